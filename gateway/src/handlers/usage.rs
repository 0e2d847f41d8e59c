use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::clock::utc_day_start;
use crate::errors::AppResult;
use crate::state::AppState;
use crate::store::{Identity, UsageLedger, UsageTotals};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageLimits {
    pub daily_chars: u64,
    pub requests_per_minute: u64,
    pub window_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub today: UsageTotals,
    pub total: UsageTotals,
    pub limits: UsageLimits,
}

/// Usage since UTC midnight, all-time usage, and the configured limits
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> AppResult<Json<UsageResponse>> {
    let since = utc_day_start(state.clock.now());
    let today = state.store.totals(&identity.id, Some(since)).await?;
    let total = state.store.totals(&identity.id, None).await?;

    let limits = state.config.rate_limits();
    Ok(Json(UsageResponse {
        today,
        total,
        limits: UsageLimits {
            daily_chars: limits.chars_per_day,
            requests_per_minute: limits.requests_per_window,
            window_seconds: limits.window_seconds,
        },
    }))
}
