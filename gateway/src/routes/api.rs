use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, api, tts, usage, voices};
use crate::middleware::{admin_middleware, auth_middleware};
use crate::state::AppState;

/// Full `/v1` router with authentication layers applied
///
/// - `/v1/health`: public
/// - `/v1/tts`: the gateway authenticates before reading the body
/// - `/v1/voices`, `/v1/usage`: credential middleware
/// - `/v1/admin/*`: admin token middleware
///
/// Unknown paths fall back to a JSON 404.
pub fn create_api_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/v1/health", get(api::health_check))
        .route("/v1/tts", post(tts::synthesize));

    let protected_routes = Router::new()
        .route("/v1/voices", get(voices::list_voices).post(voices::create_voice))
        .route("/v1/usage", get(usage::get_usage))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/v1/admin/users", post(admin::issue_key))
        .route("/v1/admin/users/{user_id}/active", put(admin::set_active))
        .layer(middleware::from_fn_with_state(state.clone(), admin_middleware));

    public_routes
        .merge(protected_routes)
        .merge(admin_routes)
        .fallback(api::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
