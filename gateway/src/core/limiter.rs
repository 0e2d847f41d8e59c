//! Sliding-window request limits and daily character quotas.
//!
//! [`Limiter::check`] is a pure read over the usage ledger. [`Admission`]
//! wraps it with a per-identity lock and an in-flight reservation table so
//! that two concurrent requests cannot both pass on the same remaining
//! capacity.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

use super::clock::utc_day_start;
use crate::errors::AppResult;
use crate::store::{SharedStore, StoreResult, UsageLedger};

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Too many requests in the current window")]
    RateLimited,

    #[error("Daily character quota exceeded")]
    QuotaExceeded,
}

impl RateLimitError {
    pub fn code(&self) -> &'static str {
        match self {
            RateLimitError::RateLimited => "rate_limited",
            RateLimitError::QuotaExceeded => "quota_exceeded",
        }
    }
}

/// Outcome of a limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied(RateLimitError),
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimits {
    pub requests_per_window: u64,
    pub window_seconds: u64,
    pub chars_per_day: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_window: 60,
            window_seconds: 60,
            chars_per_day: 300_000,
        }
    }
}

/// Capacity held by requests that passed admission but are not yet in the ledger
#[derive(Debug, Clone, Copy, Default)]
struct Pending {
    requests: u64,
    chars: u64,
}

#[derive(Clone)]
pub struct Limiter {
    store: SharedStore,
    limits: RateLimits,
}

impl Limiter {
    pub fn new(store: SharedStore, limits: RateLimits) -> Self {
        Self { store, limits }
    }

    /// Decide whether `identity_id` may spend `incoming_chars` on `endpoint` at `now`.
    ///
    /// The request window is checked before the daily quota. A request that
    /// brings the day's total to exactly the quota is allowed.
    pub async fn check(
        &self,
        identity_id: &str,
        endpoint: &str,
        incoming_chars: u64,
        now: OffsetDateTime,
    ) -> StoreResult<RateDecision> {
        self.evaluate(identity_id, endpoint, incoming_chars, now, Pending::default())
            .await
    }

    async fn evaluate(
        &self,
        identity_id: &str,
        endpoint: &str,
        incoming_chars: u64,
        now: OffsetDateTime,
        pending: Pending,
    ) -> StoreResult<RateDecision> {
        let window_start = now - time::Duration::seconds(self.limits.window_seconds as i64);
        let recent = self
            .store
            .count_since(identity_id, endpoint, window_start)
            .await?;
        if recent + pending.requests >= self.limits.requests_per_window {
            return Ok(RateDecision::Denied(RateLimitError::RateLimited));
        }

        let used_today = self
            .store
            .sum_chars_since(identity_id, utc_day_start(now))
            .await?;
        if used_today + pending.chars + incoming_chars > self.limits.chars_per_day {
            return Ok(RateDecision::Denied(RateLimitError::QuotaExceeded));
        }

        Ok(RateDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Reserve capacity atomically with the limit check
    #[default]
    Reserve,
    /// Check against the ledger only; concurrent requests may overshoot
    CheckOnly,
}

impl std::str::FromStr for AdmissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reserve" => Ok(AdmissionMode::Reserve),
            "check_only" | "check-only" => Ok(AdmissionMode::CheckOnly),
            other => Err(format!("unknown admission mode '{other}'")),
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    requests: HashMap<String, u64>,
    chars: u64,
}

type InFlightTable = Arc<DashMap<String, InFlight>>;

/// Limit check plus capacity reservation
pub struct Admission {
    limiter: Limiter,
    mode: AdmissionMode,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    in_flight: InFlightTable,
}

impl Admission {
    pub fn new(limiter: Limiter, mode: AdmissionMode) -> Self {
        Self {
            limiter,
            mode,
            locks: DashMap::new(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Admit one request or refuse it with a [`RateLimitError`].
    ///
    /// The returned [`Reservation`] must be kept alive until the usage record
    /// has been appended; dropping it releases the reserved capacity.
    pub async fn admit(
        &self,
        identity_id: &str,
        endpoint: &str,
        chars: u64,
        now: OffsetDateTime,
    ) -> AppResult<Reservation> {
        if self.mode == AdmissionMode::CheckOnly {
            return match self.limiter.check(identity_id, endpoint, chars, now).await? {
                RateDecision::Allowed => Ok(Reservation::untracked()),
                RateDecision::Denied(reason) => Err(reason.into()),
            };
        }

        let lock = self
            .locks
            .entry(identity_id.to_string())
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.reserve(identity_id, endpoint, chars, now).await
        };
        drop(lock);
        // Only the map still holds the lock once nobody is admitting
        self.locks
            .remove_if(identity_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn reserve(
        &self,
        identity_id: &str,
        endpoint: &str,
        chars: u64,
        now: OffsetDateTime,
    ) -> AppResult<Reservation> {
        let pending = self.pending(identity_id, endpoint);
        match self
            .limiter
            .evaluate(identity_id, endpoint, chars, now, pending)
            .await?
        {
            RateDecision::Allowed => {}
            RateDecision::Denied(reason) => {
                tracing::debug!(
                    identity_id = %identity_id,
                    reason = reason.code(),
                    in_flight = pending.requests,
                    "Admission denied"
                );
                return Err(reason.into());
            }
        }

        {
            let mut entry = self.in_flight.entry(identity_id.to_string()).or_default();
            *entry.requests.entry(endpoint.to_string()).or_default() += 1;
            entry.chars += chars;
        }

        Ok(Reservation {
            table: Some(Arc::clone(&self.in_flight)),
            identity_id: identity_id.to_string(),
            endpoint: endpoint.to_string(),
            chars,
        })
    }

    fn pending(&self, identity_id: &str, endpoint: &str) -> Pending {
        self.in_flight
            .get(identity_id)
            .map(|entry| Pending {
                requests: entry.requests.get(endpoint).copied().unwrap_or(0),
                chars: entry.chars,
            })
            .unwrap_or_default()
    }

    /// Requests currently holding a reservation for `identity_id`
    pub fn in_flight_requests(&self, identity_id: &str) -> u64 {
        self.in_flight
            .get(identity_id)
            .map(|entry| entry.requests.values().sum())
            .unwrap_or(0)
    }
}

/// Capacity held between admission and the ledger append
#[must_use = "dropping a reservation releases its capacity"]
pub struct Reservation {
    table: Option<InFlightTable>,
    identity_id: String,
    endpoint: String,
    chars: u64,
}

impl Reservation {
    fn untracked() -> Self {
        Self {
            table: None,
            identity_id: String::new(),
            endpoint: String::new(),
            chars: 0,
        }
    }

    /// Release the reservation once the usage record is in the ledger
    pub fn commit(self) {
        tracing::trace!(identity_id = %self.identity_id, "Reservation committed");
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let Some(table) = self.table.take() else {
            return;
        };
        let now_empty = match table.get_mut(&self.identity_id) {
            Some(mut entry) => {
                if let Some(count) = entry.requests.get_mut(&self.endpoint) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        entry.requests.remove(&self.endpoint);
                    }
                }
                entry.chars = entry.chars.saturating_sub(self.chars);
                entry.requests.is_empty() && entry.chars == 0
            }
            None => false,
        };
        if now_empty {
            table.remove_if(&self.identity_id, |_, entry| {
                entry.requests.is_empty() && entry.chars == 0
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, ManualClock};
    use crate::errors::AppError;
    use crate::store::{MemoryStore, NewUsage, UsageLedger};
    use time::Duration;
    use time::macros::datetime;

    const TTS: &str = "/v1/tts";

    fn setup(limits: RateLimits) -> (Arc<ManualClock>, Arc<MemoryStore>, Limiter) {
        let clock = Arc::new(ManualClock::new(datetime!(2026-06-01 12:00:00 UTC)));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let limiter = Limiter::new(store.clone(), limits);
        (clock, store, limiter)
    }

    async fn record(store: &MemoryStore, id: &str, chars: u64) {
        store
            .append(NewUsage {
                identity_id: "u1".to_string(),
                endpoint: TTS.to_string(),
                character_count: chars,
                request_id: id.to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sixty_first_request_is_rate_limited() {
        let (clock, store, limiter) = setup(RateLimits::default());
        for i in 0..60 {
            record(&store, &format!("r{i}"), 1).await;
        }
        let decision = limiter.check("u1", TTS, 1, clock.now()).await.unwrap();
        assert_eq!(decision, RateDecision::Denied(RateLimitError::RateLimited));
    }

    #[tokio::test]
    async fn test_window_slides() {
        let (clock, store, limiter) = setup(RateLimits {
            requests_per_window: 2,
            ..RateLimits::default()
        });
        record(&store, "a", 1).await;
        record(&store, "b", 1).await;
        assert!(!limiter.check("u1", TTS, 1, clock.now()).await.unwrap().is_allowed());

        // A record exactly at the window start no longer counts
        clock.advance(Duration::seconds(60));
        assert!(limiter.check("u1", TTS, 1, clock.now()).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_quota_boundary() {
        let (clock, store, limiter) = setup(RateLimits {
            chars_per_day: 100,
            ..RateLimits::default()
        });
        record(&store, "a", 60).await;

        let exact = limiter.check("u1", TTS, 40, clock.now()).await.unwrap();
        assert!(exact.is_allowed());

        record(&store, "b", 40).await;
        let over = limiter.check("u1", TTS, 1, clock.now()).await.unwrap();
        assert_eq!(over, RateDecision::Denied(RateLimitError::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_quota_resets_at_utc_midnight() {
        let (clock, store, limiter) = setup(RateLimits {
            chars_per_day: 10,
            ..RateLimits::default()
        });
        record(&store, "a", 10).await;
        assert!(!limiter.check("u1", TTS, 1, clock.now()).await.unwrap().is_allowed());

        clock.set(datetime!(2026-06-02 00:00:01 UTC));
        assert!(limiter.check("u1", TTS, 1, clock.now()).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_usage_at_midnight_counts_toward_new_day() {
        let (clock, store, limiter) = setup(RateLimits {
            chars_per_day: 10,
            ..RateLimits::default()
        });
        clock.set(datetime!(2026-06-02 00:00:00 UTC));
        record(&store, "a", 10).await;

        clock.set(datetime!(2026-06-02 09:00:00 UTC));
        let decision = limiter.check("u1", TTS, 1, clock.now()).await.unwrap();
        assert_eq!(decision, RateDecision::Denied(RateLimitError::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_rate_checked_before_quota() {
        let (clock, store, limiter) = setup(RateLimits {
            requests_per_window: 1,
            chars_per_day: 1,
            window_seconds: 60,
        });
        record(&store, "a", 1).await;
        let decision = limiter.check("u1", TTS, 5, clock.now()).await.unwrap();
        assert_eq!(decision, RateDecision::Denied(RateLimitError::RateLimited));
    }

    #[tokio::test]
    async fn test_reservations_count_against_limits() {
        let (clock, _store, limiter) = setup(RateLimits {
            requests_per_window: 2,
            ..RateLimits::default()
        });
        let admission = Admission::new(limiter, AdmissionMode::Reserve);

        let first = admission.admit("u1", TTS, 1, clock.now()).await.unwrap();
        let _second = admission.admit("u1", TTS, 1, clock.now()).await.unwrap();
        let third = admission.admit("u1", TTS, 1, clock.now()).await;
        assert!(matches!(
            third,
            Err(AppError::RateLimit(RateLimitError::RateLimited))
        ));
        assert_eq!(admission.in_flight_requests("u1"), 2);

        drop(first);
        assert_eq!(admission.in_flight_requests("u1"), 1);
        assert!(admission.admit("u1", TTS, 1, clock.now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_admission_respects_quota() {
        let (clock, _store, limiter) = setup(RateLimits {
            chars_per_day: 100,
            ..RateLimits::default()
        });
        let admission = Arc::new(Admission::new(limiter, AdmissionMode::Reserve));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let admission = admission.clone();
            let now = clock.now();
            handles.push(tokio::spawn(async move {
                admission.admit("u1", TTS, 30, now).await.ok()
            }));
        }
        let mut held = Vec::new();
        for handle in handles {
            if let Some(reservation) = handle.await.unwrap() {
                held.push(reservation);
            }
        }
        assert_eq!(held.len(), 3);
        assert!(admission.locks.is_empty());
    }

    #[tokio::test]
    async fn test_admission_locks_are_pruned() {
        let (clock, _store, limiter) = setup(RateLimits::default());
        let admission = Admission::new(limiter, AdmissionMode::Reserve);

        let reservation = admission.admit("u1", TTS, 1, clock.now()).await.unwrap();
        let _ = admission.admit("u2", TTS, 1, clock.now()).await.unwrap();
        assert!(admission.locks.is_empty());

        drop(reservation);
        assert!(admission.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_check_only_does_not_reserve() {
        let (clock, _store, limiter) = setup(RateLimits {
            requests_per_window: 1,
            ..RateLimits::default()
        });
        let admission = Admission::new(limiter, AdmissionMode::CheckOnly);
        let _a = admission.admit("u1", TTS, 1, clock.now()).await.unwrap();
        let _b = admission.admit("u1", TTS, 1, clock.now()).await.unwrap();
        assert_eq!(admission.in_flight_requests("u1"), 0);
    }

    #[test]
    fn test_admission_mode_parse() {
        assert_eq!("reserve".parse::<AdmissionMode>(), Ok(AdmissionMode::Reserve));
        assert_eq!("CHECK_ONLY".parse::<AdmissionMode>(), Ok(AdmissionMode::CheckOnly));
        assert!("none".parse::<AdmissionMode>().is_err());
    }
}
