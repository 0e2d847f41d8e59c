use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{AudioFormat, SpeechProvider, SpeechRequest, Synthesizer, UpstreamError};
use crate::store::VoiceProfile;

/// Default backoff between attempts
pub const DEFAULT_RETRY_DELAYS_MS: [u64; 3] = [250, 500, 1000];

/// Bounded retry schedule.
///
/// Attempt `n` (0-based) is followed by `delays[n]` before attempt `n + 1`;
/// the final attempt has no delay after it, so a policy makes
/// `delays.len() + 1` attempts at most.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
    /// Overall budget across attempts and sleeps
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RETRY_DELAYS_MS, None)
    }
}

impl RetryPolicy {
    pub fn from_millis(delays_ms: &[u64], deadline: Option<Duration>) -> Self {
        Self {
            delays: delays_ms.iter().copied().map(Duration::from_millis).collect(),
            deadline,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.delays.len() as u32 + 1
    }
}

/// [`Synthesizer`] that retries transient provider failures
pub struct RetryingSynthesizer<P> {
    provider: P,
    policy: RetryPolicy,
}

impl<P: SpeechProvider> RetryingSynthesizer<P> {
    pub fn new(provider: P, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Run `request` through the retry schedule
    pub async fn run(&self, request: &SpeechRequest) -> Result<Bytes, UpstreamError> {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts();
        let mut last = String::new();

        for attempt in 0..max_attempts {
            match self.provider.attempt(request).await {
                Ok(audio) => {
                    debug!(
                        provider = self.provider.name(),
                        attempt = attempt + 1,
                        bytes = audio.len(),
                        "Upstream synthesis succeeded"
                    );
                    return Ok(audio);
                }
                Err(err @ UpstreamError::Transient { .. }) => {
                    last = err.detail();
                    warn!(
                        provider = self.provider.name(),
                        attempt = attempt + 1,
                        max_attempts,
                        error = %last,
                        "Transient upstream failure"
                    );
                }
                Err(err) => return Err(err),
            }

            let Some(delay) = self.policy.delays.get(attempt as usize).copied() else {
                break;
            };
            let over_deadline = self
                .policy
                .deadline
                .is_some_and(|deadline| started.elapsed() + delay > deadline);
            if over_deadline {
                warn!(
                    provider = self.provider.name(),
                    attempt = attempt + 1,
                    "Upstream deadline reached, giving up"
                );
                return Err(UpstreamError::Exhausted {
                    attempts: attempt + 1,
                    last,
                });
            }
            tokio::time::sleep(delay).await;
        }

        Err(UpstreamError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }
}

#[async_trait]
impl<P: SpeechProvider> Synthesizer for RetryingSynthesizer<P> {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        format: AudioFormat,
        speed: f32,
    ) -> Result<Bytes, UpstreamError> {
        let request = SpeechRequest::for_voice(voice, text, format, speed);
        self.run(&request).await
    }
}
