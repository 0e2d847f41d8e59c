pub mod clock;
pub mod gateway;
pub mod identity;
pub mod limiter;
pub mod tts;
pub mod voices;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use gateway::{Gateway, GatewayPolicy, SynthesisOutcome, TTS_ENDPOINT, TtsRequestBody};
pub use identity::{IdentityService, IssuedCredential};
pub use limiter::{Admission, AdmissionMode, Limiter, RateDecision, RateLimitError, RateLimits};
pub use tts::{
    AudioFormat, OpenAISpeech, OpenAISpeechConfig, RetryPolicy, RetryingSynthesizer,
    SpeechProvider, Synthesizer, UpstreamError,
};
pub use voices::{VoiceRegistry, VoiceSpec};
