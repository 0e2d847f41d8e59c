//! OpenAI Audio Speech provider.
//!
//! Supported voices: alloy, ash, ballad, coral, echo, fable, onyx, nova,
//! sage, shimmer, verse. The voice registry stores these names as each
//! profile's `provider_voice_name`.

mod config;
mod provider;

pub use config::{
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, DEFAULT_UPSTREAM_TIMEOUT_MS,
    OpenAISpeechConfig, OpenAIVoice,
};
pub use provider::OpenAISpeech;
