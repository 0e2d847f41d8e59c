use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::clock::{SharedClock, SystemClock};
use crate::core::gateway::Gateway;
use crate::core::identity::IdentityService;
use crate::core::limiter::{Admission, Limiter};
use crate::core::tts::{OpenAISpeech, RetryingSynthesizer, Synthesizer};
use crate::core::voices::VoiceRegistry;
use crate::errors::AppError;
use crate::store::{SharedStore, StoreError, open_store};

/// Failures while assembling [`AppState`]
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to seed default voices: {0}")]
    Seed(#[from] AppError),
}

/// Shared application state
pub struct AppState {
    pub config: ServerConfig,
    pub store: SharedStore,
    pub clock: SharedClock,
    pub identities: IdentityService,
    pub voices: VoiceRegistry,
    pub gateway: Gateway,
}

impl AppState {
    /// Open the configured store, seed default voices and wire the OpenAI synthesizer
    pub async fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let clock: SharedClock = Arc::new(SystemClock);
        let store = open_store(&config.db_path, clock.clone())?;

        let provider = OpenAISpeech::new(config.openai_config())?;
        if provider.config().api_key().is_none() {
            tracing::warn!("OPENAI_API_KEY not set; every /v1/tts request will fail upstream");
        }
        let synthesizer = Arc::new(RetryingSynthesizer::new(provider, config.retry_policy()));

        let state = Self::with_parts(config, store, clock, synthesizer);
        let seeded = state.voices.seed_defaults().await?;
        if seeded > 0 {
            info!(count = seeded, "Default voices installed");
        }
        Ok(state)
    }

    /// Assemble state from already-built parts
    pub fn with_parts(
        config: ServerConfig,
        store: SharedStore,
        clock: SharedClock,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Arc<Self> {
        let identities = IdentityService::new(store.clone());
        let voices = VoiceRegistry::new(store.clone());
        let admission = Admission::new(
            Limiter::new(store.clone(), config.rate_limits()),
            config.admission,
        );
        let gateway = Gateway::new(
            identities.clone(),
            voices.clone(),
            admission,
            synthesizer,
            store.clone(),
            clock.clone(),
            config.gateway_policy(),
        );

        Arc::new(Self {
            config,
            store,
            clock,
            identities,
            voices,
            gateway,
        })
    }
}
