//! Voice profiles: lookup with visibility rules, listing and creation.

use tracing::{info, warn};
use uuid::Uuid;

use super::tts::openai::OpenAIVoice;
use crate::errors::{AppResult, NotFoundError, ValidationError};
use crate::store::{NewVoice, SYSTEM_OWNER, SharedStore, Visibility, VoiceProfile, VoiceStore};

pub const DEFAULT_VOICE_ID: &str = "naija_female_warm";
pub const DEFAULT_CUSTOM_VOICE_NAME: &str = "Custom Voice";
pub const DEFAULT_LANGUAGE: &str = "en-NG";
pub const DEFAULT_ACCENT: &str = "nigerian";

/// Caller-supplied fields for a new private voice
#[derive(Debug, Clone, Default)]
pub struct VoiceSpec {
    pub display_name: Option<String>,
    pub provider_voice_name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub accent: Option<String>,
}

struct SeedVoice {
    id: &'static str,
    display_name: &'static str,
    provider_voice: OpenAIVoice,
    description: &'static str,
    language: &'static str,
    accent: &'static str,
}

const SEED_VOICES: [SeedVoice; 4] = [
    SeedVoice {
        id: "naija_male_deep",
        display_name: "Nigerian Male Deep",
        provider_voice: OpenAIVoice::Onyx,
        description: "Nigerian male, deep & calm authority; announcements/news/support.",
        language: "en-NG",
        accent: "nigerian",
    },
    SeedVoice {
        id: "naija_female_warm",
        display_name: "Nigerian Female Warm",
        provider_voice: OpenAIVoice::Coral,
        description: "Nigerian female, warm & lively; onboarding/conversational.",
        language: "en-NG",
        accent: "nigerian",
    },
    SeedVoice {
        id: "naija_female_bold",
        display_name: "Nigerian Female Bold",
        provider_voice: OpenAIVoice::Verse,
        description: "Nigerian female, bold & confident; ads & announcements.",
        language: "en-NG",
        accent: "nigerian",
    },
    SeedVoice {
        id: "us_male_story",
        display_name: "US Male Storyteller",
        provider_voice: OpenAIVoice::Sage,
        description: "US male, calm storyteller; explainer videos & narration.",
        language: "en-US",
        accent: "american",
    },
];

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct VoiceRegistry {
    store: SharedStore,
}

impl VoiceRegistry {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Voice usable by `requester_id`. Someone else's private voice is
    /// reported as not found.
    pub async fn resolve(&self, voice_id: &str, requester_id: &str) -> AppResult<VoiceProfile> {
        match self.store.voice_by_id(voice_id).await? {
            Some(voice) if voice.visible_to(requester_id) => Ok(voice),
            _ => Err(NotFoundError::Voice.into()),
        }
    }

    /// Public voices followed by the requester's private voices, each group newest first
    pub async fn list(&self, requester_id: &str) -> AppResult<Vec<VoiceProfile>> {
        let mut voices = self.store.public_voices().await?;
        voices.extend(self.store.private_voices(requester_id).await?);
        Ok(voices)
    }

    /// Create a private voice owned by `owner_id`
    pub async fn create(&self, owner_id: &str, spec: VoiceSpec) -> AppResult<VoiceProfile> {
        let provider_voice_name = spec.provider_voice_name.trim().to_string();
        if provider_voice_name.is_empty() {
            return Err(ValidationError::ProviderVoiceRequired.into());
        }
        if OpenAIVoice::parse(&provider_voice_name).is_none() {
            warn!(
                provider_voice = %provider_voice_name,
                "Voice references a provider voice name that is not in the known list"
            );
        }

        let simple = Uuid::new_v4().simple().to_string();
        let voice = NewVoice {
            id: format!("voice_{}", &simple[..16]),
            owner_id: owner_id.to_string(),
            display_name: non_blank(spec.display_name)
                .unwrap_or_else(|| DEFAULT_CUSTOM_VOICE_NAME.to_string()),
            provider_voice_name,
            description: non_blank(spec.description).unwrap_or_default(),
            language: non_blank(spec.language).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            accent: non_blank(spec.accent).unwrap_or_else(|| DEFAULT_ACCENT.to_string()),
            visibility: Visibility::Private,
        };
        let profile = self.store.insert_voice(voice).await?;
        info!(voice_id = %profile.id, owner_id = %owner_id, "Created custom voice");
        Ok(profile)
    }

    /// Insert the built-in public voices when none exist. Returns how many were added.
    pub async fn seed_defaults(&self) -> AppResult<usize> {
        if !self.store.public_voices().await?.is_empty() {
            return Ok(0);
        }
        for seed in &SEED_VOICES {
            self.store
                .insert_voice(NewVoice {
                    id: seed.id.to_string(),
                    owner_id: SYSTEM_OWNER.to_string(),
                    display_name: seed.display_name.to_string(),
                    provider_voice_name: seed.provider_voice.as_str().to_string(),
                    description: seed.description.to_string(),
                    language: seed.language.to_string(),
                    accent: seed.accent.to_string(),
                    visibility: Visibility::Public,
                })
                .await?;
        }
        info!(count = SEED_VOICES.len(), "Seeded default voices");
        Ok(SEED_VOICES.len())
    }
}
