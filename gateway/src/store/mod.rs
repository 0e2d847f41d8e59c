//! Persistence for identities, voice profiles and the usage ledger.
//!
//! The gateway only depends on the capability traits defined here
//! ([`IdentityStore`], [`VoiceStore`], [`UsageLedger`]). Two backends are
//! provided:
//! - [`MemoryStore`]: process-local, selected with `TTS_DB_PATH=:memory:`
//! - [`SqliteStore`]: durable single-file database
//!
//! Timestamps are stamped by the store's own [`Clock`](crate::core::clock::Clock),
//! never by the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::clock::SharedClock;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Owner id used for built-in public voices
pub const SYSTEM_OWNER: &str = "system";

/// Path value that selects the in-memory backend
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Storage failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend failed to read or write
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A uniqueness constraint was violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A caller identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub credential: String,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_used_at: Option<OffsetDateTime>,
}

/// Identity fields chosen by the issuer; timestamps come from the store
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub id: String,
    pub email: String,
    pub credential: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// Mapping from a logical voice id to provider parameters and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceProfile {
    pub id: String,
    pub owner_id: String,
    pub display_name: String,
    pub provider_voice_name: String,
    pub description: String,
    pub language: String,
    pub accent: String,
    pub visibility: Visibility,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl VoiceProfile {
    /// Whether `requester_id` may see and use this voice
    pub fn visible_to(&self, requester_id: &str) -> bool {
        self.visibility.is_public() || self.owner_id == requester_id
    }
}

#[derive(Debug, Clone)]
pub struct NewVoice {
    pub id: String,
    pub owner_id: String,
    pub display_name: String,
    pub provider_voice_name: String,
    pub description: String,
    pub language: String,
    pub accent: String,
    pub visibility: Visibility,
}

/// One accepted synthesis call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub identity_id: String,
    pub endpoint: String,
    pub character_count: u64,
    pub request_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUsage {
    pub identity_id: String,
    pub endpoint: String,
    pub character_count: u64,
    pub request_id: String,
}

/// Result of a ledger append
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Recorded(UsageRecord),
    /// A record with the same request id already exists; nothing was written
    Duplicate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub characters: u64,
    pub requests: u64,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn identity_by_credential(&self, credential: &str) -> StoreResult<Option<Identity>>;

    async fn identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;

    async fn identity_by_id(&self, id: &str) -> StoreResult<Option<Identity>>;

    /// Insert a new active identity. Fails with [`StoreError::Conflict`] when
    /// the email or credential is already taken.
    async fn insert_identity(&self, identity: NewIdentity) -> StoreResult<Identity>;

    /// Returns the updated identity, or `None` if no such id exists
    async fn set_identity_active(&self, id: &str, active: bool)
    -> StoreResult<Option<Identity>>;

    /// Stamp `last_used_at` with the store clock
    async fn touch_identity(&self, id: &str) -> StoreResult<()>;
}

#[async_trait]
pub trait VoiceStore: Send + Sync {
    async fn voice_by_id(&self, id: &str) -> StoreResult<Option<VoiceProfile>>;

    /// All public voices, newest first
    async fn public_voices(&self) -> StoreResult<Vec<VoiceProfile>>;

    /// Private voices owned by `owner_id`, newest first
    async fn private_voices(&self, owner_id: &str) -> StoreResult<Vec<VoiceProfile>>;

    async fn insert_voice(&self, voice: NewVoice) -> StoreResult<VoiceProfile>;
}

/// Append-only record of accepted synthesis calls
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Durably append a record. Idempotent on `request_id`.
    async fn append(&self, entry: NewUsage) -> StoreResult<AppendOutcome>;

    /// Records for `identity_id` + `endpoint` with `created_at > since`
    async fn count_since(
        &self,
        identity_id: &str,
        endpoint: &str,
        since: OffsetDateTime,
    ) -> StoreResult<u64>;

    /// Summed characters for `identity_id` across endpoints with `created_at >= since`
    async fn sum_chars_since(&self, identity_id: &str, since: OffsetDateTime)
    -> StoreResult<u64>;

    /// Characters and request count at or after `since` (all time when `None`)
    async fn totals(
        &self,
        identity_id: &str,
        since: Option<OffsetDateTime>,
    ) -> StoreResult<UsageTotals>;
}

/// Everything the gateway needs from persistence
pub trait Store: IdentityStore + VoiceStore + UsageLedger {}

impl<T: IdentityStore + VoiceStore + UsageLedger> Store for T {}

pub type SharedStore = Arc<dyn Store>;

/// Open the backend selected by `db_path`
pub fn open_store(db_path: &Path, clock: SharedClock) -> StoreResult<SharedStore> {
    if db_path.as_os_str() == IN_MEMORY_PATH {
        tracing::info!("Using in-memory store; usage will not survive restarts");
        return Ok(Arc::new(MemoryStore::new(clock)));
    }
    tracing::info!(path = %db_path.display(), "Opening SQLite store");
    Ok(Arc::new(SqliteStore::open(db_path, clock)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;
    use tempfile::TempDir;

    #[test]
    fn test_voice_visibility() {
        let voice = VoiceProfile {
            id: "voice_1".to_string(),
            owner_id: "user-a".to_string(),
            display_name: "Mine".to_string(),
            provider_voice_name: "nova".to_string(),
            description: String::new(),
            language: "en-US".to_string(),
            accent: "american".to_string(),
            visibility: Visibility::Private,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert!(voice.visible_to("user-a"));
        assert!(!voice.visible_to("user-b"));
    }

    #[test]
    fn test_identity_serialization_hides_credential() {
        let identity = Identity {
            id: "id-1".to_string(),
            email: "a@example.com".to_string(),
            credential: "tts_secret".to_string(),
            active: true,
            created_at: OffsetDateTime::UNIX_EPOCH,
            last_used_at: None,
        };
        let json = serde_json::to_string(&identity).unwrap();
        assert!(!json.contains("tts_secret"));
    }

    #[tokio::test]
    async fn test_open_store_selects_backend() {
        let clock: SharedClock = Arc::new(SystemClock);
        let memory = open_store(Path::new(IN_MEMORY_PATH), clock.clone()).unwrap();
        assert!(memory.public_voices().await.unwrap().is_empty());

        let dir = TempDir::new().unwrap();
        let sqlite = open_store(&dir.path().join("tts.db"), clock).unwrap();
        assert!(sqlite.public_voices().await.unwrap().is_empty());
        assert!(dir.path().join("tts.db").exists());
    }
}
