//! SQLite backend.
//!
//! A single connection sits behind `Arc<Mutex<Connection>>`; every call runs
//! on the blocking pool so async workers never wait on disk I/O.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

use super::{
    AppendOutcome, Identity, IdentityStore, NewIdentity, NewUsage, NewVoice, StoreError,
    StoreResult, UsageLedger, UsageRecord, UsageTotals, Visibility, VoiceProfile, VoiceStore,
};
use crate::core::clock::{SharedClock, from_millis, to_millis};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    credential    TEXT NOT NULL UNIQUE,
    active        INTEGER NOT NULL DEFAULT 1,
    created_at_ms INTEGER NOT NULL,
    last_used_ms  INTEGER
);

CREATE TABLE IF NOT EXISTS voices (
    seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
    id                  TEXT NOT NULL UNIQUE,
    owner_id            TEXT NOT NULL,
    display_name        TEXT NOT NULL,
    provider_voice_name TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    language            TEXT NOT NULL DEFAULT '',
    accent              TEXT NOT NULL DEFAULT '',
    is_public           INTEGER NOT NULL DEFAULT 0,
    created_at_ms       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS usage (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id   TEXT NOT NULL,
    endpoint      TEXT NOT NULL,
    chars         INTEGER NOT NULL,
    request_id    TEXT NOT NULL UNIQUE,
    created_at_ms INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_identity_endpoint_time
    ON usage(identity_id, endpoint, created_at_ms);
";

const IDENTITY_COLUMNS: &str = "id, email, credential, active, created_at_ms, last_used_ms";

const VOICE_COLUMNS: &str = "id, owner_id, display_name, provider_voice_name, description, \
     language, accent, is_public, created_at_ms";

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(msg.unwrap_or_else(|| "constraint violation".to_string()))
            }
            rusqlite::Error::FromSqlConversionFailure(_, _, source) => {
                StoreError::Corrupt(source.to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Durable store backed by a single SQLite file
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: SharedClock,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema
    pub fn open(path: &Path, clock: SharedClock) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        // journal_mode returns the resulting mode as a row
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Self::from_connection(conn, clock)
    }

    /// Private database that disappears with the connection
    pub fn open_in_memory(clock: SharedClock) -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(conn: Connection, clock: SharedClock) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("storage task failed: {e}")))?
    }
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        id: row.get(0)?,
        email: row.get(1)?,
        credential: row.get(2)?,
        active: row.get(3)?,
        created_at: from_millis(row.get(4)?),
        last_used_at: row.get::<_, Option<i64>>(5)?.map(from_millis),
    })
}

fn voice_from_row(row: &Row<'_>) -> rusqlite::Result<VoiceProfile> {
    let is_public: bool = row.get(7)?;
    Ok(VoiceProfile {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        display_name: row.get(2)?,
        provider_voice_name: row.get(3)?,
        description: row.get(4)?,
        language: row.get(5)?,
        accent: row.get(6)?,
        visibility: if is_public {
            Visibility::Public
        } else {
            Visibility::Private
        },
        created_at: from_millis(row.get(8)?),
    })
}

fn query_identity(
    conn: &Connection,
    column: &'static str,
    value: &str,
) -> StoreResult<Option<Identity>> {
    let sql = format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE {column} = ?1");
    Ok(conn
        .query_row(&sql, params![value], identity_from_row)
        .optional()?)
}

fn query_voices(conn: &Connection, filter: &str, args: &[&dyn rusqlite::ToSql]) -> StoreResult<Vec<VoiceProfile>> {
    let sql = format!(
        "SELECT {VOICE_COLUMNS} FROM voices WHERE {filter} ORDER BY created_at_ms DESC, seq DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, voice_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn chars_to_sql(chars: u64) -> StoreResult<i64> {
    i64::try_from(chars).map_err(|_| StoreError::Backend(format!("character count {chars} overflows")))
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn identity_by_credential(&self, credential: &str) -> StoreResult<Option<Identity>> {
        let credential = credential.to_string();
        self.with_conn(move |conn| query_identity(conn, "credential", &credential))
            .await
    }

    async fn identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let email = email.to_string();
        self.with_conn(move |conn| query_identity(conn, "email", &email))
            .await
    }

    async fn identity_by_id(&self, id: &str) -> StoreResult<Option<Identity>> {
        let id = id.to_string();
        self.with_conn(move |conn| query_identity(conn, "id", &id)).await
    }

    async fn insert_identity(&self, identity: NewIdentity) -> StoreResult<Identity> {
        let created_at = self.clock.now();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO identities (id, email, credential, active, created_at_ms)
                 VALUES (?1, ?2, ?3, 1, ?4)",
                params![
                    identity.id,
                    identity.email,
                    identity.credential,
                    to_millis(created_at)
                ],
            )?;
            Ok(Identity {
                id: identity.id,
                email: identity.email,
                credential: identity.credential,
                active: true,
                created_at,
                last_used_at: None,
            })
        })
        .await
    }

    async fn set_identity_active(
        &self,
        id: &str,
        active: bool,
    ) -> StoreResult<Option<Identity>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE identities SET active = ?1 WHERE id = ?2",
                params![active, id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_identity(conn, "id", &id)
        })
        .await
    }

    async fn touch_identity(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        let now = to_millis(self.clock.now());
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE identities SET last_used_ms = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl VoiceStore for SqliteStore {
    async fn voice_by_id(&self, id: &str) -> StoreResult<Option<VoiceProfile>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {VOICE_COLUMNS} FROM voices WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], voice_from_row).optional()?)
        })
        .await
    }

    async fn public_voices(&self) -> StoreResult<Vec<VoiceProfile>> {
        self.with_conn(|conn| query_voices(conn, "is_public = 1", &[]))
            .await
    }

    async fn private_voices(&self, owner_id: &str) -> StoreResult<Vec<VoiceProfile>> {
        let owner_id = owner_id.to_string();
        self.with_conn(move |conn| {
            query_voices(conn, "is_public = 0 AND owner_id = ?1", &[&owner_id])
        })
        .await
    }

    async fn insert_voice(&self, voice: NewVoice) -> StoreResult<VoiceProfile> {
        let created_at = self.clock.now();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO voices (id, owner_id, display_name, provider_voice_name,
                     description, language, accent, is_public, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    voice.id,
                    voice.owner_id,
                    voice.display_name,
                    voice.provider_voice_name,
                    voice.description,
                    voice.language,
                    voice.accent,
                    voice.visibility.is_public(),
                    to_millis(created_at),
                ],
            )?;
            Ok(VoiceProfile {
                id: voice.id,
                owner_id: voice.owner_id,
                display_name: voice.display_name,
                provider_voice_name: voice.provider_voice_name,
                description: voice.description,
                language: voice.language,
                accent: voice.accent,
                visibility: voice.visibility,
                created_at,
            })
        })
        .await
    }
}

#[async_trait]
impl UsageLedger for SqliteStore {
    async fn append(&self, entry: NewUsage) -> StoreResult<AppendOutcome> {
        let now_ms = to_millis(self.clock.now());
        self.with_conn(move |conn| {
            let chars = chars_to_sql(entry.character_count)?;
            let tx = conn.transaction()?;

            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM usage WHERE request_id = ?1)",
                params![entry.request_id],
                |row| row.get(0),
            )?;
            if exists {
                return Ok(AppendOutcome::Duplicate);
            }

            let last_ms: Option<i64> = tx.query_row(
                "SELECT MAX(created_at_ms) FROM usage WHERE identity_id = ?1",
                params![entry.identity_id],
                |row| row.get(0),
            )?;
            let created_ms = last_ms.map_or(now_ms, |last| last.max(now_ms));

            tx.execute(
                "INSERT INTO usage (identity_id, endpoint, chars, request_id, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.identity_id,
                    entry.endpoint,
                    chars,
                    entry.request_id,
                    created_ms
                ],
            )?;
            tx.commit()?;

            Ok(AppendOutcome::Recorded(UsageRecord {
                identity_id: entry.identity_id,
                endpoint: entry.endpoint,
                character_count: entry.character_count,
                request_id: entry.request_id,
                created_at: from_millis(created_ms),
            }))
        })
        .await
    }

    async fn count_since(
        &self,
        identity_id: &str,
        endpoint: &str,
        since: OffsetDateTime,
    ) -> StoreResult<u64> {
        let identity_id = identity_id.to_string();
        let endpoint = endpoint.to_string();
        let since_ms = to_millis(since);
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM usage
                 WHERE identity_id = ?1 AND endpoint = ?2 AND created_at_ms > ?3",
                params![identity_id, endpoint, since_ms],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn sum_chars_since(
        &self,
        identity_id: &str,
        since: OffsetDateTime,
    ) -> StoreResult<u64> {
        let totals = self.totals(identity_id, Some(since)).await?;
        Ok(totals.characters)
    }

    async fn totals(
        &self,
        identity_id: &str,
        since: Option<OffsetDateTime>,
    ) -> StoreResult<UsageTotals> {
        let identity_id = identity_id.to_string();
        let since_ms = since.map_or(i64::MIN, to_millis);
        self.with_conn(move |conn| {
            let (chars, requests): (i64, i64) = conn.query_row(
                "SELECT COALESCE(SUM(chars), 0), COUNT(*) FROM usage
                 WHERE identity_id = ?1 AND created_at_ms >= ?2",
                params![identity_id, since_ms],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(UsageTotals {
                characters: chars.max(0) as u64,
                requests: requests.max(0) as u64,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{Clock, ManualClock};
    use tempfile::TempDir;
    use time::macros::datetime;

    fn clock() -> SharedClock {
        Arc::new(ManualClock::new(datetime!(2026-05-01 10:00:00 UTC)))
    }

    fn usage(request_id: &str, chars: u64) -> NewUsage {
        NewUsage {
            identity_id: "u1".to_string(),
            endpoint: "/v1/tts".to_string(),
            character_count: chars,
            request_id: request_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_usage_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tts.db");

        {
            let store = SqliteStore::open(&path, clock()).unwrap();
            store.append(usage("req-1", 42)).await.unwrap();
            store
                .insert_identity(NewIdentity {
                    id: "u1".to_string(),
                    email: "a@example.com".to_string(),
                    credential: "tts_abc".to_string(),
                })
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path, clock()).unwrap();
        let totals = reopened.totals("u1", None).await.unwrap();
        assert_eq!(totals, UsageTotals { characters: 42, requests: 1 });
        let identity = reopened.identity_by_credential("tts_abc").await.unwrap();
        assert_eq!(identity.map(|i| i.email).as_deref(), Some("a@example.com"));
    }

    #[tokio::test]
    async fn test_duplicate_request_id_is_noop() {
        let store = SqliteStore::open_in_memory(clock()).unwrap();
        store.append(usage("req-1", 10)).await.unwrap();
        let second = store.append(usage("req-1", 10)).await.unwrap();
        assert_eq!(second, AppendOutcome::Duplicate);
        assert_eq!(store.totals("u1", None).await.unwrap().requests, 1);
    }

    #[tokio::test]
    async fn test_totals_include_records_at_since() {
        let clock = clock();
        let since = clock.now();
        let store = SqliteStore::open_in_memory(clock).unwrap();
        store.append(usage("req-1", 9)).await.unwrap();
        assert_eq!(store.sum_chars_since("u1", since).await.unwrap(), 9);
        assert_eq!(store.count_since("u1", "/v1/tts", since).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = SqliteStore::open_in_memory(clock()).unwrap();
        let first = NewIdentity {
            id: "u1".to_string(),
            email: "a@example.com".to_string(),
            credential: "tts_1".to_string(),
        };
        store.insert_identity(first).await.unwrap();
        let err = store
            .insert_identity(NewIdentity {
                id: "u2".to_string(),
                email: "a@example.com".to_string(),
                credential: "tts_2".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_set_active_unknown_identity() {
        let store = SqliteStore::open_in_memory(clock()).unwrap();
        assert!(store.set_identity_active("missing", false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_voice_listing_order() {
        let store = SqliteStore::open_in_memory(clock()).unwrap();
        for id in ["a", "b", "c"] {
            store
                .insert_voice(NewVoice {
                    id: id.to_string(),
                    owner_id: "system".to_string(),
                    display_name: id.to_uppercase(),
                    provider_voice_name: "alloy".to_string(),
                    description: String::new(),
                    language: "en-US".to_string(),
                    accent: "american".to_string(),
                    visibility: Visibility::Public,
                })
                .await
                .unwrap();
        }
        let ids: Vec<_> = store
            .public_voices()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }
}
