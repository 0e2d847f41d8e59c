use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use time::OffsetDateTime;

use super::{
    AppendOutcome, Identity, IdentityStore, NewIdentity, NewUsage, NewVoice, StoreError,
    StoreResult, UsageLedger, UsageRecord, UsageTotals, VoiceProfile, VoiceStore,
};
use crate::core::clock::SharedClock;

#[derive(Debug, Default)]
struct Inner {
    identities: HashMap<String, Identity>,
    by_credential: HashMap<String, String>,
    by_email: HashMap<String, String>,
    /// (insertion seq, profile)
    voices: Vec<(u64, VoiceProfile)>,
    next_voice_seq: u64,
    usage: Vec<UsageRecord>,
    request_ids: HashSet<String>,
    last_usage_at: HashMap<String, OffsetDateTime>,
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug)]
pub struct MemoryStore {
    clock: SharedClock,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of usage records, for diagnostics and tests
    pub fn usage_len(&self) -> usize {
        self.inner.read().usage.len()
    }
}

fn newest_first(voices: &mut [(u64, VoiceProfile)]) {
    voices.sort_by(|(seq_a, a), (seq_b, b)| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| seq_b.cmp(seq_a))
    });
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn identity_by_credential(&self, credential: &str) -> StoreResult<Option<Identity>> {
        let inner = self.inner.read();
        Ok(inner
            .by_credential
            .get(credential)
            .and_then(|id| inner.identities.get(id))
            .cloned())
    }

    async fn identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let inner = self.inner.read();
        Ok(inner
            .by_email
            .get(email)
            .and_then(|id| inner.identities.get(id))
            .cloned())
    }

    async fn identity_by_id(&self, id: &str) -> StoreResult<Option<Identity>> {
        Ok(self.inner.read().identities.get(id).cloned())
    }

    async fn insert_identity(&self, identity: NewIdentity) -> StoreResult<Identity> {
        let mut inner = self.inner.write();
        if inner.identities.contains_key(&identity.id) {
            return Err(StoreError::Conflict(format!("identity id {}", identity.id)));
        }
        if inner.by_email.contains_key(&identity.email) {
            return Err(StoreError::Conflict(format!("email {}", identity.email)));
        }
        if inner.by_credential.contains_key(&identity.credential) {
            return Err(StoreError::Conflict("credential".to_string()));
        }

        let record = Identity {
            id: identity.id,
            email: identity.email,
            credential: identity.credential,
            active: true,
            created_at: self.clock.now(),
            last_used_at: None,
        };
        inner
            .by_credential
            .insert(record.credential.clone(), record.id.clone());
        inner.by_email.insert(record.email.clone(), record.id.clone());
        inner.identities.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn set_identity_active(
        &self,
        id: &str,
        active: bool,
    ) -> StoreResult<Option<Identity>> {
        let mut inner = self.inner.write();
        Ok(inner.identities.get_mut(id).map(|identity| {
            identity.active = active;
            identity.clone()
        }))
    }

    async fn touch_identity(&self, id: &str) -> StoreResult<()> {
        let now = self.clock.now();
        if let Some(identity) = self.inner.write().identities.get_mut(id) {
            identity.last_used_at = Some(now);
        }
        Ok(())
    }
}

#[async_trait]
impl VoiceStore for MemoryStore {
    async fn voice_by_id(&self, id: &str) -> StoreResult<Option<VoiceProfile>> {
        Ok(self
            .inner
            .read()
            .voices
            .iter()
            .find(|(_, v)| v.id == id)
            .map(|(_, v)| v.clone()))
    }

    async fn public_voices(&self) -> StoreResult<Vec<VoiceProfile>> {
        let mut voices: Vec<_> = self
            .inner
            .read()
            .voices
            .iter()
            .filter(|(_, v)| v.visibility.is_public())
            .cloned()
            .collect();
        newest_first(&mut voices);
        Ok(voices.into_iter().map(|(_, v)| v).collect())
    }

    async fn private_voices(&self, owner_id: &str) -> StoreResult<Vec<VoiceProfile>> {
        let mut voices: Vec<_> = self
            .inner
            .read()
            .voices
            .iter()
            .filter(|(_, v)| !v.visibility.is_public() && v.owner_id == owner_id)
            .cloned()
            .collect();
        newest_first(&mut voices);
        Ok(voices.into_iter().map(|(_, v)| v).collect())
    }

    async fn insert_voice(&self, voice: NewVoice) -> StoreResult<VoiceProfile> {
        let mut inner = self.inner.write();
        if inner.voices.iter().any(|(_, v)| v.id == voice.id) {
            return Err(StoreError::Conflict(format!("voice id {}", voice.id)));
        }
        let profile = VoiceProfile {
            id: voice.id,
            owner_id: voice.owner_id,
            display_name: voice.display_name,
            provider_voice_name: voice.provider_voice_name,
            description: voice.description,
            language: voice.language,
            accent: voice.accent,
            visibility: voice.visibility,
            created_at: self.clock.now(),
        };
        inner.next_voice_seq += 1;
        let seq = inner.next_voice_seq;
        inner.voices.push((seq, profile.clone()));
        Ok(profile)
    }
}

#[async_trait]
impl UsageLedger for MemoryStore {
    async fn append(&self, entry: NewUsage) -> StoreResult<AppendOutcome> {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        if inner.request_ids.contains(&entry.request_id) {
            return Ok(AppendOutcome::Duplicate);
        }

        let created_at = match inner.last_usage_at.get(&entry.identity_id) {
            Some(last) if *last > now => *last,
            _ => now,
        };
        let record = UsageRecord {
            identity_id: entry.identity_id,
            endpoint: entry.endpoint,
            character_count: entry.character_count,
            request_id: entry.request_id,
            created_at,
        };
        inner.request_ids.insert(record.request_id.clone());
        inner
            .last_usage_at
            .insert(record.identity_id.clone(), created_at);
        inner.usage.push(record.clone());
        Ok(AppendOutcome::Recorded(record))
    }

    async fn count_since(
        &self,
        identity_id: &str,
        endpoint: &str,
        since: OffsetDateTime,
    ) -> StoreResult<u64> {
        Ok(self
            .inner
            .read()
            .usage
            .iter()
            .filter(|r| r.identity_id == identity_id && r.endpoint == endpoint && r.created_at > since)
            .count() as u64)
    }

    async fn sum_chars_since(
        &self,
        identity_id: &str,
        since: OffsetDateTime,
    ) -> StoreResult<u64> {
        Ok(self
            .inner
            .read()
            .usage
            .iter()
            .filter(|r| r.identity_id == identity_id && r.created_at >= since)
            .map(|r| r.character_count)
            .sum())
    }

    async fn totals(
        &self,
        identity_id: &str,
        since: Option<OffsetDateTime>,
    ) -> StoreResult<UsageTotals> {
        let inner = self.inner.read();
        let mut totals = UsageTotals::default();
        for record in inner
            .usage
            .iter()
            .filter(|r| r.identity_id == identity_id)
            .filter(|r| since.is_none_or(|s| r.created_at >= s))
        {
            totals.characters += record.character_count;
            totals.requests += 1;
        }
        Ok(totals)
    }
}
