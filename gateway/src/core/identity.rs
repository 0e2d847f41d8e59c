//! Credential authentication and issuance.

use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppResult, AuthError, NotFoundError, ValidationError};
use crate::store::{Identity, IdentityStore, NewIdentity, SharedStore, StoreError};

/// Prefix carried by every issued credential
pub const CREDENTIAL_PREFIX: &str = "tts_";

/// Hex characters of the digest kept in a credential
const CREDENTIAL_HEX_LEN: usize = 32;

/// Result of [`IdentityService::issue_credential`]
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub identity: Identity,
    /// False when the email already had a credential
    pub created: bool,
}

#[derive(Clone)]
pub struct IdentityService {
    store: SharedStore,
}

/// `tts_` + 32 hex chars of sha256(email + "-" + random uuid)
pub fn generate_credential(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b"-");
    hasher.update(Uuid::new_v4().to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{CREDENTIAL_PREFIX}{}", &digest[..CREDENTIAL_HEX_LEN])
}

/// Trimmed, lower-cased email
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IdentityService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Resolve a presented credential to an active identity
    pub async fn authenticate(&self, credential: Option<&str>) -> AppResult<Identity> {
        let credential = match credential.map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => return Err(AuthError::Missing.into()),
        };

        match self.store.identity_by_credential(credential).await? {
            None => Err(AuthError::Invalid.into()),
            Some(identity) if !identity.active => Err(AuthError::Inactive.into()),
            Some(identity) => Ok(identity),
        }
    }

    /// Best-effort `last_used_at` update
    pub async fn touch(&self, identity_id: &str) {
        if let Err(e) = self.store.touch_identity(identity_id).await {
            warn!(identity_id = %identity_id, error = %e, "Failed to update last_used_at");
        }
    }

    /// Issue a credential for `email`, or return the one it already has
    pub async fn issue_credential(&self, email: &str) -> AppResult<IssuedCredential> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(ValidationError::EmailRequired.into());
        }

        if let Some(identity) = self.store.identity_by_email(&email).await? {
            return Ok(IssuedCredential {
                identity,
                created: false,
            });
        }

        let new = NewIdentity {
            id: Uuid::new_v4().to_string(),
            credential: generate_credential(&email),
            email: email.clone(),
        };
        match self.store.insert_identity(new).await {
            Ok(identity) => {
                info!(identity_id = %identity.id, "Issued new credential");
                Ok(IssuedCredential {
                    identity,
                    created: true,
                })
            }
            // Lost a race with a concurrent issue for the same email
            Err(StoreError::Conflict(_)) => {
                let identity = self
                    .store
                    .identity_by_email(&email)
                    .await?
                    .ok_or_else(|| StoreError::Backend("identity vanished after conflict".into()))?;
                Ok(IssuedCredential {
                    identity,
                    created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set_active(&self, identity_id: &str, active: bool) -> AppResult<Identity> {
        let identity = self
            .store
            .set_identity_active(identity_id, active)
            .await?
            .ok_or(NotFoundError::User)?;
        info!(identity_id = %identity.id, active, "Identity activation changed");
        Ok(identity)
    }
}
