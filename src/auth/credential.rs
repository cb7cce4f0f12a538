//! Long-lived access credential persistence.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::CredentialError;
use crate::provider::{AccessToken, ApiError, ProviderApi, SessionContext};

/// Access credential as stored on disk. Superseded, never mutated, on
/// re-authentication.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub api_key_fingerprint: String,
    pub access_token: String,
    pub access_token_secret: String,
    pub account_id: String,
    pub obtained_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("api_key_fingerprint", &self.api_key_fingerprint)
            .field("access_token", &self.access_token)
            .field("access_token_secret", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

impl Credential {
    pub fn access(&self) -> AccessToken {
        AccessToken {
            token: self.access_token.clone(),
            secret: self.access_token_secret.clone(),
        }
    }
}

/// Hex SHA-256 of the API key. Identifies which key a credential was issued
/// under without storing the key itself.
pub fn fingerprint(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Outcome of checking a stored credential against the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    Valid,
    FingerprintMismatch,
    Rejected,
}

/// Sole reader and writer of the credential file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no file exists. A file that exists but does not hold
    /// a credential is `CorruptStore`, not absent.
    pub fn load(&self) -> Result<Option<Credential>, CredentialError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CredentialError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };
        let credential =
            serde_json::from_str(&contents).map_err(|e| CredentialError::CorruptStore {
                path: self.path.clone(),
                source: e,
            })?;
        tracing::debug!("Loaded credential from {}", self.path.display());
        Ok(Some(credential))
    }

    /// Fingerprint comparison first; only a matching credential costs a
    /// provider round-trip.
    pub async fn validate(
        &self,
        credential: &Credential,
        current_fingerprint: &str,
        api: &dyn ProviderApi,
        ctx: &SessionContext,
    ) -> Result<Validity, ApiError> {
        if credential.api_key_fingerprint != current_fingerprint {
            return Ok(Validity::FingerprintMismatch);
        }

        match api.test_login(&ctx.with_access(credential.access())).await {
            Ok(account_id) if account_id == credential.account_id => Ok(Validity::Valid),
            Ok(account_id) => {
                tracing::warn!(
                    "Stored credential belongs to {} but provider reports {}",
                    credential.account_id,
                    account_id
                );
                Ok(Validity::Rejected)
            }
            Err(e) if e.is_auth_rejection() => {
                tracing::debug!("Stored credential rejected: {}", e);
                Ok(Validity::Rejected)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the file with `credential`, readable by the owner only.
    pub fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        let json = serde_json::to_vec_pretty(credential).map_err(|e| CredentialError::Encode {
            path: self.path.clone(),
            source: e,
        })?;
        crate::fs::write_atomic(&self.path, &json, true).map_err(|e| CredentialError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::debug!("Saved credential to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::test_support::{consumer, FakeProvider};
    use std::sync::atomic::Ordering;

    pub(crate) fn sample_credential(api_key: &str) -> Credential {
        Credential {
            api_key_fingerprint: fingerprint(api_key),
            access_token: "72157-token".into(),
            access_token_secret: "token-secret".into(),
            account_id: "12345@N00".into(),
            obtained_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn test_fingerprint_is_stable_hex() {
        let fp = fingerprint("abc");
        assert_eq!(fp.len(), 64);
        assert_eq!(
            fp,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(fingerprint("abd"), fp);
    }

    #[test]
    fn test_load_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("tokens.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("tokens.json"));
        let cred = sample_credential("key");
        store.save(&cred).unwrap();
        assert_eq!(store.load().unwrap(), Some(cred));
    }

    #[test]
    fn test_file_uses_camel_case_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("tokens.json"));
        store.save(&sample_credential("key")).unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        for field in [
            "apiKeyFingerprint",
            "accessToken",
            "accessTokenSecret",
            "accountId",
            "obtainedAt",
        ] {
            assert!(raw.contains(field), "missing {field}");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_save_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        CredentialStore::new(&path)
            .save(&sample_credential("key"))
            .unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, r#"{"oauth_token": "legacy"}"#).unwrap();
        let err = CredentialStore::new(&path).load().unwrap_err();
        assert!(matches!(err, CredentialError::CorruptStore { .. }));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let dbg = format!("{:?}", sample_credential("key"));
        assert!(!dbg.contains("token-secret"));
    }

    fn ctx() -> SessionContext {
        SessionContext::unauthenticated(consumer("key"))
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_needs_no_round_trip() {
        let store = CredentialStore::new("/nonexistent");
        let cred = sample_credential("old-key");
        let api = FakeProvider::new().with_valid_token(&cred.access_token);
        let validity = store
            .validate(&cred, &fingerprint("new-key"), &api, &ctx())
            .await
            .unwrap();
        assert_eq!(validity, Validity::FingerprintMismatch);
        assert_eq!(api.login_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_credential() {
        let store = CredentialStore::new("/nonexistent");
        let cred = sample_credential("key");
        let api = FakeProvider::new().with_valid_token(&cred.access_token);
        let validity = store
            .validate(&cred, &fingerprint("key"), &api, &ctx())
            .await
            .unwrap();
        assert_eq!(validity, Validity::Valid);
        assert_eq!(api.login_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revoked_credential_rejected() {
        let store = CredentialStore::new("/nonexistent");
        let api = FakeProvider::new();
        let validity = store
            .validate(&sample_credential("key"), &fingerprint("key"), &api, &ctx())
            .await
            .unwrap();
        assert_eq!(validity, Validity::Rejected);
    }

    #[tokio::test]
    async fn test_other_account_rejected() {
        let store = CredentialStore::new("/nonexistent");
        let cred = sample_credential("key");
        let mut api = FakeProvider::new().with_valid_token(&cred.access_token);
        api.account_id = "999@N01".into();
        let validity = store
            .validate(&cred, &fingerprint("key"), &api, &ctx())
            .await
            .unwrap();
        assert_eq!(validity, Validity::Rejected);
    }

    #[tokio::test]
    async fn test_transient_validation_error_propagates() {
        let store = CredentialStore::new("/nonexistent");
        let cred = sample_credential("key");
        let api = FakeProvider::new().with_valid_token(&cred.access_token);
        api.transient_login_failures.store(1, Ordering::SeqCst);
        let result = store
            .validate(&cred, &fingerprint("key"), &api, &ctx())
            .await;
        assert!(result.unwrap_err().is_transient());
    }
}
