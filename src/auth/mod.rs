//! Credential lifecycle: reuse a stored access credential when it is still
//! good for the current API key, otherwise run the OAuth hand-off once and
//! persist the result.

pub mod credential;
pub mod error;
pub mod prompt;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

use self::credential::{fingerprint, Credential, CredentialStore, Validity};
use self::error::AuthError;
use self::prompt::VerifierPrompt;
use self::session::AuthSession;
use crate::provider::{ProviderApi, SessionContext};
use crate::retry::{self, RetryConfig};

/// Inputs for [`resolve_credential`].
pub struct AuthOptions {
    pub force_reauth: bool,
    pub verifier_timeout: Duration,
    pub validation_retry: RetryConfig,
}

/// Return a credential valid for `ctx.consumer`, authorizing anew when the
/// stored one is absent, corrupt, issued under another key, or revoked.
///
/// A freshly issued credential is saved before it is returned; failing to
/// save it is an [`AuthError`], since the next run would prompt again.
pub async fn resolve_credential(
    store: &CredentialStore,
    api: &dyn ProviderApi,
    ctx: &SessionContext,
    prompt: Arc<dyn VerifierPrompt>,
    opts: &AuthOptions,
) -> Result<Credential, AuthError> {
    let current = fingerprint(&ctx.consumer.key);

    if opts.force_reauth {
        tracing::info!("Re-authorization requested");
    } else {
        match store.load() {
            Ok(Some(stored)) => {
                let validity = retry::retry_with_backoff(
                    &opts.validation_retry,
                    "token validation",
                    |e: &crate::provider::ApiError| e.retry_action(),
                    || store.validate(&stored, &current, api, ctx),
                )
                .await
                .map_err(AuthError::ValidationFailed)?;

                match validity {
                    Validity::Valid => {
                        tracing::info!("Using saved authorization for {}", stored.account_id);
                        return Ok(stored);
                    }
                    Validity::FingerprintMismatch => {
                        tracing::info!("Saved authorization was issued for a different API key");
                    }
                    Validity::Rejected => {
                        tracing::info!("Saved authorization is no longer accepted");
                    }
                }
            }
            Ok(None) => {
                tracing::info!("No saved authorization at {}", store.path().display());
            }
            Err(e) => {
                tracing::warn!("{}; re-authorizing", e);
            }
        }
    }

    let mut session = AuthSession::new(api, prompt, ctx.clone(), opts.verifier_timeout);
    let credential = session.run().await.inspect_err(|e| {
        tracing::debug!(state = ?session.state(), "Authorization stopped: {}", e);
    })?;
    store.save(&credential).map_err(AuthError::Persist)?;
    tracing::info!("Authorization saved to {}", store.path().display());
    Ok(credential)
}
