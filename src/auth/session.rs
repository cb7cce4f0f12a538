//! One-time authorization hand-off, modelled as an explicit state machine.
//!
//! ```text
//! Unauthenticated → TemporaryTokenIssued → AwaitingUserVerification
//!                 → AccessTokenIssued → Validated
//! ```
//!
//! Any failure moves the session to `Abandoned`. There is no retry loop:
//! repeating the hand-off without new input from the user cannot succeed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::credential::{fingerprint, Credential};
use super::error::AuthError;
use super::prompt::VerifierPrompt;
use crate::provider::{ApiError, ProviderApi, SessionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    TemporaryTokenIssued,
    AwaitingUserVerification,
    AccessTokenIssued,
    Validated,
    Abandoned,
}

pub struct AuthSession<'a> {
    api: &'a dyn ProviderApi,
    prompt: Arc<dyn VerifierPrompt>,
    ctx: SessionContext,
    verifier_timeout: Duration,
    state: AuthState,
}

impl<'a> AuthSession<'a> {
    pub fn new(
        api: &'a dyn ProviderApi,
        prompt: Arc<dyn VerifierPrompt>,
        ctx: SessionContext,
        verifier_timeout: Duration,
    ) -> Self {
        Self {
            api,
            prompt,
            ctx,
            verifier_timeout,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Drive the hand-off to `Validated`, yielding a credential bound to the
    /// current API key, or to `Abandoned`.
    pub async fn run(&mut self) -> Result<Credential, AuthError> {
        let result = self.drive().await;
        if let Err(e) = &result {
            tracing::error!("Authorization abandoned: {}", e);
            self.transition(AuthState::Abandoned);
        }
        result
    }

    async fn drive(&mut self) -> Result<Credential, AuthError> {
        let temporary = self
            .api
            .request_temporary_token(&self.ctx)
            .await
            .map_err(AuthError::TemporaryTokenRejected)?;
        self.transition(AuthState::TemporaryTokenIssued);

        let url = self.api.authorization_url(&temporary);
        self.transition(AuthState::AwaitingUserVerification);
        let verifier = self.wait_for_verifier(url).await?;

        let grant = self
            .api
            .exchange_verifier(&self.ctx, &temporary, &verifier)
            .await
            .map_err(AuthError::VerifierRejected)?;
        self.transition(AuthState::AccessTokenIssued);

        let account_id = self
            .api
            .test_login(&self.ctx.with_access(grant.access.clone()))
            .await
            .map_err(AuthError::ValidationFailed)?;
        if account_id != grant.account_id {
            return Err(AuthError::ValidationFailed(ApiError::OAuth(format!(
                "token issued for {} but provider reports {}",
                grant.account_id, account_id
            ))));
        }
        self.transition(AuthState::Validated);
        tracing::info!("Authorized as {}", account_id);

        Ok(Credential {
            api_key_fingerprint: fingerprint(&self.ctx.consumer.key),
            access_token: grant.access.token,
            access_token_secret: grant.access.secret,
            account_id,
            obtained_at: Utc::now(),
        })
    }

    async fn wait_for_verifier(&self, url: String) -> Result<String, AuthError> {
        let prompt = Arc::clone(&self.prompt);
        let handle = tokio::task::spawn_blocking(move || prompt.ask(&url));

        let code = match tokio::time::timeout(self.verifier_timeout, handle).await {
            Err(_) => {
                return Err(AuthError::NoVerifier(format!(
                    "timed out after {}s",
                    self.verifier_timeout.as_secs()
                )))
            }
            Ok(Err(join)) => return Err(AuthError::NoVerifier(join.to_string())),
            Ok(Ok(Err(io))) => return Err(AuthError::NoVerifier(io.to_string())),
            Ok(Ok(Ok(code))) => code,
        };
        if code.is_empty() {
            return Err(AuthError::NoVerifier("empty code".into()));
        }
        Ok(code)
    }

    fn transition(&mut self, next: AuthState) {
        tracing::debug!("Auth state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
