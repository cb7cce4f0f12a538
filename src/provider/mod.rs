//! Provider API boundary.
//!
//! [`ProviderApi`] is the seam between the backup engine and the photo
//! service. Every call takes an explicit [`SessionContext`] instead of
//! reading shared session state, so concurrent workers (and distinct
//! accounts) never observe each other's tokens.

pub mod error;
pub mod flickr;
pub mod oauth;
pub mod responses;
pub mod types;

pub use error::ApiError;
pub use oauth::ConsumerKeys;
pub use types::{AlbumSummary, Asset, MediaType, Page};

/// Page size requested from every paginated listing.
pub const PER_PAGE: u32 = 500;

/// Access token and secret used to sign authenticated calls.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub secret: String,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Per-run call context: the application keys, plus the access token once
/// one has been resolved.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub consumer: ConsumerKeys,
    pub access: Option<AccessToken>,
}

impl SessionContext {
    pub fn unauthenticated(consumer: ConsumerKeys) -> Self {
        Self {
            consumer,
            access: None,
        }
    }

    pub fn with_access(&self, access: AccessToken) -> Self {
        Self {
            consumer: self.consumer.clone(),
            access: Some(access),
        }
    }
}

/// Short-lived token issued at the start of the authorization hand-off.
#[derive(Clone)]
pub struct TemporaryToken {
    pub token: String,
    pub secret: String,
}

impl std::fmt::Debug for TemporaryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemporaryToken")
            .field("token", &self.token)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Result of exchanging a verification code for a long-lived token.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    pub access: AccessToken,
    pub account_id: String,
}

#[async_trait::async_trait]
pub trait ProviderApi: Send + Sync {
    /// Start the hand-off; the context carries no access token.
    async fn request_temporary_token(
        &self,
        ctx: &SessionContext,
    ) -> Result<TemporaryToken, ApiError>;

    /// Page the user opens to approve read access.
    fn authorization_url(&self, temporary: &TemporaryToken) -> String;

    async fn exchange_verifier(
        &self,
        ctx: &SessionContext,
        temporary: &TemporaryToken,
        verifier: &str,
    ) -> Result<AccessGrant, ApiError>;

    /// Cheap authenticated round-trip; returns the account id the token
    /// belongs to.
    async fn test_login(&self, ctx: &SessionContext) -> Result<String, ApiError>;

    async fn albums_page(
        &self,
        ctx: &SessionContext,
        page: u32,
        per_page: u32,
    ) -> Result<Page<AlbumSummary>, ApiError>;

    async fn album_assets_page(
        &self,
        ctx: &SessionContext,
        album_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<String>, ApiError>;

    /// Every asset id in the account, in the provider's global order.
    async fn library_page(
        &self,
        ctx: &SessionContext,
        page: u32,
        per_page: u32,
    ) -> Result<Page<String>, ApiError>;

    async fn asset_detail(&self, ctx: &SessionContext, asset_id: &str) -> Result<Asset, ApiError>;
}
