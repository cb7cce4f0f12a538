//! reqwest-backed Flickr client.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::error::ApiError;
use super::oauth::{self, TokenPair};
use super::responses::{
    Envelope, LoginResponse, PeoplePhotosResponse, PhotoInfoResponse, PhotosetPhotosResponse,
    PhotosetsListResponse, SizesResponse,
};
use super::types::{AlbumSummary, Asset, Page};
use super::{AccessGrant, AccessToken, ProviderApi, SessionContext, TemporaryToken};

const REST_URL: &str = "https://api.flickr.com/services/rest/";
const OAUTH_BASE: &str = "https://www.flickr.com/services/oauth";
const OUT_OF_BAND_CALLBACK: &str = "oob";
pub(crate) const CLIENT_USER_AGENT: &str = concat!("flickr-backup/", env!("CARGO_PKG_VERSION"));

pub struct FlickrClient {
    http: Client,
}

impl FlickrClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        ctx: &SessionContext,
        method: &str,
        extra: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut params: Vec<(String, String)> = vec![
            ("method".into(), method.into()),
            ("format".into(), "json".into()),
            ("nojsoncallback".into(), "1".into()),
        ];
        params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.clone())));

        let token = ctx.access.as_ref().map(|a| TokenPair {
            token: &a.token,
            secret: &a.secret,
        });
        let signed = oauth::sign_request("GET", REST_URL, &ctx.consumer, token, params)?;

        tracing::debug!(method, "Provider call");
        let response = self
            .http
            .get(REST_URL)
            .query(&signed)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                method: method.to_string(),
                source: e,
            })?;
        let body = read_success_body(response, method).await?;

        let envelope: Envelope = serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            method: method.to_string(),
            source: e,
        })?;
        if envelope.stat != "ok" {
            return Err(ApiError::Provider {
                method: method.to_string(),
                code: envelope.code.unwrap_or(0),
                message: envelope.message.unwrap_or_default(),
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            method: method.to_string(),
            source: e,
        })
    }

    async fn token_call(
        &self,
        ctx: &SessionContext,
        endpoint: &str,
        token: Option<TokenPair<'_>>,
        extra: Vec<(String, String)>,
    ) -> Result<HashMap<String, String>, ApiError> {
        let url = format!("{OAUTH_BASE}/{endpoint}");
        let signed = oauth::sign_request("GET", &url, &ctx.consumer, token, extra)?;
        let response = self
            .http
            .get(&url)
            .query(&signed)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                method: endpoint.to_string(),
                source: e,
            })?;
        let body = read_success_body(response, endpoint).await?;
        Ok(parse_form_response(&body))
    }
}

async fn read_success_body(response: reqwest::Response, method: &str) -> Result<String, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::HttpStatus {
            status: status.as_u16(),
            method: method.to_string(),
            retry_after_secs: retry_after(response.headers()),
        });
    }
    response.text().await.map_err(|e| ApiError::Transport {
        method: method.to_string(),
        source: e,
    })
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn parse_form_response(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn required(fields: &HashMap<String, String>, key: &str) -> Result<String, ApiError> {
    fields
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| match fields.get("oauth_problem") {
            Some(problem) => ApiError::OAuth(format!("provider reported {problem}")),
            None => ApiError::OAuth(format!("token response missing {key}")),
        })
}

#[async_trait::async_trait]
impl ProviderApi for FlickrClient {
    async fn request_temporary_token(
        &self,
        ctx: &SessionContext,
    ) -> Result<TemporaryToken, ApiError> {
        let fields = self
            .token_call(
                ctx,
                "request_token",
                None,
                vec![("oauth_callback".into(), OUT_OF_BAND_CALLBACK.into())],
            )
            .await?;
        if fields.get("oauth_callback_confirmed").map(String::as_str) == Some("false") {
            return Err(ApiError::OAuth("callback not confirmed".into()));
        }
        Ok(TemporaryToken {
            token: required(&fields, "oauth_token")?,
            secret: required(&fields, "oauth_token_secret")?,
        })
    }

    fn authorization_url(&self, temporary: &TemporaryToken) -> String {
        format!(
            "{OAUTH_BASE}/authorize?oauth_token={}&perms=read",
            oauth::percent_encode(&temporary.token)
        )
    }

    async fn exchange_verifier(
        &self,
        ctx: &SessionContext,
        temporary: &TemporaryToken,
        verifier: &str,
    ) -> Result<AccessGrant, ApiError> {
        let fields = self
            .token_call(
                ctx,
                "access_token",
                Some(TokenPair {
                    token: &temporary.token,
                    secret: &temporary.secret,
                }),
                vec![("oauth_verifier".into(), verifier.to_string())],
            )
            .await?;
        Ok(AccessGrant {
            access: AccessToken {
                token: required(&fields, "oauth_token")?,
                secret: required(&fields, "oauth_token_secret")?,
            },
            account_id: required(&fields, "user_nsid")?,
        })
    }

    async fn test_login(&self, ctx: &SessionContext) -> Result<String, ApiError> {
        let resp: LoginResponse = self.call(ctx, "flickr.test.login", &[]).await?;
        Ok(resp.user.id)
    }

    async fn albums_page(
        &self,
        ctx: &SessionContext,
        page: u32,
        per_page: u32,
    ) -> Result<Page<AlbumSummary>, ApiError> {
        let resp: PhotosetsListResponse = self
            .call(
                ctx,
                "flickr.photosets.getList",
                &[("page", page.to_string()), ("per_page", per_page.to_string())],
            )
            .await?;
        Ok(resp.photosets.into_page())
    }

    async fn album_assets_page(
        &self,
        ctx: &SessionContext,
        album_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page<String>, ApiError> {
        let resp: PhotosetPhotosResponse = self
            .call(
                ctx,
                "flickr.photosets.getPhotos",
                &[
                    ("photoset_id", album_id.to_string()),
                    ("media", "all".into()),
                    ("page", page.to_string()),
                    ("per_page", per_page.to_string()),
                ],
            )
            .await?;
        Ok(resp.photoset.into_page())
    }

    async fn library_page(
        &self,
        ctx: &SessionContext,
        page: u32,
        per_page: u32,
    ) -> Result<Page<String>, ApiError> {
        let resp: PeoplePhotosResponse = self
            .call(
                ctx,
                "flickr.people.getPhotos",
                &[
                    ("user_id", "me".into()),
                    ("page", page.to_string()),
                    ("per_page", per_page.to_string()),
                ],
            )
            .await?;
        Ok(resp.photos.into_page())
    }

    async fn asset_detail(&self, ctx: &SessionContext, asset_id: &str) -> Result<Asset, ApiError> {
        let id = [("photo_id", asset_id.to_string())];
        let info: PhotoInfoResponse = self.call(ctx, "flickr.photos.getInfo", &id).await?;
        let sizes: SizesResponse = self.call(ctx, "flickr.photos.getSizes", &id).await?;
        Ok(info.photo.into_asset(&sizes.sizes))
    }
}
