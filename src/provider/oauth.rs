//! OAuth 1.0a request signing (RFC 5849, HMAC-SHA1).
//!
//! Every provider call, including the token handshake itself, carries the
//! `oauth_*` protocol parameters and a signature over the method, URL and
//! the full sorted parameter set.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::error::ApiError;

type HmacSha1 = Hmac<Sha1>;

/// The application's API key and secret.
#[derive(Clone)]
pub struct ConsumerKeys {
    pub key: String,
    pub secret: String,
}

impl std::fmt::Debug for ConsumerKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerKeys")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Token half of the signing key: a temporary token during the handshake,
/// an access token afterwards.
#[derive(Clone, Copy)]
pub struct TokenPair<'a> {
    pub token: &'a str,
    pub secret: &'a str,
}

/// RFC 3986 encoding: everything except `A-Z a-z 0-9 - . _ ~`.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// Build the signature base string from the normalized parameter set.
pub fn signature_base_string(http_method: &str, url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();
    let normalized = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        http_method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&normalized)
    )
}

/// HMAC-SHA1 over the base string, keyed by `consumer_secret&token_secret`.
pub fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> Result<String, ApiError> {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| ApiError::OAuth(format!("invalid signing key: {e}")))?;
    mac.update(base.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Add the protocol parameters and signature to `params`, using a fresh
/// nonce and the current time.
pub fn sign_request(
    http_method: &str,
    url: &str,
    consumer: &ConsumerKeys,
    token: Option<TokenPair<'_>>,
    params: Vec<(String, String)>,
) -> Result<Vec<(String, String)>, ApiError> {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let timestamp = chrono::Utc::now().timestamp().to_string();
    sign_request_with(http_method, url, consumer, token, params, &nonce, &timestamp)
}

pub(crate) fn sign_request_with(
    http_method: &str,
    url: &str,
    consumer: &ConsumerKeys,
    token: Option<TokenPair<'_>>,
    mut params: Vec<(String, String)>,
    nonce: &str,
    timestamp: &str,
) -> Result<Vec<(String, String)>, ApiError> {
    params.push(("oauth_consumer_key".into(), consumer.key.clone()));
    params.push(("oauth_nonce".into(), nonce.to_string()));
    params.push(("oauth_signature_method".into(), "HMAC-SHA1".into()));
    params.push(("oauth_timestamp".into(), timestamp.to_string()));
    params.push(("oauth_version".into(), "1.0".into()));
    if let Some(t) = token {
        params.push(("oauth_token".into(), t.token.to_string()));
    }

    let base = signature_base_string(http_method, url, &params);
    let signature = sign(&base, &consumer.secret, token.map(|t| t.secret).unwrap_or(""))?;
    params.push(("oauth_signature".into(), signature));
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photos_example() -> (ConsumerKeys, Vec<(String, String)>) {
        (
            ConsumerKeys {
                key: "dpf43f3p2l4k3l03".into(),
                secret: "kd94hf93k423kf44".into(),
            },
            vec![
                ("file".into(), "vacation.jpg".into()),
                ("size".into(), "original".into()),
            ],
        )
    }

    #[test]
    fn test_percent_encode_reserved() {
        assert_eq!(percent_encode("a b&c=d/e"), "a%20b%26c%3Dd%2Fe");
        assert_eq!(percent_encode("AZaz09-._~"), "AZaz09-._~");
        assert_eq!(percent_encode("é"), "%C3%A9");
    }

    #[test]
    fn test_reference_signature() {
        // OAuth Core 1.0 Appendix A worked example.
        let (consumer, params) = photos_example();
        let signed = sign_request_with(
            "GET",
            "http://photos.example.net/photos",
            &consumer,
            Some(TokenPair {
                token: "nnch734d00sl2jdk",
                secret: "pfkkdhi9sl3r4s00",
            }),
            params,
            "kllo9940pd9333jh",
            "1191242096",
        )
        .unwrap();

        let signature = signed
            .iter()
            .find(|(k, _)| k == "oauth_signature")
            .map(|(_, v)| v.as_str());
        assert_eq!(signature, Some("tR3+Ty81lMeYAr/Fid0kMTYa/WM="));
    }

    #[test]
    fn test_reference_base_string() {
        let params: Vec<(String, String)> = vec![
            ("size".into(), "original".into()),
            ("file".into(), "vacation.jpg".into()),
            ("oauth_version".into(), "1.0".into()),
        ];
        let base = signature_base_string("get", "http://photos.example.net/photos", &params);
        assert_eq!(
            base,
            "GET&http%3A%2F%2Fphotos.example.net%2Fphotos&\
             file%3Dvacation.jpg%26oauth_version%3D1.0%26size%3Doriginal"
        );
    }

    #[test]
    fn test_request_token_signing_has_no_oauth_token() {
        let (consumer, _) = photos_example();
        let signed = sign_request(
            "GET",
            "https://www.flickr.com/services/oauth/request_token",
            &consumer,
            None,
            vec![("oauth_callback".into(), "oob".into())],
        )
        .unwrap();
        assert!(signed.iter().all(|(k, _)| k != "oauth_token"));
        assert!(signed.iter().any(|(k, _)| k == "oauth_signature"));
    }

    #[test]
    fn test_consumer_debug_redacts_secret() {
        let (consumer, _) = photos_example();
        let dbg = format!("{:?}", consumer);
        assert!(!dbg.contains("kd94hf93k423kf44"));
    }
}
