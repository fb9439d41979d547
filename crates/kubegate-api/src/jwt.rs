//! JWKS-backed token parser
//!
//! [`KeyManager`] fetches the identity provider's JWKS document and keeps the
//! RSA keys indexed by `kid`; a background task refreshes it on an interval so
//! token validation never waits on the network. [`JwtTokenParser`] validates
//! RS256/RS384/RS512 tokens against those keys.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::auth::{TokenClaims, TokenError, TokenParser};

/// Clock skew tolerated on `exp`, `nbf` and `iat`
pub const DEFAULT_LEEWAY_SECS: u64 = 5;

/// Key loading failures
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// JWKS document could not be fetched or decoded
    #[error("failed to fetch JWKS from {url}: {message}")]
    Fetch {
        /// JWKS endpoint
        url: String,
        /// Underlying error
        message: String,
    },

    /// JWKS document held no RSA key with a `kid`
    #[error("no usable keys found in JWKS")]
    NoUsableKeys,
}

/// JWKS document
#[derive(Debug, Deserialize)]
pub struct JwksDocument {
    keys: Vec<JwkKey>,
}

/// Individual JWK key
#[derive(Debug, Deserialize)]
struct JwkKey {
    kty: String,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

/// Signing keys of the identity provider, indexed by `kid`
pub struct KeyManager {
    jwks_url: String,
    http_client: reqwest::Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl KeyManager {
    /// Fetch the JWKS document once and build the manager
    ///
    /// Fails if the first fetch fails; the gateway cannot validate anything
    /// without keys.
    pub async fn load(jwks_url: impl Into<String>) -> Result<Arc<Self>, KeyError> {
        let manager = Arc::new(Self {
            jwks_url: jwks_url.into(),
            http_client: reqwest::Client::new(),
            keys: RwLock::new(HashMap::new()),
        });
        manager.refresh().await?;
        Ok(manager)
    }

    /// Build a manager from an already decoded JWKS document
    pub fn from_document(document: JwksDocument) -> Result<Arc<Self>, KeyError> {
        let keys = decoding_keys(document)?;
        Ok(Arc::new(Self {
            jwks_url: String::new(),
            http_client: reqwest::Client::new(),
            keys: RwLock::new(keys),
        }))
    }

    /// Re-fetch the JWKS document and swap in its keys
    pub async fn refresh(&self) -> Result<usize, KeyError> {
        debug!(url = %self.jwks_url, "Fetching JWKS");

        let fetch_error = |e: reqwest::Error| KeyError::Fetch {
            url: self.jwks_url.clone(),
            message: e.to_string(),
        };

        let document: JwksDocument = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_error)?
            .json()
            .await
            .map_err(fetch_error)?;

        let keys = decoding_keys(document)?;
        let count = keys.len();
        *self.keys.write().await = keys;

        info!(key_count = count, "Refreshed JWKS cache");
        Ok(count)
    }

    /// Refresh the keys every `interval` until the process exits
    ///
    /// A failed refresh keeps the previous keys.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; keys were loaded already
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.refresh().await {
                    warn!(error = %e, "JWKS refresh failed, keeping previous keys");
                }
            }
        })
    }

    /// Key for `kid`, if known
    pub async fn key(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().await.get(kid).cloned()
    }
}

fn decoding_keys(document: JwksDocument) -> Result<HashMap<String, DecodingKey>, KeyError> {
    let mut keys = HashMap::new();
    for jwk in document.keys {
        let Some(kid) = jwk.kid.clone() else {
            warn!(kty = %jwk.kty, "Skipping JWK without kid");
            continue;
        };
        match jwk_to_decoding_key(&jwk) {
            Some(key) => {
                keys.insert(kid, key);
            }
            None => warn!(kid = %kid, kty = %jwk.kty, "Skipping unusable JWK"),
        }
    }

    if keys.is_empty() {
        return Err(KeyError::NoUsableKeys);
    }
    Ok(keys)
}

/// Convert an RSA JWK to a DecodingKey
fn jwk_to_decoding_key(jwk: &JwkKey) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        return None;
    }
    let (n, e) = (jwk.n.as_ref()?, jwk.e.as_ref()?);
    DecodingKey::from_rsa_components(n, e).ok()
}

/// Claims read from the token body
#[derive(Debug, Deserialize)]
struct JwtClaims {
    sub: Option<String>,
    preferred_username: Option<String>,
    email: Option<String>,
}

/// [`TokenParser`] validating RSA-signed JWTs against a [`KeyManager`]
pub struct JwtTokenParser {
    keys: Arc<KeyManager>,
    leeway: u64,
}

impl JwtTokenParser {
    /// Create a parser with the default leeway
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self {
            keys,
            leeway: DEFAULT_LEEWAY_SECS,
        }
    }
}

#[async_trait]
impl TokenParser for JwtTokenParser {
    async fn parse(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let header = decode_header(token).map_err(|e| TokenError::Invalid(e.to_string()))?;

        if !matches!(
            header.alg,
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512
        ) {
            return Err(TokenError::Invalid(format!(
                "unexpected signing method: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| TokenError::Invalid("token header has no kid".into()))?;
        let key = self
            .keys
            .key(&kid)
            .await
            .ok_or_else(|| TokenError::UnknownKey(kid.clone()))?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.leeway;
        validation.validate_aud = false;

        let claims = decode::<JwtClaims>(token, &key, &validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?
            .claims;

        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::MissingClaim("subject missing"))?;
        let preferred_username = claims
            .preferred_username
            .filter(|s| !s.is_empty())
            .ok_or(TokenError::MissingClaim("preferred_username missing"))?;

        Ok(TokenClaims {
            subject,
            preferred_username,
            email: claims.email.filter(|e| !e.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, get_current_timestamp, EncodingKey, Header};
    use serde_json::json;

    const TEST_KEY_PEM: &str = include_str!("testdata/jwt_rsa.pem");
    const TEST_KEY_N: &str = "qBGQE48O_6AADaPrhKVyH3TENl3r5828fyAIJ6TbSaR4L9ol3Il3e4Lr8p8vS0bOJoUnC-LagWtHaZwDtNSJdSobnh-3oZVHQU9oEO42GyRtkJIbDe-dtVl53PUYghIc1oCvaG_92GYKI5rdvv_vSQReIrw8ZSAuXt4qZQE_PBH0O2xBgqqnTZ5DnsNd7QZFZmmznoMCgdzpHTWI2m4Yg3dtpnqByJp__mA_WC2z062Cb-34InQ5OEelwiiK_PlvznYrWZtw-U3gcnXOt0SHDo5jKnSBdXOtArDrTnpL0RFN1Ut2Hvjt-NPIDJh3_gXpns7Wb9YzUXmRRE9EAmwHGQ";
    const TEST_KEY_E: &str = "AQAB";
    const TEST_KID: &str = "test-key";

    fn parser() -> JwtTokenParser {
        let document: JwksDocument = serde_json::from_value(json!({
            "keys": [
                {"kty": "RSA", "kid": TEST_KID, "n": TEST_KEY_N, "e": TEST_KEY_E},
                {"kty": "EC", "kid": "ec-key", "crv": "P-256", "x": "x", "y": "y"}
            ]
        }))
        .unwrap();
        JwtTokenParser::new(KeyManager::from_document(document).unwrap())
    }

    fn sign(kid: Option<&str>, claims: serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).unwrap();
        encode(&header, &claims, &key).unwrap()
    }

    fn valid_claims() -> serde_json::Value {
        json!({
            "sub": "user-123",
            "preferred_username": "smith",
            "email": "smith@example.com",
            "exp": get_current_timestamp() + 3600,
        })
    }

    #[tokio::test]
    async fn test_parse_valid_token() {
        let token = sign(Some(TEST_KID), valid_claims());
        let claims = parser().parse(&token).await.unwrap();
        assert_eq!(claims.subject, "user-123");
        assert_eq!(claims.preferred_username, "smith");
        assert_eq!(claims.email.as_deref(), Some("smith@example.com"));
    }

    #[tokio::test]
    async fn test_parse_malformed_token() {
        let err = parser().parse("not-a-token").await.unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_parse_requires_kid() {
        let token = sign(None, valid_claims());
        let err = parser().parse(&token).await.unwrap_err();
        assert!(err.to_string().contains("no kid"));
    }

    #[tokio::test]
    async fn test_parse_unknown_kid() {
        let token = sign(Some("rotated-away"), valid_claims());
        let err = parser().parse(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::UnknownKey(kid) if kid == "rotated-away"));
    }

    #[tokio::test]
    async fn test_parse_rejects_hmac() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(TEST_KID.to_string());
        let token = encode(&header, &valid_claims(), &EncodingKey::from_secret(b"secret")).unwrap();

        let err = parser().parse(&token).await.unwrap_err();
        assert!(err.to_string().contains("unexpected signing method"));
    }

    #[tokio::test]
    async fn test_parse_missing_subject() {
        let mut claims = valid_claims();
        claims["sub"] = json!("");
        let token = sign(Some(TEST_KID), claims);

        let err = parser().parse(&token).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "token does not comply to expected claims: subject missing"
        );
    }

    #[tokio::test]
    async fn test_parse_missing_preferred_username() {
        let mut claims = valid_claims();
        claims
            .as_object_mut()
            .unwrap()
            .remove("preferred_username");
        let token = sign(Some(TEST_KID), claims);

        let err = parser().parse(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::MissingClaim(_)));
    }

    #[tokio::test]
    async fn test_parse_expired_token() {
        let mut claims = valid_claims();
        claims["exp"] = json!(get_current_timestamp() - 3600);
        let token = sign(Some(TEST_KID), claims);

        let err = parser().parse(&token).await.unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_parse_within_leeway() {
        let mut claims = valid_claims();
        claims["exp"] = json!(get_current_timestamp() - 2);
        let token = sign(Some(TEST_KID), claims);

        assert!(parser().parse(&token).await.is_ok());
    }

    #[test]
    fn test_document_without_rsa_keys_rejected() {
        let document: JwksDocument = serde_json::from_value(json!({
            "keys": [{"kty": "EC", "kid": "ec-key"}]
        }))
        .unwrap();
        assert!(matches!(
            KeyManager::from_document(document),
            Err(KeyError::NoUsableKeys)
        ));
    }
}
