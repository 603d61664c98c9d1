// Compact signed token codec
// Decision: HMAC only (HS256 default, HS384/HS512 allowed); one shared secret, no asymmetric keys
// Decision: Signature is checked before expiry so a forged token is always reported as invalid
// Decision: The clock is injectable so expiry can be tested with simulated time

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{crypto, encode, Algorithm, DecodingKey, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};

/// Default token lifetime (one day)
pub const DEFAULT_TTL_SECS: u64 = 86_400;

/// Token identifier used when none is configured
pub const DEFAULT_TOKEN_ID: &str = "4890g23a12f";

/// Claim names the codec manages itself
pub const REGISTERED_CLAIMS: [&str; 7] = ["iat", "nbf", "exp", "sub", "jti", "iss", "aud"];

// ============================================================================
// Clock
// ============================================================================

/// Source of the current UTC instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock frozen at a unix timestamp
    pub fn at_timestamp(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Codec settings, also the option set of the `jwt` guard driver
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Shared HMAC secret
    #[serde(default)]
    pub secret: String,
    /// Token lifetime in seconds
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    /// Signing algorithm name (HS256, HS384, HS512)
    #[serde(default = "default_algo")]
    pub algo: String,
    /// Value of the `jti` claim
    #[serde(default = "default_jti")]
    pub jti: String,
    /// Issuer claim (`iss`), omitted when unset
    #[serde(default)]
    pub app_name: Option<String>,
}

fn default_ttl() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_algo() -> String {
    "HS256".to_string()
}

fn default_jti() -> String {
    DEFAULT_TOKEN_ID.to_string()
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: DEFAULT_TTL_SECS,
            algo: default_algo(),
            jti: default_jti(),
            app_name: None,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .field("algo", &self.algo)
            .field("jti", &self.jti)
            .field("app_name", &self.app_name)
            .finish()
    }
}

// ============================================================================
// TokenCodec
// ============================================================================

/// Issues, parses and verifies compact HMAC-signed tokens
///
/// Wire format: `base64url(header).base64url(claims).base64url(signature)`,
/// unpadded. Immutable once built; share it freely across requests.
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_id: String,
    issuer: Option<String>,
    ttl: u64,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// HS256 codec with default lifetime and token identifier
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            algorithm: Algorithm::HS256,
            header: Header::new(Algorithm::HS256),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_id: DEFAULT_TOKEN_ID.to_string(),
            issuer: None,
            ttl: DEFAULT_TTL_SECS,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build a codec from configuration
    pub fn from_config(config: &TokenConfig) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::config("Token secret must not be empty"));
        }

        let algorithm: Algorithm = config
            .algo
            .parse()
            .map_err(|_| AuthError::config(format!("Unknown token algorithm: {}", config.algo)))?;

        let mut codec = Self::new(config.secret.as_bytes())
            .with_algorithm(algorithm)?
            .with_token_id(config.jti.clone())
            .with_ttl(config.ttl);
        if let Some(app_name) = config.app_name.as_ref().filter(|s| !s.is_empty()) {
            codec = codec.with_issuer(app_name.clone());
        }
        Ok(codec)
    }

    /// Switch the signing algorithm (HMAC family only)
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> AuthResult<Self> {
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::config(format!(
                "Unsupported token algorithm: {:?} (only HMAC is supported)",
                algorithm
            )));
        }
        self.algorithm = algorithm;
        self.header = Header::new(algorithm);
        Ok(self)
    }

    pub fn with_token_id(mut self, token_id: impl Into<String>) -> Self {
        self.token_id = token_id.into();
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Default lifetime used by `generate`
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl = ttl_secs;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Default token lifetime in seconds
    pub fn ttl_secs(&self) -> u64 {
        self.ttl
    }

    /// Issue a token for the subject with the default lifetime
    pub fn generate(&self, subject: &str) -> AuthResult<String> {
        self.generate_with(subject, self.ttl, Map::new())
    }

    /// Issue a token with an explicit lifetime and extra claims
    pub fn generate_with(
        &self,
        subject: &str,
        ttl_secs: u64,
        extra_claims: Map<String, Value>,
    ) -> AuthResult<String> {
        let now = self.clock.now();
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| AuthError::encoding(format!("Token lifetime out of range: {}", ttl_secs)))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::encoding("Token expiry out of range"))?;

        let mut claims = Map::new();
        claims.insert("iat".to_string(), now.timestamp().into());
        claims.insert("nbf".to_string(), now.timestamp().into());
        claims.insert("exp".to_string(), expires_at.timestamp().into());
        claims.insert("sub".to_string(), subject.into());
        claims.insert("jti".to_string(), self.token_id.clone().into());
        if let Some(issuer) = &self.issuer {
            claims.insert("iss".to_string(), issuer.clone().into());
        }

        for (key, value) in extra_claims {
            if REGISTERED_CLAIMS.contains(&key.as_str()) {
                return Err(AuthError::encoding(format!(
                    "Claim [{}] is registered and cannot be set as a custom claim",
                    key
                )));
            }
            claims.insert(key, value);
        }

        encode(&self.header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::encoding(format!("Failed to encode token: {}", e)))
    }

    /// Decode all claims without checking signature or expiry
    ///
    /// For inspection only; never base a trust decision on the result.
    pub fn parse(&self, token: &str) -> AuthResult<Map<String, Value>> {
        let segments = split_token(token)?;
        decode_segment(segments.payload, "payload")
    }

    /// Verify signature and expiry, returning the subject
    pub fn verify(&self, token: &str) -> AuthResult<String> {
        let segments = split_token(token)?;

        let header: Header = decode_segment(segments.header, "header")?;
        if header.alg != self.algorithm {
            return Err(AuthError::invalid_token(format!(
                "Unexpected algorithm {:?}",
                header.alg
            )));
        }

        let signed = &token[..segments.header.len() + 1 + segments.payload.len()];
        let valid = crypto::verify(
            segments.signature,
            signed.as_bytes(),
            &self.decoding_key,
            self.algorithm,
        )
        .map_err(|e| AuthError::invalid_token(e.to_string()))?;
        if !valid {
            return Err(AuthError::invalid_token("Signature mismatch"));
        }

        let claims: Map<String, Value> = decode_segment(segments.payload, "payload")?;

        let expires_at = claims
            .get("exp")
            .and_then(Value::as_f64)
            .ok_or_else(|| AuthError::invalid_token("Missing exp claim"))?;
        if self.clock.now().timestamp() as f64 >= expires_at {
            return Err(AuthError::TokenExpired);
        }

        claims
            .get("sub")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AuthError::invalid_token("Missing sub claim"))
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .field("token_id", &self.token_id)
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

struct Segments<'a> {
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
}

fn split_token(token: &str) -> AuthResult<Segments<'_>> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok(Segments {
                header,
                payload,
                signature,
            })
        }
        _ => Err(AuthError::invalid_token(
            "Token must have three non-empty segments",
        )),
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> AuthResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::invalid_token(format!("Malformed {} encoding: {}", what, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token(format!("Malformed {}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn test_codec() -> (TokenCodec, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::at_timestamp(NOW));
        let codec = TokenCodec::new("test-secret-key-for-testing").with_clock(clock.clone());
        (codec, clock)
    }

    #[test]
    fn test_generate_and_verify() {
        let (codec, _) = test_codec();
        let token = codec.generate_with("42", 3600, Map::new()).unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert!(!token.contains('='));
        assert_eq!(codec.verify(&token).unwrap(), "42");
    }

    #[test]
    fn test_claim_set() {
        let (codec, _) = test_codec();
        let codec = codec.with_issuer("gatehouse");
        let mut extra = Map::new();
        extra.insert("role".to_string(), json!("admin"));

        let token = codec.generate_with("42", 60, extra).unwrap();
        let claims = codec.parse(&token).unwrap();

        assert_eq!(claims["iat"], json!(NOW));
        assert_eq!(claims["nbf"], json!(NOW));
        assert_eq!(claims["exp"], json!(NOW + 60));
        assert_eq!(claims["sub"], json!("42"));
        assert_eq!(claims["jti"], json!(DEFAULT_TOKEN_ID));
        assert_eq!(claims["iss"], json!("gatehouse"));
        assert_eq!(claims["role"], json!("admin"));
    }

    #[test]
    fn test_issuer_omitted_by_default() {
        let (codec, _) = test_codec();
        let claims = codec.parse(&codec.generate("1").unwrap()).unwrap();
        assert!(!claims.contains_key("iss"));
        assert_eq!(claims["exp"], json!(NOW + DEFAULT_TTL_SECS as i64));
    }

    #[test]
    fn test_expiry_boundary() {
        let (codec, clock) = test_codec();
        let token = codec.generate_with("42", 3600, Map::new()).unwrap();

        clock.advance(Duration::seconds(3599));
        assert_eq!(codec.verify(&token).unwrap(), "42");

        clock.advance(Duration::seconds(1));
        assert!(matches!(codec.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let (codec, _) = test_codec();
        let token = codec.generate_with("42", 0, Map::new()).unwrap();
        assert!(matches!(codec.verify(&token), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_parse_ignores_expiry_and_signature() {
        let (codec, clock) = test_codec();
        let token = codec.generate_with("42", 10, Map::new()).unwrap();
        clock.advance(Duration::seconds(100));

        let other = TokenCodec::new("another-secret");
        assert_eq!(other.parse(&token).unwrap()["sub"], json!("42"));
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let (codec, _) = test_codec();
        let token = codec.generate_with("42", 3600, Map::new()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        for index in 0..parts[1].len() - 1 {
            let mut payload: Vec<char> = parts[1].chars().collect();
            payload[index] = if payload[index] == 'A' { 'B' } else { 'A' };
            let payload: String = payload.into_iter().collect();
            let tampered = format!("{}.{}.{}", parts[0], payload, parts[2]);

            assert!(
                matches!(codec.verify(&tampered), Err(AuthError::InvalidToken(_))),
                "tampering at {} was not rejected",
                index
            );
        }
    }

    #[test]
    fn test_forged_expired_token_reports_invalid() {
        let (codec, clock) = test_codec();
        let forger = TokenCodec::new("wrong-secret").with_clock(clock.clone());
        let token = forger.generate_with("42", 10, Map::new()).unwrap();
        clock.advance(Duration::seconds(100));

        assert!(matches!(codec.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let (codec, _) = test_codec();
        let other = TokenCodec::new("wrong-secret");
        let token = other.generate("42").unwrap();

        assert!(matches!(codec.verify(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_algorithm_mismatch() {
        let (codec, _) = test_codec();
        let hs512 = TokenCodec::new("test-secret-key-for-testing")
            .with_algorithm(Algorithm::HS512)
            .unwrap();
        let token = hs512.generate("42").unwrap();

        assert!(matches!(codec.verify(&token), Err(AuthError::InvalidToken(_))));
        assert_eq!(hs512.verify(&token).unwrap(), "42");
    }

    #[test]
    fn test_asymmetric_algorithm_rejected() {
        let result = TokenCodec::new("secret").with_algorithm(Algorithm::RS256);
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_malformed_tokens() {
        let (codec, _) = test_codec();
        for token in ["", "abc", "a.b", "a.b.c.d", "..", "a..c", "!!!.@@@.###"] {
            assert!(
                matches!(codec.verify(token), Err(AuthError::InvalidToken(_))),
                "{:?} should be invalid",
                token
            );
        }
        assert!(matches!(codec.parse("a.b"), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_registered_claim_cannot_be_overridden() {
        let (codec, _) = test_codec();
        let mut extra = Map::new();
        extra.insert("sub".to_string(), json!("99"));

        assert!(matches!(
            codec.generate_with("42", 60, extra),
            Err(AuthError::Encoding(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = TokenConfig {
            secret: "s3cr3t".to_string(),
            ttl: 120,
            algo: "HS384".to_string(),
            jti: "custom-id".to_string(),
            app_name: Some("gatehouse".to_string()),
        };
        let codec = TokenCodec::from_config(&config).unwrap();
        assert_eq!(codec.algorithm(), Algorithm::HS384);
        assert_eq!(codec.ttl_secs(), 120);

        let claims = codec.parse(&codec.generate("7").unwrap()).unwrap();
        assert_eq!(claims["jti"], json!("custom-id"));
        assert_eq!(claims["iss"], json!("gatehouse"));
    }

    #[test]
    fn test_from_config_rejects_bad_settings() {
        assert!(matches!(
            TokenCodec::from_config(&TokenConfig::default()),
            Err(AuthError::Configuration(_))
        ));

        let config = TokenConfig {
            algo: "none".to_string(),
            ..TokenConfig::new("s3cr3t")
        };
        assert!(matches!(
            TokenCodec::from_config(&config),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let rendered = format!("{:?}", TokenConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}
