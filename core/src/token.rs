//! Stateless signed tokens.
//!
//! A token is URL-safe base64 over `{"payload": {...}, "signature": "<hex>"}`,
//! where the signature is HMAC-SHA256 of the payload serialized as compact JSON
//! with sorted keys. `exp` and `iat` (epoch seconds) are always set by the issuer.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub type Payload = Map<String, Value>;

const TRANSPORT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token signing is not configured")]
    Configuration,
    #[error("malformed token: {0}")]
    InvalidFormat(String),
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token expired at {exp} (now {now})")]
    Expired { exp: i64, now: i64 },
}

/// Issues and verifies tokens with a fixed secret. Without a secret every
/// operation fails with [`TokenError::Configuration`].
#[derive(Clone)]
pub struct TokenSigner {
    secret: Option<Vec<u8>>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("configured", &self.is_configured()).finish()
    }
}

impl TokenSigner {
    pub fn new(secret: Option<&str>) -> Self {
        let secret = secret.filter(|s| !s.is_empty()).map(|s| s.as_bytes().to_vec());
        Self { secret }
    }

    pub fn is_configured(&self) -> bool { self.secret.is_some() }

    pub fn issue(&self, payload: Payload, ttl_seconds: i64) -> Result<String, TokenError> {
        self.issue_at(payload, ttl_seconds, unix_now())
    }

    /// Issue with an explicit clock. Caller-supplied `exp`/`iat` are overwritten.
    /// A ttl that is not positive, or pushes `exp` past `i64::MAX`, is a configuration error.
    pub fn issue_at(&self, mut payload: Payload, ttl_seconds: i64, now: i64) -> Result<String, TokenError> {
        let secret = self.secret.as_deref().ok_or(TokenError::Configuration)?;
        if ttl_seconds <= 0 {
            return Err(TokenError::Configuration);
        }
        let exp = now.checked_add(ttl_seconds).ok_or(TokenError::Configuration)?;
        payload.insert("exp".into(), Value::from(exp));
        payload.insert("iat".into(), Value::from(now));
        let signature = hex::encode(sign(secret, &payload));

        let mut envelope = Map::new();
        envelope.insert("payload".into(), Value::Object(payload));
        envelope.insert("signature".into(), Value::String(signature));
        let json = serde_json::to_string(&Value::Object(envelope))
            .map_err(|e| TokenError::InvalidFormat(e.to_string()))?;
        Ok(TRANSPORT.encode(json))
    }

    pub fn verify(&self, token: &str) -> Result<Payload, TokenError> {
        self.verify_at(token, unix_now())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<Payload, TokenError> {
        let secret = self.secret.as_deref().ok_or(TokenError::Configuration)?;
        let bytes = TRANSPORT
            .decode(token.trim())
            .map_err(|e| TokenError::InvalidFormat(format!("bad encoding: {e}")))?;
        let envelope: Value = serde_json::from_slice(&bytes)
            .map_err(|e| TokenError::InvalidFormat(format!("bad json: {e}")))?;
        let Value::Object(mut envelope) = envelope else {
            return Err(TokenError::InvalidFormat("envelope is not an object".into()));
        };
        let payload = match envelope.remove("payload") {
            Some(Value::Object(p)) => p,
            _ => return Err(TokenError::InvalidFormat("missing payload".into())),
        };
        let provided = match envelope.remove("signature") {
            Some(Value::String(s)) => s,
            _ => return Err(TokenError::InvalidFormat("missing signature".into())),
        };

        let expected = hex::encode(sign(secret, &payload));
        if !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
            return Err(TokenError::InvalidSignature);
        }

        let exp = payload
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or_else(|| TokenError::InvalidFormat("missing exp".into()))?;
        if exp < now {
            return Err(TokenError::Expired { exp, now });
        }
        Ok(payload)
    }
}

/// Compact JSON with object keys sorted at every nesting level.
fn canonical(payload: &Payload) -> String {
    serde_json::to_string(&sorted(&Value::Object(payload.clone()))).unwrap_or_default()
}

// Rebuilt in key order so the output does not depend on serde_json's map backend.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), sorted(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn sign(secret: &[u8], payload: &Payload) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(canonical(payload).as_bytes());
    mac.finalize().into_bytes().to_vec()
}

pub fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
