//! Signed join-token scheme.
//!
//! A token binds a client to exactly one `(publicUrl, roomId, clientId)`
//! triple for a short lifetime. The subject claim is always the literal
//! string `"joinRoom"` — this isn't a normal JWT audience/subject, it's a
//! fixed marker that lets a verifier reject tokens minted for some other
//! purpose that happen to share the signing secret.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The fixed `sub` claim every join token must carry.
pub const JOIN_SUBJECT: &str = "joinRoom";

/// Default token lifetime when the caller doesn't specify one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// The decoded payload of a join token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(rename = "publicUrl")]
    pub public_url: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "roomProperties", skip_serializing_if = "Option::is_none")]
    pub room_properties: Option<serde_json::Value>,
    #[serde(rename = "clientId")]
    pub client_id: String,
    #[serde(rename = "clientProperties", skip_serializing_if = "Option::is_none")]
    pub client_properties: Option<serde_json::Value>,
    /// Restricts the token to joining a room that already exists: this
    /// implementation rejects a `joinOnly` token aimed at a room that
    /// doesn't exist yet rather than silently ignoring the flag; see
    /// DESIGN.md.
    #[serde(rename = "joinOnly", default, skip_serializing_if = "Option::is_none")]
    pub join_only: Option<bool>,
}

/// Inputs to [`generate`]; mirrors the fields of [`TokenClaims`] minus `sub`/`exp`.
pub struct GenerateTokenOpts {
    pub public_url: String,
    pub room_id: String,
    pub room_properties: Option<serde_json::Value>,
    pub client_id: String,
    pub client_properties: Option<serde_json::Value>,
    pub join_only: Option<bool>,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(jsonwebtoken::errors::Error),
    #[error("authentication failed: {0}")]
    Verify(#[from] VerifyError),
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed or unverifiable token")]
    Malformed(jsonwebtoken::errors::Error),
    #[error("token expired")]
    Expired,
    #[error("token subject is not \"joinRoom\"")]
    WrongSubject,
}

/// Sign a new join token with the shared secret.
pub fn generate(secret: &str, opts: GenerateTokenOpts) -> Result<String, TokenError> {
    let ttl = opts.ttl.unwrap_or(DEFAULT_TTL);
    let exp = now_secs() + ttl.as_secs() as usize;
    let claims = TokenClaims {
        sub: JOIN_SUBJECT.to_string(),
        exp,
        public_url: opts.public_url,
        room_id: opts.room_id,
        room_properties: opts.room_properties,
        client_id: opts.client_id,
        client_properties: opts.client_properties,
        join_only: opts.join_only,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(TokenError::Sign)
}

/// Verify a presented token against the shared secret, requiring the
/// `joinRoom` subject.
pub fn verify(secret: &str, token: &str) -> Result<TokenClaims, VerifyError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp"]);
    validation.sub = Some(JOIN_SUBJECT.to_string());

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => VerifyError::Expired,
            jsonwebtoken::errors::ErrorKind::InvalidSubject => VerifyError::WrongSubject,
            _ => VerifyError::Malformed(err),
        })?;

    if data.claims.sub != JOIN_SUBJECT {
        return Err(VerifyError::WrongSubject);
    }
    Ok(data.claims)
}

fn now_secs() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_sign_and_verify() {
        let secret = "test-secret";
        let token = generate(
            secret,
            GenerateTokenOpts {
                public_url: "rs-a".into(),
                room_id: "R1".into(),
                room_properties: None,
                client_id: "C1".into(),
                client_properties: Some(serde_json::json!({"name": "alice"})),
                join_only: None,
                ttl: None,
            },
        )
        .expect("sign");

        let claims = verify(secret, &token).expect("verify");
        assert_eq!(claims.sub, JOIN_SUBJECT);
        assert_eq!(claims.public_url, "rs-a");
        assert_eq!(claims.room_id, "R1");
        assert_eq!(claims.client_id, "C1");
        assert_eq!(claims.client_properties, Some(serde_json::json!({"name": "alice"})));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = generate(
            "secret-a",
            GenerateTokenOpts {
                public_url: "rs-a".into(),
                room_id: "R1".into(),
                room_properties: None,
                client_id: "C1".into(),
                client_properties: None,
                join_only: None,
                ttl: None,
            },
        )
        .unwrap();
        let err = verify("secret-b", &token).unwrap_err();
        assert!(matches!(err, VerifyError::Malformed(_)));
    }

    #[test]
    fn rejects_expired_token() {
        let token = generate(
            "secret",
            GenerateTokenOpts {
                public_url: "rs-a".into(),
                room_id: "R1".into(),
                room_properties: None,
                client_id: "C1".into(),
                client_properties: None,
                join_only: None,
                ttl: Some(Duration::from_secs(0)),
            },
        )
        .unwrap();
        std::thread::sleep(Duration::from_secs(1));
        let err = verify("secret", &token).unwrap_err();
        assert!(matches!(err, VerifyError::Expired));
    }
}
