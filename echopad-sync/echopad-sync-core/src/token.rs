//! Token Service — HMAC-SHA256 signed access/refresh tokens (spec §4.2).
//!
//! Grounded on `context-hub-core/src/auth.rs`'s `Hs256Verifier`, which
//! already wraps `jsonwebtoken` configured for `Algorithm::HS256`. This
//! adds the matching issuer half and the spec's two token shapes. `decode`
//! — locating the session row for a claimed refresh token before its hash
//! is verified against the stored session — needs the payload without
//! signature verification, which `jsonwebtoken` has no mode for; that one
//! piece is hand-rolled base64url decoding rather than a crate call.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const ACCESS_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;
const REFRESH_TOKEN_LIFETIME_SECS: u64 = 30 * 24 * 60 * 60;

/// Default HMAC secret used only when `JWT_SECRET` is unset — fine for
/// local development, never for a real deployment (spec §6).
pub const DEV_DEFAULT_SECRET: &str = "echopad-dev-secret-do-not-use-in-production";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub device_id: Uuid,
    pub iat: u64,
    pub exp: u64,
    pub scope: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub device_id: Uuid,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iat: u64,
    pub exp: u64,
}

pub struct TokenService {
    secret: String,
}

impl TokenService {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs()
    }

    pub fn issue_access(&self, user_id: Uuid, device_id: Uuid) -> anyhow::Result<String> {
        let now = Self::now();
        let claims = AccessClaims {
            sub: user_id,
            device_id,
            iat: now,
            exp: now + ACCESS_TOKEN_LIFETIME_SECS,
            scope: vec!["sync:read".to_string(), "sync:write".to_string()],
        };
        let header = Header::new(Algorithm::HS256);
        Ok(encode(
            &header,
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    pub fn issue_refresh(&self, user_id: Uuid, device_id: Uuid) -> anyhow::Result<String> {
        let now = Self::now();
        let claims = RefreshClaims {
            sub: user_id,
            device_id,
            token_type: "refresh".to_string(),
            iat: now,
            exp: now + REFRESH_TOKEN_LIFETIME_SECS,
        };
        let header = Header::new(Algorithm::HS256);
        Ok(encode(
            &header,
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }

    /// Verify signature and expiry, returning the access claims.
    pub fn verify_access(&self, token: &str) -> Option<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .ok()
        .map(|d| d.claims)
    }

    /// Verify signature and expiry, returning the refresh claims.
    pub fn verify_refresh(&self, token: &str) -> Option<RefreshClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.required_spec_claims.clear();
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .ok()
        .map(|d| d.claims)
    }

    /// Decode a refresh token's payload WITHOUT verifying its signature —
    /// used solely to locate the claimed session row (spec §4.2) before
    /// that row's stored hash is checked against the presented token.
    pub fn decode_unverified(token: &str) -> Option<RefreshClaims> {
        let payload_segment = token.split('.').nth(1)?;
        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_segment).ok()?;
        serde_json::from_slice(&payload_bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trips() {
        let svc = TokenService::new("test-secret".to_string());
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let token = svc.issue_access(user_id, device_id).unwrap();
        let claims = svc.verify_access(&token).expect("should verify");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.device_id, device_id);
    }

    #[test]
    fn tampered_signature_fails_verify() {
        let svc = TokenService::new("test-secret".to_string());
        let other = TokenService::new("other-secret".to_string());
        let token = svc.issue_access(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        assert!(other.verify_access(&token).is_none());
    }

    #[test]
    fn decode_unverified_does_not_need_the_right_secret() {
        let svc = TokenService::new("test-secret".to_string());
        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let token = svc.issue_refresh(user_id, device_id).unwrap();
        let claims = TokenService::decode_unverified(&token).expect("decodes");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.token_type, "refresh");
    }

    #[test]
    fn expired_token_fails_verify() {
        let svc = TokenService::new("test-secret".to_string());
        let now = TokenService::now();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
            iat: now - 100,
            exp: now - 50,
            scope: vec![],
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(svc.verify_access(&token).is_none());
    }
}
