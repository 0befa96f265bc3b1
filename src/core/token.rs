//! Stateless identity tokens.
//!
//! Tokens use the JWT compact form with `HS256`: a fixed header, the claims
//! `{sub, iat, exp}`, and an HMAC-SHA256 signature over both, each part
//! base64url-encoded without padding. Nothing is persisted; a token is valid
//! exactly while its signature checks out and `exp` lies in the future.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::models::models::Id;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("failed to sign token")]
    Signing,
}

pub struct TokenService {
    key: Vec<u8>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: secret.to_vec(),
            ttl,
        }
    }

    /// Fails when `hours` is not positive or does not fit a `Duration`.
    pub fn with_hours(secret: &[u8], hours: i64) -> anyhow::Result<Self> {
        let ttl = Duration::try_hours(hours)
            .filter(|ttl| *ttl > Duration::zero())
            .ok_or_else(|| anyhow::anyhow!("token lifetime of {hours} hours is out of range"))?;
        Ok(Self::new(secret, ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: Id) -> Result<String, TokenError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: Id, now: DateTime<Utc>) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            sub: user,
            iat: now.timestamp(),
            exp: now
                .checked_add_signed(self.ttl)
                .ok_or(TokenError::Signing)?
                .timestamp(),
        };

        let header = serde_json::to_vec(&header).map_err(|_| TokenError::Signing)?;
        let claims = serde_json::to_vec(&claims).map_err(|_| TokenError::Signing)?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }

    pub fn verify(&self, token: &str) -> Result<Id, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Id, TokenError> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => return Err(TokenError::Malformed),
            };

        let header: Header = decode_part(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        // verify_slice compares in constant time
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: Claims = decode_part(claims_b64)?;
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims.sub)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| TokenError::Signing)
    }
}

fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::with_hours(b"test-secret", 100).unwrap()
    }

    #[test]
    fn issued_token_verifies_to_same_user() {
        let tokens = service();
        let user = Id::new();
        let token = tokens.issue(user).unwrap();
        assert_eq!(tokens.verify(&token), Ok(user));
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn token_expires_after_ttl() {
        let tokens = service();
        let user = Id::new();
        let issued = Utc::now();
        let token = tokens.issue_at(user, issued).unwrap();

        let almost = issued + Duration::hours(100) - Duration::seconds(1);
        assert_eq!(tokens.verify_at(&token, almost), Ok(user));

        let expired = issued + Duration::hours(100);
        assert_eq!(tokens.verify_at(&token, expired), Err(TokenError::Expired));
        assert_eq!(
            tokens.verify_at(&token, issued + Duration::days(365)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let token = service().issue(Id::new()).unwrap();
        let other = TokenService::with_hours(b"another-secret", 100).unwrap();
        assert_eq!(other.verify(&token), Err(TokenError::BadSignature));
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let tokens = service();
        let token = tokens.issue(Id::new()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = Claims {
            sub: Id::new(),
            iat: 0,
            exp: i64::MAX,
        };
        let forged = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());
        let tampered = format!("{}.{}.{}", parts[0], forged, parts[2]);

        assert_eq!(tokens.verify(&tampered), Err(TokenError::BadSignature));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let tokens = service();
        assert_eq!(tokens.verify(""), Err(TokenError::Malformed));
        assert_eq!(tokens.verify("a.b"), Err(TokenError::Malformed));
        assert_eq!(tokens.verify("a.b.c.d"), Err(TokenError::Malformed));
        assert_eq!(tokens.verify("!!!.???.***"), Err(TokenError::Malformed));
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                sub: Id::new(),
                iat: 0,
                exp: i64::MAX,
            })
            .unwrap(),
        );
        let token = format!("{header}.{claims}.");
        assert_eq!(service().verify(&token), Err(TokenError::UnsupportedAlgorithm));
    }

    #[test]
    fn lifetime_out_of_range_is_an_error() {
        assert!(TokenService::with_hours(b"s", i64::MAX).is_err());
        assert!(TokenService::with_hours(b"s", 0).is_err());
        assert!(TokenService::with_hours(b"s", 10_000_000_000).is_ok());
    }

    #[test]
    fn expiry_past_the_calendar_fails_to_issue() {
        let tokens = TokenService::new(b"s", Duration::try_days(100_000_000).unwrap());
        assert_eq!(tokens.issue(Id::new()), Err(TokenError::Signing));
    }
}
