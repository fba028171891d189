//! Signed bearer tokens binding a user id.
//!
//! Tokens are HS256 JWTs. The signing secret is handed to [`TokenCodec::new`]
//! so that independent codecs (one per test, one per process) never share key
//! material.

use crate::domain::error::DomainError;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // user id
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    #[instrument(skip(self))]
    pub fn issue(&self, user_id: u32) -> Result<String, DomainError> {
        let now = Utc::now().timestamp();
        let exp = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| {
                DomainError::Internal(format!("token ttl of {:?} is out of range", self.ttl))
            })?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| DomainError::Internal(format!("Failed to sign token: {}", e)))?;
        debug!(user_id = user_id, "Token issued");
        Ok(token)
    }

    /// Recovers the user id from `token`.
    ///
    /// Malformed input, a foreign signature, an expired token or a subject
    /// that is not a user id all yield `DomainError::InvalidToken`.
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<u32, DomainError> {
        let validation = Validation::new(Algorithm::HS256);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "Token rejected");
            DomainError::InvalidToken(e.to_string())
        })?;

        let user_id = data.claims.sub.parse::<u32>().map_err(|_| {
            warn!(sub = %data.claims.sub, "Token subject is not a user id");
            DomainError::InvalidToken("subject is not a user id".to_string())
        })?;

        debug!(user_id = user_id, "Token verified");
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn codec() -> TokenCodec {
        TokenCodec::new("test-token-secret", DAY)
    }

    #[test]
    fn test_issue_produces_three_part_jwt() {
        let token = codec().issue(7).unwrap();

        assert!(!token.is_empty());
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_verify_returns_issued_user_id() {
        let codec = codec();
        for user_id in [0, 1, 42, u32::MAX] {
            let token = codec.issue(user_id).unwrap();
            assert_eq!(codec.verify(&token).unwrap(), user_id);
        }
    }

    #[test]
    fn test_verify_rejects_non_token_input() {
        let codec = codec();
        for input in ["testToken", "password", "", "a.b.c"] {
            assert!(matches!(
                codec.verify(input),
                Err(DomainError::InvalidToken(_))
            ));
        }
    }

    #[test]
    fn test_verify_rejects_token_from_other_key() {
        let token = TokenCodec::new("other-secret", DAY).issue(3).unwrap();

        assert!(matches!(
            codec().verify(&token),
            Err(DomainError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let codec = codec();
        let token = codec.issue(1).unwrap();
        let forged_claims = codec.issue(2).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let forged: Vec<&str> = forged_claims.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged[1], parts[2]);

        assert!(codec.verify(&spliced).is_err());
    }

    #[test]
    fn test_verify_rejects_expired_token() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "5".to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-token-secret"),
        )
        .unwrap();

        assert!(matches!(
            codec().verify(&token),
            Err(DomainError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_issue_rejects_out_of_range_ttl() {
        for secs in [i64::MAX as u64, u64::MAX - 3600, u64::MAX] {
            let codec = TokenCodec::new("test-token-secret", Duration::from_secs(secs));
            assert!(matches!(codec.issue(1), Err(DomainError::Internal(_))));
        }
    }

    #[test]
    fn test_issue_with_long_ttl_is_not_expired() {
        let codec = TokenCodec::new("test-token-secret", Duration::from_secs(10 * 365 * 86_400));
        let token = codec.issue(9).unwrap();

        assert_eq!(codec.verify(&token).unwrap(), 9);
    }

    #[test]
    fn test_verify_rejects_non_numeric_subject() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "not-a-number".to_string(),
            iat: now,
            exp: now + 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-token-secret"),
        )
        .unwrap();

        assert!(matches!(
            codec().verify(&token),
            Err(DomainError::InvalidToken(_))
        ));
    }
}
