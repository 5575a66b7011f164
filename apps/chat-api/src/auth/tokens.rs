//! Gateway JWT validation.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Claims carried by a gateway access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The authenticated user id.
    pub id: String,
    pub exp: i64,
}

/// Verifies HS256 access tokens against the shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validate a token and return the user id it asserts.
    ///
    /// Signature and `exp` checks come from `jsonwebtoken`; any failure
    /// maps to the same unauthorized error so callers cannot distinguish
    /// a forged token from an expired one.
    pub fn verify(&self, token: &str) -> Result<String, EventError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                tracing::debug!(?e, "token validation failed");
                EventError::unauthorized("Invalid or expired token")
            })?;
        Ok(data.claims.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};

    fn mint(secret: &str, id: &str, exp: i64) -> String {
        let claims = Claims {
            id: id.to_string(),
            exp,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("mint test token")
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 600
    }

    #[test]
    fn accepts_valid_token() {
        let verifier = TokenVerifier::new("test-secret");
        let token = mint("test-secret", "usr_01", future_exp());
        assert_eq!(verifier.verify(&token).unwrap(), "usr_01");
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = TokenVerifier::new("test-secret");
        let token = mint("other-secret", "usr_01", future_exp());
        let err = verifier.verify(&token).unwrap_err();
        assert_eq!(err.message, "Invalid or expired token");
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = TokenVerifier::new("test-secret");
        let token = mint("test-secret", "usr_01", chrono::Utc::now().timestamp() - 600);
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn rejects_garbage() {
        let verifier = TokenVerifier::new("test-secret");
        assert!(verifier.verify("not-a-jwt").is_err());
    }
}
