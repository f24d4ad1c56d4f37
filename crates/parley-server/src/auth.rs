use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use parley_core::errors::ChatError;
use parley_core::ids::UserId;
use parley_core::verify::IdentityVerifier;

/// Claims carried by the admission credential.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject: the user handle.
    sub: String,
    /// Expiry (Unix timestamp).
    exp: i64,
}

/// HS256 credential verifier. Token issuance belongs to the identity
/// provider; this server only validates.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

#[async_trait]
impl IdentityVerifier for TokenVerifier {
    async fn verify(&self, credential: &str) -> Result<UserId, ChatError> {
        let data = decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| ChatError::AuthFailure(e.to_string()))?;

        if data.claims.sub.is_empty() {
            return Err(ChatError::AuthFailure("empty subject".into()));
        }
        Ok(UserId::from_raw(data.claims.sub))
    }
}

/// Mint a credential. For local tooling and tests.
pub fn issue_token(
    identity: &UserId,
    secret: &SecretString,
    ttl: std::time::Duration,
) -> Result<String, ChatError> {
    let claims = Claims {
        sub: identity.as_str().to_owned(),
        exp: Utc::now().timestamp() + ttl.as_secs() as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| ChatError::AuthFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn secret() -> SecretString {
        SecretString::from("test-secret")
    }

    #[tokio::test]
    async fn valid_token_roundtrips_identity() {
        let secret = secret();
        let token = issue_token(&UserId::from_raw("alice"), &secret, Duration::from_secs(300)).unwrap();

        let verifier = TokenVerifier::new(&secret);
        let identity = verifier.verify(&token).await.unwrap();
        assert_eq!(identity.as_str(), "alice");
    }

    #[tokio::test]
    async fn garbage_token_is_auth_failure() {
        let verifier = TokenVerifier::new(&secret());
        let err = verifier.verify("not-a-jwt").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.error_kind(), "auth_failure");
    }

    #[tokio::test]
    async fn wrong_secret_is_rejected() {
        let token =
            issue_token(&UserId::from_raw("alice"), &secret(), Duration::from_secs(300)).unwrap();

        let verifier = TokenVerifier::new(&SecretString::from("other-secret"));
        assert!(verifier.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let secret = secret();
        // beyond the default validation leeway
        let claims = Claims {
            sub: "alice".into(),
            exp: Utc::now().timestamp() - 600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
        )
        .unwrap();

        let verifier = TokenVerifier::new(&secret);
        assert!(verifier.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn empty_subject_is_rejected() {
        let secret = secret();
        let token = issue_token(&UserId::from_raw(""), &secret, Duration::from_secs(300)).unwrap();

        let verifier = TokenVerifier::new(&secret);
        let err = verifier.verify(&token).await.unwrap_err();
        assert_eq!(err.error_kind(), "auth_failure");
    }
}
