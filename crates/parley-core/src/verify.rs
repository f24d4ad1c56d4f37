use async_trait::async_trait;

use crate::errors::ChatError;
use crate::ids::UserId;

/// Validates a caller identity from an opaque credential.
///
/// Called once per connection before the core admits it. A failure closes
/// the connection with a policy-violation code; no core state is created.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<UserId, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AcceptAll;

    #[async_trait]
    impl IdentityVerifier for AcceptAll {
        async fn verify(&self, credential: &str) -> Result<UserId, ChatError> {
            if credential.is_empty() {
                return Err(ChatError::AuthFailure("empty credential".into()));
            }
            Ok(UserId::from_raw(credential))
        }
    }

    #[tokio::test]
    async fn trait_object_dispatch() {
        let verifier: Box<dyn IdentityVerifier> = Box::new(AcceptAll);
        let id = verifier.verify("alice").await.unwrap();
        assert_eq!(id.as_str(), "alice");
        assert!(verifier.verify("").await.unwrap_err().is_fatal());
    }
}
