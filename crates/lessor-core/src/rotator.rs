//! Credential rotator

use lessor_config::{MIN_SECRET_LENGTH, RotationConfig};
use lessor_gateway_api::SecretChanger;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{LeaseError, LeaseResult};

/// Generate a random alphanumeric secret from the OS CSPRNG
pub fn generate_secret(length: usize) -> LeaseResult<String> {
    if length < MIN_SECRET_LENGTH {
        return Err(LeaseError::InvalidRequest(format!(
            "secret length {length} is below the minimum of {MIN_SECRET_LENGTH}"
        )));
    }

    Ok(OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect())
}

/// Replaces account secrets through the external change collaborator
pub struct CredentialRotator {
    changer: Arc<dyn SecretChanger>,
    secret_length: usize,
}

impl CredentialRotator {
    pub fn new(changer: Arc<dyn SecretChanger>, config: &RotationConfig) -> Self {
        Self {
            changer,
            secret_length: config.secret_length,
        }
    }

    /// Change the secret at the provider and return the new one.
    ///
    /// Nothing is persisted here; the caller stores the returned secret for
    /// the whole sibling group in one transaction.
    pub async fn rotate(&self, credential_ref: &str, old_secret: &str) -> LeaseResult<String> {
        let new_secret = generate_secret(self.secret_length)?;

        match self
            .changer
            .change_secret(credential_ref, old_secret, &new_secret)
            .await
        {
            Ok(()) => {
                info!(credential_ref, "Secret changed at provider");
                Ok(new_secret)
            }
            Err(e) => {
                warn!(credential_ref, error = %e, "Secret change failed");
                Err(LeaseError::RotationFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lessor_gateway_api::MockSecretChanger;

    #[test]
    fn generated_secrets_are_alphanumeric() {
        let secret = generate_secret(12).unwrap();
        assert_eq!(secret.len(), 12);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_secret(12).unwrap());
    }

    #[test]
    fn short_secrets_rejected() {
        assert!(matches!(
            generate_secret(7),
            Err(LeaseError::InvalidRequest(_))
        ));
        assert_eq!(generate_secret(8).unwrap().len(), 8);
    }

    #[tokio::test]
    async fn rotate_returns_secret_given_to_provider() {
        let changer = Arc::new(MockSecretChanger::new());
        let rotator = CredentialRotator::new(changer.clone(), &RotationConfig::default());

        let secret = rotator.rotate("l1.maFile", "old").await.unwrap();
        assert_eq!(changer.changes(), vec![("l1.maFile".to_string(), secret)]);
    }

    #[tokio::test]
    async fn provider_refusal_is_rotation_failure() {
        let changer = Arc::new(MockSecretChanger::new());
        changer.set_fail(true);
        let rotator = CredentialRotator::new(changer.clone(), &RotationConfig::default());

        let result = rotator.rotate("l1.maFile", "old").await;
        assert!(matches!(result, Err(LeaseError::RotationFailed(_))));
        assert_eq!(changer.call_count(), 1);
    }
}
