//! Guard code generator
//!
//! Reproduces the provider's authenticator: HMAC-SHA1 over a 30-second time
//! step, dynamic truncation to 31 bits, then five characters drawn from a
//! 26-symbol alphabet. Codes must be identical to the ones the provider's
//! own app shows for the same secret and window.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use lessor_config::SecretEncoding;
use lessor_gateway_api::{ClockSkewSource, CredentialSource};
use sha1::Sha1;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::GuardError;

const CODE_ALPHABET: &[u8; 26] = b"23456789BCDFGHJKMNPQRTVWXY";
const CODE_LENGTH: usize = 5;
const TIME_STEP_SECONDS: i64 = 30;

/// Compute the guard code for a raw shared secret at a unix time
pub fn guard_code(secret: &[u8], unix_time: i64) -> Result<String, GuardError> {
    if secret.is_empty() {
        return Err(GuardError::InvalidSecret("empty secret".into()));
    }

    let counter = unix_time.div_euclid(TIME_STEP_SECONDS) as u64;
    let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(secret)
        .map_err(|e| GuardError::InvalidSecret(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest[19] & 0x0F);
    let mut value = u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7FFF_FFFF;

    let alphabet_len = CODE_ALPHABET.len() as u32;
    let mut code = String::with_capacity(CODE_LENGTH);
    for _ in 0..CODE_LENGTH {
        code.push(char::from(CODE_ALPHABET[(value % alphabet_len) as usize]));
        value /= alphabet_len;
    }

    Ok(code)
}

/// Decode a shared secret as stored in credential files
pub fn decode_shared_secret(
    encoded: &str,
    encoding: SecretEncoding,
) -> Result<Vec<u8>, GuardError> {
    let trimmed = encoded.trim();
    let bytes = match encoding {
        SecretEncoding::Base64 => {
            use base64::Engine as _;
            base64::engine::general_purpose::STANDARD
                .decode(trimmed)
                .map_err(|e| GuardError::InvalidSecret(e.to_string()))?
        }
        SecretEncoding::Base32 => {
            let cleaned: String = trimmed
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '=')
                .map(|c| c.to_ascii_uppercase())
                .collect();
            base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &cleaned)
                .ok_or_else(|| GuardError::InvalidSecret("not valid base32".into()))?
        }
    };

    if bytes.is_empty() {
        return Err(GuardError::InvalidSecret("empty secret".into()));
    }
    Ok(bytes)
}

/// Produces guard codes for inventory accounts
pub struct GuardCodeGenerator {
    skew: Arc<dyn ClockSkewSource>,
    credentials: Arc<dyn CredentialSource>,
    encoding: SecretEncoding,
}

impl GuardCodeGenerator {
    pub fn new(
        skew: Arc<dyn ClockSkewSource>,
        credentials: Arc<dyn CredentialSource>,
        encoding: SecretEncoding,
    ) -> Self {
        Self {
            skew,
            credentials,
            encoding,
        }
    }

    /// Clock skew against the provider; zero when it cannot be fetched
    pub async fn skew_seconds(&self) -> i64 {
        match self.skew.skew_seconds().await {
            Ok(skew) => skew,
            Err(e) => {
                warn!(error = %e, "Clock skew unavailable, using zero offset");
                0
            }
        }
    }

    /// Guard code for the account behind `credential_ref` at `now`
    pub async fn code_for(
        &self,
        credential_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<String, GuardError> {
        let encoded = self.credentials.shared_secret(credential_ref).await?;
        let secret = decode_shared_secret(&encoded, self.encoding)?;
        let skew = self.skew_seconds().await;

        let at = now.timestamp().checked_add(skew).unwrap_or_else(|| {
            warn!(skew, "Clock skew out of range, using zero offset");
            now.timestamp()
        });

        debug!(credential_ref, skew, "Generating guard code");
        guard_code(&secret, at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lessor_gateway_api::{FixedSkew, MockCredentials};

    const SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn known_vectors() {
        let vectors = [
            (0, "GG5F5"),
            (59, "PV9M4"),
            (1_111_111_109, "PY4YB"),
            (1_234_567_890, "VHHQY"),
            (1_700_000_000, "R87JJ"),
            (1_700_000_029, "5MWGC"),
        ];
        for (time, expected) in vectors {
            assert_eq!(guard_code(SECRET, time).unwrap(), expected, "t={time}");
        }
    }

    #[test]
    fn code_is_stable_within_window() {
        assert_eq!(
            guard_code(SECRET, 1_700_000_029).unwrap(),
            guard_code(SECRET, 1_700_000_030).unwrap()
        );
    }

    #[test]
    fn decodes_both_encodings() {
        let b64 =
            decode_shared_secret("MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=", SecretEncoding::Base64).unwrap();
        let b32 = decode_shared_secret(
            "gezd gnbv gy3t qojq gezd gnbv gy3t qojq",
            SecretEncoding::Base32,
        )
        .unwrap();
        assert_eq!(b64, SECRET);
        assert_eq!(b32, SECRET);
    }

    #[test]
    fn rejects_garbage_secret() {
        assert!(decode_shared_secret("***", SecretEncoding::Base64).is_err());
        assert!(decode_shared_secret("", SecretEncoding::Base32).is_err());
    }

    #[tokio::test]
    async fn generator_applies_skew() {
        let credentials = Arc::new(
            MockCredentials::new().with_secret("acct.maFile", "cnOgv/KdpLoP6Nbh0GMkXkPXALQ="),
        );
        let generator = GuardCodeGenerator::new(
            Arc::new(FixedSkew::new(0)),
            credentials.clone(),
            SecretEncoding::Base64,
        );
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(generator.code_for("acct.maFile", now).await.unwrap(), "X45RP");

        // A +29s skew pushes 1_700_000_000 into the next 30-second window
        let skewed = GuardCodeGenerator::new(
            Arc::new(FixedSkew::new(29)),
            Arc::new(MockCredentials::new().with_secret("k", "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=")),
            SecretEncoding::Base64,
        );
        let before = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(skewed.code_for("k", before).await.unwrap(), "5MWGC");
    }

    #[tokio::test]
    async fn unreachable_time_source_degrades_to_zero() {
        let generator = GuardCodeGenerator::new(
            Arc::new(FixedSkew::unreachable()),
            Arc::new(MockCredentials::new().with_secret("k", "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=")),
            SecretEncoding::Base64,
        );
        assert_eq!(generator.skew_seconds().await, 0);

        let now = Utc.timestamp_opt(1_234_567_890, 0).unwrap();
        assert_eq!(generator.code_for("k", now).await.unwrap(), "VHHQY");
    }

    #[tokio::test]
    async fn extreme_skew_falls_back_to_local_time() {
        let generator = GuardCodeGenerator::new(
            Arc::new(FixedSkew::new(i64::MAX)),
            Arc::new(MockCredentials::new().with_secret("k", "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=")),
            SecretEncoding::Base64,
        );
        let now = Utc.timestamp_opt(1_234_567_890, 0).unwrap();
        assert_eq!(generator.code_for("k", now).await.unwrap(), "VHHQY");
    }

    #[tokio::test]
    async fn unknown_credential_is_an_error() {
        let generator = GuardCodeGenerator::new(
            Arc::new(FixedSkew::new(0)),
            Arc::new(MockCredentials::new()),
            SecretEncoding::Base64,
        );
        let result = generator.code_for("missing", Utc::now()).await;
        assert!(matches!(result, Err(GuardError::Credential(_))));
    }
}
