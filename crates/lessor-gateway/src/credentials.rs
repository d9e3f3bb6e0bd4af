//! Shared secrets from per-account credential files
//!
//! Each account's credential reference names a JSON file (the `.maFile`
//! format of mobile authenticator exports) holding a `shared_secret` field.

use async_trait::async_trait;
use lessor_gateway_api::{CredentialSource, GatewayError, GatewayResult};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Deserialize)]
struct MaFile {
    shared_secret: Option<String>,
}

/// Reads credential files from a directory. Absolute references are used
/// as-is; relative ones must stay inside the directory.
pub struct MaFileCredentials {
    dir: PathBuf,
}

impl MaFileCredentials {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn resolve(&self, credential_ref: &str) -> GatewayResult<PathBuf> {
        let path = Path::new(credential_ref);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        if credential_ref.is_empty()
            || path
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(GatewayError::Rejected(format!(
                "invalid credential reference '{}'",
                credential_ref
            )));
        }
        Ok(self.dir.join(path))
    }
}

#[async_trait]
impl CredentialSource for MaFileCredentials {
    async fn shared_secret(&self, credential_ref: &str) -> GatewayResult<String> {
        let path = self.resolve(credential_ref)?;
        debug!(path = %path.display(), "Reading credential file");

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GatewayError::Rejected(format!(
                    "credential file not found: {}",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let file: MaFile = serde_json::from_str(&contents)
            .map_err(|e| GatewayError::Parse(format!("{}: {}", path.display(), e)))?;

        file.shared_secret
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::Parse(format!("{}: no shared_secret", path.display()))
            })
    }
}
