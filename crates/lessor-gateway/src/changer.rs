//! Secret changes through an external helper process

use async_trait::async_trait;
use lessor_gateway_api::{GatewayError, GatewayResult, SecretChanger};
use serde::Serialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Secrets handed to the helper on stdin, one JSON line
#[derive(Serialize)]
struct ChangeRequest<'a> {
    old_secret: &'a str,
    new_secret: &'a str,
}

/// Runs `argv` with the credential reference appended as the last argument.
///
/// The helper reads `{"old_secret": .., "new_secret": ..}` from stdin and
/// exits 0 once the provider confirmed the change. Anything it prints on
/// stderr becomes the failure reason.
pub struct CommandSecretChanger {
    argv: Vec<String>,
}

impl CommandSecretChanger {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl SecretChanger for CommandSecretChanger {
    async fn change_secret(
        &self,
        credential_ref: &str,
        old_secret: &str,
        new_secret: &str,
    ) -> GatewayResult<()> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(GatewayError::Rejected("no secret change helper configured".into()));
        };

        let mut child = Command::new(program)
            .args(args)
            .arg(credential_ref)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        debug!(program = %program, credential_ref, pid = ?child.id(), "Secret change helper spawned");

        let mut line = serde_json::to_vec(&ChangeRequest {
            old_secret,
            new_secret,
        })
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
        line.push(b'\n');

        if let Some(mut stdin) = child.stdin.take() {
            // The helper may exit without reading; its exit status decides
            if let Err(e) = stdin.write_all(&line).await {
                debug!(error = %e, "Helper closed stdin early");
            }
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reason = if stderr.is_empty() {
            format!("helper exited with {}", output.status)
        } else {
            stderr
        };
        warn!(credential_ref, status = %output.status, "Secret change helper failed");
        Err(GatewayError::Rejected(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn helper_receives_ref_and_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("arg");
        let stdin_file = dir.path().join("stdin");
        // With `sh -c`, the first extra argument becomes $0
        let script = format!(
            "printf '%s' \"$0\" > {}; cat > {}",
            args_file.display(),
            stdin_file.display()
        );

        let changer = CommandSecretChanger::new(sh(&script));
        changer
            .change_secret("alpha.maFile", "old-pw", "new-pw")
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&args_file).unwrap(), "alpha.maFile");
        let request: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&stdin_file).unwrap()).unwrap();
        assert_eq!(request["old_secret"], "old-pw");
        assert_eq!(request["new_secret"], "new-pw");
    }

    #[tokio::test]
    async fn failing_helper_reports_stderr() {
        let changer = CommandSecretChanger::new(sh("echo 'captcha required' >&2; exit 3"));
        match changer.change_secret("alpha.maFile", "a", "b").await {
            Err(GatewayError::Rejected(reason)) => assert_eq!(reason, "captcha required"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_failure_names_exit_status() {
        let changer = CommandSecretChanger::new(sh("exit 1"));
        match changer.change_secret("alpha.maFile", "a", "b").await {
            Err(GatewayError::Rejected(reason)) => assert!(reason.contains("exit")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let changer = CommandSecretChanger::new(Vec::new());
        assert!(matches!(
            changer.change_secret("alpha.maFile", "a", "b").await,
            Err(GatewayError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let changer = CommandSecretChanger::new(vec!["/nonexistent/lessor-helper".into()]);
        assert!(matches!(
            changer.change_secret("alpha.maFile", "a", "b").await,
            Err(GatewayError::Io(_))
        ));
    }
}
