//! Bearer credential sources injected into the HTTP repository.

use crate::config::Config;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no API token configured; run `sessionrec auth` first")]
    Missing,
    #[error("token command failed: {0}")]
    Command(String),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, CredentialError>;
}

#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, CredentialError> {
        let token = self.0.trim();
        if token.is_empty() {
            return Err(CredentialError::Missing);
        }
        Ok(token.to_string())
    }
}

/// Runs a shell command (e.g. `pass show portal/token`) on every request so a
/// rotated token is picked up without restarting.
#[derive(Clone)]
pub struct CommandToken {
    cmd: String,
}

impl CommandToken {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

#[async_trait]
impl CredentialProvider for CommandToken {
    async fn bearer_token(&self) -> Result<String, CredentialError> {
        let output = tokio::process::Command::new("sh")
            .arg("-lc")
            .arg(&self.cmd)
            .output()
            .await
            .map_err(|e| CredentialError::Command(e.to_string()))?;
        if !output.status.success() {
            return Err(CredentialError::Command(format!(
                "exit status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let s = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if s.is_empty() {
            Err(CredentialError::Missing)
        } else {
            Ok(s)
        }
    }
}

/// Credential source chosen from config: an inline token wins over a command.
pub fn from_config(cfg: &Config) -> Box<dyn CredentialProvider> {
    if let Some(t) = cfg.api.token.as_ref() {
        if !t.trim().is_empty() {
            return Box::new(StaticToken::new(t.clone()));
        }
    }
    match cfg.api.token_cmd.as_ref() {
        Some(cmd) if !cmd.trim().is_empty() => Box::new(CommandToken::new(cmd.clone())),
        _ => Box::new(StaticToken::new(String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_static_token_is_missing() {
        let err = StaticToken::new("   ").bearer_token().await.unwrap_err();
        assert!(matches!(err, CredentialError::Missing));
    }

    #[tokio::test]
    async fn inline_token_wins_over_command() {
        let mut cfg = Config::default();
        cfg.api.token = Some("abc".into());
        cfg.api.token_cmd = Some("exit 1".into());
        let token = from_config(&cfg).bearer_token().await.unwrap();
        assert_eq!(token, "abc");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_token_trims_stdout() {
        let provider = CommandToken::new("printf '  tok-123\\n'");
        assert_eq!(provider.bearer_token().await.unwrap(), "tok-123");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_error() {
        let provider = CommandToken::new("exit 3");
        let err = provider.bearer_token().await.unwrap_err();
        assert!(matches!(err, CredentialError::Command(_)));
    }
}
