use crate::config::ConfigError;
use crate::probe::ProbeError;
use crate::recordings::api::RepositoryError;
use crate::recordings::download::DownloadError;
use crate::state::Failure;
use std::fmt;
use thiserror::Error;

/// Failure classes every boundary reports. Callers branch on these, never on
/// message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Resource absent; render an empty state, do not retry.
    NotFound,
    /// Credential invalid or expired; re-authenticate outside this crate.
    Unauthorized,
    /// Network or server failure; the caller may offer a retry.
    Transport,
    /// Media could not be loaded or decoded; terminal for that source.
    PlaybackFailed,
    /// Resolution was attempted and errored.
    ResolutionFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Transport => "transport",
            ErrorKind::PlaybackFailed => "playback failed",
            ErrorKind::ResolutionFailed => "resolution failed",
        };
        f.write_str(s)
    }
}

/// Top-level error for CLI commands.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    /// A load that ended in an explicit failed or absent state.
    #[error("{}", .0.message)]
    Failed(Failure),
    #[error("{message}")]
    Playback { message: String },
    #[error("{message}")]
    Resolution { message: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        let kind = match self {
            AppError::Config(_) => return 10,
            AppError::Json(_) | AppError::Io(_) => return 1,
            AppError::Repository(e) => e.kind(),
            AppError::Download(e) => e.kind(),
            AppError::Failed(f) => f.kind,
            AppError::Probe(_) | AppError::Playback { .. } => ErrorKind::PlaybackFailed,
            AppError::Resolution { .. } => ErrorKind::ResolutionFailed,
        };
        match kind {
            ErrorKind::Unauthorized => 11,
            ErrorKind::Transport => 12,
            ErrorKind::NotFound => 13,
            ErrorKind::PlaybackFailed | ErrorKind::ResolutionFailed => 14,
        }
    }
}
