use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe binary not found at {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("ffprobe exited with status {code:?}: {message}")]
    Process { code: Option<i32>, message: String },
    #[error("unreadable media metadata: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaMetadata {
    pub duration_secs: f64,
}

/// Acquires metadata for a media URL before playback can start.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, ProbeError>;
}

pub struct FfprobeProbe {
    path: String,
}

impl FfprobeProbe {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Run `ffprobe -version` to ensure the binary is callable.
pub async fn ensure_ffprobe_available(path: &str) -> Result<(), ProbeError> {
    let mut cmd = Command::new(path);
    cmd.arg("-version");
    match cmd.output().await {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => Err(ProbeError::Process {
            code: output.status.code(),
            message: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ProbeError::NotFound(path.to_string()))
        }
        Err(e) => Err(ProbeError::Io(e)),
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, url: &str) -> Result<MediaMetadata, ProbeError> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("-v")
            .arg("error")
            .arg("-hide_banner")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(url);

        match cmd.output().await {
            Ok(output) if output.status.success() => {
                parse_duration(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => Err(ProbeError::Process {
                code: output.status.code(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ProbeError::NotFound(self.path.clone()))
            }
            Err(e) => Err(ProbeError::Io(e)),
        }
    }
}

fn parse_duration(stdout: &str) -> Result<MediaMetadata, ProbeError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ProbeError::Parse("empty ffprobe output".into()))?;
    let duration_secs: f64 = line
        .parse()
        .map_err(|_| ProbeError::Parse(format!("duration {line:?}")))?;
    if !duration_secs.is_finite() || duration_secs < 0.0 {
        return Err(ProbeError::Parse(format!("duration {line:?}")));
    }
    Ok(MediaMetadata { duration_secs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_duration() {
        let meta = parse_duration("3000.480000\n").unwrap();
        assert!((meta.duration_secs - 3000.48).abs() < 1e-9);
    }

    #[test]
    fn rejects_na_and_empty() {
        assert!(matches!(parse_duration("N/A\n"), Err(ProbeError::Parse(_))));
        assert!(matches!(parse_duration("\n\n"), Err(ProbeError::Parse(_))));
        assert!(matches!(parse_duration("-1"), Err(ProbeError::Parse(_))));
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let probe = FfprobeProbe::new("/nonexistent/ffprobe-sessionrec");
        let err = probe.probe("https://host/a.mp4").await.unwrap_err();
        assert!(matches!(err, ProbeError::NotFound(_)));
        assert!(matches!(
            ensure_ffprobe_available("/nonexistent/ffprobe-sessionrec").await,
            Err(ProbeError::NotFound(_))
        ));
    }
}
