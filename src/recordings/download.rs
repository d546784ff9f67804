use crate::error::ErrorKind;
use crate::fsutil::{atomic_rename, recording_file_name, unique_destination};
use crate::progress::download_bar;
use crate::recordings::api::{RecordingRepository, RepositoryError, DOWNLOAD_FALLBACK};
use crate::recordings::models::{DownloadDescriptor, RecordingId};
use crate::state::Failure;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use indicatif::ProgressBar;
use reqwest::Client;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("could not retrieve recording: {0}")]
    Retrieval(String),
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::Repository(e) => e.kind(),
            DownloadError::Retrieval(_) => ErrorKind::Transport,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            DownloadError::Repository(e) => e.user_message().to_string(),
            DownloadError::Retrieval(detail) => format!("{DOWNLOAD_FALLBACK}: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieved {
    /// Handed to the host; completion is never confirmed.
    Opened,
    Saved(PathBuf),
}

/// The host's native way of fetching a URL.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, descriptor: &DownloadDescriptor) -> Result<Retrieved, DownloadError>;
}

/// Opens the signed URL with the desktop's default handler.
pub struct SystemOpener;

impl SystemOpener {
    fn command(url: &str) -> Result<tokio::process::Command, DownloadError> {
        #[cfg(target_os = "windows")]
        {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.args(["/C", "start", ""]).arg(url);
            return Ok(cmd);
        }
        #[cfg(not(target_os = "windows"))]
        {
            let opener = ["xdg-open", "open"]
                .iter()
                .find_map(|name| which::which(name).ok())
                .ok_or_else(|| DownloadError::Retrieval("no URL opener (xdg-open/open) found".into()))?;
            let mut cmd = tokio::process::Command::new(opener);
            cmd.arg(url);
            Ok(cmd)
        }
    }
}

#[async_trait]
impl Retriever for SystemOpener {
    async fn retrieve(&self, descriptor: &DownloadDescriptor) -> Result<Retrieved, DownloadError> {
        let mut cmd = Self::command(&descriptor.download_url)?;
        cmd.stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        cmd.spawn()
            .map_err(|e| DownloadError::Retrieval(format!("spawn opener: {e}")))?;
        info!(recording_id = descriptor.recording_id, "download URL handed to system opener");
        Ok(Retrieved::Opened)
    }
}

/// Streams the signed URL into a directory, writing `.part` then renaming.
pub struct FileSaver {
    client: Client,
    dir: PathBuf,
}

impl FileSaver {
    pub fn new(client: Client, dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            dir: dir.into(),
        }
    }
}

#[async_trait]
impl Retriever for FileSaver {
    async fn retrieve(&self, descriptor: &DownloadDescriptor) -> Result<Retrieved, DownloadError> {
        let io_err = |e: std::io::Error| DownloadError::Retrieval(e.to_string());

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let name = recording_file_name(&descriptor.download_url, descriptor.recording_id);
        let dest = unique_destination(&self.dir, &name).await.map_err(io_err)?;
        let part = dest.with_extension("part");

        // The signed URL carries its own authorization.
        let resp = self
            .client
            .get(&descriptor.download_url)
            .send()
            .await
            .map_err(|e| DownloadError::Retrieval(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(DownloadError::Retrieval(format!(
                "GET returned status {}",
                resp.status().as_u16()
            )));
        }

        let len = resp
            .content_length()
            .or((descriptor.size > 0).then_some(descriptor.size));
        let pb = download_bar(len, &name);
        save_stream(resp.bytes_stream(), &part, &dest, &pb).await?;

        info!(recording_id = descriptor.recording_id, path = %dest.display(), "recording saved");
        Ok(Retrieved::Saved(dest))
    }
}

/// Write `stream` to `part`, then move it to `dest`. On any failure the part
/// file is removed and the bar abandoned.
async fn save_stream<S, B, E>(
    stream: S,
    part: &Path,
    dest: &Path,
    pb: &ProgressBar,
) -> Result<(), DownloadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    match write_part(stream, part, dest, pb).await {
        Ok(()) => {
            pb.finish_and_clear();
            Ok(())
        }
        Err(e) => {
            pb.abandon();
            if let Err(rm) = tokio::fs::remove_file(part).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %part.display(), error = %rm, "could not remove partial download");
                }
            }
            Err(e)
        }
    }
}

async fn write_part<S, B, E>(
    stream: S,
    part: &Path,
    dest: &Path,
    pb: &ProgressBar,
) -> Result<(), DownloadError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let io_err = |e: std::io::Error| DownloadError::Retrieval(e.to_string());
    let mut stream = std::pin::pin!(stream);
    let mut file = tokio::fs::File::create(part).await.map_err(io_err)?;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| DownloadError::Retrieval(e.to_string()))?;
        let bytes = bytes.as_ref();
        file.write_all(bytes).await.map_err(io_err)?;
        pb.inc(bytes.len() as u64);
    }
    file.flush().await.map_err(io_err)?;
    drop(file);
    atomic_rename(part, dest).await.map_err(io_err)
}

/// Single-flight download action. Each call requests a fresh descriptor;
/// overlapping calls for the same id are the caller's to prevent.
pub struct DownloadController<'a, R: ?Sized, T: ?Sized> {
    repo: &'a R,
    retriever: &'a T,
    in_progress: bool,
    error: Option<Failure>,
}

impl<'a, R, T> DownloadController<'a, R, T>
where
    R: RecordingRepository + ?Sized,
    T: Retriever + ?Sized,
{
    pub fn new(repo: &'a R, retriever: &'a T) -> Self {
        Self {
            repo,
            retriever,
            in_progress: false,
            error: None,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn error(&self) -> Option<&Failure> {
        self.error.as_ref()
    }

    pub async fn download(&mut self, recording_id: RecordingId) -> Result<Retrieved, DownloadError> {
        self.in_progress = true;
        self.error = None;

        let result = self.fetch_and_retrieve(recording_id).await;

        self.in_progress = false;
        if let Err(e) = &result {
            warn!(recording_id, error = %e, "recording download failed");
            self.error = Some(Failure {
                kind: e.kind(),
                message: e.user_message(),
            });
        }
        result
    }

    async fn fetch_and_retrieve(&self, recording_id: RecordingId) -> Result<Retrieved, DownloadError> {
        let descriptor = self.repo.fetch_download_descriptor(recording_id).await?;
        if descriptor.download_url.trim().is_empty() {
            return Err(DownloadError::Retrieval(
                "server returned an empty download URL".into(),
            ));
        }
        if !descriptor.note.is_empty() {
            info!(recording_id, note = %descriptor.note, "download descriptor issued");
        }
        self.retriever.retrieve(&descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recordings::api::fake::FakeRepository;
    use crate::recordings::models::fixtures::descriptor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRetriever {
        opened: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Retriever for RecordingRetriever {
        async fn retrieve(&self, d: &DownloadDescriptor) -> Result<Retrieved, DownloadError> {
            if self.fail {
                return Err(DownloadError::Retrieval("opener crashed".into()));
            }
            self.opened.lock().unwrap().push(d.download_url.clone());
            Ok(Retrieved::Opened)
        }
    }

    #[tokio::test]
    async fn success_opens_url_and_clears_flag() {
        let repo = FakeRepository::default()
            .with_descriptor(3, Ok(descriptor(3, "https://signed.example/3")));
        let retriever = RecordingRetriever::default();
        let mut dc = DownloadController::new(&repo, &retriever);

        let out = dc.download(3).await.unwrap();
        assert_eq!(out, Retrieved::Opened);
        assert!(!dc.in_progress());
        assert!(dc.error().is_none());
        assert_eq!(*retriever.opened.lock().unwrap(), vec!["https://signed.example/3"]);
    }

    #[tokio::test]
    async fn not_found_is_reported_as_not_found() {
        let repo = FakeRepository::default().with_descriptor(
            3,
            Err(RepositoryError::NotFound("Recording not found".into())),
        );
        let retriever = RecordingRetriever::default();
        let mut dc = DownloadController::new(&repo, &retriever);

        let err = dc.download(3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!dc.in_progress());
        let failure = dc.error().unwrap();
        assert_eq!(failure.kind, ErrorKind::NotFound);
        assert_eq!(failure.message, "Recording not found");
        assert!(retriever.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retrieval_failure_is_resignalled() {
        let repo = FakeRepository::default()
            .with_descriptor(3, Ok(descriptor(3, "https://signed.example/3")));
        let retriever = RecordingRetriever {
            fail: true,
            ..Default::default()
        };
        let mut dc = DownloadController::new(&repo, &retriever);
        let err = dc.download(3).await.unwrap_err();
        assert!(matches!(err, DownloadError::Retrieval(_)));
        assert!(!dc.in_progress());
        assert!(dc.error().unwrap().message.starts_with(DOWNLOAD_FALLBACK));
    }

    #[tokio::test]
    async fn every_download_requests_a_fresh_descriptor() {
        let repo = FakeRepository::default()
            .with_descriptor(3, Ok(descriptor(3, "https://signed.example/3")));
        let retriever = RecordingRetriever::default();
        let mut dc = DownloadController::new(&repo, &retriever);
        dc.download(3).await.unwrap();
        dc.download(3).await.unwrap();
        assert_eq!(repo.descriptor_calls(), 2);
    }

    #[tokio::test]
    async fn success_after_failure_clears_error() {
        let repo = FakeRepository::default()
            .with_descriptor(4, Ok(descriptor(4, "https://signed.example/4")));
        let retriever = RecordingRetriever::default();
        let mut dc = DownloadController::new(&repo, &retriever);
        assert!(dc.download(99).await.is_err());
        assert!(dc.error().is_some());
        dc.download(4).await.unwrap();
        assert!(dc.error().is_none());
    }

    #[tokio::test]
    async fn empty_url_is_not_opened() {
        let repo = FakeRepository::default().with_descriptor(5, Ok(descriptor(5, " ")));
        let retriever = RecordingRetriever::default();
        let mut dc = DownloadController::new(&repo, &retriever);
        assert!(dc.download(5).await.is_err());
        assert!(retriever.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_rename_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the destination directory should be.
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"x").await.unwrap();
        let part = dir.path().join("out.part");
        let dest = blocker.join("out.mp4");

        let chunks = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(b"video".to_vec()),
            Ok(b"-bytes".to_vec()),
        ]);
        let err = save_stream(chunks, &part, &dest, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Retrieval(_)));
        assert!(!part.exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn broken_stream_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("out.part");
        let dest = dir.path().join("out.mp4");

        let chunks = futures_util::stream::iter(vec![
            Ok(b"video".to_vec()),
            Err(std::io::Error::other("connection reset")),
        ]);
        let err = save_stream(chunks, &part, &dest, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(!part.exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn complete_stream_lands_at_destination() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("out.part");
        let dest = dir.path().join("sub").join("out.mp4");

        let chunks = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(b"abc".to_vec())]);
        save_stream(chunks, &part, &dest, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"abc");
        assert!(!part.exists());
    }
}
