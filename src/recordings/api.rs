use crate::auth::{self, CredentialProvider};
use crate::config::{Config, ConfigError};
use crate::error::ErrorKind;
use crate::http::{build_http_client, classify_status};
use crate::recordings::models::{
    AppointmentId, DownloadDescriptor, Page, RecordingId, RecordingRecord,
};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub(crate) const RECORDING_FALLBACK: &str = "Failed to load recording";
pub(crate) const RECORDING_NOT_FOUND: &str = "No recording found for this appointment";
pub(crate) const LIST_FALLBACK: &str = "Failed to load recordings";
pub(crate) const DOWNLOAD_FALLBACK: &str = "Failed to download recording";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized ({}): {message}", status_label(.status, "no credential"))]
    Unauthorized { status: Option<u16>, message: String },
    #[error("transport error ({}): {message}", status_label(.status, "network"))]
    Transport { status: Option<u16>, message: String },
}

fn status_label(status: &Option<u16>, otherwise: &str) -> String {
    status
        .map(|s| format!("status {s}"))
        .unwrap_or_else(|| otherwise.to_string())
}

impl RepositoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound(_) => ErrorKind::NotFound,
            RepositoryError::Unauthorized { .. } => ErrorKind::Unauthorized,
            RepositoryError::Transport { .. } => ErrorKind::Transport,
        }
    }

    /// Text suitable for showing to the user as-is.
    pub fn user_message(&self) -> &str {
        match self {
            RepositoryError::NotFound(message)
            | RepositoryError::Unauthorized { message, .. }
            | RepositoryError::Transport { message, .. } => message,
        }
    }

    fn transport(err: reqwest::Error) -> Self {
        RepositoryError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// REST access to recording resources. Implementations never retry; callers
/// decide what a failure means.
#[async_trait]
pub trait RecordingRepository: Send + Sync {
    async fn fetch_by_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<RecordingRecord, RepositoryError>;

    async fn list(&self, page: u32, page_size: u32) -> Result<Page, RepositoryError>;

    async fn fetch_download_descriptor(
        &self,
        recording_id: RecordingId,
    ) -> Result<DownloadDescriptor, RepositoryError>;
}

pub struct HttpRecordingRepository {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpRecordingRepository {
    pub fn new(
        client: Client,
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, url::ParseError> {
        // Relative joins drop the last path segment unless it ends in '/'.
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
            credentials,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let client = build_http_client(cfg)
            .map_err(|e| ConfigError::Invalid(format!("http client: {e}")))?;
        let credentials: Arc<dyn CredentialProvider> = Arc::from(auth::from_config(cfg));
        Self::new(client, &cfg.api.base_url, credentials)
            .map_err(|e| ConfigError::Invalid(format!("api.base_url: {e}")))
    }

    fn endpoint(&self, path: &str) -> Result<Url, RepositoryError> {
        self.base_url
            .join(path)
            .map_err(|e| RepositoryError::Transport {
                status: None,
                message: format!("invalid endpoint {path}: {e}"),
            })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        fallback: &str,
    ) -> Result<T, RepositoryError> {
        let token = self.credentials.bearer_token().await.map_err(|e| {
            RepositoryError::Unauthorized {
                status: None,
                message: e.to_string(),
            }
        })?;

        debug!(method = "GET", url = %url, "recordings request");
        let resp = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(RepositoryError::transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(RepositoryError::transport)?;

        if !status.is_success() {
            let snippet = text.chars().take(500).collect::<String>();
            warn!(status = %status.as_u16(), url = %url, body = %snippet, "recordings non-success response");
            return Err(classify_status(status, &text, fallback));
        }

        serde_json::from_str(&text).map_err(|e| {
            let snippet = text.chars().take(500).collect::<String>();
            warn!(error = %e, url = %url, body = %snippet, "recordings decode failure");
            RepositoryError::Transport {
                status: Some(status.as_u16()),
                message: format!("unexpected response body: {e}"),
            }
        })
    }
}

#[async_trait]
impl RecordingRepository for HttpRecordingRepository {
    async fn fetch_by_appointment(
        &self,
        appointment_id: AppointmentId,
    ) -> Result<RecordingRecord, RepositoryError> {
        let url = self.endpoint(&format!("appointments/{appointment_id}/recording/"))?;
        match self.get_json(url, RECORDING_FALLBACK).await {
            // The backend's 404 body is generic; say what was missing.
            Err(RepositoryError::NotFound(_)) => {
                Err(RepositoryError::NotFound(RECORDING_NOT_FOUND.to_string()))
            }
            other => other,
        }
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<Page, RepositoryError> {
        let mut url = self.endpoint("appointments/recordings/")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &page_size.to_string());
        self.get_json(url, LIST_FALLBACK).await
    }

    async fn fetch_download_descriptor(
        &self,
        recording_id: RecordingId,
    ) -> Result<DownloadDescriptor, RepositoryError> {
        let url = self.endpoint(&format!("appointments/recordings/{recording_id}/download/"))?;
        self.get_json(url, DOWNLOAD_FALLBACK).await
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory repository with per-endpoint call counters.
    #[derive(Default)]
    pub struct FakeRepository {
        pub records: Mutex<HashMap<AppointmentId, Result<RecordingRecord, RepositoryError>>>,
        pub pages: Mutex<HashMap<u32, Result<Page, RepositoryError>>>,
        pub descriptors: Mutex<HashMap<RecordingId, Result<DownloadDescriptor, RepositoryError>>>,
        pub record_calls: AtomicUsize,
        pub list_calls: AtomicUsize,
        pub descriptor_calls: AtomicUsize,
        pub last_page_request: Mutex<Option<(u32, u32)>>,
    }

    impl FakeRepository {
        pub fn with_record(self, appointment_id: AppointmentId, rec: RecordingRecord) -> Self {
            self.records.lock().unwrap().insert(appointment_id, Ok(rec));
            self
        }

        pub fn with_record_error(self, appointment_id: AppointmentId, err: RepositoryError) -> Self {
            self.records.lock().unwrap().insert(appointment_id, Err(err));
            self
        }

        pub fn with_page(self, page: u32, result: Result<Page, RepositoryError>) -> Self {
            self.pages.lock().unwrap().insert(page, result);
            self
        }

        pub fn with_descriptor(
            self,
            recording_id: RecordingId,
            result: Result<DownloadDescriptor, RepositoryError>,
        ) -> Self {
            self.descriptors.lock().unwrap().insert(recording_id, result);
            self
        }

        pub fn descriptor_calls(&self) -> usize {
            self.descriptor_calls.load(Ordering::SeqCst)
        }

        pub fn record_calls(&self) -> usize {
            self.record_calls.load(Ordering::SeqCst)
        }

        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RecordingRepository for FakeRepository {
        async fn fetch_by_appointment(
            &self,
            appointment_id: AppointmentId,
        ) -> Result<RecordingRecord, RepositoryError> {
            self.record_calls.fetch_add(1, Ordering::SeqCst);
            self.records
                .lock()
                .unwrap()
                .get(&appointment_id)
                .cloned()
                .unwrap_or_else(|| Err(RepositoryError::NotFound(RECORDING_NOT_FOUND.into())))
        }

        async fn list(&self, page: u32, page_size: u32) -> Result<Page, RepositoryError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_page_request.lock().unwrap() = Some((page, page_size));
            self.pages
                .lock()
                .unwrap()
                .get(&page)
                .cloned()
                .unwrap_or_else(|| Err(RepositoryError::NotFound("Invalid page.".into())))
        }

        async fn fetch_download_descriptor(
            &self,
            recording_id: RecordingId,
        ) -> Result<DownloadDescriptor, RepositoryError> {
            self.descriptor_calls.fetch_add(1, Ordering::SeqCst);
            self.descriptors
                .lock()
                .unwrap()
                .get(&recording_id)
                .cloned()
                .unwrap_or_else(|| Err(RepositoryError::NotFound("Recording not found".into())))
        }
    }
}
