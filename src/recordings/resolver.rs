//! Picks the one URL a player should load for a recording.
//!
//! Candidates are tried in a fixed order and the first usable one wins:
//! external storage location, then the provider media URI, then (completed
//! recordings only) a signed download URL fetched on demand.

use crate::error::ErrorKind;
use crate::recordings::api::RecordingRepository;
use crate::recordings::models::{RecordingId, RecordingRecord, RecordingStatus};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate<'a> {
    External(&'a str),
    Direct(&'a str),
    /// Ask the download endpoint for a signed URL.
    Deferred(RecordingId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceOrigin {
    ExternalLocation,
    MediaUri,
    SignedDownload,
}

impl fmt::Display for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceOrigin::ExternalLocation => "external storage",
            SourceOrigin::MediaUri => "provider media URI",
            SourceOrigin::SignedDownload => "signed download URL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    pub url: String,
    pub origin: SourceOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    /// Nothing to resolve yet; worth checking again later.
    NoSourcePresent { status: RecordingStatus },
    /// The signed-URL lookup was attempted and did not produce a URL.
    ResolutionFailed {
        cause: Option<ErrorKind>,
        message: String,
    },
}

impl Unavailable {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Unavailable::NoSourcePresent { .. } => None,
            Unavailable::ResolutionFailed { .. } => Some(ErrorKind::ResolutionFailed),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Unavailable::NoSourcePresent {
                status: RecordingStatus::Failed,
            } => "The recording failed; no video is available.".to_string(),
            Unavailable::NoSourcePresent { .. } => {
                "The recording is still being processed. Check back later.".to_string()
            }
            Unavailable::ResolutionFailed { message, .. } => {
                format!("Could not get a playable video: {message}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Source(VideoSource),
    Unavailable(Unavailable),
}

impl Resolution {
    pub fn source(&self) -> Option<&VideoSource> {
        match self {
            Resolution::Source(s) => Some(s),
            Resolution::Unavailable(_) => None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Ordered candidate list for `record`. Empty means nothing can be resolved.
pub fn candidates(record: &RecordingRecord) -> Vec<Candidate<'_>> {
    let mut out = Vec::with_capacity(3);
    if let Some(location) = non_empty(&record.media_external_location) {
        out.push(Candidate::External(location));
    }
    if let Some(uri) = non_empty(&record.media_uri) {
        out.push(Candidate::Direct(uri));
    }
    if record.is_completed() {
        out.push(Candidate::Deferred(record.id));
    }
    out
}

pub struct VideoSourceResolver<'a, R: RecordingRepository + ?Sized> {
    repo: &'a R,
}

impl<'a, R: RecordingRepository + ?Sized> VideoSourceResolver<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self { repo }
    }

    /// Resolve `record` to a single source. At most one network call, and
    /// only when neither direct field is usable.
    pub async fn resolve(&self, record: &RecordingRecord) -> Resolution {
        let mut failure = None;
        for candidate in candidates(record) {
            let attempt = match candidate {
                Candidate::External(url) => Ok(VideoSource {
                    url: url.to_string(),
                    origin: SourceOrigin::ExternalLocation,
                }),
                Candidate::Direct(url) => Ok(VideoSource {
                    url: url.to_string(),
                    origin: SourceOrigin::MediaUri,
                }),
                Candidate::Deferred(recording_id) => self.resolve_deferred(recording_id).await,
            };
            match attempt {
                Ok(source) => {
                    debug!(recording_id = record.id, origin = %source.origin, "video source resolved");
                    return Resolution::Source(source);
                }
                Err(unavailable) => failure = Some(unavailable),
            }
        }

        let unavailable = failure.unwrap_or(Unavailable::NoSourcePresent {
            status: record.status,
        });
        debug!(recording_id = record.id, status = %record.status, reason = ?unavailable, "no playable source");
        Resolution::Unavailable(unavailable)
    }

    async fn resolve_deferred(&self, recording_id: RecordingId) -> Result<VideoSource, Unavailable> {
        debug!(recording_id, "falling back to signed download URL");
        match self.repo.fetch_download_descriptor(recording_id).await {
            Ok(descriptor) if !descriptor.download_url.trim().is_empty() => Ok(VideoSource {
                url: descriptor.download_url,
                origin: SourceOrigin::SignedDownload,
            }),
            Ok(_) => {
                warn!(recording_id, "download descriptor carried an empty URL");
                Err(Unavailable::ResolutionFailed {
                    cause: None,
                    message: "the server returned an empty download URL".to_string(),
                })
            }
            Err(e) => {
                warn!(recording_id, error = %e, "signed URL lookup failed");
                Err(Unavailable::ResolutionFailed {
                    cause: Some(e.kind()),
                    message: e.user_message().to_string(),
                })
            }
        }
    }
}
