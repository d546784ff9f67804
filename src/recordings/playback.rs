//! Transport and seek state machine for one video source at a time.
//!
//! `transition` is pure: it maps a snapshot and an event to the next snapshot
//! plus the side effects the host player must perform. `PlaybackController`
//! owns a snapshot and drives metadata acquisition through a [`MediaProbe`].

use crate::probe::{MediaProbe, ProbeError};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Errored,
}

impl PlaybackState {
    fn accepts_transport(self) -> bool {
        matches!(
            self,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Errored => "errored",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFailureKind {
    /// The media could not be fetched; often an expired or missing credential.
    Load,
    Decode,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFailure {
    pub kind: MediaFailureKind,
    pub detail: String,
}

impl MediaFailure {
    pub fn new(kind: MediaFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<&ProbeError> for MediaFailure {
    fn from(err: &ProbeError) -> Self {
        let kind = match err {
            ProbeError::Process { .. } => MediaFailureKind::Load,
            ProbeError::Parse(_) => MediaFailureKind::Decode,
            ProbeError::NotFound(_) | ProbeError::Io(_) => MediaFailureKind::Other,
        };
        MediaFailure::new(kind, err.to_string())
    }
}

/// What the user sees when a source fails. Always terminal for the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackError {
    pub kind: MediaFailureKind,
    pub message: String,
}

impl PlaybackError {
    fn from_failure(failure: &MediaFailure) -> Self {
        let message = match failure.kind {
            MediaFailureKind::Load => "Failed to load video. The recording may not be available or requires authentication.".to_string(),
            MediaFailureKind::Decode => "The video could not be decoded.".to_string(),
            MediaFailureKind::Other => format!("Video playback error: {}", failure.detail),
        };
        Self {
            kind: failure.kind,
            message,
        }
    }

    pub fn may_require_authentication(&self) -> bool {
        self.kind == MediaFailureKind::Load
    }

    pub fn hint(&self) -> &'static str {
        "Try downloading the recording instead."
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Point the player at a new source. Accepted in every state.
    Assign(String),
    Unload,
    MetadataLoaded { generation: u64, duration: f64 },
    MetadataFailed { generation: u64, failure: MediaFailure },
    Play,
    Pause,
    /// Native position report, in seconds.
    Progress { position: f64 },
    Ended,
    BeginSeek,
    SeekInput { position: f64 },
    EndSeek,
    MediaError(MediaFailure),
}

impl PlaybackEvent {
    fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::Assign(_) => "assign",
            PlaybackEvent::Unload => "unload",
            PlaybackEvent::MetadataLoaded { .. } => "metadata-loaded",
            PlaybackEvent::MetadataFailed { .. } => "metadata-failed",
            PlaybackEvent::Play => "play",
            PlaybackEvent::Pause => "pause",
            PlaybackEvent::Progress { .. } => "progress",
            PlaybackEvent::Ended => "ended",
            PlaybackEvent::BeginSeek => "begin-seek",
            PlaybackEvent::SeekInput { .. } => "seek-input",
            PlaybackEvent::EndSeek => "end-seek",
            PlaybackEvent::MediaError(_) => "media-error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    LoadMetadata { generation: u64, url: String },
    StartPlayback,
    PausePlayback,
    SeekTo(f64),
    ReportError(PlaybackError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {event} while {state}")]
    Illegal {
        state: PlaybackState,
        event: &'static str,
    },
    #[error("no video URL available")]
    EmptySource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: PlaybackState,
    pub source: Option<String>,
    /// Bumped on every assignment; metadata for older generations is dropped.
    pub generation: u64,
    pub duration: Option<f64>,
    /// Displayed position in seconds. While seeking this is the seek input.
    pub position: f64,
    pub seeking: bool,
    pub error: Option<PlaybackError>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Idle,
            source: None,
            generation: 0,
            duration: None,
            position: 0.0,
            seeking: false,
            error: None,
        }
    }
}

impl Snapshot {
    fn clamp(&self, position: f64) -> f64 {
        let upper = self.duration.unwrap_or(0.0);
        if position.is_nan() {
            return self.position;
        }
        position.clamp(0.0, upper)
    }

    fn errored(&self, failure: &MediaFailure) -> (Snapshot, Vec<Effect>) {
        let error = PlaybackError::from_failure(failure);
        let next = Snapshot {
            state: PlaybackState::Errored,
            seeking: false,
            error: Some(error.clone()),
            ..self.clone()
        };
        (next, vec![Effect::ReportError(error)])
    }
}

pub type Step = Result<(Snapshot, Vec<Effect>), TransitionError>;

/// Compute the next snapshot for `event`. Illegal commands are rejected;
/// stale or suppressed native callbacks leave the snapshot unchanged.
pub fn transition(snap: &Snapshot, event: PlaybackEvent) -> Step {
    use PlaybackState::*;

    let name = event.name();
    let unchanged = || -> Step { Ok((snap.clone(), Vec::new())) };
    let illegal = || -> Step {
        Err(TransitionError::Illegal {
            state: snap.state,
            event: name,
        })
    };

    match event {
        PlaybackEvent::Assign(url) => {
            let url = url.trim().to_string();
            if url.is_empty() {
                return Err(TransitionError::EmptySource);
            }
            let generation = snap.generation + 1;
            let next = Snapshot {
                state: Loading,
                source: Some(url.clone()),
                generation,
                ..Snapshot::default()
            };
            Ok((next, vec![Effect::LoadMetadata { generation, url }]))
        }
        PlaybackEvent::Unload => Ok((
            Snapshot {
                generation: snap.generation + 1,
                ..Snapshot::default()
            },
            Vec::new(),
        )),
        PlaybackEvent::MetadataLoaded {
            generation,
            duration,
        } => {
            if generation != snap.generation || snap.state != Loading {
                return unchanged();
            }
            if !duration.is_finite() || duration < 0.0 {
                return Ok(snap.errored(&MediaFailure::new(
                    MediaFailureKind::Decode,
                    format!("invalid duration {duration}"),
                )));
            }
            Ok((
                Snapshot {
                    state: Ready,
                    duration: Some(duration),
                    position: 0.0,
                    ..snap.clone()
                },
                Vec::new(),
            ))
        }
        PlaybackEvent::MetadataFailed {
            generation,
            failure,
        } => {
            if generation != snap.generation || snap.state != Loading {
                return unchanged();
            }
            Ok(snap.errored(&failure))
        }
        PlaybackEvent::Play => match snap.state {
            Ready | Paused => Ok((
                Snapshot {
                    state: Playing,
                    ..snap.clone()
                },
                vec![Effect::StartPlayback],
            )),
            Playing => unchanged(),
            _ => illegal(),
        },
        PlaybackEvent::Pause => match snap.state {
            Playing => Ok((
                Snapshot {
                    state: Paused,
                    ..snap.clone()
                },
                vec![Effect::PausePlayback],
            )),
            Paused => unchanged(),
            _ => illegal(),
        },
        PlaybackEvent::Progress { position } => {
            if snap.seeking || !snap.state.accepts_transport() {
                return unchanged();
            }
            Ok((
                Snapshot {
                    position: snap.clamp(position),
                    ..snap.clone()
                },
                Vec::new(),
            ))
        }
        PlaybackEvent::Ended => {
            if snap.state != Playing {
                return unchanged();
            }
            Ok((
                Snapshot {
                    state: Paused,
                    position: snap.duration.unwrap_or(snap.position),
                    ..snap.clone()
                },
                Vec::new(),
            ))
        }
        PlaybackEvent::BeginSeek => {
            if !snap.state.accepts_transport() {
                return illegal();
            }
            Ok((
                Snapshot {
                    seeking: true,
                    ..snap.clone()
                },
                Vec::new(),
            ))
        }
        PlaybackEvent::SeekInput { position } => {
            if !snap.seeking || !snap.state.accepts_transport() {
                return illegal();
            }
            Ok((
                Snapshot {
                    position: snap.clamp(position),
                    ..snap.clone()
                },
                Vec::new(),
            ))
        }
        PlaybackEvent::EndSeek => {
            if !snap.seeking || !snap.state.accepts_transport() {
                return illegal();
            }
            Ok((
                Snapshot {
                    seeking: false,
                    ..snap.clone()
                },
                vec![Effect::SeekTo(snap.position)],
            ))
        }
        PlaybackEvent::MediaError(failure) => match snap.state {
            Loading | Ready | Playing | Paused => Ok(snap.errored(&failure)),
            Idle | Errored => unchanged(),
        },
    }
}

/// Ticket for one metadata acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub generation: u64,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct PlaybackController {
    snap: Snapshot,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snap
    }

    pub fn state(&self) -> PlaybackState {
        self.snap.state
    }

    pub fn position(&self) -> f64 {
        self.snap.position
    }

    pub fn duration(&self) -> Option<f64> {
        self.snap.duration
    }

    pub fn error(&self) -> Option<&PlaybackError> {
        self.snap.error.as_ref()
    }

    pub fn is_seeking(&self) -> bool {
        self.snap.seeking
    }

    pub fn source(&self) -> Option<&str> {
        self.snap.source.as_deref()
    }

    /// Fraction of the media played, in `[0, 1]`.
    pub fn played_fraction(&self) -> f64 {
        match self.snap.duration {
            Some(d) if d > 0.0 => (self.snap.position / d).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// `m:ss / m:ss`, or `None` until the duration is known.
    pub fn time_display(&self) -> Option<String> {
        self.snap.duration.map(|d| {
            format!("{} / {}", format_clock(self.snap.position), format_clock(d))
        })
    }

    pub fn apply(&mut self, event: PlaybackEvent) -> Result<Vec<Effect>, TransitionError> {
        let name = event.name();
        let (next, effects) = transition(&self.snap, event)?;
        if next.state != self.snap.state {
            debug!(from = %self.snap.state, to = %next.state, event = name, "playback transition");
        }
        if let Some(err) = next.error.as_ref().filter(|_| self.snap.error.is_none()) {
            warn!(source = ?next.source, message = %err.message, "playback failed");
        }
        self.snap = next;
        Ok(effects)
    }

    /// Assign a new source; derived fields are cleared before loading begins.
    pub fn assign(&mut self, url: &str) -> Result<LoadRequest, TransitionError> {
        self.apply(PlaybackEvent::Assign(url.to_string()))?;
        Ok(LoadRequest {
            generation: self.snap.generation,
            url: self.snap.source.clone().unwrap_or_default(),
        })
    }

    /// Acquire metadata for `request`. A result for a superseded source is
    /// dropped without touching the current state.
    pub async fn load<P: MediaProbe + ?Sized>(
        &mut self,
        probe: &P,
        request: &LoadRequest,
    ) -> Vec<Effect> {
        let outcome = probe.probe(&request.url).await;
        self.finish_load(request, outcome.as_ref().map(|m| m.duration_secs))
    }

    pub fn finish_load(
        &mut self,
        request: &LoadRequest,
        outcome: Result<f64, &ProbeError>,
    ) -> Vec<Effect> {
        let event = match outcome {
            Ok(duration) => PlaybackEvent::MetadataLoaded {
                generation: request.generation,
                duration,
            },
            Err(e) => PlaybackEvent::MetadataFailed {
                generation: request.generation,
                failure: MediaFailure::from(e),
            },
        };
        // Metadata events never fail; stale ones are ignored.
        self.apply(event).unwrap_or_default()
    }

    pub fn unload(&mut self) {
        let _ = self.apply(PlaybackEvent::Unload);
    }

    pub fn play(&mut self) -> Result<Vec<Effect>, TransitionError> {
        self.apply(PlaybackEvent::Play)
    }

    pub fn pause(&mut self) -> Result<Vec<Effect>, TransitionError> {
        self.apply(PlaybackEvent::Pause)
    }

    pub fn toggle(&mut self) -> Result<Vec<Effect>, TransitionError> {
        if self.snap.state == PlaybackState::Playing {
            self.pause()
        } else {
            self.play()
        }
    }

    pub fn progress(&mut self, position: f64) {
        let _ = self.apply(PlaybackEvent::Progress { position });
    }

    pub fn ended(&mut self) {
        let _ = self.apply(PlaybackEvent::Ended);
    }

    pub fn begin_seek(&mut self) -> Result<(), TransitionError> {
        self.apply(PlaybackEvent::BeginSeek).map(|_| ())
    }

    pub fn seek_input(&mut self, position: f64) -> Result<(), TransitionError> {
        self.apply(PlaybackEvent::SeekInput { position }).map(|_| ())
    }

    /// Returns the committed position.
    pub fn end_seek(&mut self) -> Result<f64, TransitionError> {
        self.apply(PlaybackEvent::EndSeek)?;
        Ok(self.snap.position)
    }

    pub fn media_error(&mut self, failure: MediaFailure) -> Vec<Effect> {
        self.apply(PlaybackEvent::MediaError(failure))
            .unwrap_or_default()
    }
}

/// `m:ss` with minutes unbounded (e.g. `75:03`).
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
