pub mod api;
pub mod download;
pub mod list;
pub mod models;
pub mod playback;
pub mod resolver;
pub mod session;

use crate::config::{Config, DownloadMode};
use crate::error::{AppError, ErrorKind};
use crate::http::build_http_client;
use crate::probe::{ensure_ffprobe_available, FfprobeProbe};
use crate::progress::spinner;
use crate::state::{Failure, LoadState};
use api::HttpRecordingRepository;
use download::{DownloadController, FileSaver, Retrieved, Retriever, SystemOpener};
use list::RecordingListCoordinator;
use models::{display_timestamp, AppointmentId, RecordingId, RecordingRecord};
use playback::{format_clock, PlaybackController, PlaybackState};
use resolver::{Resolution, Unavailable};
use session::RecordingView;
use std::path::PathBuf;

fn loaded<T>(state: &LoadState<T>) -> Result<&T, AppError> {
    match state {
        LoadState::Loaded(v) => Ok(v),
        LoadState::Absent { message } => Err(AppError::Failed(Failure {
            kind: ErrorKind::NotFound,
            message: message.clone(),
        })),
        LoadState::Failed(f) => Err(AppError::Failed(f.clone())),
        LoadState::Idle | LoadState::Loading => Err(AppError::Failed(Failure {
            kind: ErrorKind::Transport,
            message: "request did not complete".into(),
        })),
    }
}

fn or_dash(s: &str) -> &str {
    if s.trim().is_empty() {
        "-"
    } else {
        s
    }
}

pub async fn run_list(
    cfg: &Config,
    page: u32,
    page_size: Option<u32>,
    json: bool,
) -> Result<(), AppError> {
    let repo = HttpRecordingRepository::from_config(cfg)?;
    let mut list =
        RecordingListCoordinator::starting_at(&repo, page, page_size.unwrap_or(cfg.page_size));

    let pb = spinner("Loading recordings");
    list.load().await;
    pb.finish_and_clear();
    let current = loaded(list.state())?;

    if json {
        println!("{}", serde_json::to_string_pretty(current)?);
        return Ok(());
    }

    if current.results.is_empty() {
        println!("No recordings found.");
        return Ok(());
    }

    println!(
        "{:<6} {:<22} {:<20} {:<20} {:>8} {:>10} {:<10}",
        "ID", "DATE", "PATIENT", "PSYCHOLOGIST", "LENGTH", "SIZE", "STATUS"
    );
    for r in &current.results {
        println!(
            "{:<6} {:<22} {:<20} {:<20} {:>8} {:>10} {:<10}",
            r.id,
            display_timestamp(&r.appointment_date),
            or_dash(&r.patient_name),
            or_dash(&r.psychologist_name),
            or_dash(&r.duration_formatted),
            or_dash(&r.size_formatted),
            r.status.label()
        );
    }
    println!(
        "\n{} recordings, {} completed on this page",
        list.total_count(),
        list.completed_count()
    );
    if list.shows_pagination() {
        println!("Page {} of {}", list.page(), list.total_pages());
    }
    Ok(())
}

fn print_record(record: &RecordingRecord, can_download: bool) {
    println!("Recording {} ({})", record.id, record.recording_sid);
    println!("  Appointment:  {}", record.appointment_id);
    println!("  Status:       {}", record.status_label());
    println!("  Patient:      {}", or_dash(&record.patient_name));
    println!("  Psychologist: {}", or_dash(&record.psychologist_name));
    println!("  Duration:     {}", or_dash(&record.duration_formatted));
    println!("  Size:         {}", or_dash(&record.size_formatted));
    println!("  Started:      {}", display_timestamp(&record.created_at));
    if let Some(done) = &record.completed_at {
        println!("  Completed:    {}", display_timestamp(done));
    }
    if let Some(identity) = &record.participant_identity {
        println!("  Participant:  {identity}");
    }
    if can_download {
        println!("\nDownload with: sessionrec download --recording {}", record.id);
    }
}

pub async fn run_show(cfg: &Config, appointment_id: AppointmentId, json: bool) -> Result<(), AppError> {
    let repo = HttpRecordingRepository::from_config(cfg)?;
    let mut view = RecordingView::new(&repo);
    let record = loaded(view.select(appointment_id).await)?.clone();

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record, view.can_download());
    }
    Ok(())
}

/// Resolve the selected appointment's recording; `Ok(None)` when there is
/// nothing to play yet.
async fn resolve_for(
    view: &mut RecordingView<'_, HttpRecordingRepository>,
    appointment_id: AppointmentId,
) -> Result<Option<resolver::VideoSource>, AppError> {
    loaded(view.select(appointment_id).await)?;
    match view.resolve_current().await {
        Some(Resolution::Source(source)) => Ok(Some(source.clone())),
        Some(Resolution::Unavailable(u)) => match u {
            Unavailable::NoSourcePresent { .. } => {
                println!("{}", u.user_message());
                Ok(None)
            }
            Unavailable::ResolutionFailed { .. } => Err(AppError::Resolution {
                message: u.user_message(),
            }),
        },
        None => Ok(None),
    }
}

pub async fn run_resolve(cfg: &Config, appointment_id: AppointmentId) -> Result<(), AppError> {
    let repo = HttpRecordingRepository::from_config(cfg)?;
    let mut view = RecordingView::new(&repo);
    if let Some(source) = resolve_for(&mut view, appointment_id).await? {
        println!("{}", source.url);
        eprintln!("source: {}", source.origin);
    }
    Ok(())
}

pub async fn run_inspect(cfg: &Config, appointment_id: AppointmentId) -> Result<(), AppError> {
    ensure_ffprobe_available(&cfg.player.ffprobe_path).await?;
    let repo = HttpRecordingRepository::from_config(cfg)?;
    let mut view = RecordingView::new(&repo);
    let Some(source) = resolve_for(&mut view, appointment_id).await? else {
        return Ok(());
    };
    let recording_id = view.record().map(|r| r.id);

    let probe = FfprobeProbe::new(&cfg.player.ffprobe_path);
    let mut player = PlaybackController::new();
    let request = player
        .assign(&source.url)
        .map_err(|e| AppError::Playback { message: e.to_string() })?;

    let pb = spinner("Loading video metadata");
    player.load(&probe, &request).await;
    pb.finish_and_clear();

    println!("Source:   {} ({})", source.url, source.origin);
    println!("State:    {}", player.state());
    if let Some(duration) = player.duration() {
        println!("Duration: {}", format_clock(duration));
    }
    if let Some(display) = player.time_display() {
        println!("Position: {display}");
    }

    if player.state() == PlaybackState::Errored {
        if let Some(err) = player.error() {
            if let Some(id) = recording_id.filter(|_| view.can_download()) {
                eprintln!("{} (sessionrec download --recording {id})", err.hint());
            }
            return Err(AppError::Playback {
                message: err.message.clone(),
            });
        }
    }
    Ok(())
}

pub async fn run_download(
    cfg: &Config,
    recording_id: RecordingId,
    save: bool,
    dir: Option<PathBuf>,
) -> Result<(), AppError> {
    let repo = HttpRecordingRepository::from_config(cfg)?;
    let retriever: Box<dyn Retriever> = if save || cfg.download.mode == DownloadMode::Save {
        let client = build_http_client(cfg)
            .map_err(|e| crate::config::ConfigError::Invalid(format!("http client: {e}")))?;
        let dir = dir.unwrap_or_else(|| PathBuf::from(&cfg.download.dir));
        Box::new(FileSaver::new(client, dir))
    } else {
        Box::new(SystemOpener)
    };

    let mut controller = DownloadController::new(&repo, retriever.as_ref());
    match controller.download(recording_id).await {
        Ok(Retrieved::Opened) => println!("Opened download for recording {recording_id}."),
        Ok(Retrieved::Saved(path)) => println!("Saved {}", path.display()),
        Err(e) => {
            return Err(match controller.error() {
                Some(failure) => AppError::Failed(failure.clone()),
                None => e.into(),
            });
        }
    }
    Ok(())
}
