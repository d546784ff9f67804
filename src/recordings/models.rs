use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RecordingId = u64;
pub type AppointmentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Started,
    Completed,
    Failed,
}

impl RecordingStatus {
    pub fn label(self) -> &'static str {
        match self {
            RecordingStatus::Started => "Recording",
            RecordingStatus::Completed => "Completed",
            RecordingStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordingStatus::Started => "started",
            RecordingStatus::Completed => "completed",
            RecordingStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Full recording resource as returned by `GET /appointments/{id}/recording/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingRecord {
    pub id: RecordingId,
    pub appointment_id: AppointmentId,
    pub recording_sid: String,
    #[serde(default)]
    pub media_uri: Option<String>,
    #[serde(default)]
    pub media_external_location: Option<String>,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub duration_formatted: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub size_formatted: String,
    pub status: RecordingStatus,
    #[serde(default)]
    pub status_display: String,
    #[serde(default)]
    pub participant_identity: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub psychologist_name: String,
}

impl RecordingRecord {
    pub fn is_completed(&self) -> bool {
        self.status == RecordingStatus::Completed
    }

    /// Server label when present, otherwise the status' own label.
    pub fn status_label(&self) -> &str {
        if self.status_display.trim().is_empty() {
            self.status.label()
        } else {
            &self.status_display
        }
    }

    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            id: self.id,
            recording_sid: self.recording_sid.clone(),
            appointment_date: self.created_at.clone(),
            patient_name: self.patient_name.clone(),
            psychologist_name: self.psychologist_name.clone(),
            duration: self.duration,
            duration_formatted: self.duration_formatted.clone(),
            size: self.size,
            size_formatted: self.size_formatted.clone(),
            status: self.status,
            created_at: self.created_at.clone(),
            completed_at: self.completed_at.clone(),
        }
    }
}

/// Listing projection of [`RecordingRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub id: RecordingId,
    pub recording_sid: String,
    pub appointment_date: String,
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub psychologist_name: String,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub duration_formatted: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub size_formatted: String,
    pub status: RecordingStatus,
    pub created_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl RecordingSummary {
    pub fn is_completed(&self) -> bool {
        self.status == RecordingStatus::Completed
    }
}

/// Signed, single-use download grant. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadDescriptor {
    pub recording_id: RecordingId,
    pub appointment_id: AppointmentId,
    pub download_url: String,
    #[serde(default)]
    pub external_location: Option<String>,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub size_formatted: String,
    #[serde(default)]
    pub duration_formatted: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub note: String,
}

/// One page of `GET /appointments/recordings/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    #[serde(default)]
    pub results: Vec<RecordingSummary>,
}

impl Page {
    pub fn completed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_completed()).count()
    }
}

/// Parse a server timestamp, tolerating the naive form some backends emit.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

/// `Jan 5, 2025, 3:07 PM`-style rendering; falls back to the raw text.
pub fn display_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%b %-d, %Y, %-I:%M %p")
            .to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn record(id: RecordingId, status: RecordingStatus) -> RecordingRecord {
        RecordingRecord {
            id,
            appointment_id: id * 10,
            recording_sid: format!("RT{id:04}"),
            media_uri: None,
            media_external_location: None,
            duration: 3000,
            duration_formatted: "50:00".into(),
            size: 52_428_800,
            size_formatted: "50.0 MB".into(),
            status,
            status_display: String::new(),
            participant_identity: None,
            created_at: "2025-03-01T10:00:00Z".into(),
            completed_at: (status == RecordingStatus::Completed)
                .then(|| "2025-03-01T10:50:00Z".to_string()),
            patient_name: "Sam Patient".into(),
            psychologist_name: "Dr. Rivera".into(),
        }
    }

    pub fn descriptor(recording_id: RecordingId, url: &str) -> DownloadDescriptor {
        DownloadDescriptor {
            recording_id,
            appointment_id: recording_id * 10,
            download_url: url.to_string(),
            external_location: None,
            duration: 3000,
            size: 52_428_800,
            size_formatted: "50.0 MB".into(),
            duration_formatted: "50:00".into(),
            created_at: None,
            completed_at: None,
            note: "Link expires in 1 hour".into(),
        }
    }

    pub fn page(count: u64, statuses: &[RecordingStatus], next: bool, previous: bool) -> Page {
        Page {
            count,
            next: next.then(|| "https://api.example.com/next".to_string()),
            previous: previous.then(|| "https://api.example.com/prev".to_string()),
            results: statuses
                .iter()
                .enumerate()
                .map(|(i, s)| record(i as RecordingId + 1, *s).summary())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_deserializes_with_optional_fields_missing() {
        let json = r#"{
            "id": 7,
            "appointment_id": 42,
            "recording_sid": "RT123",
            "media_uri": null,
            "duration": 0,
            "duration_formatted": "0:00",
            "size": 0,
            "size_formatted": "0 B",
            "status": "started",
            "status_display": "In progress",
            "created_at": "2025-03-01T10:00:00Z",
            "patient_name": "A",
            "psychologist_name": "B"
        }"#;
        let rec: RecordingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.status, RecordingStatus::Started);
        assert!(rec.media_uri.is_none());
        assert!(rec.media_external_location.is_none());
        assert!(rec.completed_at.is_none());
        assert_eq!(rec.status_label(), "In progress");
    }

    #[test]
    fn status_label_falls_back_when_server_label_blank() {
        let rec = fixtures::record(1, RecordingStatus::Completed);
        assert_eq!(rec.status_label(), "Completed");
    }

    #[test]
    fn page_counts_completed_results_only() {
        use RecordingStatus::*;
        let page = fixtures::page(5, &[Completed, Started, Completed, Failed], true, false);
        assert_eq!(page.completed_count(), 2);
    }

    #[test]
    fn timestamps_parse_with_and_without_offset() {
        assert!(parse_timestamp("2025-03-01T10:00:00+10:00").is_some());
        assert!(parse_timestamp("2025-03-01T10:00:00.123456").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert_eq!(display_timestamp("yesterday"), "yesterday");
    }
}
