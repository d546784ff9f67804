use crate::recordings::api::{RecordingRepository, RepositoryError};
use crate::recordings::models::{AppointmentId, RecordingId, RecordingRecord, RecordingStatus};
use crate::recordings::resolver::{Resolution, SourceOrigin, Unavailable, VideoSourceResolver};
use crate::state::{LatestSlot, LoadState, Ticket};
use tracing::debug;

/// What a resolution depends on. A refetch that changes any of these
/// invalidates the cached resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceKey {
    id: RecordingId,
    status: RecordingStatus,
    media_uri: Option<String>,
    media_external_location: Option<String>,
}

impl SourceKey {
    fn of(record: &RecordingRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            media_uri: record.media_uri.clone(),
            media_external_location: record.media_external_location.clone(),
        }
    }
}

/// Only resolutions produced from the record itself may be reused.
fn is_reusable(resolution: &Resolution) -> bool {
    match resolution {
        Resolution::Source(source) => source.origin != SourceOrigin::SignedDownload,
        Resolution::Unavailable(Unavailable::NoSourcePresent { .. }) => true,
        Resolution::Unavailable(Unavailable::ResolutionFailed { .. }) => false,
    }
}

/// The recording attached to one selected appointment.
pub struct RecordingView<'a, R: ?Sized> {
    repo: &'a R,
    slot: LatestSlot<AppointmentId, RecordingRecord>,
    resolved: Option<(SourceKey, Resolution)>,
}

impl<'a, R: RecordingRepository + ?Sized> RecordingView<'a, R> {
    pub fn new(repo: &'a R) -> Self {
        Self {
            repo,
            slot: LatestSlot::new(),
            resolved: None,
        }
    }

    pub fn appointment(&self) -> Option<AppointmentId> {
        self.slot.key().copied()
    }

    pub fn state(&self) -> &LoadState<RecordingRecord> {
        self.slot.state()
    }

    pub fn record(&self) -> Option<&RecordingRecord> {
        self.slot.state().value()
    }

    /// Switch to `appointment_id` without awaiting. Pair with [`Self::complete`].
    pub fn begin(&mut self, appointment_id: AppointmentId) -> Ticket<AppointmentId> {
        self.slot.begin(appointment_id)
    }

    /// Apply a fetched record; `false` if another appointment was selected since.
    pub fn complete(
        &mut self,
        ticket: &Ticket<AppointmentId>,
        result: Result<RecordingRecord, RepositoryError>,
    ) -> bool {
        let applied = self.slot.finish(ticket, result);
        if !applied {
            debug!(appointment_id = ticket.key, "dropping stale recording response");
        }
        applied
    }

    pub async fn select(&mut self, appointment_id: AppointmentId) -> &LoadState<RecordingRecord> {
        let ticket = self.begin(appointment_id);
        let result = self.repo.fetch_by_appointment(appointment_id).await;
        self.complete(&ticket, result);
        self.slot.state()
    }

    /// Fetch the selected appointment again. No-op when nothing is selected.
    pub async fn refetch(&mut self) -> &LoadState<RecordingRecord> {
        if let Some(appointment_id) = self.appointment() {
            return self.select(appointment_id).await;
        }
        self.slot.state()
    }

    pub fn clear(&mut self) {
        self.slot.clear();
        self.resolved = None;
    }

    /// Resolve a source for the loaded record. Results that needed no request
    /// are kept per record identity. Signed URLs and failed lookups are never
    /// reused, so every call after one of those asks the server again.
    pub async fn resolve_current(&mut self) -> Option<&Resolution> {
        let record = self.slot.state().value()?;
        let key = SourceKey::of(record);
        let cached = matches!(&self.resolved, Some((k, r)) if *k == key && is_reusable(r));
        if !cached {
            let resolution = VideoSourceResolver::new(self.repo).resolve(record).await;
            self.resolved = Some((key, resolution));
        }
        self.resolved.as_ref().map(|(_, r)| r)
    }

    /// "Recording available" badge for an appointment row.
    pub fn indicator(&self, appointment_completed: bool) -> bool {
        appointment_completed && self.record().is_some()
    }

    pub fn can_download(&self) -> bool {
        self.record().is_some_and(RecordingRecord::is_completed)
    }
}
