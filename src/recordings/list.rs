use crate::recordings::api::{RecordingRepository, RepositoryError};
use crate::recordings::models::Page;
use crate::state::{LatestSlot, LoadState, Ticket};
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Paged view over `GET /appointments/recordings/`.
///
/// Derived counts come from the last page that landed, so `completed_count`
/// is per page, not global.
pub struct RecordingListCoordinator<'a, R: ?Sized> {
    repo: &'a R,
    page: u32,
    page_size: u32,
    slot: LatestSlot<u32, Page>,
}

impl<'a, R: RecordingRepository + ?Sized> RecordingListCoordinator<'a, R> {
    pub fn new(repo: &'a R, page_size: u32) -> Self {
        Self::starting_at(repo, 1, page_size)
    }

    pub fn starting_at(repo: &'a R, page: u32, page_size: u32) -> Self {
        Self {
            repo,
            page: page.max(1),
            page_size: if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size },
            slot: LatestSlot::new(),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn state(&self) -> &LoadState<Page> {
        self.slot.state()
    }

    pub fn current(&self) -> Option<&Page> {
        self.slot.state().value()
    }

    pub fn total_count(&self) -> u64 {
        self.current().map(|p| p.count).unwrap_or(0)
    }

    pub fn total_pages(&self) -> u32 {
        let size = u64::from(self.page_size);
        self.total_count().div_ceil(size) as u32
    }

    pub fn completed_count(&self) -> usize {
        self.current().map(Page::completed_count).unwrap_or(0)
    }

    pub fn shows_pagination(&self) -> bool {
        self.total_count() > u64::from(self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.current().is_some_and(|p| p.next.is_some()) && self.page < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.current().is_some_and(|p| p.previous.is_some()) && self.page > 1
    }

    /// Mark the current page as loading. Pair with [`Self::complete`].
    pub fn begin(&mut self) -> Ticket<u32> {
        self.slot.begin(self.page)
    }

    /// Returns `false` when the response belongs to a superseded request.
    pub fn complete(&mut self, ticket: &Ticket<u32>, result: Result<Page, RepositoryError>) -> bool {
        let applied = self.slot.finish(ticket, result);
        if !applied {
            debug!(page = ticket.key, "dropping stale recordings page");
        }
        applied
    }

    pub async fn load(&mut self) -> &LoadState<Page> {
        let ticket = self.begin();
        let result = self.repo.list(self.page, self.page_size).await;
        self.complete(&ticket, result);
        self.slot.state()
    }

    pub async fn reload(&mut self) -> &LoadState<Page> {
        self.load().await
    }

    /// Advance one page. No-op at the last page.
    pub async fn next_page(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.page += 1;
        self.load().await;
        true
    }

    /// Go back one page. No-op at the first page.
    pub async fn prev_page(&mut self) -> bool {
        if !self.has_previous() {
            return false;
        }
        self.page -= 1;
        self.load().await;
        true
    }
}
