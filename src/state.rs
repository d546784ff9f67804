//! Load-state bookkeeping shared by every fetching component.
//!
//! Nothing is cancelled on the wire. A response is dropped instead when the
//! identity it was requested for is no longer the current one.

use crate::error::ErrorKind;
use crate::recordings::api::RepositoryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&RepositoryError> for Failure {
    fn from(err: &RepositoryError) -> Self {
        Failure {
            kind: err.kind(),
            message: err.user_message().to_string(),
        }
    }
}

/// Idle, loading, absent and failed are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    /// Nothing requested yet.
    Idle,
    Loading,
    /// The server answered that the resource does not exist.
    Absent { message: String },
    Loaded(T),
    Failed(Failure),
}

impl<T> LoadState<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            LoadState::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// Proof that a request was started for `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket<K> {
    pub key: K,
    generation: u64,
}

/// Latest-wins slot: only the most recently begun request may write.
#[derive(Debug)]
pub struct LatestSlot<K, T> {
    generation: u64,
    key: Option<K>,
    state: LoadState<T>,
}

impl<K, T> Default for LatestSlot<K, T> {
    fn default() -> Self {
        Self {
            generation: 0,
            key: None,
            state: LoadState::Idle,
        }
    }
}

impl<K: Clone + PartialEq, T> LatestSlot<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    pub fn state(&self) -> &LoadState<T> {
        &self.state
    }

    /// Start a request for `key`; any outstanding ticket becomes stale.
    pub fn begin(&mut self, key: K) -> Ticket<K> {
        self.generation += 1;
        self.key = Some(key.clone());
        self.state = LoadState::Loading;
        Ticket {
            key,
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket<K>) -> bool {
        ticket.generation == self.generation && self.key.as_ref() == Some(&ticket.key)
    }

    /// Apply a result. Returns `false` (and changes nothing) for stale tickets.
    pub fn finish(&mut self, ticket: &Ticket<K>, result: Result<T, RepositoryError>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state = match result {
            Ok(v) => LoadState::Loaded(v),
            Err(RepositoryError::NotFound(message)) => LoadState::Absent { message },
            Err(e) => LoadState::Failed(Failure::from(&e)),
        };
        true
    }

    /// Forget the current key; outstanding tickets become stale.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.key = None;
        self.state = LoadState::Idle;
    }
}
