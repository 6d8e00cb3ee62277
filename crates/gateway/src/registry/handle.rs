use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use terralens_common::api::engine::ResultEnvelope;
use terralens_common::descriptor::ComputationDescriptor;
use terralens_common::fingerprint::Fingerprint;
use terralens_common::{HandleKey, TerralensError};

/// Outcome of one build attempt, broadcast to every waiter of the key.
pub(crate) type BuildOutcome = Result<Arc<ResultEnvelope>, TerralensError>;

/// One build attempt in flight for a Pending handle.
///
/// `attempt` distinguishes the current attempt from a stale one: after a
/// forced release (build timeout) a retry starts a fresh attempt, and a
/// straggling completion from the old attempt must not transition the
/// handle.
pub(crate) struct BuildInFlight {
    pub tx: watch::Sender<Option<BuildOutcome>>,
    pub started: Instant,
    pub attempt: u64,
}

/// Lifecycle state of a registry entry.
pub(crate) enum EntryState {
    /// Accepted but not materialized. `build` is Some while exactly one
    /// resolver's engine call is in flight.
    Pending { build: Option<BuildInFlight> },
    /// Materialized; the envelope is handed out by Arc so repeated
    /// resolves return the identical payload.
    Ready(Arc<ResultEnvelope>),
    /// The engine call failed; the error is cached and replayed to every
    /// later resolver of this key.
    Failed(TerralensError),
}

/// A registry entry. Owned exclusively by the registry; callers only ever
/// see a [`HandleSnapshot`].
pub(crate) struct HandleEntry {
    pub descriptor: Arc<ComputationDescriptor>,
    pub fingerprint: Fingerprint,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Instant,
    /// Monotonic build attempt counter for this entry.
    pub attempts: u64,
}

impl HandleEntry {
    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }

    pub fn state_kind(&self) -> HandleState {
        match self.state {
            EntryState::Pending { .. } => HandleState::Pending,
            EntryState::Ready(_) => HandleState::Ready,
            EntryState::Failed(_) => HandleState::Failed,
        }
    }

    /// Whether a build attempt younger than `build_timeout` is in flight.
    pub fn build_in_flight_since(&self, build_timeout: Duration) -> bool {
        match &self.state {
            EntryState::Pending { build: Some(b) } => b.started.elapsed() < build_timeout,
            _ => false,
        }
    }
}

/// Externally visible lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Ready,
    Failed,
}

/// Read-only view of a handle. The registry never hands out the mutable
/// entry, so descriptor immutability holds by construction.
#[derive(Clone, Debug)]
pub struct HandleSnapshot {
    pub key: HandleKey,
    pub descriptor: Arc<ComputationDescriptor>,
    pub state: HandleState,
    pub created_at: DateTime<Utc>,
}
