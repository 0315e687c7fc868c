//! Generation tokens and in-flight bookkeeping for asynchronous map fetches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Pipelines whose fetches are tracked independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchKind {
  Cluster,
  Boundary,
  Legend,
  Identify,
}

/// Information about a fetch that has not completed yet.
#[derive(Clone, Debug)]
pub struct FetchInfo {
  pub kind: FetchKind,
  pub generation: u64,
  pub started_at: Instant,
}

impl FetchInfo {
  #[must_use]
  pub fn elapsed(&self) -> std::time::Duration {
    self.started_at.elapsed()
  }
}

#[derive(Default)]
struct Inner {
  latest: HashMap<FetchKind, u64>,
  in_flight: HashMap<u64, FetchInfo>,
  next_id: u64,
}

/// Hands out monotonically increasing generations per fetch kind.
#[derive(Clone, Default)]
pub struct FetchTracker {
  inner: Arc<Mutex<Inner>>,
}

impl FetchTracker {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Starts a fetch, superseding every earlier ticket of the same kind.
  #[must_use]
  pub fn begin(&self, kind: FetchKind) -> FetchTicket {
    let mut inner = self.lock();
    let generation = {
      let latest = inner.latest.entry(kind).or_insert(0);
      *latest += 1;
      *latest
    };
    let id = inner.next_id;
    inner.next_id += 1;
    inner.in_flight.insert(
      id,
      FetchInfo {
        kind,
        generation,
        started_at: Instant::now(),
      },
    );
    drop(inner);

    FetchTicket {
      id,
      kind,
      generation,
      tracker: self.clone(),
    }
  }

  /// Supersedes all outstanding tickets of a kind without starting a new fetch.
  pub fn invalidate(&self, kind: FetchKind) {
    *self.lock().latest.entry(kind).or_insert(0) += 1;
  }

  #[must_use]
  pub fn latest(&self, kind: FetchKind) -> u64 {
    self.lock().latest.get(&kind).copied().unwrap_or(0)
  }

  /// Snapshot of all fetches still running.
  #[must_use]
  pub fn in_flight(&self) -> Vec<FetchInfo> {
    self.lock().in_flight.values().cloned().collect()
  }

  #[must_use]
  pub fn count(&self, kind: FetchKind) -> usize {
    self
      .lock()
      .in_flight
      .values()
      .filter(|info| info.kind == kind)
      .count()
  }
}

/// Proof of one fetch. Results are applied only while the ticket is current.
/// Dropping the ticket marks the fetch as finished.
pub struct FetchTicket {
  id: u64,
  kind: FetchKind,
  generation: u64,
  tracker: FetchTracker,
}

impl FetchTicket {
  #[must_use]
  pub fn kind(&self) -> FetchKind {
    self.kind
  }

  #[must_use]
  pub fn generation(&self) -> u64 {
    self.generation
  }

  #[must_use]
  pub fn is_current(&self) -> bool {
    self.tracker.latest(self.kind) == self.generation
  }
}

impl Drop for FetchTicket {
  fn drop(&mut self) {
    self.tracker.lock().in_flight.remove(&self.id);
  }
}
