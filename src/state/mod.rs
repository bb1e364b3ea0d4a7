mod types;

pub use types::*;

use std::sync::Arc;
use tokio::sync::watch;

/// Single-writer, many-reader store for the published [`ProgressSnapshot`].
///
/// Backed by a `watch` channel: every update swaps in a complete value and
/// wakes subscribers, and late subscribers start from the latest value.
#[derive(Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<ProgressSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProgressSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current snapshot.
    pub fn current(&self) -> ProgressSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    /// Apply `f` to the snapshot and notify subscribers.
    ///
    /// Readers observe either the old or the new value, never an
    /// intermediate one.
    pub fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        self.tx.send_modify(f);
    }

    /// Replace the snapshot wholesale.
    pub fn replace(&self, snapshot: ProgressSnapshot) {
        self.tx.send_replace(snapshot);
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Format seconds as `MM:SS`, or `H:MM:SS` from one hour up.
pub fn format_clock(secs: f64) -> String {
    let total = if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    };
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}")
    } else {
        format!("{mins:02}:{secs:02}")
    }
}

/// Format an encode speed relative to realtime, e.g. `1.50x`.
pub fn format_speed(speed: f64) -> String {
    format!("{speed:.2}x")
}
