//! Echo-suppression state machine.
//!
//! ```text
//!            inbound SYNC_ALL (re-arms window)
//!        ┌──────────────────────────────────────┐
//!        │                                      ▼
//!     ┌──────┐   inbound SYNC_ALL   ┌───────────────────────┐
//!     │ Idle │ ───────────────────▶ │ ApplyingRemote{until} │
//!     └──────┘                      └───────────────────────┘
//!        ▲      now >= until                    │
//!        └──────────────────────────────────────┘
//!
//!   change observed   | Idle     | ApplyingRemote
//!   ------------------+----------+-------------------------------
//!   Remote (echo)     | Suppress | Suppress
//!   Local (genuine)   | Publish  | Defer (broadcast on release)
//! ```

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Time source for the debounce window.
pub trait Clock: Send + Sync {
    /// Monotonic time for window arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock time for operator-facing timestamps.
    fn wall(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        *elapsed += by;
    }

    fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(self.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + offset
    }
}

/// Coordinator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    /// A remote snapshot was just applied; changes observed until `until`
    /// are its echoes.
    ApplyingRemote { until: Instant },
}

/// Where an observed change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A mutator issued on this replica.
    Local,
    /// Applying an inbound snapshot.
    Remote,
}

/// What the replica must do with an observed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Persist and broadcast now.
    Publish,
    /// Persist now, broadcast once the guard releases.
    Defer,
    /// Neither persist nor broadcast.
    Suppress,
}

/// Decides which changes are genuine and when to broadcast them.
#[derive(Debug)]
pub struct SyncCoordinator {
    phase: SyncPhase,
    window: Duration,
    pending_publish: bool,
    last_synced_at: Option<DateTime<Utc>>,
    suppressed_echoes: u64,
}

impl SyncCoordinator {
    pub fn new(window: Duration) -> Self {
        Self {
            phase: SyncPhase::Idle,
            window,
            pending_publish: false,
            last_synced_at: None,
            suppressed_echoes: 0,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_applying_remote(&self) -> bool {
        matches!(self.phase, SyncPhase::ApplyingRemote { .. })
    }

    /// When the last remote snapshot was applied.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Seed the timestamp from durable state on startup.
    pub fn restore_last_synced_at(&mut self, at: Option<DateTime<Utc>>) {
        self.last_synced_at = at;
    }

    /// Echoes swallowed since startup.
    pub fn suppressed_echoes(&self) -> u64 {
        self.suppressed_echoes
    }

    pub fn has_pending_publish(&self) -> bool {
        self.pending_publish
    }

    /// Enter (or re-arm) the guarded phase for an inbound snapshot.
    pub fn begin_remote_apply(&mut self, now: Instant, wall: DateTime<Utc>) {
        self.phase = SyncPhase::ApplyingRemote {
            until: now + self.window,
        };
        self.last_synced_at = Some(wall);
    }

    /// Classify a change observed at `now`.
    pub fn observe_change(&mut self, origin: ChangeOrigin, now: Instant) -> SyncDecision {
        self.release_if_elapsed(now);

        match (origin, self.phase) {
            (ChangeOrigin::Remote, _) => {
                self.suppressed_echoes += 1;
                SyncDecision::Suppress
            }
            (ChangeOrigin::Local, SyncPhase::Idle) => {
                // This broadcast carries any earlier deferred change too.
                self.pending_publish = false;
                SyncDecision::Publish
            }
            (ChangeOrigin::Local, SyncPhase::ApplyingRemote { .. }) => {
                self.pending_publish = true;
                SyncDecision::Defer
            }
        }
    }

    /// Request a broadcast on the next release (e.g., after a failed publish).
    pub fn mark_pending(&mut self) {
        self.pending_publish = true;
    }

    /// Advance the timer. Returns true if the caller must broadcast a
    /// deferred snapshot now.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.release_if_elapsed(now);
        if self.phase == SyncPhase::Idle && self.pending_publish {
            self.pending_publish = false;
            return true;
        }
        false
    }

    fn release_if_elapsed(&mut self, now: Instant) {
        if let SyncPhase::ApplyingRemote { until } = self.phase {
            if now >= until {
                self.phase = SyncPhase::Idle;
            }
        }
    }
}
