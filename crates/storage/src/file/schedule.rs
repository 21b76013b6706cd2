//! Write coalescing state machine
//!
//! The file backend never touches the disk on `set_item`. Mutations move the
//! schedule into `Pending` with a deadline; mutations that arrive before the
//! deadline push it back, so a burst collapses into one physical write.
//!
//! ```text
//!            mark_dirty                 deadline reached
//!   Clean ───────────────▶ Pending ─────────────────────▶ Writing
//!     ▲  ◀── abandon ────── │  ▲                            │
//!     │                     └──┘ mark_dirty (push back)     │
//!     ├──────────────── finish_write(ok) ───────────────────┤
//!     │                                                     │
//!  Stalled ◀──────────── finish_write(failed) ──────────────┘
//! ```
//!
//! A mutation while `Writing` is remembered in `redirtied`, and the write's
//! completion then returns to `Pending` instead of `Clean`. `Stalled` is
//! dirty data without a timer: a failed background write waits for the next
//! mutation or an explicit flush rather than retrying on its own.

use std::time::Duration;
use tokio::time::Instant;

/// Current state of the write schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Memory matches the last completed write
    Clean,
    /// Dirty; a write is due at `deadline`
    Pending { deadline: Instant },
    /// A physical write is in flight
    Writing {
        /// Deadline of mutations made after the in-flight snapshot was taken
        redirtied: Option<Instant>,
        /// The dirty generation was given up while the write was running
        abandoned: bool,
    },
    /// Dirty with no write scheduled
    Stalled,
}

/// Coalescing write schedule with an explicit delay
#[derive(Debug, Clone)]
pub struct WriteSchedule {
    state: WriteState,
    delay: Duration,
}

impl WriteSchedule {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: WriteState::Clean,
            delay,
        }
    }

    pub fn state(&self) -> WriteState {
        self.state
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether memory holds mutations that no started write contains
    pub fn is_dirty(&self) -> bool {
        match self.state {
            WriteState::Clean => false,
            WriteState::Pending { .. } | WriteState::Stalled => true,
            WriteState::Writing { redirtied, .. } => redirtied.is_some(),
        }
    }

    /// Whether the schedule is fully settled: nothing dirty, nothing in flight
    pub fn is_clean(&self) -> bool {
        self.state == WriteState::Clean
    }

    /// When the next scheduled write is due, if one is scheduled
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            WriteState::Pending { deadline } => Some(deadline),
            WriteState::Writing { redirtied, .. } => redirtied,
            WriteState::Clean | WriteState::Stalled => None,
        }
    }

    /// Whether the timer should start a write at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.state, WriteState::Pending { deadline } if now >= deadline)
    }

    /// Record a mutation at `now`, (re)starting the coalescing delay
    pub fn mark_dirty(&mut self, now: Instant) {
        let deadline = now + self.delay;
        self.state = match self.state {
            WriteState::Clean | WriteState::Pending { .. } | WriteState::Stalled => {
                WriteState::Pending { deadline }
            }
            WriteState::Writing { .. } => WriteState::Writing {
                redirtied: Some(deadline),
                abandoned: false,
            },
        };
    }

    /// A write has taken a snapshot of everything in memory
    pub fn begin_write(&mut self) {
        self.state = WriteState::Writing {
            redirtied: None,
            abandoned: false,
        };
    }

    /// The physical write finished
    pub fn finish_write(&mut self, succeeded: bool) {
        if let WriteState::Writing {
            redirtied,
            abandoned,
        } = self.state
        {
            self.state = match redirtied {
                Some(deadline) => WriteState::Pending { deadline },
                None if succeeded || abandoned => WriteState::Clean,
                None => WriteState::Stalled,
            };
        }
    }

    /// Drop the current dirty generation so nothing retries it
    ///
    /// The data stays in memory and is written by the next mutation's write.
    pub fn abandon(&mut self) {
        self.state = match self.state {
            WriteState::Writing { .. } => WriteState::Writing {
                redirtied: None,
                abandoned: true,
            },
            _ => WriteState::Clean,
        };
    }
}
