//! Single slot link timer
//!
//! The link only ever has one timer outstanding. Scheduling a new timer replaces the pending one
//! and bumps the generation, so a token handed out for the replaced timer can never fire.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Instant;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// What a link timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Stop the current scan.
    ScanWindow,

    /// Start a new scan.
    Retry,

    /// Give up on the current connection attempt.
    ConnectTimeout,
}

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    pub kind: TimerKind,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct TimerSlot {
    pending: Option<(TimerToken, Instant)>,
    generation: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timer, cancelling any pending one.
    pub fn schedule(&mut self, kind: TimerKind, deadline: Instant) -> TimerToken {
        self.generation += 1;

        let token = TimerToken {
            kind,
            generation: self.generation,
        };
        self.pending = Some((token, deadline));

        token
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<TimerToken> {
        self.pending.map(|(t, _)| t)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, d)| d)
    }

    /// The pending timer's token if its deadline has passed.
    pub fn due(&self, now: Instant) -> Option<TimerToken> {
        match self.pending {
            Some((token, deadline)) if now >= deadline => Some(token),
            _ => None,
        }
    }

    /// Consume the timer identified by `token`.
    ///
    /// Returns `false` and leaves the slot untouched if the token is stale.
    pub fn fire(&mut self, token: TimerToken) -> bool {
        match self.pending {
            Some((t, _)) if t == token => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
