//! # Command Channel
//!
//! Encodes wheel commands into the drive payload and writes them to the link, throttled to a
//! minimum interval between writes. Nothing is queued: a command that cannot be sent now is
//! dropped and the caller computes a fresh one on its next step.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod rate_limiter;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{trace, warn};
use std::time::{Duration, Instant};

// Internal
use crate::link::{LinkError, LinkMgr, LinkTransport};
use comms_if::eqpt::drive::WheelCommand;

pub use rate_limiter::RateLimiter;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of a send attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The payload was handed to the transport.
    Sent,

    /// Dropped, the minimum interval has not elapsed since the last write.
    Throttled,

    /// Dropped, the link is not ready.
    LinkNotReady,

    /// The transport rejected the write.
    WriteFailed(LinkError),
}

pub struct CommandChannel {
    limiter: RateLimiter,

    num_sent: u64,
    num_throttled: u64,
    num_failed: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SendOutcome {
    /// The command reached the transport.
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

impl CommandChannel {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            limiter: RateLimiter::new(min_interval),
            num_sent: 0,
            num_throttled: 0,
            num_failed: 0,
        }
    }

    /// Try to send a command over the link.
    ///
    /// Unless `force` is set the command is throttled if the minimum interval has not elapsed
    /// since the last write attempt. The interval is only restarted when a write is attempted.
    pub fn try_send<T: LinkTransport>(
        &mut self,
        link: &mut LinkMgr<T>,
        cmd: &WheelCommand,
        force: bool,
        now: Instant,
    ) -> SendOutcome {
        if !force && !self.limiter.is_ready(now) {
            self.num_throttled += 1;
            return SendOutcome::Throttled;
        }

        if !link.is_ready() {
            return SendOutcome::LinkNotReady;
        }

        let payload = cmd.to_payload();
        self.limiter.mark(now);

        match link.write(payload.as_bytes()) {
            Ok(()) => {
                trace!("Sent {}{}", payload, if force { " (forced)" } else { "" });
                self.num_sent += 1;
                SendOutcome::Sent
            }
            Err(LinkError::NotReady) => SendOutcome::LinkNotReady,
            Err(e) => {
                warn!("Could not send {}: {}", payload, e);
                self.num_failed += 1;
                SendOutcome::WriteFailed(e)
            }
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn num_sent(&self) -> u64 {
        self.num_sent
    }

    pub fn num_throttled(&self) -> u64 {
        self.num_throttled
    }

    pub fn num_failed(&self) -> u64 {
        self.num_failed
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
