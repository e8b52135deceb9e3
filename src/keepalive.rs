//! Idle-session reaping.
//!
//! Sessions exist to serve a peer that is actually talking to us; a
//! peer that goes quiet for the keepalive interval gets its session
//! reclaimed. The [`ActivityTimer`] is the generic last-seen-traffic
//! window behind that: started at session creation, kicked by every
//! successfully decoded inbound datagram, checked from the session's
//! poll loop.

use embedded_time::Instant;

use crate::time::{self, Clock, Millis};

/// Tracks when traffic was last seen and how long silence is
/// tolerated.
#[derive(Debug, Clone, Copy)]
pub struct ActivityTimer<C: Clock> {
  last_seen: Instant<C>,
  interval: Millis,
}

impl<C: Clock> ActivityTimer<C> {
  /// Start a fresh window of `interval` milliseconds.
  pub fn start(now: Instant<C>, interval: Millis) -> Self {
    Self { last_seen: now,
           interval }
  }

  /// Traffic was seen; the window starts over.
  pub fn kick(&mut self, now: Instant<C>) {
    self.last_seen = now;
  }

  /// Begin a new window without changing the interval.
  ///
  /// Identical to [`kick`](ActivityTimer::kick) today, kept distinct
  /// because callers mean different things: `kick` marks traffic,
  /// `restart` re-arms after an expiry check that decided to keep the
  /// session alive.
  pub fn restart(&mut self, now: Instant<C>) {
    self.last_seen = now;
  }

  /// Has the window elapsed with no kick?
  pub fn is_expired(&self, now: Instant<C>) -> bool {
    time::elapsed(self.last_seen, now) >= self.interval
  }
}
