//! Retransmission of outbound CON messages.
//!
//! When the session sends a confirmable message that expects an
//! acknowledgement (a separate response; never an ACK, those are
//! fire-and-forget) it registers the *exact* encoded bytes here. The
//! table resends them on a jittered doubling-backoff schedule until
//! the peer ACKs the id or the attempts run out — and running out is
//! terminal for the whole session, not just the exchange.

use std::collections::BTreeMap;

use embedded_time::Instant;

use crate::retry::{Attempts, RetryTimer, YouShould};
use crate::time::{Clock, Millis};

#[derive(Debug, Clone)]
struct Entry<C: Clock> {
  bytes: Vec<u8>,
  timer: RetryTimer<C>,
}

/// What [`RetransTracker::poll`] found due.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fired {
  /// Datagrams to put back on the wire, verbatim
  pub resend: Vec<Vec<u8>>,
  /// The first exchange whose attempts ran out, if any.
  ///
  /// Fatal: the session owning this table terminates.
  pub exhausted: Option<u16>,
}

/// Table of un-acked outbound CON messages, keyed by the *locally
/// allocated* message id.
///
/// Exclusively owned and mutated by the session; a given id appears
/// at most once.
#[derive(Debug, Clone)]
pub struct RetransTracker<C: Clock> {
  base: Millis,
  jitter: Millis,
  max_attempts: Attempts,
  entries: BTreeMap<u16, Entry<C>>,
}

impl<C: Clock> RetransTracker<C> {
  /// Create an empty tracker.
  ///
  /// `base` and `jitter` shape each entry's initial timeout (drawn
  /// from `[base, base + jitter)`); `max_attempts` caps
  /// retransmissions per entry.
  pub fn new(base: Millis, jitter: Millis, max_attempts: Attempts) -> Self {
    Self { base,
           jitter,
           max_attempts,
           entries: BTreeMap::new() }
  }

  /// Start tracking a just-transmitted CON message.
  ///
  /// `bytes` must be the datagram as it went out; retransmissions
  /// repeat it bit-for-bit.
  pub fn register(&mut self, id: u16, bytes: Vec<u8>, now: Instant<C>) {
    let timer = RetryTimer::new(now, self.base, self.jitter, self.max_attempts);
    self.entries.insert(id, Entry { bytes, timer });
  }

  /// An ACK for `id` arrived: cancel retransmission.
  ///
  /// Returns `false` when `id` is unknown (duplicate or late ACK),
  /// which callers treat as a no-op.
  pub fn acknowledge(&mut self, id: u16) -> bool {
    self.entries.remove(&id).is_some()
  }

  /// Drive every timer against `now`.
  ///
  /// Entries whose backoff elapsed get their bytes queued for resend;
  /// an entry with no attempts left stops the scan and is reported as
  /// exhausted.
  pub fn poll(&mut self, now: Instant<C>) -> Fired {
    let mut fired = Fired::default();

    for (id, entry) in self.entries.iter_mut() {
      match entry.timer.what_should_i_do(now) {
        | Err(nb::Error::WouldBlock) => (),
        | Ok(YouShould::Retry) => fired.resend.push(entry.bytes.clone()),
        | Ok(YouShould::Cry) => {
          fired.exhausted = Some(*id);
          break;
        },
      }
    }

    if let Some(id) = fired.exhausted {
      self.entries.remove(&id);
    }

    fired
  }

  /// Number of tracked ids
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// `len() == 0`
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::test::ClockMock;

  fn tracker() -> RetransTracker<ClockMock> {
    RetransTracker::new(Milliseconds(100), Milliseconds(0), Attempts(4))
  }

  #[test]
  fn resends_until_acked() {
    let mut t = tracker();
    t.register(9, vec![0xca, 0xfe], ClockMock::instant(0));

    assert_eq!(t.poll(ClockMock::instant(99)), Fired::default());

    let fired = t.poll(ClockMock::instant(100));
    assert_eq!(fired.resend, vec![vec![0xca, 0xfe]]);
    assert_eq!(fired.exhausted, None);

    assert!(t.acknowledge(9));
    assert!(t.is_empty());
    assert_eq!(t.poll(ClockMock::instant(60_000)), Fired::default());
  }

  #[test]
  fn late_ack_is_a_noop() {
    let mut t = tracker();
    assert!(!t.acknowledge(9));
  }

  #[test]
  fn exhaustion_after_max_attempts() {
    let mut t = tracker();
    t.register(9, vec![1], ClockMock::instant(0));

    // schedule with base 100ms: fires at 100, 300, 700, 1500
    let mut resends = 0;
    for at in [100u64, 300, 700, 1_500] {
      let fired = t.poll(ClockMock::instant(at));
      resends += fired.resend.len();
      assert_eq!(fired.exhausted, None);
    }
    assert_eq!(resends, 4);

    // the fifth fire is terminal
    let fired = t.poll(ClockMock::instant(3_100));
    assert_eq!(fired.exhausted, Some(9));
    assert!(t.is_empty());
  }

  #[test]
  fn entries_back_off_independently() {
    let mut t = tracker();
    t.register(1, vec![1], ClockMock::instant(0));
    t.register(2, vec![2], ClockMock::instant(50));

    let fired = t.poll(ClockMock::instant(100));
    assert_eq!(fired.resend, vec![vec![1]]);

    let fired = t.poll(ClockMock::instant(150));
    assert_eq!(fired.resend, vec![vec![2]]);
  }
}
