use core::convert::Infallible;

use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use rand::{Rng, SeedableRng};

use crate::time::{self, Clock, Millis};

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer::what_should_i_do`].
///
/// This tells you if a retransmission should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the exchange being
  /// retried should be considered poisoned.
  Cry,
  /// A retransmission should be performed
  Retry,
}

/// A non-blocking retransmission timer with doubling backoff, that
/// lives alongside some message to resend.
///
/// It does not _contain_ the bytes to resend; the
/// [retransmission table](crate::retrans) pairs each timer with the
/// exact datagram it guards.
///
/// The initial timeout is drawn uniformly from `[base, base + jitter)`
/// (an independent draw per timer, seeded from the clock) and doubles
/// after every retransmission, so a timer created with `base` 2000ms
/// fires at ~2000, ~4000, ~8000... ms intervals until `max_attempts`
/// retransmissions have happened, after which it yields
/// [`YouShould::Cry`].
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use newt::retry::{Attempts, RetryTimer, YouShould};
/// use newt::std::Clock;
///
/// let clock = Clock::new();
/// let now = || embedded_time::Clock::try_now(&clock).unwrap();
///
/// let mut retry =
///   RetryTimer::new(now(), Milliseconds(2_000), Milliseconds(1_000), Attempts(4));
///
/// // Not enough time has passed
/// assert_eq!(retry.what_should_i_do(now()), Err(nb::Error::WouldBlock));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RetryTimer<C: Clock> {
  start: Instant<C>,
  due: Millis,
  timeout: Millis,
  attempts: Attempts,
  max_attempts: Attempts,
}

impl<C: Clock> RetryTimer<C> {
  /// Create a new retrier whose first fire happens `[base, base + jitter)`
  /// milliseconds after `start`.
  pub fn new(start: Instant<C>, base: Millis, jitter: Millis, max_attempts: Attempts) -> Self {
    let init = if jitter.0 == 0 {
      base
    } else {
      let mut rand =
        rand_chacha::ChaCha8Rng::seed_from_u64(time::since_epoch(start).0);
      Milliseconds(rand.gen_range(base.0..base.0 + jitter.0))
    };

    Self { start,
           due: init,
           timeout: init,
           attempts: Attempts(0),
           max_attempts }
  }

  /// The timer fired (or the caller is polling); what do I do?
  ///
  /// Returns `nb::Error::WouldBlock` when we have not yet waited the
  /// appropriate amount of time, [`YouShould::Retry`] when a
  /// retransmission is owed (doubling the timeout and rescheduling),
  /// and [`YouShould::Cry`] once all attempts are spent.
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, Infallible> {
    if time::elapsed(self.start, now) < self.due {
      Err(nb::Error::WouldBlock)
    } else if self.attempts >= self.max_attempts {
      Ok(YouShould::Cry)
    } else {
      self.attempts.0 += 1;
      self.timeout = Milliseconds(self.timeout.0 * 2);
      // reschedule from the previous deadline, not from `now`, so
      // late polls don't stretch the backoff schedule
      self.due = Milliseconds(self.due.0 + self.timeout.0);
      Ok(YouShould::Retry)
    }
  }

  /// Number of retransmissions performed so far
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// The current backoff window, in milliseconds
  pub fn timeout(&self) -> Millis {
    self.timeout
  }
}
