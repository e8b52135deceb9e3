use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// Milliseconds elapsed between two instants.
///
/// `to` must not precede `from`; within this crate `from` is always a
/// deadline's epoch and `to` is "now."
pub(crate) fn elapsed<C: Clock>(from: Instant<C>, to: Instant<C>) -> Millis {
  (to - from).try_into().unwrap()
}

/// Milliseconds an instant lies after the clock's epoch.
///
/// Used to seed jitter rngs, mirroring how retry timers derive
/// randomness from the time they were created.
pub(crate) fn since_epoch<C: Clock>(t: Instant<C>) -> Millis {
  Millis::try_from(t.duration_since_epoch()).unwrap()
}
