//! Glue for running `newt` on a hosted (`std`) platform.

use embedded_time::clock::Error;
use embedded_time::fraction::Fraction;
use embedded_time::Instant;

/// Implement [`embedded_time::Clock`] using [`std::time::Instant`] as
/// the source of truth.
///
/// Ticks are microseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct Clock(std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock. Instants read from it are relative to this
  /// moment.
  pub fn new() -> Self {
    Self(std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<Instant<Self>, Error> {
    let micros = std::time::Instant::now().duration_since(self.0)
                                          .as_micros();
    Ok(Instant::new(micros as u64))
  }
}
