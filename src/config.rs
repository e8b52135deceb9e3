use embedded_time::duration::Milliseconds;

use crate::retry::Attempts;
use crate::time::Millis;

/// Runtime config for a single endpoint session.
///
/// All knobs have RFC7252-flavored defaults; construct with
/// struct-update syntax when you only want to change one:
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use newt::config::Config;
///
/// let cfg = Config { keepalive: Milliseconds(30_000),
///                    ..Default::default() };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Config {
  /// Base timeout before the first retransmission of an
  /// un-acked outbound CON message.
  ///
  /// The actual initial timeout is drawn uniformly from
  /// `[ack_timeout, ack_timeout + ack_random_factor)` and doubles
  /// after every retransmission.
  ///
  /// Defaults to 2000 milliseconds:
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use newt::config::Config;
  ///
  /// assert_eq!(Config::default().ack_timeout, Milliseconds(2_000u64));
  /// ```
  pub ack_timeout: Millis,

  /// Upper bound (exclusive) of the random jitter added to
  /// [`ack_timeout`](Config.ack_timeout), drawn independently per
  /// registered exchange.
  ///
  /// Defaults to 1000 milliseconds:
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use newt::config::Config;
  ///
  /// assert_eq!(Config::default().ack_random_factor,
  ///            Milliseconds(1_000u64));
  /// ```
  pub ack_random_factor: Millis,

  /// Number of times an un-acked outbound CON message is resent
  /// before the exchange (and with it the session) is considered
  /// failed.
  ///
  /// Defaults to 4 attempts:
  /// ```
  /// use newt::config::Config;
  /// use newt::retry::Attempts;
  ///
  /// assert_eq!(Config::default().max_retransmits, Attempts(4));
  /// ```
  pub max_retransmits: Attempts,

  /// How long we give the application to answer an inbound CON
  /// request before giving up on piggybacking and sending an empty
  /// ACK (forcing the eventual response to go out as a separate CON
  /// exchange).
  ///
  /// Defaults to 1000 milliseconds:
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use newt::config::Config;
  ///
  /// assert_eq!(Config::default().processing_delay,
  ///            Milliseconds(1_000u64));
  /// ```
  pub processing_delay: Millis,

  /// How long a session may go without any decodable inbound traffic
  /// before it is reaped as idle.
  ///
  /// Defaults to one hour:
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use newt::config::Config;
  ///
  /// assert_eq!(Config::default().keepalive, Milliseconds(3_600_000u64));
  /// ```
  pub keepalive: Millis,
}

impl Default for Config {
  fn default() -> Self {
    Config { ack_timeout: Milliseconds(2_000),
             ack_random_factor: Milliseconds(1_000),
             max_retransmits: Attempts(4),
             processing_delay: Milliseconds(1_000),
             keepalive: Milliseconds(3_600_000) }
  }
}
