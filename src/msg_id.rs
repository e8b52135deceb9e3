//! Message ids identify an exchange at the transport-reliability
//! layer; each outbound message that is not an ACK or RST reply gets
//! a fresh one.
//!
//! The session stores the id it last issued (initially 0) and calls
//! [`next`] to advance it, so ids strictly cycle `1, 2, ..., 65535, 1,
//! ...` and `0` is never put on the wire by us.

/// The next message id after `current`.
///
/// Pure and total: wraps from `u16::MAX` back to 1, skipping 0.
///
/// ```
/// use newt::msg_id::next;
///
/// assert_eq!(next(0), 1);
/// assert_eq!(next(1), 2);
/// assert_eq!(next(u16::MAX), 1);
/// ```
pub const fn next(current: u16) -> u16 {
  if current == u16::MAX {
    1
  } else {
    current + 1
  }
}

#[cfg(test)]
mod tests {
  use super::next;

  #[test]
  fn never_yields_zero() {
    let mut id = 0u16;
    for _ in 0..=(u16::MAX as u32 + 10) {
      id = next(id);
      assert_ne!(id, 0);
    }
  }

  #[test]
  fn strictly_cycles() {
    let mut id = 0u16;
    for expect in 1..=u16::MAX {
      id = next(id);
      assert_eq!(id, expect);
    }
    assert_eq!(next(id), 1);
  }
}
