//! Deduplication & delayed acknowledgement of inbound CON requests.
//!
//! Every accepted confirmable request is owed exactly one
//! acknowledgement. If the application answers within the configured
//! processing delay the answer rides piggybacked on the ACK; if not,
//! an empty ACK goes out when the delay elapses and the eventual
//! answer becomes its own separate CON exchange. The [`DedupTracker`]
//! is the bookkeeping for that promise, keyed by the *peer-chosen*
//! message id of the request.

use std::collections::BTreeMap;

use embedded_time::Instant;

use crate::time::{self, Clock, Millis};

/// How an application response for a given request id should leave
/// the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
  /// The delayed-ack timer was still pending: ride the response on
  /// the ACK, reusing the request's id.
  Piggyback,
  /// The empty ACK already went out: the response needs a fresh id,
  /// CON type, and its own retransmission tracking.
  Separate,
  /// Nothing owed (request was NON, or already settled): send as-is
  /// with a fresh id, no tracking.
  Plain,
}

#[derive(Debug, Clone)]
enum Pending<C: Clock> {
  /// Delayed ack scheduled but not yet sent
  Scheduled { token: Vec<u8>, since: Instant<C> },
  /// Empty ack sent; a separate response is still owed
  AckSent { token: Vec<u8> },
}

/// Table of inbound CON requests whose acknowledgement is pending or
/// whose separate response is still owed.
///
/// Exclusively owned and mutated by the session; a given id appears
/// at most once.
#[derive(Debug, Clone)]
pub struct DedupTracker<C: Clock> {
  delay: Millis,
  entries: BTreeMap<u16, Pending<C>>,
}

impl<C: Clock> DedupTracker<C> {
  /// Create an empty tracker whose delayed acks fire `delay`
  /// milliseconds after a request is accepted.
  pub fn new(delay: Millis) -> Self {
    Self { delay,
           entries: BTreeMap::new() }
  }

  /// An inbound confirmable request with a resolvable method was
  /// accepted; schedule its delayed ack.
  ///
  /// Returns `false` (and changes nothing) when `id` is already
  /// tracked, which means the datagram is a retransmission of a
  /// request we are still working on and must not be re-delivered.
  pub fn accept(&mut self, id: u16, token: Vec<u8>, now: Instant<C>) -> bool {
    if self.entries.contains_key(&id) {
      return false;
    }

    self.entries
        .insert(id, Pending::Scheduled { token, since: now });
    true
  }

  /// The application produced a response for `id`; decide how it
  /// goes out. Always removes the entry.
  pub fn settle(&mut self, id: u16) -> Settlement {
    match self.entries.remove(&id) {
      | Some(Pending::Scheduled { .. }) => Settlement::Piggyback,
      | Some(Pending::AckSent { .. }) => Settlement::Separate,
      | None => Settlement::Plain,
    }
  }

  /// Collect the ids whose delayed-ack deadline has passed,
  /// transitioning them to the "empty ack sent" state.
  ///
  /// The caller is expected to actually emit the empty ACKs.
  pub fn poll(&mut self, now: Instant<C>) -> Vec<u16> {
    let delay = self.delay;
    let fired = self.entries
                    .iter()
                    .filter_map(|(id, pending)| match pending {
                      | Pending::Scheduled { since, .. }
                        if time::elapsed(*since, now) >= delay =>
                      {
                        Some(*id)
                      },
                      | _ => None,
                    })
                    .collect::<Vec<_>>();

    for id in fired.iter() {
      if let Some(Pending::Scheduled { token, .. }) = self.entries.remove(id) {
        self.entries.insert(*id, Pending::AckSent { token });
      }
    }

    fired
  }

  /// The peer sent RST for `id`: it no longer expects a response, so
  /// a still-pending delayed ack is canceled. An entry whose empty
  /// ack already went out is left alone.
  pub fn reset(&mut self, id: u16) -> bool {
    match self.entries.get(&id) {
      | Some(Pending::Scheduled { .. }) => {
        self.entries.remove(&id);
        true
      },
      | _ => false,
    }
  }

  /// Drop whatever state `id` has, pending or fired. Used when we
  /// ourselves answer with RST.
  pub fn clear(&mut self, id: u16) -> bool {
    self.entries.remove(&id).is_some()
  }

  /// The token recorded for `id`, if tracked. Response correlation
  /// is by id; the token is retained for logging and debugging.
  pub fn token(&self, id: u16) -> Option<&[u8]> {
    self.entries.get(&id).map(|pending| match pending {
                           | Pending::Scheduled { token, .. } => token.as_slice(),
                           | Pending::AckSent { token } => token.as_slice(),
                         })
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
