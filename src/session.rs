//! The per-endpoint session actor.
//!
//! One [`Session`] lives for the duration of a conversation with one
//! remote `(address, port)` pair. The embedding runtime demultiplexes
//! datagrams to it, forwards application responses into it, and polls
//! it for timer work; everything the session wants done in the world
//! comes back as [`Effect`]s.
//!
//! There is no named state enumeration; the session's "state" is the
//! contents of its two tables plus the keepalive window, and behavior
//! is dispatched purely on the type of each inbound message.

use std::net::SocketAddr;

use coap_lite::{MessageType, Packet, ResponseType};
use embedded_time::Instant;

use crate::config::Config;
use crate::dedup::{DedupTracker, Settlement};
use crate::keepalive::ActivityTimer;
use crate::logging::msg_summary;
use crate::net::Addrd;
use crate::time::Clock;
use crate::retrans::RetransTracker;
use crate::{msg, msg_id};

/// Used by the [`Session`] to deterministically communicate
/// side-effects it would like the embedding runtime to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
  /// Put these bytes on the wire, best-effort; reliability is this
  /// crate's job, not the transport's.
  Send(Addrd<Vec<u8>>),
  /// Emit a log line (e.g. via `log::log!`)
  Log(log::Level, String),
}

/// How we store a sequence of effects to perform
pub type Effects = Vec<Effect>;

/// Why a session ended.
///
/// Both variants are *normal* lifecycle events. The supervisor
/// reclaims the session; nothing panics, nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
  /// No decodable inbound traffic for the keepalive interval
  Idle,
  /// Retransmission of the contained outbound message id was
  /// exhausted without an ACK
  Exhausted(u16),
}

/// Responder lookup & delivery, implemented by the application
/// layer.
///
/// The session hands over the request path and the full request; the
/// implementor either accepts delivery (and is expected to call
/// [`Session::send_response`] with a message carrying the same token,
/// now or later) or rejects it with a response code which the session
/// echoes back to the peer.
pub trait Dispatch {
  /// Resolve a responder for `path` and deliver `req` to it.
  fn dispatch(&mut self, path: &str, req: &Addrd<Packet>) -> Result<(), ResponseType>;
}

/// The session state machine for one remote endpoint.
///
/// Owns the message-id counter, the
/// [dedup table](crate::dedup::DedupTracker), the
/// [retransmission table](crate::retrans::RetransTracker) and the
/// [keepalive window](crate::keepalive::ActivityTimer); nothing else
/// ever reads or writes them.
#[derive(Debug, Clone)]
pub struct Session<C: Clock> {
  addr: SocketAddr,
  cfg: Config,
  last_id: u16,
  dedup: DedupTracker<C>,
  retrans: RetransTracker<C>,
  keepalive: ActivityTimer<C>,
}

impl<C: Clock> Session<C> {
  /// Create a session for the peer at `addr`, with its keepalive
  /// window starting at `now`.
  pub fn new(addr: SocketAddr, cfg: Config, now: Instant<C>) -> Self {
    Self { addr,
           cfg,
           last_id: 0,
           dedup: DedupTracker::new(cfg.processing_delay),
           retrans: RetransTracker::new(cfg.ack_timeout,
                                        cfg.ack_random_factor,
                                        cfg.max_retransmits),
           keepalive: ActivityTimer::start(now, cfg.keepalive) }
  }

  /// The remote endpoint this session serves
  pub fn addr(&self) -> SocketAddr {
    self.addr
  }

  /// Inbound CON requests whose acknowledgement is still owed
  pub fn pending_acks(&self) -> usize {
    self.dedup.len()
  }

  /// Outbound CON messages awaiting acknowledgement
  pub fn pending_retrans(&self) -> usize {
    self.retrans.len()
  }

  /// A datagram arrived from the peer.
  ///
  /// Undecodable bytes are logged and dropped without touching any
  /// state (not even the keepalive window); decoded messages kick the
  /// keepalive and are dispatched on their type.
  pub fn on_dgram<D>(&mut self,
                     now: Instant<C>,
                     dgram: &[u8],
                     dispatch: &mut D,
                     effects: &mut Effects)
    where D: Dispatch
  {
    let msg = match Packet::from_bytes(dgram) {
      | Ok(msg) => msg,
      | Err(e) => {
        effects.push(Effect::Log(log::Level::Warn,
                                 format!("{}: dropping undecodable {} byte datagram ({:?})",
                                         self.addr,
                                         dgram.len(),
                                         e)));
        return;
      },
    };

    self.keepalive.kick(now);

    match msg.header.get_type() {
      | MessageType::Confirmable => self.on_con(now, msg, dispatch, effects),
      | MessageType::NonConfirmable => self.on_non(now, msg, dispatch, effects),
      | MessageType::Acknowledgement => self.on_ack(msg, effects),
      | MessageType::Reset => self.on_reset(msg, effects),
    }
  }

  /// The application (or the session itself, for error and RST
  /// replies) wants `msg` delivered to the peer.
  ///
  /// Routing is by the message's declared type and the dedup table's
  /// state for its id:
  /// - RST goes out as-is, clearing any dedup entry for the id
  /// - a response whose request is still awaiting its delayed ack is
  ///   piggybacked (type rewritten to ACK, id reused)
  /// - a response whose empty ack already went out becomes a fresh
  ///   CON exchange with retransmission tracking
  /// - anything else goes out plain under a fresh id
  pub fn send_response(&mut self, now: Instant<C>, mut msg: Packet, effects: &mut Effects) {
    if matches!(msg.header.get_type(), MessageType::Reset) {
      self.dedup.clear(msg.header.message_id);
      self.transmit(&msg, effects);
      return;
    }

    match self.dedup.settle(msg.header.message_id) {
      | Settlement::Piggyback => {
        msg.header.set_type(MessageType::Acknowledgement);
        self.transmit(&msg, effects);
      },
      | Settlement::Separate => {
        let id = self.alloc_id();
        msg.header.message_id = id;
        msg.header.set_type(MessageType::Confirmable);
        if let Some(bytes) = self.transmit(&msg, effects) {
          self.retrans.register(id, bytes, now);
        }
      },
      | Settlement::Plain => {
        msg.header.message_id = self.alloc_id();
        self.transmit(&msg, effects);
      },
    }
  }

  /// Drive every timer the session owns against `now`.
  ///
  /// Emits due empty ACKs and retransmissions, then reports whether
  /// the session should terminate (exhausted exchange or expired
  /// keepalive). `None` means "keep going, poll me again later."
  pub fn poll(&mut self, now: Instant<C>, effects: &mut Effects) -> Option<Exit> {
    for id in self.dedup.poll(now) {
      let line = format!("{}: processing delay elapsed for id {} (token {:?}), acking empty",
                         self.addr,
                         id,
                         self.dedup.token(id).unwrap_or(&[]));
      effects.push(Effect::Log(log::Level::Debug, line));
      self.transmit(&msg::empty_ack(id), effects);
    }

    let fired = self.retrans.poll(now);
    for bytes in fired.resend {
      effects.push(Effect::Log(log::Level::Debug,
                               format!("{}: retransmitting {} byte datagram",
                                       self.addr,
                                       bytes.len())));
      effects.push(Effect::Send(Addrd(bytes, self.addr)));
    }
    if let Some(id) = fired.exhausted {
      effects.push(Effect::Log(log::Level::Warn,
                               format!("{}: id {} never acked, giving up on this peer",
                                       self.addr, id)));
      return Some(Exit::Exhausted(id));
    }

    if self.keepalive.is_expired(now) {
      effects.push(Effect::Log(log::Level::Info,
                               format!("{}: no traffic for {}ms, reaping idle session",
                                       self.addr, self.cfg.keepalive.0)));
      return Some(Exit::Idle);
    }

    None
  }

  fn on_con<D>(&mut self,
               now: Instant<C>,
               msg: Packet,
               dispatch: &mut D,
               effects: &mut Effects)
    where D: Dispatch
  {
    let id = msg.header.message_id;

    if !msg::is_request(&msg) {
      effects.push(Effect::Log(log::Level::Debug,
                               format!("{}: CON without a method ({}), resetting",
                                       self.addr,
                                       msg_summary(&msg))));
      self.send_response(now, msg::rst(id), effects);
      return;
    }

    if !self.dedup.accept(id, msg.get_token().clone(), now) {
      effects.push(Effect::Log(log::Level::Debug,
                               format!("{}: duplicate CON request id {}, dropping",
                                       self.addr, id)));
      return;
    }

    self.deliver(now, msg, dispatch, effects);
  }

  fn on_non<D>(&mut self,
               now: Instant<C>,
               msg: Packet,
               dispatch: &mut D,
               effects: &mut Effects)
    where D: Dispatch
  {
    if !msg::is_request(&msg) {
      effects.push(Effect::Log(log::Level::Trace,
                               format!("{}: ignoring NON non-request ({})",
                                       self.addr,
                                       msg_summary(&msg))));
      return;
    }

    self.deliver(now, msg, dispatch, effects);
  }

  fn on_ack(&mut self, msg: Packet, effects: &mut Effects) {
    let id = msg.header.message_id;
    if self.retrans.acknowledge(id) {
      effects.push(Effect::Log(log::Level::Trace,
                               format!("{}: id {} acked", self.addr, id)));
    } else {
      effects.push(Effect::Log(log::Level::Debug,
                               format!("{}: ACK for unknown id {}, ignoring",
                                       self.addr, id)));
    }
  }

  fn on_reset(&mut self, msg: Packet, effects: &mut Effects) {
    let id = msg.header.message_id;
    if self.dedup.reset(id) {
      effects.push(Effect::Log(log::Level::Debug,
                               format!("{}: peer reset id {}, delayed ack canceled",
                                       self.addr, id)));
    }
  }

  fn deliver<D>(&mut self,
                now: Instant<C>,
                msg: Packet,
                dispatch: &mut D,
                effects: &mut Effects)
    where D: Dispatch
  {
    let path = msg::path(&msg);
    let req = Addrd(msg, self.addr);

    match dispatch.dispatch(&path, &req) {
      | Ok(()) => {
        effects.push(Effect::Log(log::Level::Trace,
                                 format!("{}: delivered {} for /{}",
                                         self.addr,
                                         msg_summary(req.data()),
                                         path)));
      },
      | Err(code) => {
        effects.push(Effect::Log(log::Level::Debug,
                                 format!("{}: no responder for /{}, replying {:?}",
                                         self.addr, path, code)));
        let reply = msg::error_reply(req.data(), code);
        self.send_response(now, reply, effects);
      },
    }
  }

  /// Encode and queue `msg` for sending.
  ///
  /// An encode failure can only mean the message we built is
  /// malformed; it is logged and swallowed so the session survives.
  fn transmit(&mut self, msg: &Packet, effects: &mut Effects) -> Option<Vec<u8>> {
    match msg.to_bytes() {
      | Ok(bytes) => {
        effects.push(Effect::Log(log::Level::Trace,
                                 format!("{}: sending {}", self.addr, msg_summary(msg))));
        effects.push(Effect::Send(Addrd(bytes.clone(), self.addr)));
        Some(bytes)
      },
      | Err(e) => {
        effects.push(Effect::Log(log::Level::Error,
                                 format!("{}: failed to encode {} ({:?}), dropping",
                                         self.addr,
                                         msg_summary(msg),
                                         e)));
        None
      },
    }
  }

  fn alloc_id(&mut self) -> u16 {
    self.last_id = msg_id::next(self.last_id);
    self.last_id
  }
}

#[cfg(test)]
mod tests {
  use coap_lite::MessageClass;
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::retry::Attempts;
  use crate::test::{self, ClockMock, DispatchMock};

  fn session(cfg: Config) -> Session<ClockMock> {
    Session::new(test::dummy_addr(), cfg, ClockMock::instant(0))
  }

  fn quick_retrans_config() -> Config {
    // deterministic schedule: no jitter, 100ms base
    Config { ack_timeout: Milliseconds(100),
             ack_random_factor: Milliseconds(0),
             max_retransmits: Attempts(4),
             ..Default::default() }
  }

  #[test]
  fn fast_responder_gets_piggybacked_ack() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    let req = test::con_get(42, &[1, 2], "who/am/i");
    s.on_dgram(ClockMock::instant(0), &test::bytes(&req), &mut dispatch, &mut fx);

    assert_eq!(dispatch.seen.len(), 1);
    assert_eq!(dispatch.seen[0].0, "who/am/i");
    assert_eq!(test::sent(&fx).len(), 0);
    assert_eq!(s.pending_acks(), 1);

    // responder answers well within the processing delay
    s.send_response(ClockMock::instant(10),
                    test::response_to(&req, MessageType::Confirmable),
                    &mut fx);

    let sent = test::sent(&fx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].header.get_type(), MessageType::Acknowledgement));
    assert_eq!(sent[0].header.message_id, 42);
    assert_eq!(sent[0].get_token(), &vec![1, 2]);

    assert_eq!(s.pending_acks(), 0);
    assert_eq!(s.pending_retrans(), 0);

    // nothing owed: future polls emit nothing
    let mut fx = Effects::new();
    assert_eq!(s.poll(ClockMock::instant(100_000), &mut fx), None);
    assert_eq!(test::sent(&fx).len(), 0);
  }

  #[test]
  fn slow_responder_gets_empty_ack_then_separate_con() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    let req = test::con_get(42, &[7], "slow");
    s.on_dgram(ClockMock::instant(0), &test::bytes(&req), &mut dispatch, &mut fx);

    // processing delay elapses before the app answers
    assert_eq!(s.poll(ClockMock::instant(1_000), &mut fx), None);
    let sent = test::sent(&fx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].header.get_type(), MessageType::Acknowledgement));
    assert!(matches!(sent[0].header.code, MessageClass::Empty));
    assert_eq!(sent[0].header.message_id, 42);
    assert!(sent[0].get_token().is_empty());

    // the log line names the token the ack is owed for
    assert!(fx.iter().any(|e| {
              matches!(e, Effect::Log(log::Level::Debug, line) if line.contains("token [7]"))
            }));

    // the late answer becomes a separate CON under a fresh id
    let mut fx = Effects::new();
    s.send_response(ClockMock::instant(1_500),
                    test::response_to(&req, MessageType::Confirmable),
                    &mut fx);

    let sent = test::sent(&fx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].header.get_type(), MessageType::Confirmable));
    assert_eq!(sent[0].header.message_id, 1);
    assert_eq!(sent[0].get_token(), &vec![7]);
    assert_eq!(s.pending_retrans(), 1);

    // the peer acks the separate response; tracking stops
    let mut fx = Effects::new();
    s.on_dgram(ClockMock::instant(1_600),
               &test::bytes(&test::ack_for(1)),
               &mut dispatch,
               &mut fx);
    assert_eq!(s.pending_retrans(), 0);
  }

  #[test]
  fn unacked_separate_response_retransmits_then_kills_session() {
    let mut s = session(quick_retrans_config());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    let req = test::con_get(5, &[], "slow");
    s.on_dgram(ClockMock::instant(0), &test::bytes(&req), &mut dispatch, &mut fx);
    s.poll(ClockMock::instant(1_000), &mut fx); // empty ack

    s.send_response(ClockMock::instant(1_000),
                    test::response_to(&req, MessageType::Confirmable),
                    &mut fx);
    assert_eq!(s.pending_retrans(), 1);

    // registered at t=1000 with base 100ms: fires at 1100, 1300,
    // 1700, 2500; the fifth fire at 4100 is terminal
    let mut resends = 0;
    for at in [1_100u64, 1_300, 1_700, 2_500] {
      let mut fx = Effects::new();
      assert_eq!(s.poll(ClockMock::instant(at), &mut fx), None);
      resends += test::sent(&fx).len();
    }
    assert_eq!(resends, 4);

    let mut fx = Effects::new();
    assert_eq!(s.poll(ClockMock::instant(4_100), &mut fx),
               Some(Exit::Exhausted(1)));
  }

  #[test]
  fn late_and_duplicate_acks_are_noops() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    s.on_dgram(ClockMock::instant(0),
               &test::bytes(&test::ack_for(999)),
               &mut dispatch,
               &mut fx);

    assert_eq!(test::sent(&fx).len(), 0);
    assert_eq!(s.pending_retrans(), 0);
  }

  #[test]
  fn peer_reset_cancels_delayed_ack() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    let req = test::con_get(8, &[3], "x");
    s.on_dgram(ClockMock::instant(0), &test::bytes(&req), &mut dispatch, &mut fx);
    s.on_dgram(ClockMock::instant(10),
               &test::bytes(&test::reset_for(8)),
               &mut dispatch,
               &mut fx);

    assert_eq!(s.pending_acks(), 0);

    // no ack is ever sent for that id
    let mut fx = Effects::new();
    assert_eq!(s.poll(ClockMock::instant(10_000), &mut fx), None);
    assert_eq!(test::sent(&fx).len(), 0);

    // and a late response is sent plain, under a fresh id
    let mut fx = Effects::new();
    s.send_response(ClockMock::instant(10_000),
                    test::response_to(&req, MessageType::NonConfirmable),
                    &mut fx);
    let sent = test::sent(&fx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].header.get_type(), MessageType::NonConfirmable));
    assert_eq!(sent[0].header.message_id, 1);
    assert_eq!(s.pending_retrans(), 0);
  }

  #[test]
  fn duplicate_con_request_is_delivered_once() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    let req = test::con_get(9, &[], "x");
    s.on_dgram(ClockMock::instant(0), &test::bytes(&req), &mut dispatch, &mut fx);
    s.on_dgram(ClockMock::instant(50), &test::bytes(&req), &mut dispatch, &mut fx);

    assert_eq!(dispatch.seen.len(), 1);
    assert_eq!(test::sent(&fx).len(), 0);
    assert_eq!(s.pending_acks(), 1);
  }

  #[test]
  fn con_without_method_gets_reset() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    // a CON response is not something a server session can process
    let mut bogus = test::response_to(&test::con_get(33, &[], ""), MessageType::Confirmable);
    bogus.header.message_id = 33;
    s.on_dgram(ClockMock::instant(0), &test::bytes(&bogus), &mut dispatch, &mut fx);

    assert_eq!(dispatch.seen.len(), 0);
    let sent = test::sent(&fx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].header.get_type(), MessageType::Reset));
    assert_eq!(sent[0].header.message_id, 33);

    // replying RST must not burn a message id
    let mut fx = Effects::new();
    s.send_response(ClockMock::instant(1),
                    test::response_to(&test::non_get(1, &[], "x"),
                                      MessageType::NonConfirmable),
                    &mut fx);
    assert_eq!(test::sent(&fx)[0].header.message_id, 1);
  }

  #[test]
  fn resolver_failure_on_con_is_an_error_ack() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::rejecting(ResponseType::NotFound);
    let mut fx = Effects::new();

    let req = test::con_get(21, &[9], "nope");
    s.on_dgram(ClockMock::instant(0), &test::bytes(&req), &mut dispatch, &mut fx);

    let sent = test::sent(&fx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].header.get_type(), MessageType::Acknowledgement));
    assert!(matches!(sent[0].header.code,
                     MessageClass::Response(ResponseType::NotFound)));
    assert_eq!(sent[0].header.message_id, 21);
    assert_eq!(sent[0].get_token(), &vec![9]);

    // the dedup entry was cleared with the piggybacked error
    assert_eq!(s.pending_acks(), 0);
    let mut fx = Effects::new();
    assert_eq!(s.poll(ClockMock::instant(10_000), &mut fx), None);
    assert_eq!(test::sent(&fx).len(), 0);
  }

  #[test]
  fn non_request_roundtrip_is_untracked() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    let req = test::non_get(70, &[4], "sensor");
    s.on_dgram(ClockMock::instant(0), &test::bytes(&req), &mut dispatch, &mut fx);

    assert_eq!(dispatch.seen.len(), 1);
    assert_eq!(s.pending_acks(), 0);

    s.send_response(ClockMock::instant(5),
                    test::response_to(&req, MessageType::NonConfirmable),
                    &mut fx);

    let sent = test::sent(&fx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].header.get_type(), MessageType::NonConfirmable));
    assert_eq!(sent[0].header.message_id, 1);
    assert_eq!(s.pending_retrans(), 0);
  }

  #[test]
  fn resolver_failure_on_non_still_acks() {
    // semantically odd (NON exchanges aren't acknowledged) but
    // long-observed behavior of this layer
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::rejecting(ResponseType::MethodNotAllowed);
    let mut fx = Effects::new();

    let req = test::non_get(70, &[], "nope");
    s.on_dgram(ClockMock::instant(0), &test::bytes(&req), &mut dispatch, &mut fx);

    let sent = test::sent(&fx);
    assert_eq!(sent.len(), 1);
    assert!(matches!(sent[0].header.get_type(), MessageType::Acknowledgement));
    assert_eq!(sent[0].header.message_id, 1);
    assert_eq!(s.pending_retrans(), 0);
  }

  #[test]
  fn undecodable_datagram_is_dropped_quietly() {
    let mut s = session(Config::default());
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    s.on_dgram(ClockMock::instant(0), &[0xff], &mut dispatch, &mut fx);

    assert_eq!(dispatch.seen.len(), 0);
    assert_eq!(test::sent(&fx).len(), 0);
    assert!(fx.iter()
              .any(|e| matches!(e, Effect::Log(log::Level::Warn, _))));
  }

  #[test]
  fn idle_session_is_reaped_and_traffic_extends_it() {
    let cfg = Config { keepalive: Milliseconds(1_000),
                       ..Default::default() };
    let mut s = session(cfg);
    let mut dispatch = DispatchMock::accepting();
    let mut fx = Effects::new();

    assert_eq!(s.poll(ClockMock::instant(999), &mut fx), None);

    // decodable traffic resets the window
    s.on_dgram(ClockMock::instant(500),
               &test::bytes(&test::non_get(1, &[], "ping")),
               &mut dispatch,
               &mut fx);
    assert_eq!(s.poll(ClockMock::instant(1_400), &mut fx), None);

    // garbage does not
    s.on_dgram(ClockMock::instant(1_450), &[0xff], &mut dispatch, &mut fx);
    assert_eq!(s.poll(ClockMock::instant(1_500), &mut fx), Some(Exit::Idle));
  }
}
