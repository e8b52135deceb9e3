//! `newt` is the per-endpoint message-exchange layer of a CoAP server:
//! the piece that turns "unreliable UDP datagrams" into the
//! confirmable / non-confirmable exchange semantics of
//! [RFC7252](https://datatracker.ietf.org/doc/html/rfc7252) for one
//! remote peer.
//!
//! One [`session::Session`] is created per remote `(address, port)`
//! pair and owns everything that peer's exchanges need:
//! - message id allocation ([`msg_id`])
//! - retransmission of outbound CON messages with jittered exponential
//!   backoff ([`retrans`], [`retry`])
//! - deduplication and delayed acknowledgement of inbound CON requests
//!   ([`dedup`])
//! - idle-session reaping via a keepalive timer ([`keepalive`])
//!
//! ## Sans-io
//! The session never touches a socket and never blocks. Inbound
//! datagrams and outbound response requests are methods; time is an
//! [`embedded_time::Instant`] passed in by the caller; network sends
//! and log lines come back out as [`session::Effect`]s for the
//! embedding runtime to perform. This keeps the whole state machine
//! deterministic: feed it the same sequence of events and clock
//! readings and you get the same sequence of effects.
//!
//! ## Who parses
//! Wire parsing and serialization are delegated to [`coap_lite`];
//! `newt` only decides *when* messages are (re)sent, acked, reset or
//! dropped.

// style
#![allow(clippy::unused_unit)]
// deny
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// warnings
#![cfg_attr(not(test), warn(unreachable_pub))]


pub(crate) mod logging;

/// configuring runtime behavior
pub mod config;

/// deduplication & delayed acknowledgement of inbound CON requests
pub mod dedup;

/// idle-session keepalive timer
pub mod keepalive;

/// wire codec boundary
pub mod msg;

/// message id allocation
pub mod msg_id;

/// network addressing
pub mod net;

/// retransmission of outbound CON messages
pub mod retrans;

/// non-blocking exponential-backoff timers
pub mod retry;

/// the per-endpoint session actor
pub mod session;

/// `std`-only newt stuff
pub mod std;

/// time abstractions
pub mod time;
