//! The wire codec boundary.
//!
//! `newt` leans on [`coap_lite`] for parsing and serialization and
//! keeps its own fingers out of the byte layout; this module is the
//! small set of constructors and accessors the session layer needs on
//! top of [`Packet`].

use coap_lite::{CoapOption, MessageClass, MessageType, Packet, ResponseType};

/// Does this message carry a request method (GET/POST/PUT/DELETE)?
///
/// Messages that don't (responses, empty messages, reserved codes)
/// cannot be routed to a responder.
pub fn is_request(msg: &Packet) -> bool {
  matches!(msg.header.code, MessageClass::Request(_))
}

/// The request path, reassembled from the Uri-Path options.
///
/// Segments are joined with `/` and no leading slash is added, so a
/// request for `/who/am/i` yields `"who/am/i"`. Non-utf8 segments are
/// replaced lossily; the responder resolver decides what to do with
/// the result.
pub fn path(msg: &Packet) -> String {
  match msg.get_option(CoapOption::UriPath) {
    | None => String::new(),
    | Some(segs) => segs.iter()
                        .map(|seg| String::from_utf8_lossy(seg).into_owned())
                        .collect::<Vec<_>>()
                        .join("/"),
  }
}

/// An empty acknowledgement for message id `id`.
///
/// Empty means empty: no code, no token, no payload. This is the
/// "I heard you, answer comes later" message of a separate response
/// exchange.
pub fn empty_ack(id: u16) -> Packet {
  let mut msg = Packet::new();
  msg.header.set_type(MessageType::Acknowledgement);
  msg.header.code = MessageClass::Empty;
  msg.header.message_id = id;
  msg
}

/// A reset message for message id `id`, sent when a peer's message
/// can't be processed at all (e.g. a CON carrying no method).
pub fn rst(id: u16) -> Packet {
  let mut msg = Packet::new();
  msg.header.set_type(MessageType::Reset);
  msg.header.code = MessageClass::Empty;
  msg.header.message_id = id;
  msg
}

/// An error response echoing `req`'s id and token, typed as an ACK.
///
/// Used when responder resolution fails; the declared ACK type is
/// kept even for NON requests, matching the long-observed behavior of
/// this layer.
pub fn error_reply(req: &Packet, code: ResponseType) -> Packet {
  let mut msg = Packet::new();
  msg.header.set_type(MessageType::Acknowledgement);
  msg.header.code = MessageClass::Response(code);
  msg.header.message_id = req.header.message_id;
  msg.set_token(req.get_token().clone());
  msg
}
