//! A single-threaded UDP CoAP server that gives every peer its own
//! `newt` session and performs the effects the sessions emit.
//!
//! Answers GET /hello; everything else is 4.04.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use coap_lite::{MessageClass, MessageType, Packet, ResponseType};
use embedded_time::Clock as _;
use newt::config::Config;
use newt::net::Addrd;
use newt::session::{Dispatch, Effect, Effects, Session};

#[derive(Default)]
struct Responders {
  delivered: Vec<(String, Addrd<Packet>)>,
}

impl Dispatch for Responders {
  fn dispatch(&mut self, path: &str, req: &Addrd<Packet>) -> Result<(), ResponseType> {
    match path {
      | "hello" => {
        self.delivered.push((path.into(), req.clone()));
        Ok(())
      },
      | _ => Err(ResponseType::NotFound),
    }
  }
}

fn perform(sock: &UdpSocket, fx: Effects) -> std::io::Result<()> {
  for effect in fx {
    match effect {
      | Effect::Send(Addrd(bytes, addr)) => {
        sock.send_to(&bytes, addr)?;
      },
      | Effect::Log(level, line) => log::log!(level, "{}", line),
    }
  }
  Ok(())
}

fn main() -> std::io::Result<()> {
  simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Trace)
                                    .init()
                                    .unwrap();

  let clock = newt::std::Clock::new();
  let sock = UdpSocket::bind("0.0.0.0:5683")?;
  sock.set_read_timeout(Some(Duration::from_millis(100)))?;
  log::info!("listening on {}", sock.local_addr()?);

  let mut sessions = HashMap::<SocketAddr, Session<newt::std::Clock>>::new();
  let mut responders = Responders::default();
  let mut buf = [0u8; 1152];

  loop {
    let mut fx = Effects::new();

    match sock.recv_from(&mut buf) {
      | Ok((n, addr)) => {
        let now = clock.try_now().unwrap();
        let session = sessions.entry(addr)
                              .or_insert_with(|| {
                                log::info!("new session for {}", addr);
                                Session::new(addr, Config::default(), now)
                              });
        session.on_dgram(now, &buf[..n], &mut responders, &mut fx);
      },
      | Err(e)
        if matches!(e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) =>
      {
        ()
      },
      | Err(e) => return Err(e),
    }

    let now = clock.try_now().unwrap();

    for (path, req) in responders.delivered.drain(..) {
      if let Some(session) = sessions.get_mut(&req.addr()) {
        let mut rep = Packet::new();
        rep.header.set_type(MessageType::Acknowledgement);
        rep.header.code = MessageClass::Response(ResponseType::Content);
        rep.header.message_id = req.data().header.message_id;
        rep.set_token(req.data().get_token().clone());
        rep.payload = format!("hi from /{}", path).into_bytes();
        session.send_response(now, rep, &mut fx);
      }
    }

    let mut dead = vec![];
    for (addr, session) in sessions.iter_mut() {
      if let Some(exit) = session.poll(now, &mut fx) {
        log::info!("{} exited: {:?}", addr, exit);
        dead.push(*addr);
      }
    }
    for addr in dead {
      sessions.remove(&addr);
    }

    perform(&sock, fx)?;
  }
}
