use coap_lite::Packet;

pub(crate) fn msg_summary(msg: &Packet) -> String {
  format!("{:?} {:?} id {} with {} byte payload",
          msg.header.get_type(),
          msg.header.code,
          msg.header.message_id,
          msg.payload.len())
}
