//! Line framing between the radio stick and [`Packet`]s.
//!
//! Received lines look like `A0D1AA0011D8A4C200A1B01050000\r\n`; outgoing
//! packets are written as `As0D1AA0...\r\n`.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::core::packet::{Packet, Parsed};
use crate::error::BidCoSError;

/// Lines longer than this without a terminator are discarded.
pub const MAX_LINE_LENGTH: usize = 1024;

#[derive(Debug, Clone)]
pub struct BidCoSCodec {
    frame_prefix: Option<char>,
    send_prefix: String,
}

impl Default for BidCoSCodec {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl BidCoSCodec {
    pub fn new(frame_prefix: Option<char>, send_prefix: impl Into<String>) -> Self {
        Self {
            frame_prefix,
            send_prefix: send_prefix.into(),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(config.frame_prefix, config.send_prefix.clone())
    }
}

impl Decoder for BidCoSCodec {
    type Item = Parsed<Packet>;
    type Error = BidCoSError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_LINE_LENGTH {
                    warn!(len = src.len(), "Discarding unterminated line");
                    src.clear();
                }
                return Ok(None);
            };

            let line = src.split_to(end + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }

            let framed = match self.frame_prefix {
                Some(prefix) if text.starts_with(prefix) => true,
                Some(_) => {
                    debug!(line = %text, "Ignoring non-packet line");
                    continue;
                }
                None => false,
            };
            return Ok(Some(Packet::parse(text, framed)));
        }
    }

    /// A final line without terminator is still decoded once the stream ends.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        src.put_u8(b'\n');
        let frame = self.decode(src)?;
        src.clear();
        Ok(frame)
    }
}

impl Encoder<&Packet> for BidCoSCodec {
    type Error = BidCoSError;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let hex = item.serialize();
        dst.reserve(self.send_prefix.len() + hex.len() + 2);
        dst.put_slice(self.send_prefix.as_bytes());
        dst.put_slice(hex.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

impl Encoder<Packet> for BidCoSCodec {
    type Error = BidCoSError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode(&item, dst)
    }
}
