//! # BidCoS Packet
//!
//! The packet model and its ASCII-hex wire representation.
//!
//! A packet is built either from a hex line received from the radio stick or
//! from explicit header fields. Once built it is immutable; outgoing payloads
//! are composed with [`PacketBuilder`].
//!
//! Hex parsing never aborts. Every field is decoded independently and a field
//! that cannot be decoded becomes `0`, with a [`ParseWarning`] describing what
//! was degraded.

use crate::core::address::Address;
use crate::error::{BidCoSError, PositionError, Result};
use std::fmt;
use std::fmt::Write as _;
use tracing::warn;

/// Number of header bytes preceding the payload (length byte excluded).
pub const HEADER_LEN: usize = 9;

/// Largest payload a single length byte can describe.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - HEADER_LEN;

/// Control byte flags
pub mod control {
    /// The sender waits for an answer; unanswered packets are resent.
    pub const RESPONSE_EXPECTED: u8 = 0x20;
    /// The packet itself answers an earlier request.
    pub const IS_RESPONSE: u8 = 0x02;
    /// Wake-up / burst transmission requested.
    pub const BURST: u8 = 0x10;
}

// Hex offsets relative to the optional frame marker.
const LENGTH_OFFSET: usize = 0;
const COUNTER_OFFSET: usize = 2;
const CONTROL_OFFSET: usize = 4;
const TYPE_OFFSET: usize = 6;
const SENDER_OFFSET: usize = 8;
const DESTINATION_OFFSET: usize = 14;
const PAYLOAD_OFFSET: usize = 20;

/// Low-bit masks indexed by bit width; width 0 and 8 select the whole byte.
const BITMASK: [u8; 9] = [0xFF, 0x01, 0x03, 0x07, 0x0F, 0x1F, 0x3F, 0x7F, 0xFF];

fn bitmask(width: usize) -> u8 {
    BITMASK.get(width).copied().unwrap_or(0xFF)
}

/// A field that was degraded while decoding a hex packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// The field contained non-hex characters and decoded to 0.
    InvalidHex { field: &'static str, offset: usize },
    /// The text ended before the field; it decoded to 0.
    MissingField { field: &'static str, offset: usize },
    /// Fewer payload bytes were present than the length byte announced.
    Truncated { declared: u8, available: usize },
    /// The length byte disagrees with the decoded payload.
    LengthMismatch { declared: u8, actual: u8 },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::InvalidHex { field, offset } => {
                write!(f, "invalid hex in field {field} at offset {offset}")
            }
            ParseWarning::MissingField { field, offset } => {
                write!(f, "field {field} missing at offset {offset}")
            }
            ParseWarning::Truncated {
                declared,
                available,
            } => write!(
                f,
                "length byte announces {declared} bytes, only {available} payload bytes present"
            ),
            ParseWarning::LengthMismatch { declared, actual } => {
                write!(f, "length byte {declared} does not match packet length {actual}")
            }
        }
    }
}

/// A decoded value together with everything that had to be degraded to get it.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub value: T,
    pub warnings: Vec<ParseWarning>,
}

impl<T> Parsed<T> {
    /// True when nothing was degraded.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Header-derived field that only exists for some message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedField {
    Value(u8),
    /// The message type does not define this field.
    NotApplicable,
    /// The message type defines the field but the payload is too short.
    Truncated,
}

impl DerivedField {
    pub fn value(self) -> Option<u8> {
        match self {
            DerivedField::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A BidCoS radio packet.
///
/// The length byte is not stored; it is always `9 + payload.len()`.
#[derive(Debug, Clone, Eq)]
pub struct Packet {
    message_counter: u8,
    control_byte: u8,
    message_type: u8,
    sender: Address,
    destination: Address,
    payload: Vec<u8>,
    rssi: Option<u8>,
}

impl PartialEq for Packet {
    // RSSI describes the reception, not the packet.
    fn eq(&self, other: &Self) -> bool {
        self.message_counter == other.message_counter
            && self.control_byte == other.control_byte
            && self.message_type == other.message_type
            && self.sender == other.sender
            && self.destination == other.destination
            && self.payload == other.payload
    }
}

impl Packet {
    /// Build a packet from explicit header fields.
    ///
    /// Payloads longer than [`MAX_PAYLOAD_LEN`] cannot be described by the
    /// length byte and are cut to that size.
    pub fn new(
        message_counter: u8,
        control_byte: u8,
        message_type: u8,
        sender: Address,
        destination: Address,
        mut payload: Vec<u8>,
    ) -> Self {
        if payload.len() > MAX_PAYLOAD_LEN {
            warn!(
                len = payload.len(),
                max = MAX_PAYLOAD_LEN,
                "Payload too long for length byte, truncating"
            );
            payload.truncate(MAX_PAYLOAD_LEN);
        }
        Self {
            message_counter,
            control_byte,
            message_type,
            sender,
            destination,
            payload,
            rssi: None,
        }
    }

    /// Decode a hex line as received from the radio stick.
    ///
    /// With `skip_first_char` the first character is treated as a frame marker.
    /// A trailing `\r\n` is ignored. Two hex digits following the payload are
    /// kept as RSSI.
    pub fn parse(text: &str, skip_first_char: bool) -> Parsed<Packet> {
        let body = text
            .strip_suffix("\r\n")
            .or_else(|| text.strip_suffix('\n'))
            .unwrap_or(text);
        let start = if skip_first_char {
            body.chars().next().map_or(0, char::len_utf8)
        } else {
            0
        };
        let bytes = &body.as_bytes()[start..];
        let mut warnings = Vec::new();

        let declared = read_hex(bytes, LENGTH_OFFSET, 2, "length", &mut warnings) as u8;
        let message_counter = read_hex(bytes, COUNTER_OFFSET, 2, "counter", &mut warnings) as u8;
        let control_byte = read_hex(bytes, CONTROL_OFFSET, 2, "control", &mut warnings) as u8;
        let message_type = read_hex(bytes, TYPE_OFFSET, 2, "type", &mut warnings) as u8;
        let sender = read_hex(bytes, SENDER_OFFSET, 6, "sender", &mut warnings);
        let destination = read_hex(bytes, DESTINATION_OFFSET, 6, "destination", &mut warnings);

        let announced = (declared as usize).saturating_sub(HEADER_LEN);
        let available = bytes.len().saturating_sub(PAYLOAD_OFFSET) / 2;
        let payload_len = if announced > available {
            warnings.push(ParseWarning::Truncated {
                declared,
                available,
            });
            available
        } else {
            announced
        };

        let mut payload = Vec::with_capacity(payload_len);
        for i in 0..payload_len {
            let offset = PAYLOAD_OFFSET + i * 2;
            payload.push(read_hex(bytes, offset, 2, "payload", &mut warnings) as u8);
        }

        let rssi_offset = PAYLOAD_OFFSET + payload_len * 2;
        let rssi = if bytes.len() >= rssi_offset + 2 {
            Some(read_hex(bytes, rssi_offset, 2, "rssi", &mut warnings) as u8)
        } else {
            None
        };

        let packet = Packet {
            message_counter,
            control_byte,
            message_type,
            sender: Address::new(sender),
            destination: Address::new(destination),
            payload,
            rssi,
        };

        let actual = packet.length();
        if declared != actual && !warnings.iter().any(|w| matches!(w, ParseWarning::Truncated { .. })) {
            warnings.push(ParseWarning::LengthMismatch { declared, actual });
        }

        Parsed {
            value: packet,
            warnings,
        }
    }

    /// Decode the binary form: length byte, header, payload and an optional RSSI byte.
    pub fn from_bytes(bytes: &[u8], has_rssi: bool) -> Result<Packet> {
        if bytes.len() < HEADER_LEN + 1 {
            return Err(BidCoSError::ShortPacket(bytes.len()));
        }
        let (payload_end, rssi) = if has_rssi && bytes.len() > HEADER_LEN + 1 {
            (bytes.len() - 1, bytes.last().copied())
        } else {
            (bytes.len(), None)
        };
        let mut packet = Packet::new(
            bytes[1],
            bytes[2],
            bytes[3],
            Address::from_bytes([bytes[4], bytes[5], bytes[6]]),
            Address::from_bytes([bytes[7], bytes[8], bytes[9]]),
            bytes[HEADER_LEN + 1..payload_end].to_vec(),
        );
        packet.rssi = rssi;
        Ok(packet)
    }

    /// Encode as uppercase hex without frame marker or line ending.
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(PAYLOAD_OFFSET + self.payload.len() * 2);
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{:02X}{:02X}{:02X}{:02X}{:06X}{:06X}",
            self.length(),
            self.message_counter,
            self.control_byte,
            self.message_type,
            self.sender.value(),
            self.destination.value()
        );
        for byte in &self.payload {
            let _ = write!(out, "{byte:02X}");
        }
        out
    }

    /// Encode the binary form (without RSSI).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + 1 + self.payload.len());
        data.push(self.length());
        data.push(self.message_counter);
        data.push(self.control_byte);
        data.push(self.message_type);
        data.extend_from_slice(&self.sender.to_bytes());
        data.extend_from_slice(&self.destination.to_bytes());
        data.extend_from_slice(&self.payload);
        data
    }

    pub fn length(&self) -> u8 {
        (HEADER_LEN + self.payload.len()) as u8
    }

    pub fn message_counter(&self) -> u8 {
        self.message_counter
    }

    pub fn control_byte(&self) -> u8 {
        self.control_byte
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn destination(&self) -> Address {
        self.destination
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn rssi(&self) -> Option<u8> {
        self.rssi
    }

    /// True when the sender expects an answer and this is not itself one.
    pub fn expects_response(&self) -> bool {
        expects_response(self.control_byte)
    }

    /// Message subtype, defined for types 0x01 and 0x11 only.
    pub fn message_subtype(&self) -> DerivedField {
        match self.message_type {
            0x01 => self.payload_field(1),
            0x11 => self.payload_field(0),
            _ => DerivedField::NotApplicable,
        }
    }

    /// Channel, defined for type 0x01 only.
    pub fn channel(&self) -> DerivedField {
        match self.message_type {
            0x01 => self.payload_field(0),
            _ => DerivedField::NotApplicable,
        }
    }

    fn payload_field(&self, index: usize) -> DerivedField {
        self.payload
            .get(index)
            .map_or(DerivedField::Truncated, |v| DerivedField::Value(*v))
    }

    /// Read a bit field addressed as `byte.bit`, where byte 9 is the first payload byte.
    ///
    /// A fractional `index` selects a bit run of `round(size * 10)` bits
    /// starting at bit `round(index * 10) % 10` inside one byte. A byte-aligned
    /// `index` reads `ceil(size)` bytes big-endian; a fractional `size` masks
    /// the first byte to its low `round(size * 10) % 10` bits. When `signed`
    /// is set and the first byte has its bit at that position set,
    /// `2^(floor(size) * 8 + position)` is added to the result.
    pub fn get_position(&self, index: f64, size: f64, signed: bool) -> std::result::Result<i64, PositionError> {
        check_finite(index, size)?;
        if size < 0.0 {
            return Err(PositionError::NegativeSize(size));
        }
        if index < HEADER_LEN as f64 {
            return Err(PositionError::IndexBeforePayload(index));
        }
        let relative = index - HEADER_LEN as f64;
        let byte_index = relative.floor();
        let byte = byte_index as usize;
        let len = self.payload.len();

        if byte_index != relative {
            if size > 1.0 {
                return Err(PositionError::PartialByteTooWide(size));
            }
            if signed {
                return Err(PositionError::SignedPartialByte);
            }
            let value = *self
                .payload
                .get(byte)
                .ok_or(PositionError::OutOfBounds { byte, len })?;
            let shift = bit_offset(index);
            let width = (size * 10.0).round() as usize;
            return Ok(((value >> shift) & bitmask(width)) as i64);
        }

        let bytes = (size.ceil() as usize).max(1);
        if bytes > 8 {
            return Err(PositionError::TooWide(bytes));
        }
        let end = field_end(byte, bytes, len)?;
        let bit_size = ((size * 10.0).round() as u64 % 10) as usize;
        let first = self.payload[byte];
        let mut result: i64 = ((first & bitmask(bit_size)) as i64) << ((bytes - 1) * 8);
        for (i, value) in self.payload[byte + 1..end].iter().enumerate() {
            result += (*value as i64) << ((bytes - i - 2) * 8);
        }
        if signed && (first as u32) & (1u32 << bit_size) != 0 {
            let bits = (size.floor() as u32) * 8 + bit_size as u32;
            result = result.wrapping_add(1i64.checked_shl(bits).unwrap_or(0));
        }
        Ok(result)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// True when the control byte asks for an answer and is not itself an answer.
pub fn expects_response(control_byte: u8) -> bool {
    control_byte & control::RESPONSE_EXPECTED != 0 && control_byte & control::IS_RESPONSE == 0
}

fn bit_offset(index: f64) -> u32 {
    ((index * 10.0).round() as i64 % 10) as u32
}

fn check_finite(index: f64, size: f64) -> std::result::Result<(), PositionError> {
    match (index.is_finite(), size.is_finite()) {
        (true, true) => Ok(()),
        (false, _) => Err(PositionError::NonFinite(index)),
        (_, false) => Err(PositionError::NonFinite(size)),
    }
}

/// End offset of a `bytes` wide field starting at `byte`, bounded by `len`.
fn field_end(byte: usize, bytes: usize, len: usize) -> std::result::Result<usize, PositionError> {
    match byte.checked_add(bytes) {
        Some(end) if end <= len => Ok(end),
        _ => Err(PositionError::OutOfBounds {
            byte: byte.saturating_add(bytes - 1),
            len,
        }),
    }
}

fn read_hex(
    bytes: &[u8],
    offset: usize,
    width: usize,
    field: &'static str,
    warnings: &mut Vec<ParseWarning>,
) -> u32 {
    let Some(digits) = bytes.get(offset..offset + width) else {
        warnings.push(ParseWarning::MissingField { field, offset });
        return 0;
    };
    match std::str::from_utf8(digits)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_hexdigit()))
        .and_then(|s| u32::from_str_radix(s, 16).ok())
    {
        Some(value) => value,
        None => {
            warnings.push(ParseWarning::InvalidHex { field, offset });
            0
        }
    }
}

/// Composes an outgoing packet field by field.
#[derive(Debug, Clone, Default)]
pub struct PacketBuilder {
    message_counter: u8,
    control_byte: u8,
    message_type: u8,
    sender: Address,
    destination: Address,
    payload: Vec<u8>,
}

impl PacketBuilder {
    pub fn new(message_type: u8) -> Self {
        Self {
            message_type,
            ..Self::default()
        }
    }

    pub fn message_counter(mut self, counter: u8) -> Self {
        self.message_counter = counter;
        self
    }

    pub fn control_byte(mut self, control_byte: u8) -> Self {
        self.control_byte = control_byte;
        self
    }

    pub fn sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    pub fn destination(mut self, destination: Address) -> Self {
        self.destination = destination;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Write `value` at `byte.bit` position; the inverse of [`Packet::get_position`].
    ///
    /// Sub-byte sizes are OR-ed into the addressed byte. Byte sizes overwrite,
    /// masking the first byte to the fractional bit width. The payload grows
    /// with zero bytes as needed.
    pub fn set_position(
        &mut self,
        index: f64,
        size: f64,
        value: &[u8],
    ) -> std::result::Result<(), PositionError> {
        check_finite(index, size)?;
        if size < 0.0 {
            return Err(PositionError::NegativeSize(size));
        }
        if index < HEADER_LEN as f64 {
            return Err(PositionError::IndexBeforePayload(index));
        }
        let relative = index - HEADER_LEN as f64;
        let byte_index = relative.floor();
        let byte = byte_index as usize;

        if byte_index != relative || size < 0.8 {
            if size > 1.0 {
                return Err(PositionError::PartialByteTooWide(size));
            }
            if byte >= MAX_PAYLOAD_LEN {
                return Err(PositionError::OutOfBounds {
                    byte,
                    len: MAX_PAYLOAD_LEN,
                });
            }
            if self.payload.len() <= byte {
                self.payload.resize(byte + 1, 0);
            }
            let bits = value.last().copied().unwrap_or(0) as u32;
            self.payload[byte] |= (bits << bit_offset(relative)) as u8;
            return Ok(());
        }

        let bytes = (size.ceil() as usize).max(1);
        let end = field_end(byte, bytes, MAX_PAYLOAD_LEN)?;
        if self.payload.len() < end {
            self.payload.resize(end, 0);
        }
        if value.is_empty() {
            return Ok(());
        }
        let bit_size = ((size * 10.0).round() as u64 % 10) as usize;
        let bytes = bytes.min(value.len());
        self.payload[byte] = value[0] & bitmask(bit_size);
        self.payload[byte + 1..byte + bytes].copy_from_slice(&value[1..bytes]);
        Ok(())
    }

    pub fn build(self) -> Packet {
        Packet::new(
            self.message_counter,
            self.control_byte,
            self.message_type,
            self.sender,
            self.destination,
            self.payload,
        )
    }
}
