//! Network-layer packet and its fixed-header wire format.
//!
//! ```text
//! | destination (5) | kind (1) | change (1) | payload ... |
//! ```
//!
//! The destination is left-padded with `0` and the padding is stripped again
//! on decode, so addresses that themselves start with `0` do not survive the
//! round trip. Topology validation rejects such host addresses.

use crate::error::CodecError;
use crate::types::Address;

pub const DESTINATION_LEN: usize = 5;
pub const HEADER_LEN: usize = DESTINATION_LEN + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Data,
    Control,
}

impl PacketKind {
    pub fn code(self) -> u8 {
        match self {
            PacketKind::Data => b'1',
            PacketKind::Control => b'2',
        }
    }

    pub fn from_code(code: u8) -> Result<Self, CodecError> {
        match code {
            b'1' => Ok(PacketKind::Data),
            b'2' => Ok(PacketKind::Control),
            other => Err(CodecError::InvalidKind(other as char)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub destination: Address,
    pub kind: PacketKind,
    pub change: bool,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn data(destination: Address, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            destination,
            kind: PacketKind::Data,
            change: false,
            payload: payload.into(),
        }
    }

    pub fn control(destination: Address, change: bool, payload: Vec<u8>) -> Self {
        Self {
            destination,
            kind: PacketKind::Control,
            change,
            payload,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        decode(bytes)
    }

    /// Payload rendered for log lines.
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let destination = packet.destination.as_str();
    if destination.len() > DESTINATION_LEN {
        return Err(CodecError::FieldOverflow(destination.to_string()));
    }

    let mut bytes = Vec::with_capacity(HEADER_LEN + packet.payload.len());
    bytes.resize(DESTINATION_LEN - destination.len(), b'0');
    bytes.extend_from_slice(destination.as_bytes());
    bytes.push(packet.kind.code());
    bytes.push(if packet.change { b'1' } else { b'0' });
    bytes.extend_from_slice(&packet.payload);
    Ok(bytes)
}

pub fn decode(bytes: &[u8]) -> Result<Packet, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::MalformedHeader(format!(
            "{} bytes is shorter than the {} byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let destination = std::str::from_utf8(&bytes[..DESTINATION_LEN])
        .map_err(|_| CodecError::MalformedHeader("destination is not UTF-8".to_string()))?
        .trim_start_matches('0');

    let kind = PacketKind::from_code(bytes[DESTINATION_LEN])
        .map_err(|e| CodecError::MalformedHeader(e.to_string()))?;

    let change = match bytes[DESTINATION_LEN + 1] {
        b'0' => false,
        b'1' => true,
        other => {
            return Err(CodecError::MalformedHeader(format!(
                "change flag {:?} is neither '0' nor '1'",
                other as char
            )));
        }
    };

    Ok(Packet {
        destination: Address::from(destination),
        kind,
        change,
        payload: bytes[HEADER_LEN..].to_vec(),
    })
}
