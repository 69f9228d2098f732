//! FESL packet encoding and decoding.
//!
//! Every packet is a fixed 12-byte header followed by a text body:
//!
//! ```text
//! +-----------+----------------------------+-------------------+---------------------+
//! | type (4)  | kind (1) | id (3)          | length (4)        | body                |
//! | ASCII     | u32 big-endian             | u32 big-endian    | key=value\n ... \0  |
//! +-----------+----------------------------+-------------------+---------------------+
//! ```
//!
//! The length covers the whole packet, header and terminator included. The
//! high byte of the second word carries the [`TransmissionType`]; the low 24
//! bits carry the sequence id.

use std::fmt;

use crate::value::{FieldValue, PacketRecord};

/// Size of the fixed packet header in bytes.
pub const HEADER_LEN: usize = 12;

/// Largest sequence id that fits beside the transmission byte.
pub const MAX_PACKET_ID: u32 = 0x00FF_FFFF;

/// Body terminator.
const TERMINATOR: u8 = 0;

/// Framing flag distinguishing request/response and single/multi packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmissionType {
    SinglePacketResponse,
    MultiPacketResponse,
    SinglePacketRequest,
    MultiPacketRequest,
}

impl TransmissionType {
    /// The header byte for this transmission type.
    pub const fn to_byte(self) -> u8 {
        match self {
            TransmissionType::SinglePacketResponse => 0x80,
            TransmissionType::MultiPacketResponse => 0xB0,
            TransmissionType::SinglePacketRequest => 0xC0,
            TransmissionType::MultiPacketRequest => 0xF0,
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x80 => Some(TransmissionType::SinglePacketResponse),
            0xB0 => Some(TransmissionType::MultiPacketResponse),
            0xC0 => Some(TransmissionType::SinglePacketRequest),
            0xF0 => Some(TransmissionType::MultiPacketRequest),
            _ => None,
        }
    }
}

/// Four-character ASCII packet type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketType([u8; 4]);

impl PacketType {
    pub const FSYS: PacketType = PacketType(*b"fsys");
    pub const ACCT: PacketType = PacketType(*b"acct");
    pub const PNOW: PacketType = PacketType(*b"pnow");
    pub const PRES: PacketType = PacketType(*b"pres");
    pub const ASSO: PacketType = PacketType(*b"asso");
    pub const RANK: PacketType = PacketType(*b"rank");
    pub const XMSG: PacketType = PacketType(*b"xmsg");
    pub const RECP: PacketType = PacketType(*b"recp");

    /// Build a type code from raw bytes. Returns `None` unless all four bytes
    /// are printable ASCII.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        bytes
            .iter()
            .all(|b| b.is_ascii_graphic())
            .then_some(PacketType(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl TryFrom<&str> for PacketType {
    type Error = MalformedPacket;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes: [u8; 4] = value
            .as_bytes()
            .try_into()
            .map_err(|_| MalformedPacket::InvalidTypeCode)?;
        PacketType::from_bytes(bytes).ok_or(MalformedPacket::InvalidTypeCode)
    }
}

impl fmt::Debug for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketType({:?})", self.as_str())
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while decoding a packet. Framing is lost once any of these
/// occurs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedPacket {
    /// Fewer bytes than a header.
    #[error("packet of {0} bytes is shorter than the {HEADER_LEN}-byte header")]
    TooShort(usize),

    /// Header length disagrees with the bytes received.
    #[error("header declares {declared} bytes but {actual} are available")]
    LengthMismatch {
        /// Length from the header.
        declared: u32,
        /// Length of the buffer.
        actual: usize,
    },

    /// Unrecognized transmission byte.
    #[error("unknown transmission type 0x{0:02x}")]
    UnknownTransmissionType(u8),

    /// Type code is not four printable ASCII characters.
    #[error("invalid packet type code")]
    InvalidTypeCode,

    /// Body does not end with the terminator byte.
    #[error("body is missing its terminator")]
    MissingTerminator,

    /// Body is not valid UTF-8.
    #[error("body is not valid text")]
    InvalidText,

    /// A body line has no `=` separator.
    #[error("field {0:?} has no value")]
    MissingValue(String),
}

/// Errors raised while encoding a packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Key is empty or contains a separator character.
    #[error("invalid field key {0:?}")]
    InvalidKey(String),

    /// Text value contains a line break or NUL.
    #[error("value of field {0:?} contains a reserved character")]
    InvalidValue(String),

    /// Sequence id does not fit in 24 bits.
    #[error("packet id {0} exceeds {MAX_PACKET_ID}")]
    IdOutOfRange(u32),

    /// Encoded size does not fit the length word.
    #[error("packet of {0} bytes is too large")]
    TooLarge(usize),
}

/// A single FESL packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub transmission: TransmissionType,
    /// Sequence id; 0 for unsolicited server pushes.
    pub id: u32,
    pub fields: PacketRecord,
}

impl Packet {
    pub fn new(
        kind: PacketType,
        transmission: TransmissionType,
        id: u32,
        fields: PacketRecord,
    ) -> Self {
        Self {
            kind,
            transmission,
            id,
            fields,
        }
    }

    /// A single-packet response echoing the id of `request`.
    pub fn response_to(request: &Packet, fields: PacketRecord) -> Self {
        Self::new(
            request.kind,
            TransmissionType::SinglePacketResponse,
            request.id,
            fields,
        )
    }

    /// A server-initiated request, which always carries id 0.
    pub fn push(kind: PacketType, fields: PacketRecord) -> Self {
        Self::new(kind, TransmissionType::SinglePacketRequest, 0, fields)
    }

    /// The transaction name carried in the `TXN` field, or `""`.
    pub fn txn(&self) -> String {
        self.fields
            .text("TXN")
            .map(|txn| txn.into_owned())
            .unwrap_or_default()
    }

    /// Decode exactly one packet from `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, MalformedPacket> {
        if buf.len() < HEADER_LEN {
            return Err(MalformedPacket::TooShort(buf.len()));
        }

        let kind = PacketType::from_bytes([buf[0], buf[1], buf[2], buf[3]])
            .ok_or(MalformedPacket::InvalidTypeCode)?;

        let word = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let transmission_byte = (word >> 24) as u8;
        let transmission = TransmissionType::from_byte(transmission_byte)
            .ok_or(MalformedPacket::UnknownTransmissionType(transmission_byte))?;
        let id = word & MAX_PACKET_ID;

        let declared = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        if declared as usize != buf.len() {
            return Err(MalformedPacket::LengthMismatch {
                declared,
                actual: buf.len(),
            });
        }

        let body = match buf[HEADER_LEN..].split_last() {
            Some((&TERMINATOR, body)) => body,
            _ => return Err(MalformedPacket::MissingTerminator),
        };
        let body = std::str::from_utf8(body).map_err(|_| MalformedPacket::InvalidText)?;

        let mut fields = PacketRecord::new();
        for line in body.split('\n').filter(|line| !line.is_empty()) {
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| MalformedPacket::MissingValue(line.to_string()))?;
            fields.insert(key, FieldValue::from_wire(value));
        }

        Ok(Self {
            kind,
            transmission,
            id,
            fields,
        })
    }

    /// Encode this packet into its exact wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.id > MAX_PACKET_ID {
            return Err(EncodeError::IdOutOfRange(self.id));
        }

        let mut body = Vec::new();
        for (key, value) in self.fields.iter() {
            if key.is_empty() || key.bytes().any(|b| matches!(b, b'=' | b'\n' | 0)) {
                return Err(EncodeError::InvalidKey(key.to_string()));
            }
            let value = value.as_text();
            if value.bytes().any(|b| matches!(b, b'\n' | 0)) {
                return Err(EncodeError::InvalidValue(key.to_string()));
            }
            body.extend_from_slice(key.as_bytes());
            body.push(b'=');
            body.extend_from_slice(value.as_bytes());
            body.push(b'\n');
        }
        body.push(TERMINATOR);

        let total = HEADER_LEN + body.len();
        let length = u32::try_from(total).map_err(|_| EncodeError::TooLarge(total))?;
        let word = (u32::from(self.transmission.to_byte()) << 24) | self.id;

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(self.kind.as_bytes());
        out.extend_from_slice(&word.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Read the declared total length from a packet header.
pub fn declared_length(header: &[u8; HEADER_LEN]) -> u32 {
    u32::from_be_bytes([header[8], header[9], header[10], header[11]])
}
