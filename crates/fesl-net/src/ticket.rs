//! Decoder for the binary authentication ticket carried in PS3 login
//! requests.
//!
//! The ticket travels inside the `ticket` packet field as `$` followed by hex
//! digits. Unarmored, it is a small header followed by typed cells:
//!
//! ```text
//! +-------------+--------------+------------------------------------------+
//! | version (4) | size (4)     | cells (size bytes)                       |
//! | 0x21 01 0 0 | u32 BE       | kind u16 BE | len u16 BE | payload ...   |
//! +-------------+--------------+------------------------------------------+
//! ```
//!
//! Cells whose kind has both `0x3000` bits set are sections (ticket body,
//! footer) and hold further cells. Sections are walked in place, so record
//! indices count leaf cells only: index 5 is the player's online id.

use crate::value::FieldValue;

const HEADER_LEN: usize = 8;
const CELL_HEADER_LEN: usize = 4;
const SECTION_MASK: u16 = 0x3000;
const MAX_SECTION_DEPTH: usize = 8;

/// Record index of the issue timestamp.
pub const ISSUED_AT_INDEX: usize = 2;
/// Record index of the expiry timestamp.
pub const EXPIRES_AT_INDEX: usize = 3;
/// Record index of the numeric account id.
pub const USER_ID_INDEX: usize = 4;
/// Record index of the null-padded online id.
pub const ONLINE_ID_INDEX: usize = 5;

/// Errors raised while unarmoring or decoding a ticket.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    /// Armor or header does not look like a ticket.
    #[error("invalid ticket format: {0}")]
    InvalidFormat(String),

    /// A declared length runs past the end of its buffer.
    #[error("ticket truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        /// Offset of the header or cell being read.
        offset: usize,
        /// Bytes the header or cell declares.
        needed: usize,
        /// Bytes actually left.
        available: usize,
    },
}

/// Kind tag of a ticket cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketKind {
    Empty,
    U32,
    U64,
    /// Null-padded string.
    String,
    /// Milliseconds since the Unix epoch.
    Time,
    Binary,
    /// A kind this decoder does not interpret; kept as raw bytes.
    Unknown(u16),
}

impl TicketKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => TicketKind::Empty,
            0x0001 => TicketKind::U32,
            0x0002 => TicketKind::U64,
            0x0004 => TicketKind::String,
            0x0007 => TicketKind::Time,
            0x0008 => TicketKind::Binary,
            other => TicketKind::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            TicketKind::Empty => 0x0000,
            TicketKind::U32 => 0x0001,
            TicketKind::U64 => 0x0002,
            TicketKind::String => 0x0004,
            TicketKind::Time => 0x0007,
            TicketKind::Binary => 0x0008,
            TicketKind::Unknown(code) => code,
        }
    }
}

/// Interpreted payload of a ticket cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketValue {
    Empty,
    Field(FieldValue),
    Bytes(Vec<u8>),
}

/// One decoded leaf cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    /// Position among the ticket's leaf cells.
    pub index: usize,
    pub kind: TicketKind,
    pub raw: Vec<u8>,
    pub value: TicketValue,
}

impl TicketRecord {
    fn new(index: usize, code: u16, payload: &[u8]) -> Self {
        let kind = TicketKind::from_code(code);
        let value = match (kind, payload.len()) {
            (TicketKind::Empty, 0) => TicketValue::Empty,
            (TicketKind::U32, 4) => {
                let n = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                TicketValue::Field(FieldValue::from(n))
            }
            (TicketKind::U64 | TicketKind::Time, 8) => {
                let mut word = [0u8; 8];
                word.copy_from_slice(payload);
                TicketValue::Field(FieldValue::from(u64::from_be_bytes(word)))
            }
            (TicketKind::String, _) => TicketValue::Field(FieldValue::Text(
                String::from_utf8_lossy(payload).into_owned(),
            )),
            _ => TicketValue::Bytes(payload.to_vec()),
        };
        Self {
            index,
            kind,
            raw: payload.to_vec(),
            value,
        }
    }

    /// Text payload with trailing null padding removed.
    pub fn trimmed_text(&self) -> Option<&str> {
        match &self.value {
            TicketValue::Field(FieldValue::Text(text)) => Some(text.trim_end_matches('\0')),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match &self.value {
            TicketValue::Field(FieldValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }
}

/// A decoded ticket: its leaf records in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Major/minor version byte from the header.
    pub version: u8,
    records: Vec<TicketRecord>,
}

impl Ticket {
    /// Unarmor the field text (`$` + hex) and decode it.
    pub fn from_armored(text: &str) -> Result<Self, TicketError> {
        let text = text.trim();
        let digits = text.strip_prefix('$').unwrap_or(text);
        let bytes = hex::decode(digits)
            .map_err(|e| TicketError::InvalidFormat(format!("bad armor: {e}")))?;
        Self::decode(&bytes)
    }

    /// Decode a raw ticket.
    pub fn decode(bytes: &[u8]) -> Result<Self, TicketError> {
        if bytes.len() < HEADER_LEN {
            return Err(TicketError::Truncated {
                offset: 0,
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        let version = bytes[0];
        let major = version >> 4;
        if !(2..=4).contains(&major) || bytes[2] != 0 || bytes[3] != 0 {
            return Err(TicketError::InvalidFormat(format!(
                "unsupported header {:02x}{:02x}{:02x}{:02x}",
                bytes[0], bytes[1], bytes[2], bytes[3]
            )));
        }

        let size = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let available = bytes.len() - HEADER_LEN;
        if size > available {
            return Err(TicketError::Truncated {
                offset: 4,
                needed: size,
                available,
            });
        }

        let mut records = Vec::new();
        walk_cells(bytes, HEADER_LEN, HEADER_LEN + size, 0, &mut records)?;
        Ok(Self { version, records })
    }

    /// Re-armor raw ticket bytes as they appear in the `ticket` field.
    pub fn armor(bytes: &[u8]) -> String {
        format!("${}", hex::encode(bytes))
    }

    pub fn get(&self, index: usize) -> Option<&TicketRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TicketRecord> {
        self.records.iter()
    }

    /// The player's online display name, padding removed.
    pub fn online_id(&self) -> Option<&str> {
        let record = self.get(ONLINE_ID_INDEX)?;
        if record.kind != TicketKind::String {
            return None;
        }
        record.trimmed_text().filter(|name| !name.is_empty())
    }

    /// The numeric account id, if the ticket carries one in its usual place.
    pub fn user_id(&self) -> Option<i64> {
        self.get(USER_ID_INDEX)
            .filter(|r| r.kind == TicketKind::U64)
            .and_then(TicketRecord::as_integer)
    }

    /// Expiry in milliseconds since the Unix epoch.
    pub fn expires_at(&self) -> Option<i64> {
        self.get(EXPIRES_AT_INDEX)
            .filter(|r| r.kind == TicketKind::Time)
            .and_then(TicketRecord::as_integer)
    }
}

fn walk_cells(
    buf: &[u8],
    mut offset: usize,
    end: usize,
    depth: usize,
    out: &mut Vec<TicketRecord>,
) -> Result<(), TicketError> {
    while offset < end {
        if end - offset < CELL_HEADER_LEN {
            return Err(TicketError::Truncated {
                offset,
                needed: CELL_HEADER_LEN,
                available: end - offset,
            });
        }

        let code = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        let len = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
        let start = offset + CELL_HEADER_LEN;
        if len > end - start {
            return Err(TicketError::Truncated {
                offset,
                needed: len,
                available: end - start,
            });
        }

        if code & SECTION_MASK == SECTION_MASK {
            if depth >= MAX_SECTION_DEPTH {
                return Err(TicketError::InvalidFormat(format!(
                    "sections nested deeper than {MAX_SECTION_DEPTH}"
                )));
            }
            walk_cells(buf, start, start + len, depth + 1, out)?;
        } else {
            out.push(TicketRecord::new(out.len(), code, &buf[start..start + len]));
        }

        offset = start + len;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&kind.to_be_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn padded(text: &str, width: usize) -> Vec<u8> {
        let mut out = text.as_bytes().to_vec();
        out.resize(width, 0);
        out
    }

    /// A ticket shaped like the ones a PS3 sends: a body section and a
    /// signature footer.
    fn sample_ticket() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(cell(0x0008, &[1, 2, 3, 4, 5, 6, 7, 8]));
        body.extend(cell(0x0001, &0x100u32.to_be_bytes()));
        body.extend(cell(0x0007, &1_700_000_000_000u64.to_be_bytes()));
        body.extend(cell(0x0007, &1_700_000_600_000u64.to_be_bytes()));
        body.extend(cell(0x0002, &0x1234_5678_9ABC_DEF0u64.to_be_bytes()));
        body.extend(cell(0x0004, &padded("RacerX", 32)));
        body.extend(cell(0x0008, b"us\0\x01"));
        body.extend(cell(0x0004, &[0, 0, 0, 0]));
        body.extend(cell(0x0008, &padded("EP0002-BLUS30032_00", 24)));
        body.extend(cell(0x0001, &0u32.to_be_bytes()));

        let mut footer = Vec::new();
        footer.extend(cell(0x0008, &[0, 0, 0, 2]));
        footer.extend(cell(0x0008, &[0xAA; 8]));

        let mut payload = cell(0x3000, &body);
        payload.extend(cell(0x3002, &footer));

        let mut ticket = vec![0x21, 0x01, 0x00, 0x00];
        ticket.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        ticket.extend(payload);
        ticket
    }

    #[test]
    fn test_minimal_fixed_bytes() {
        let bytes = [
            0x21, 0x01, 0x00, 0x00, // version 2.1
            0x00, 0x00, 0x00, 0x10, // 16 bytes follow
            0x30, 0x00, 0x00, 0x0C, // body section, 12 bytes
            0x00, 0x01, 0x00, 0x04, 0x00, 0x00, 0x00, 0x2A, // u32 42
            0x00, 0x00, 0x00, 0x00, // empty
        ];
        let ticket = Ticket::decode(&bytes).unwrap();
        assert_eq!(ticket.len(), 2);
        assert_eq!(ticket.get(0).unwrap().kind, TicketKind::U32);
        assert_eq!(ticket.get(0).unwrap().as_integer(), Some(42));
        assert_eq!(ticket.get(1).unwrap().value, TicketValue::Empty);
    }

    #[test]
    fn test_sample_ticket_records() {
        let ticket = Ticket::decode(&sample_ticket()).unwrap();
        assert_eq!(ticket.version, 0x21);
        assert_eq!(ticket.len(), 12);
        assert_eq!(ticket.online_id(), Some("RacerX"));
        assert_eq!(ticket.user_id(), Some(0x1234_5678_9ABC_DEF0));
        assert_eq!(ticket.expires_at(), Some(1_700_000_600_000));

        let kinds: Vec<TicketKind> = ticket.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TicketKind::Binary,
                TicketKind::U32,
                TicketKind::Time,
                TicketKind::Time,
                TicketKind::U64,
                TicketKind::String,
                TicketKind::Binary,
                TicketKind::String,
                TicketKind::Binary,
                TicketKind::U32,
                TicketKind::Binary,
                TicketKind::Binary,
            ]
        );
        for (position, record) in ticket.iter().enumerate() {
            assert_eq!(record.index, position);
        }
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let bytes = sample_ticket();
        let first = Ticket::decode(&bytes).unwrap();
        let second = Ticket::decode(&bytes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_every_truncation_fails_cleanly() {
        let bytes = sample_ticket();
        for cut in 0..bytes.len() {
            let result = Ticket::decode(&bytes[..cut]);
            assert!(
                matches!(result, Err(TicketError::Truncated { .. })),
                "cut at {cut} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_cell_overrunning_section_is_truncated() {
        // Header claims 12 bytes; the single cell claims 200.
        let mut bytes = vec![0x21, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0C];
        bytes.extend_from_slice(&[0x00, 0x08, 0x00, 0xC8]);
        bytes.extend_from_slice(&[0u8; 8]);
        assert_eq!(
            Ticket::decode(&bytes),
            Err(TicketError::Truncated {
                offset: 8,
                needed: 200,
                available: 8,
            })
        );
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = sample_ticket();
        bytes[0] = 0x99;
        assert!(matches!(
            Ticket::decode(&bytes),
            Err(TicketError::InvalidFormat(_))
        ));

        let mut bytes = sample_ticket();
        bytes[3] = 0x01;
        assert!(matches!(
            Ticket::decode(&bytes),
            Err(TicketError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_unknown_kind_kept_as_bytes() {
        let mut payload = cell(0x0001, &7u32.to_be_bytes());
        payload.extend(cell(0x00EE, b"future"));
        let mut bytes = vec![0x31, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend(payload);

        let ticket = Ticket::decode(&bytes).unwrap();
        let record = ticket.get(1).unwrap();
        assert_eq!(record.kind, TicketKind::Unknown(0x00EE));
        assert_eq!(record.kind.code(), 0x00EE);
        assert_eq!(record.value, TicketValue::Bytes(b"future".to_vec()));
    }

    #[test]
    fn test_wrong_width_integer_kept_as_bytes() {
        let payload = cell(0x0001, &[1, 2]);
        let mut bytes = vec![0x21, 0x01, 0x00, 0x00];
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend(payload);

        let ticket = Ticket::decode(&bytes).unwrap();
        assert_eq!(ticket.get(0).unwrap().value, TicketValue::Bytes(vec![1, 2]));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let mut inner = cell(0x0001, &1u32.to_be_bytes());
        for _ in 0..=MAX_SECTION_DEPTH {
            inner = cell(0x3000, &inner);
        }
        let mut bytes = vec![0x21, 0x01, 0x00, 0x00];
        bytes.extend_from_slice(&(inner.len() as u32).to_be_bytes());
        bytes.extend(inner);

        assert!(matches!(
            Ticket::decode(&bytes),
            Err(TicketError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_armor_roundtrip() {
        let bytes = sample_ticket();
        let armored = Ticket::armor(&bytes);
        assert!(armored.starts_with('$'));
        assert_eq!(
            Ticket::from_armored(&armored).unwrap(),
            Ticket::decode(&bytes).unwrap()
        );
        // The prefix is optional and hex case does not matter.
        let bare = armored[1..].to_uppercase();
        assert_eq!(Ticket::from_armored(&bare).unwrap().online_id(), Some("RacerX"));
    }

    #[test]
    fn test_bad_armor_rejected() {
        assert!(matches!(
            Ticket::from_armored("$zz00"),
            Err(TicketError::InvalidFormat(_))
        ));
        assert!(matches!(
            Ticket::from_armored("$abc"),
            Err(TicketError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_blank_online_id_is_none() {
        let mut body = Vec::new();
        for _ in 0..5 {
            body.extend(cell(0x0000, &[]));
        }
        body.extend(cell(0x0004, &[0u8; 32]));
        let payload = cell(0x3000, &body);
        let mut bytes = vec![0x21, 0x01, 0x00, 0x00];
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend(payload);

        let ticket = Ticket::decode(&bytes).unwrap();
        assert_eq!(ticket.online_id(), None);
    }
}
