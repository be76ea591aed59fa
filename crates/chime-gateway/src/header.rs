//! Binary header that opens a multimedia transfer.
//!
//! ```text
//! [0]        Version (u8, currently 1)
//! [1]        Media kind (u8: 1 = voice, 2 = video)
//! [2..10]    Declared total length in bytes (u64 BE, > 0)
//! [10..18]   Originating client id (i64 BE)
//! [18..20]   Name length in bytes (u16 BE, > 0)
//! [20..]     Display name (UTF-8, exactly name length bytes)
//! ```
//!
//! The chunks that follow a header carry no framing of their own.

use chime_types::models::MediaKind;

use crate::error::ProtocolError;

/// Current wire version.
pub const HEADER_VERSION: u8 = 1;

/// Size of the fixed part, before the name.
pub const HEADER_FIXED_LEN: usize = 20;

const KIND_VOICE: u8 = 1;
const KIND_VIDEO: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub kind: MediaKind,
    pub length: u64,
    pub client_id: i64,
    pub name: String,
}

impl TransferHeader {
    pub fn new(kind: MediaKind, length: u64, client_id: i64, name: impl Into<String>) -> Self {
        Self {
            kind,
            length,
            client_id,
            name: name.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.length == 0 {
            return Err(malformed("declared length must be greater than zero"));
        }
        let name = self.name.as_bytes();
        if name.is_empty() {
            return Err(malformed("name is empty"));
        }
        let name_len = u16::try_from(name.len())
            .map_err(|_| malformed(format!("name is {} bytes, max {}", name.len(), u16::MAX)))?;

        let mut buf = Vec::with_capacity(HEADER_FIXED_LEN + name.len());
        buf.push(HEADER_VERSION);
        buf.push(match self.kind {
            MediaKind::Voice => KIND_VOICE,
            MediaKind::Video => KIND_VIDEO,
        });
        buf.extend_from_slice(&self.length.to_be_bytes());
        buf.extend_from_slice(&self.client_id.to_be_bytes());
        buf.extend_from_slice(&name_len.to_be_bytes());
        buf.extend_from_slice(name);
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_FIXED_LEN {
            return Err(malformed(format!(
                "{} bytes, need at least {}",
                data.len(),
                HEADER_FIXED_LEN
            )));
        }

        if data[0] != HEADER_VERSION {
            return Err(malformed(format!("unsupported version {}", data[0])));
        }

        let kind = match data[1] {
            KIND_VOICE => MediaKind::Voice,
            KIND_VIDEO => MediaKind::Video,
            other => return Err(malformed(format!("unknown media kind 0x{:02x}", other))),
        };

        let length = u64::from_be_bytes(field(data, 2)?);
        if length == 0 {
            return Err(malformed("declared length must be greater than zero"));
        }

        let client_id = i64::from_be_bytes(field(data, 10)?);

        let name_len = u16::from_be_bytes(field(data, 18)?) as usize;
        if name_len == 0 {
            return Err(malformed("name is empty"));
        }
        let name_bytes = &data[HEADER_FIXED_LEN..];
        if name_bytes.len() != name_len {
            return Err(malformed(format!(
                "name length {} does not match {} remaining bytes",
                name_len,
                name_bytes.len()
            )));
        }
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| malformed("name is not valid UTF-8"))?
            .to_string();

        Ok(Self {
            kind,
            length,
            client_id,
            name,
        })
    }
}

fn field<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ProtocolError> {
    data.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| malformed(format!("truncated at byte {}", offset)))
}

fn malformed(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedHeader(reason.into())
}
