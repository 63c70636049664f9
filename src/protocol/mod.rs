//! searchd binary wire protocol.
//!
//! Every command travels inside the same envelope, all integers big-endian:
//!
//! ```text
//! request:  u16 command | u16 command version | u32 body length | body
//! response: u16 status  | u16 version         | u32 body length | body
//! ```
//!
//! Before the first command the daemon sends its protocol version as a `u32`
//! and expects ours back ([`VER_MAJOR_PROTO`]).

pub mod codec;
pub mod request;
pub mod response;

use serde::Serialize;

use crate::error::{Error, Result};

pub use codec::{PacketReader, PacketWriter};

/// Major protocol version sent during the handshake.
pub const VER_MAJOR_PROTO: u32 = 0x1;

/// Size of the response header.
pub const RESPONSE_HEADER_LEN: usize = 8;

/// Largest request body accepted for framing.
///
/// Every counted item or string adds at least four bytes to a body, so a body
/// under this bound never carries a length that overflows its `u32` field.
pub const MAX_REQUEST_LEN: usize = 128 * 1024 * 1024;

/// Command codes understood by searchd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Command {
    Search = 0,
    Excerpt = 1,
    Update = 2,
    Keywords = 3,
    Persist = 4,
    Status = 5,
    Query = 6,
    FlushAttrs = 7,
}

impl Command {
    /// Version of the body layout this client emits for the command.
    pub const fn version(self) -> u16 {
        match self {
            Self::Search => 0x119,
            Self::Excerpt => 0x104,
            Self::Update => 0x102,
            Self::Keywords => 0x100,
            Self::Persist => 0x0,
            Self::Status => 0x100,
            Self::Query => 0x100,
            Self::FlushAttrs => 0x100,
        }
    }

    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// Reply status, both for the envelope and for each query in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchdStatus {
    Ok = 0,
    Error = 1,
    Retry = 2,
    Warning = 3,
}

impl SearchdStatus {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Error),
            2 => Some(Self::Retry),
            3 => Some(Self::Warning),
            _ => None,
        }
    }
}

/// Attribute types as reported in a result schema.
///
/// Decoding only cares about a handful of them; everything that is not
/// BIGINT, FLOAT, STRING or one of the MVA kinds travels as a `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    None,
    Integer,
    Timestamp,
    Ordinal,
    Bool,
    Float,
    BigInt,
    String,
    Multi,
    Multi64,
    /// A type code this client does not know by name.
    Other(u32),
}

impl AttrType {
    pub const MULTI_CODE: u32 = 0x4000_0001;
    pub const MULTI64_CODE: u32 = 0x4000_0002;

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::None,
            1 => Self::Integer,
            2 => Self::Timestamp,
            3 => Self::Ordinal,
            4 => Self::Bool,
            5 => Self::Float,
            6 => Self::BigInt,
            7 => Self::String,
            Self::MULTI_CODE => Self::Multi,
            Self::MULTI64_CODE => Self::Multi64,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Integer => 1,
            Self::Timestamp => 2,
            Self::Ordinal => 3,
            Self::Bool => 4,
            Self::Float => 5,
            Self::BigInt => 6,
            Self::String => 7,
            Self::Multi => Self::MULTI_CODE,
            Self::Multi64 => Self::MULTI64_CODE,
            Self::Other(code) => code,
        }
    }
}

fn body_len(len: usize, limit: usize) -> Result<u32> {
    if len > limit {
        return Err(Error::invalid(format!(
            "request body of {len} bytes exceeds the {limit} byte limit"
        )));
    }
    u32::try_from(len).map_err(|_| Error::invalid(format!("request body of {len} bytes is too large")))
}

/// Wrap a command body in the request envelope.
pub fn frame(command: Command, body: &[u8]) -> Result<Vec<u8>> {
    let len = body_len(body.len(), MAX_REQUEST_LEN)?;
    let mut w = PacketWriter::with_capacity(8 + body.len());
    w.put_u16(command.code());
    w.put_u16(command.version());
    w.put_u32(len);
    w.put_raw(body);
    Ok(w.into_inner())
}

/// Decoded response envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: u16,
    pub version: u16,
    pub len: u32,
}

impl ResponseHeader {
    pub fn parse(buf: &[u8; RESPONSE_HEADER_LEN]) -> Self {
        Self {
            status: u16::from_be_bytes([buf[0], buf[1]]),
            version: u16::from_be_bytes([buf[2], buf[3]]),
            len: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}
