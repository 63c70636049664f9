//! Error types shared by every layer of the client.

use thiserror::Error;

/// Failure while walking a response body.
///
/// Raised whenever a read would run past the end of the buffer or a declared
/// count cannot possibly fit in what remains. Once this happens the cursor
/// position is meaningless, so the whole response is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decode error at offset {offset}: {what} needs {wanted} bytes, {remaining} left")]
pub struct DecodeError {
    /// Cursor position when the read was attempted.
    pub offset: usize,
    /// Bytes the read needed.
    pub wanted: usize,
    /// Bytes left in the buffer.
    pub remaining: usize,
    /// Short description of the value being read.
    pub what: &'static str,
}

/// Errors returned by the search client.
#[derive(Debug, Error)]
pub enum Error {
    /// An option was rejected by its setter or by command validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Argument to an auxiliary command failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Dialing, reading or writing the socket failed.
    #[error("connection error ({context}): {source}")]
    Connection {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The daemon greeted us with something we cannot speak.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The daemon answered with ERROR or RETRY, or an unknown status.
    #[error("searchd error: {0}")]
    Protocol(String),

    /// The response body was truncated or malformed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// `run_queries` was called with nothing queued.
    #[error("no queries defined, issue add_query() first")]
    NoQueries,

    /// `close` was called without an open connection.
    #[error("not connected")]
    NotConnected,
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn connection(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Connection {
            context: context.into(),
            source,
        }
    }

    /// True for transport failures, false for anything the daemon itself reported.
    ///
    /// Callers use this to decide whether reconnecting and retrying makes sense.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
