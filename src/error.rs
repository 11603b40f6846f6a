//! Error taxonomy for every fallible boundary in the gateway.
//!
//! Each variant corresponds to one of the error kinds named in the protocol
//! design: framing errors are connection-fatal, ordering errors are
//! request-fatal, and handoff errors abort receiver startup. None of these
//! are retried by the gateway itself.

use std::io;
use thiserror::Error;

/// Failure decoding a netstring: a length prefix, a payload, and a
/// terminating `,`.
#[derive(Debug, Error)]
pub enum NetstringError {
    /// The byte before `:` was not an ASCII digit.
    #[error("netstring length is not a decimal integer")]
    NotADigit,

    /// More than 7 digits were read before a `:` appeared.
    #[error("netstring length exceeds 7 digits")]
    LengthTooLong,

    /// The byte following the payload was not `,`.
    #[error("netstring payload is not terminated by ','")]
    MissingComma,
}

/// Failure parsing the SCGI header block out of a netstring payload.
#[derive(Debug, Error)]
pub enum ScgiHeaderError {
    #[error("netstring framing error in header block: {0}")]
    Netstring(#[from] NetstringError),

    /// The header payload did not end with an empty trailing element,
    /// i.e. it was not terminated by a NUL byte.
    #[error("SCGI header payload is not NUL-terminated")]
    NotNulTerminated,

    /// Splitting the payload on NUL produced an odd number of elements:
    /// some key is missing its value.
    #[error("SCGI header block has an odd number of name/value fields")]
    OddFieldCount,
}

/// Too few bytes were supplied to decode a `SocketDescription`.
#[derive(Debug, Error)]
#[error("socket description is shorter than {expected} bytes (got {actual})")]
pub struct ShortDescriptionError {
    pub expected: usize,
    pub actual: usize,
}

/// Violations of the start_response / write ordering contract (spec §4.E).
#[derive(Debug, Error)]
pub enum ResponseOrderingError {
    /// `write` was called before `start_response` ever ran.
    #[error("write() called before start_response()")]
    WriteBeforeStart,

    /// `start_response` was called a second time without `exc_info`, after
    /// headers were already pending or sent.
    #[error("start_response() called again without exc_info after headers were already prepared")]
    StartResponseAfterHeaders,
}

/// Anomalies in the ancillary (SCM_RIGHTS) data carried by the handoff
/// protocol. All are receiver-fatal: startup aborts.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("control channel I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("broker did not send a complete {expected}-byte socket description (got {actual})")]
    ShortDescription { expected: usize, actual: usize },

    #[error("no SCM_RIGHTS ancillary message was received")]
    MissingAncillaryData,

    #[error("expected exactly one file descriptor in SCM_RIGHTS, got {0}")]
    UnexpectedFdCount(usize),

    #[error("invalid socket description: {0}")]
    Description(#[from] ShortDescriptionError),

    #[error("nix syscall failed: {0}")]
    Nix(#[from] nix::Error),
}

impl From<ScgiHeaderError> for io::Error {
    fn from(e: ScgiHeaderError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

impl From<ResponseOrderingError> for io::Error {
    fn from(e: ResponseOrderingError) -> Self {
        io::Error::new(io::ErrorKind::Other, e)
    }
}

/// Converts a raw `nix` errno into a standard `io::Error`, for call sites
/// (the broker's async handoff path) that have no dedicated error enum of
/// their own to convert into.
pub fn io_error_from_nix(err: nix::Error) -> io::Error {
    io::Error::from_raw_os_error(err as i32)
}
