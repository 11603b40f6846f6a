//! Response writer (component E).
//!
//! A small state machine guarding the start-response / write ordering
//! contract over an unbuffered output sink: `AWAITING_START ->
//! HEADERS_PENDING -> SENT`. Every `write` call flushes immediately —
//! callers that want batching must coalesce before calling in, since this
//! writer never defers bytes across calls.

use std::io::{self, Write};

use crate::error::ResponseOrderingError;
use crate::tracing_support;

/// The error an application hands back through `start_response` to signal
/// that an in-flight exception should be propagated instead of swallowed.
/// Boxed so the writer doesn't need to know anything about application
/// error types.
pub type ExcInfo = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ResponseState {
    AwaitingStart,
    HeadersPending,
    Sent,
}

/// Buffers the pending header block and enforces ordering over one
/// connection's output stream.
pub struct ResponseWriter<W: Write> {
    out: W,
    state: ResponseState,
    pending_headers: Option<Vec<u8>>,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(out: W) -> Self {
        ResponseWriter {
            out,
            state: ResponseState::AwaitingStart,
            pending_headers: None,
        }
    }

    /// Whether headers have been fully sent (the first byte of body data,
    /// or the forced empty flush, has gone out).
    pub fn headers_sent(&self) -> bool {
        self.state == ResponseState::Sent
    }

    /// Prepares a new header block, enforcing the ordering contract.
    ///
    /// - `exc_info` present and headers already fully sent: the caller's
    ///   exception is handed straight back as `Err`.
    /// - `exc_info` present otherwise: the pending (or would-be-a-conflict)
    ///   header block is silently replaced with the new one.
    /// - `exc_info` absent and a header block is already pending or sent:
    ///   `Err(ResponseOrderingError::StartResponseAfterHeaders)`.
    pub fn start_response(
        &mut self,
        status: &str,
        headers: &[(String, String)],
        exc_info: Option<ExcInfo>,
    ) -> Result<(), ExcInfo> {
        if let Some(exc) = exc_info {
            if self.state == ResponseState::Sent {
                return Err(exc);
            }
            // Headers not yet sent: fall through and overwrite whatever
            // was pending, discarding exc now that it's been inspected.
        } else if self.state != ResponseState::AwaitingStart {
            return Err(Box::new(ResponseOrderingError::StartResponseAfterHeaders));
        }

        let mut block = Vec::with_capacity(64);
        block.extend_from_slice(b"Status: ");
        block.extend_from_slice(status.as_bytes());
        block.extend_from_slice(b"\r\n");
        for (name, value) in headers {
            block.extend_from_slice(name.as_bytes());
            block.extend_from_slice(b": ");
            block.extend_from_slice(value.as_bytes());
            block.extend_from_slice(b"\r\n");
        }
        block.extend_from_slice(b"\r\n");

        self.pending_headers = Some(block);
        self.state = ResponseState::HeadersPending;
        tracing_support::response_started(status);
        Ok(())
    }

    /// Writes `bytes` to the output, flushing any pending header block
    /// first. Fails with [`ResponseOrderingError::WriteBeforeStart`] if
    /// `start_response` has never been called.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.state {
            ResponseState::AwaitingStart => {
                return Err(io::Error::from(ResponseOrderingError::WriteBeforeStart));
            }
            ResponseState::HeadersPending => {
                let headers = self
                    .pending_headers
                    .take()
                    .expect("HEADERS_PENDING implies pending_headers is set");
                self.out.write_all(&headers)?;
                self.state = ResponseState::Sent;
            }
            ResponseState::Sent => {}
        }
        if !bytes.is_empty() {
            self.out.write_all(bytes)?;
        }
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn write_before_start_fails_and_emits_nothing() {
        let mut w = ResponseWriter::new(Vec::new());
        let err = w.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(w.out.is_empty());
    }

    #[test]
    fn start_then_write_emits_expected_bytes() {
        let mut w = ResponseWriter::new(Vec::new());
        w.start_response("200 OK", &header_pairs(&[("X-Is-Ok", "true")]), None)
            .unwrap();
        w.write(b"some data").unwrap();
        assert_eq!(
            w.out,
            b"Status: 200 OK\r\nX-Is-Ok: true\r\n\r\nsome data".to_vec()
        );
    }

    #[test]
    fn second_start_response_without_exc_info_after_write_fails() {
        let mut w = ResponseWriter::new(Vec::new());
        w.start_response("200 OK", &[], None).unwrap();
        w.write(b"x").unwrap();
        let err = w.start_response("500 Error", &[], None).unwrap_err();
        assert!(err.downcast_ref::<ResponseOrderingError>().is_some());
    }

    #[test]
    fn second_start_response_with_exc_info_after_write_reraises() {
        let mut w = ResponseWriter::new(Vec::new());
        w.start_response("200 OK", &[], None).unwrap();
        w.write(b"x").unwrap();
        let exc: ExcInfo = Box::new(io::Error::new(io::ErrorKind::Other, "boom"));
        let err = w.start_response("500 Error", &[], Some(exc)).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn second_start_response_with_exc_info_before_write_overwrites() {
        let mut w = ResponseWriter::new(Vec::new());
        w.start_response("200 OK", &header_pairs(&[("X-First", "1")]), None)
            .unwrap();
        let exc: ExcInfo = Box::new(io::Error::new(io::ErrorKind::Other, "boom"));
        w.start_response("500 Error", &header_pairs(&[("X-Second", "1")]), Some(exc))
            .unwrap();
        w.write(b"").unwrap();
        assert_eq!(w.out, b"Status: 500 Error\r\nX-Second: 1\r\n\r\n".to_vec());
    }

    #[test]
    fn empty_body_still_flushes_header_block_once() {
        let mut w = ResponseWriter::new(Vec::new());
        w.start_response("204 No Content", &[], None).unwrap();
        w.write(b"").unwrap();
        assert_eq!(w.out, b"Status: 204 No Content\r\n\r\n".to_vec());
        assert!(w.headers_sent());
    }
}
