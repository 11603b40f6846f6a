//! Endpoint argument parsing (component J, process-wiring half).
//!
//! Both process entry points take a positional endpoint string of the
//! form `unix:<path>`, per spec.md §6.4's own example
//! (`unix:/path/workload.sock`). The control channel is always AF_UNIX
//! (spec.md §6.1), and spec.md §1 itself frames the outer proxy as "an
//! SCGI client over a UNIX socket", so the workload endpoint is
//! UNIX-only too — unlike the original's Twisted endpoint-description
//! strings, which could equally name a TCP listener. See DESIGN.md for
//! why this crate narrows that down rather than carrying it through.
//!
//! An unprefixed argument is accepted as a bare filesystem path, so
//! `scgi-handoff-broker /tmp/workload.sock /tmp/control.sock` works too.

use std::io;
use std::path::PathBuf;

/// Parses a `unix:<path>` (or bare `<path>`) endpoint argument into a
/// filesystem path.
pub fn parse(raw: &str) -> io::Result<PathBuf> {
    let path = raw.strip_prefix("unix:").unwrap_or(raw);
    if path.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "endpoint path must not be empty",
        ));
    }
    Ok(PathBuf::from(path))
}
