//! Socket Description Codec (component A).
//!
//! Serializes the `(family, type, protocol)` triple of a kernel socket into
//! a fixed-width record so it can travel alongside a passed file descriptor
//! over the handoff control channel. Mirrors `struct.Struct('iii')` in
//! `wip.common` — three native `c_int`s packed with no alignment padding,
//! host byte order.

use std::io;
use std::os::unix::io::RawFd;

use crate::error::ShortDescriptionError;

/// Byte width of one packed `c_int` field. The wire format is three of
/// these back to back.
const INT_WIDTH: usize = std::mem::size_of::<libc::c_int>();

/// Total byte length of an encoded `SocketDescription`. Every description
/// sent over the control channel has exactly this length.
pub const DESCRIPTION_LENGTH: usize = INT_WIDTH * 3;

/// The `(family, type, protocol)` triple identifying a kernel socket, as
/// reported by `getsockopt` / `socket(2)` arguments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SocketDescription {
    pub family: libc::c_int,
    pub socket_type: libc::c_int,
    pub protocol: libc::c_int,
}

impl SocketDescription {
    pub fn new(family: libc::c_int, socket_type: libc::c_int, protocol: libc::c_int) -> Self {
        SocketDescription {
            family,
            socket_type,
            protocol,
        }
    }

    /// Emits the fixed-width `(family, type, protocol)` record in host byte
    /// order.
    pub fn encode(&self) -> [u8; DESCRIPTION_LENGTH] {
        let mut out = [0u8; DESCRIPTION_LENGTH];
        out[0..INT_WIDTH].copy_from_slice(&self.family.to_ne_bytes());
        out[INT_WIDTH..2 * INT_WIDTH].copy_from_slice(&self.socket_type.to_ne_bytes());
        out[2 * INT_WIDTH..3 * INT_WIDTH].copy_from_slice(&self.protocol.to_ne_bytes());
        out
    }

    /// Inverse of [`encode`](Self::encode). Fails if fewer than
    /// [`DESCRIPTION_LENGTH`] bytes are supplied.
    pub fn decode(bytes: &[u8]) -> Result<Self, ShortDescriptionError> {
        if bytes.len() < DESCRIPTION_LENGTH {
            return Err(ShortDescriptionError {
                expected: DESCRIPTION_LENGTH,
                actual: bytes.len(),
            });
        }
        let read_int = |offset: usize| -> libc::c_int {
            let mut buf = [0u8; INT_WIDTH];
            buf.copy_from_slice(&bytes[offset..offset + INT_WIDTH]);
            libc::c_int::from_ne_bytes(buf)
        };
        Ok(SocketDescription {
            family: read_int(0),
            socket_type: read_int(INT_WIDTH),
            protocol: read_int(2 * INT_WIDTH),
        })
    }

    /// Reads the `(family, type, protocol)` triple of an already-open
    /// socket via `getsockopt(SO_DOMAIN/SO_TYPE/SO_PROTOCOL)`, mirroring
    /// `describe_socket` in the original's `wip.common` (which reads the
    /// same triple off a Python `socket` object's own attributes). `nix`
    /// has no typed wrapper for `SO_DOMAIN`/`SO_PROTOCOL`, so this goes
    /// straight to `libc`, same as [`crate::signals`] does for
    /// `siginterrupt`.
    pub fn of_raw_fd(fd: RawFd) -> io::Result<Self> {
        let family = getsockopt_int(fd, libc::SOL_SOCKET, libc::SO_DOMAIN)?;
        let socket_type = getsockopt_int(fd, libc::SOL_SOCKET, libc::SO_TYPE)?;
        let protocol = getsockopt_int(fd, libc::SOL_SOCKET, libc::SO_PROTOCOL)?;
        Ok(SocketDescription::new(family, socket_type, protocol))
    }
}

fn getsockopt_int(fd: RawFd, level: libc::c_int, name: libc::c_int) -> io::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    // Safety: `value`/`len` are valid, correctly-sized out-params for a
    // `SOL_SOCKET`-level integer option, which is all this helper is ever
    // called with.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            level,
            name,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(value)
}
