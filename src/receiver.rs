//! Receiver (component H).
//!
//! Connects to the broker's control channel, performs the handoff
//! exchange (spec.md §4.H / §6.1 / §9), reconstitutes the workload
//! listening socket from the received FD and description, and then
//! serially accepts and processes SCGI connections against the hosted
//! application forever. Runs on blocking `std::net`/`std::io`, on
//! whatever thread the caller runs it on (spec.md §5, §9: "one
//! synchronous thread"; parallelism comes from running more receiver
//! processes sharing the listen FD, not from concurrency inside one
//! receiver).
//!
//! Grounded in `wip.receiver`'s `SocketPassProcessor.from_path` /
//! `from_handoff_socket` (the READY-byte-then-split-recvmsg exchange) and
//! `handle_request` (the serial accept loop).

use std::io::{self, IoSliceMut, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use nix::cmsg_space;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::socket::{recvmsg, ControlMessageOwned, MsgFlags, UnixAddr};

use crate::application::{process_connection, Application};
use crate::error::{io_error_from_nix, HandoffError};
use crate::signals;
use crate::socket_description::{SocketDescription, DESCRIPTION_LENGTH};
use crate::tracing_support::{self, ActionGuard};

/// The single READY byte this receiver sends to request a handoff.
const READY_BYTE: u8 = 0x21;

/// Connects to `control_path`, installs the non-interrupting signal
/// policy, acquires the workload listener via one handoff exchange, and
/// serially accepts and processes connections against `app` forever.
pub fn run(control_path: &Path, app: &dyn Application) -> io::Result<()> {
    signals::install_non_interrupting_signals()?;

    let listener = acquire_workload_listener(control_path)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    tracing::info!(path = %control_path.display(), "receiver attached to workload listener");

    accept_loop(listener, app)
}

/// One accepted connection at a time, forever: spec.md §5's "the accept
/// loop is serial" rule. A single connection's failure is logged and
/// does not stop the loop.
fn accept_loop(listener: UnixListener, app: &dyn Application) -> io::Result<()> {
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                tracing_support::scgi_accepted();
                if let Err(e) = process_connection(stream, app) {
                    tracing::warn!(error = %e, "request processing failed");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

/// Connects to the broker, performs the handoff exchange, and
/// reconstitutes the resulting FD as a blocking `UnixListener`.
fn acquire_workload_listener(control_path: &Path) -> Result<UnixListener, HandoffError> {
    let mut guard = ActionGuard::handoff(&control_path.display().to_string());
    let (description, fd) = request_handoff(control_path)?;
    guard.record_socket_description(
        description.family,
        description.socket_type,
        description.protocol,
    );

    if description.family != libc::AF_UNIX {
        return Err(HandoffError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "handed-off socket has unexpected family {} (expected AF_UNIX)",
                description.family
            ),
        )));
    }

    set_blocking(fd)?;
    // Safety: fd was just received as a freshly dup'd descriptor over
    // SCM_RIGHTS; nothing else in this process has touched it yet, so
    // this is the unique owner taking responsibility for closing it.
    let listener = unsafe { UnixListener::from_raw_fd(fd) };
    guard.succeed();
    Ok(listener)
}

/// Performs the wire-level exchange of spec.md §6.1 / §9: connect, send
/// READY, then receive the description bytes and the ancillary FD split
/// across two calls. The first call carries ancillary-data semantics but
/// reads only one byte; the rest is a plain blocking read — some kernels
/// won't deliver SCM_RIGHTS alongside a bulk `MSG_WAITALL` read, so the
/// two are kept apart (`wip.receiver`'s own comment: "OOB data, like
/// ancillary data, interrupts MSG_WAITALL").
fn request_handoff(control_path: &Path) -> Result<(SocketDescription, RawFd), HandoffError> {
    let mut conn = UnixStream::connect(control_path)?;
    conn.write_all(&[READY_BYTE])?;

    let mut first_byte = [0u8; 1];
    let mut cmsg_buf = cmsg_space!([RawFd; 1]);
    let received = {
        let mut iov = [IoSliceMut::new(&mut first_byte)];
        recvmsg::<UnixAddr>(
            conn.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_buf),
            MsgFlags::empty(),
        )?
    };

    if received.bytes == 0 {
        return Err(HandoffError::ShortDescription {
            expected: DESCRIPTION_LENGTH,
            actual: 0,
        });
    }

    let mut fds: Vec<RawFd> = Vec::new();
    for cmsg in received.cmsgs() {
        if let ControlMessageOwned::ScmRights(received_fds) = cmsg {
            fds.extend(received_fds);
        }
    }
    match fds.len() {
        0 => return Err(HandoffError::MissingAncillaryData),
        1 => {}
        n => return Err(HandoffError::UnexpectedFdCount(n)),
    }

    let mut rest = vec![0u8; DESCRIPTION_LENGTH - 1];
    conn.read_exact(&mut rest)?;

    let mut full = Vec::with_capacity(DESCRIPTION_LENGTH);
    full.push(first_byte[0]);
    full.extend_from_slice(&rest);
    let description = SocketDescription::decode(&full)?;

    Ok((description, fds[0]))
}

/// Clears `O_NONBLOCK` on `fd`. The duplicate arrives with whatever file
/// status flags the broker's (non-blocking, tokio-owned) socket had, and
/// this receiver's accept loop is synchronous blocking code (spec.md
/// §4.H: "sets it to blocking mode").
fn set_blocking(fd: RawFd) -> Result<(), HandoffError> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_error_from_nix)?;
    let mut oflags = OFlag::from_bits_truncate(flags);
    oflags.remove(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(oflags)).map_err(io_error_from_nix)?;
    Ok(())
}
