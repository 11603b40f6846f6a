//! Handoff Broker (component G).
//!
//! Binds the workload listening socket once and keeps a duplicate of its
//! FD open for the life of the process, then serves the control channel:
//! every receiver that connects, sends one READY byte, and gets back a
//! [`SocketDescription`] plus a duplicate of the workload listen FD as a
//! single SCM_RIGHTS-bearing message (spec.md §4.G, §6.1). The broker
//! never itself accepts workload connections past startup — an
//! "Always-Abort" acceptor runs on that listener only for the window
//! between bind and the control channel coming up, purely to guard against
//! a stray connection racing the first receiver attaching; it is stopped
//! (removed from the broker's own I/O event loop) once the control
//! channel is ready to serve receivers.
//!
//! Grounded in `wip.handoff`: `AlwaysAbortFactory` installed directly on
//! the workload listener is reproduced here as
//! [`run_defensive_acceptor`], the `reactor.removeReader(server_port)`
//! call that follows it is reproduced as aborting that acceptor's task
//! once the control channel is up, and the single `os.dup` reused for
//! every handoff (`handoff_factory.handoff_fd`) is reproduced as
//! `handoff_fd` below.

use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags, UnixAddr};
use nix::unistd::dup;
use tokio::io::{AsyncReadExt, Interest};
use tokio::net::{UnixListener, UnixStream};

use crate::error::io_error_from_nix;
use crate::socket_description::SocketDescription;
use crate::tracing_support::ActionGuard;

/// The single READY byte a receiver sends to request a handoff (spec.md §6.1).
const READY_BYTE: u8 = 0x21;

/// Binds `workload_path` and `control_path`, then serves the control
/// channel forever. Returns only on an unrecoverable I/O error binding
/// either listener or accepting on the control channel; a single failed
/// handoff is logged and does not stop the broker.
pub async fn run(workload_path: PathBuf, control_path: PathBuf) -> io::Result<()> {
    remove_stale_socket(&workload_path)?;
    let workload_listener = UnixListener::bind(&workload_path)?;
    tracing::info!(path = %workload_path.display(), "broker listening on workload endpoint");

    let workload_fd = workload_listener.as_raw_fd();
    let description = SocketDescription::of_raw_fd(workload_fd)?;
    // One duplicate, kept open and reused for every handoff: sendmsg
    // copies a reference into each receiver without consuming this end,
    // so there's no need to dup again per connection (spec.md §3
    // Ownership; `wip.handoff`'s `handoff_factory.handoff_fd` is the same
    // single, process-lifetime duplicate).
    let handoff_fd = dup(workload_fd).map_err(io_error_from_nix)?;

    // The broker is not itself a workload acceptor; this task is the
    // "Always-Abort" defensive acceptor of spec.md §4.G, a backstop
    // against a stray connection that arrives before any receiver has
    // attached. It only covers the window between bind and the control
    // channel coming up: once the broker is ready to serve receivers, the
    // task is aborted below so the broker stops accepting on the workload
    // listener (spec.md §4.G: "Removes the listen FD from its own I/O
    // event loop"). `handoff_fd`, an independent duplicate of the same
    // kernel listen queue, is unaffected by the listener being dropped and
    // keeps the queue alive for every receiver that attaches afterward.
    let defensive = tokio::spawn(run_defensive_acceptor(workload_listener));

    remove_stale_socket(&control_path)?;
    let control_listener = UnixListener::bind(&control_path)?;
    tracing::info!(path = %control_path.display(), "broker listening on control channel");

    defensive.abort();

    let control_path_display = control_path.display().to_string();
    loop {
        let (conn, _addr) = control_listener.accept().await?;
        let path = control_path_display.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_one_handoff(conn, handoff_fd, description, &path).await {
                tracing::warn!(error = %e, "handoff failed");
            }
        });
    }
}

fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Accepts and immediately drops every connection on `listener`, logging
/// that it happened. Runs until the caller aborts its task — only for the
/// window between the workload listener coming up and the control channel
/// being ready to serve receivers.
async fn run_defensive_acceptor(listener: UnixListener) {
    loop {
        match listener.accept().await {
            Ok(_conn) => {
                tracing::warn!("rejected workload connection: no receiver is attached yet");
            }
            Err(e) => {
                tracing::warn!(error = %e, "defensive acceptor failed to accept a connection");
            }
        }
    }
}

/// Serves exactly one handoff exchange on an already-accepted control
/// connection: waits for the READY byte, then replies with the packed
/// description and the duplicated FD as a single SCM_RIGHTS-bearing
/// message, then closes. Any bytes the client sends after READY are
/// simply never read (spec.md §6.1).
async fn serve_one_handoff(
    mut conn: UnixStream,
    handoff_fd: RawFd,
    description: SocketDescription,
    control_path: &str,
) -> io::Result<()> {
    let mut guard = ActionGuard::handoff(control_path);
    guard.record_socket_description(
        description.family,
        description.socket_type,
        description.protocol,
    );

    let ready = conn.read_u8().await?;
    if ready != READY_BYTE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "expected READY byte 0x{:02x}, got 0x{:02x}",
                READY_BYTE, ready
            ),
        ));
    }

    send_description(&conn, &description.encode(), handoff_fd).await?;
    guard.succeed();
    Ok(())
}

/// Sends `payload` plus a single SCM_RIGHTS ancillary message carrying
/// `fd_to_send`, using tokio's readiness-plus-raw-syscall pattern since
/// `tokio::net::UnixStream` has no native ancillary-data API of its own.
async fn send_description(conn: &UnixStream, payload: &[u8], fd_to_send: RawFd) -> io::Result<()> {
    loop {
        conn.writable().await?;
        let result = conn.try_io(Interest::WRITABLE, || {
            let iov = [io::IoSlice::new(payload)];
            let fds = [fd_to_send];
            let cmsgs = [ControlMessage::ScmRights(&fds)];
            sendmsg::<UnixAddr>(conn.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)
                .map_err(io_error_from_nix)
        });
        match result {
            Ok(_sent) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}
