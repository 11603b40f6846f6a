//! Non-interrupting signal setup (component J, signal half).
//!
//! At receiver startup, every signal other than `SIGINT`/`SIGTERM` is marked
//! non-interrupting: a syscall that would otherwise return early with
//! `EINTR` on delivery instead restarts automatically. `SIGINT`/`SIGTERM`
//! are left with their default (interrupting) behavior so the process can
//! still be told to stop. There is no `nix` wrapper for `siginterrupt(3)`,
//! so this calls straight into `libc`, same as the retrieval pack reaches
//! for raw `libc` wherever a syscall has no higher-level binding.

use std::io;

/// Signals left with default (interrupting) delivery semantics so the
/// process can still be stopped from the outside.
const INTERRUPTING: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

/// Marks every signal except `SIGINT`/`SIGTERM` non-interrupting.
///
/// Signals the platform refuses this policy for (`siginterrupt` failing
/// with `EINVAL`, e.g. `SIGKILL`/`SIGSTOP`) are silently skipped. Any other
/// failure is propagated and aborts startup.
pub fn install_non_interrupting_signals() -> io::Result<()> {
    for sig in 1..=libc::SIGRTMAX() {
        if INTERRUPTING.contains(&sig) {
            continue;
        }
        // Safety: siginterrupt only inspects/updates process-global signal
        // disposition flags for `sig`; it performs no memory access through
        // pointers we control.
        let rc = unsafe { libc::siginterrupt(sig, 0) };
        if rc == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINVAL) {
                continue;
            }
            return Err(err);
        }
    }
    Ok(())
}
