//! Structured action boundaries (component I).
//!
//! Mirrors the six named boundaries of the hosting contract's structured
//! logging story (`handoff`, `scgi_accepted`, `scgi_request`, `scgi_parse`,
//! `wsgi_request`, `response_started`) on top of the `tracing` crate. The
//! four *actions* (`handoff`, `scgi_request`, `scgi_parse`, `wsgi_request`)
//! are spans that record a success or failure outcome when they end; the two
//! *point events* (`scgi_accepted`, `response_started`) are single log lines
//! with no action lifecycle.
//!
//! [`ActionGuard`] is the RAII piece that makes outcome recording automatic:
//! a guard defaults to recording `outcome = "failure"` when dropped, and
//! [`ActionGuard::succeed`] flips that to `"success"` on the way out. An
//! early return, a `?`, or even a panic during unwind all still produce a
//! log line, the same way `eliot.ActionType.__exit__` records failure on any
//! exception leaving the `with` block.

use tracing::Span;

/// Guards one action-boundary span, recording its outcome on drop.
///
/// Call [`ActionGuard::succeed`] immediately before the action's happy-path
/// return. Any other return path (an error return, an early `?`, a panic)
/// leaves the guard to record failure in its `Drop` impl.
pub struct ActionGuard {
    span: Span,
    outcome: Outcome,
}

#[derive(Clone, Copy)]
enum Outcome {
    Success,
    Failure,
}

impl ActionGuard {
    fn new(span: Span) -> Self {
        ActionGuard {
            span,
            outcome: Outcome::Failure,
        }
    }

    /// Marks this action as having completed successfully. Must be called
    /// on the happy path; omitting it (via early return or panic) leaves the
    /// default failure outcome in place.
    pub fn succeed(&mut self) {
        self.outcome = Outcome::Success;
    }

    /// Starts the `handoff` action, attributes `path` (the control-channel
    /// path the receiver dialed). The `family`/`type`/`proto` attributes are
    /// recorded separately via [`Self::record_socket_description`] once the
    /// description is known.
    pub fn handoff(path: &str) -> Self {
        let span = tracing::info_span!("handoff", path = %path, family = tracing::field::Empty, socket_type = tracing::field::Empty, protocol = tracing::field::Empty);
        ActionGuard::new(span)
    }

    pub fn record_socket_description(&self, family: i32, socket_type: i32, protocol: i32) {
        self.span.record("family", family);
        self.span.record("socket_type", socket_type);
        self.span.record("protocol", protocol);
    }

    /// Starts the `scgi_request` action: one accepted connection, end to
    /// end.
    pub fn scgi_request() -> Self {
        ActionGuard::new(tracing::info_span!("scgi_request"))
    }

    /// Starts the `scgi_parse` action: parsing the netstring-framed SCGI
    /// header block off an accepted connection.
    pub fn scgi_parse() -> Self {
        ActionGuard::new(tracing::info_span!("scgi_parse"))
    }

    /// Starts the `wsgi_request` action: running the application against a
    /// synthesized environment, attributed with `path_info`.
    pub fn wsgi_request(path_info: &str) -> Self {
        ActionGuard::new(tracing::info_span!("wsgi_request", path_info = %path_info))
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        let _enter = self.span.enter();
        match self.outcome {
            Outcome::Success => tracing::info!(outcome = "success"),
            Outcome::Failure => tracing::warn!(outcome = "failure"),
        }
    }
}

/// Point event: a connection was accepted on the reconstituted listen
/// socket, before any bytes have been read from it.
pub fn scgi_accepted() {
    tracing::info!(name: "scgi_accepted", "accepted connection");
}

/// Point event: the response's header block has just become `pending`,
/// i.e. `start_response` was called with a new status line.
pub fn response_started(status: &str) {
    tracing::info!(name: "response_started", status = %status, "response started");
}
