//! `scgi-handoff-broker` entry point (component J).
//!
//! Positional arguments per spec.md §6.4: `WORKLOAD_ENDPOINT` then
//! `CONTROL_ENDPOINT`, e.g.
//! `scgi-handoff-broker unix:/tmp/workload.sock unix:/tmp/control.sock`.

use std::env;
use std::process::ExitCode;

use scgi_handoff::{broker, endpoint};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let (workload_arg, control_arg) = match (args.next(), args.next()) {
        (Some(w), Some(c)) => (w, c),
        _ => {
            eprintln!("usage: scgi-handoff-broker WORKLOAD_ENDPOINT CONTROL_ENDPOINT");
            return ExitCode::FAILURE;
        }
    };

    let workload_path = match endpoint::parse(&workload_arg) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("invalid WORKLOAD_ENDPOINT '{}': {}", workload_arg, e);
            return ExitCode::FAILURE;
        }
    };
    let control_path = match endpoint::parse(&control_arg) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("invalid CONTROL_ENDPOINT '{}': {}", control_arg, e);
            return ExitCode::FAILURE;
        }
    };

    match broker::run(workload_path, control_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "broker exited");
            ExitCode::FAILURE
        }
    }
}
