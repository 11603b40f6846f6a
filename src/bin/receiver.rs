//! `scgi-handoff-receiver` entry point (component J).
//!
//! Positional argument per spec.md §6.4: the broker's control socket
//! path, e.g. `scgi-handoff-receiver unix:/tmp/control.sock`.
//!
//! Hosts a minimal built-in demo application that echoes the synthesized
//! request environment back as HTML, the same way the teacher's own
//! `bin/server.rs` hardcodes a sample handler directly in its binary.
//! Wiring in a real application is a library-level concern — see
//! `demos/echo_app.rs` for an example of doing that from outside this
//! crate via [`scgi_handoff::receiver::run`].

use std::env;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use bytes::Bytes;
use scgi_handoff::application::{ConnectionWriter, ResponseBody};
use scgi_handoff::environment::RequestEnvironment;
use scgi_handoff::response::ResponseWriter;
use scgi_handoff::{endpoint, receiver};

fn demo_app(
    env: &RequestEnvironment,
    response: &mut ResponseWriter<ConnectionWriter>,
) -> io::Result<ResponseBody> {
    let body = format!(
        "<html><head><title>scgi-handoff-receiver</title></head><body>\
         <p>served by scgi-handoff-receiver, pid {}</p>\
         <p>PATH_INFO: {}</p><p>QUERY_STRING: {}</p></body></html>\n",
        std::process::id(),
        env.path_info,
        env.query_string,
    );
    response
        .start_response(
            "200 OK",
            &[("Content-Type".to_string(), "text/html".to_string())],
            None,
        )
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let chunks: ResponseBody = Box::new(std::iter::once(Ok(Bytes::from(body.into_bytes()))));
    Ok(chunks)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let control_arg = match env::args().nth(1) {
        Some(a) => a,
        None => {
            eprintln!("usage: scgi-handoff-receiver CONTROL_ENDPOINT");
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

    match receiver::run(Path::new(&control_path), &demo_app) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "receiver exited");
            ExitCode::FAILURE
        }
    }
}
