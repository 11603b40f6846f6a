//! Example application showing how an outside crate plugs an
//! [`Application`](scgi_handoff::application::Application) into a real
//! receiver process.
//!
//! Run a broker and this receiver together:
//!
//! ```sh
//! scgi-handoff-broker unix:/tmp/workload.sock unix:/tmp/control.sock &
//! cargo run --example echo-app -- /tmp/control.sock
//! ```
//!
//! Then point an SCGI-speaking reverse proxy at `/tmp/workload.sock`.

use std::env;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use bytes::Bytes;
use scgi_handoff::application::{ConnectionWriter, ResponseBody};
use scgi_handoff::environment::RequestEnvironment;
use scgi_handoff::receiver;
use scgi_handoff::response::ResponseWriter;

/// Echoes the synthesized request environment back as an HTML page.
fn echo(
    env: &RequestEnvironment,
    response: &mut ResponseWriter<ConnectionWriter>,
) -> io::Result<ResponseBody> {
    let body = format!(
        "<html><head><title>scgi-handoff echo</title></head><body>\
         <p>PATH_INFO: {}</p>\
         <p>QUERY_STRING: {}</p>\
         <p>url scheme: {}</p>\
         <p>headers: {:?}</p>\
         </body></html>\n",
        env.path_info, env.query_string, env.url_scheme, env.headers
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
            eprintln!("usage: echo-app CONTROL_SOCKET_PATH");
            return ExitCode::FAILURE;
        }
    };

    match receiver::run(Path::new(&control_arg), &echo) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("receiver exited: {}", e);
            ExitCode::FAILURE
        }
    }
}
