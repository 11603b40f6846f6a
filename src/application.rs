//! Request processor (component F).
//!
//! Drives one accepted connection end to end: scoped socket shutdown, then
//! header parse (C) -> environment synthesis (D) -> application call ->
//! response write (E). One connection is exactly one request; there is no
//! keep-alive.

use std::io::{self, Cursor, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;

use bytes::Bytes;

use crate::environment::{self, RequestEnvironment};
use crate::header;
use crate::response::ResponseWriter;
use crate::tracing_support::ActionGuard;

/// A finite, lazily-produced response body. Any `Drop` impl on the
/// concrete iterator an application returns runs when this box is dropped,
/// which the request processor does immediately after the last chunk is
/// written — the same point the hosting contract's `close()` hook would
/// have run at.
pub type ResponseBody = Box<dyn Iterator<Item = io::Result<Bytes>> + Send>;

/// The sink type `ResponseWriter` is parameterized over at the application
/// boundary: a type-erased connection output stream.
pub type ConnectionWriter = Box<dyn Write + Send>;

/// A hosted request handler. Blanket-implemented for any matching closure,
/// so ordinary `Fn` values work directly as an `&dyn Application` without
/// a wrapper type.
pub trait Application: Send + Sync {
    fn call(
        &self,
        env: &RequestEnvironment,
        response: &mut ResponseWriter<ConnectionWriter>,
    ) -> io::Result<ResponseBody>;
}

impl<F> Application for F
where
    F: Fn(&RequestEnvironment, &mut ResponseWriter<ConnectionWriter>) -> io::Result<ResponseBody>
        + Send
        + Sync,
{
    fn call(
        &self,
        env: &RequestEnvironment,
        response: &mut ResponseWriter<ConnectionWriter>,
    ) -> io::Result<ResponseBody> {
        (self)(env, response)
    }
}

/// Calls `shutdown(RDWR)` then drops (closing) the wrapped socket exactly
/// once, on every exit path including panics, suppressing any transport
/// error the shutdown call itself raises.
struct ScopedShutdown {
    inner: Option<UnixStream>,
}

impl ScopedShutdown {
    fn new(inner: UnixStream) -> Self {
        ScopedShutdown { inner: Some(inner) }
    }
}

impl Drop for ScopedShutdown {
    fn drop(&mut self) {
        if let Some(stream) = self.inner.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Reads and parses one SCGI header block off `reader`, growing a buffer
/// chunk by chunk until [`header::parse`] reports a complete block. Wraps
/// the operation in the `scgi_parse` traceable action.
fn read_header_block<R: Read>(reader: &mut R) -> io::Result<(header::HeaderMap, Vec<u8>)> {
    let mut guard = ActionGuard::scgi_parse();
    let result = read_header_block_inner(reader);
    if result.is_ok() {
        guard.succeed();
    }
    result
}

fn read_header_block_inner<R: Read>(reader: &mut R) -> io::Result<(header::HeaderMap, Vec<u8>)> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        match header::parse(&buf) {
            Ok(Some((consumed, headers))) => {
                let leftover = buf[consumed..].to_vec();
                return Ok((headers, leftover));
            }
            Ok(None) => {
                let n = reader.read(&mut chunk)?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed before a complete SCGI header block arrived",
                    ));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(e) => return Err(io::Error::from(e)),
        }
    }
}

/// Runs `app` against a parsed environment, driving the response writer
/// through the body it returns. Wrapped in the `wsgi_request` traceable
/// action, tagged with `PATH_INFO`.
fn run_application(
    app: &dyn Application,
    env: &RequestEnvironment,
    response: &mut ResponseWriter<ConnectionWriter>,
) -> io::Result<()> {
    let mut guard = ActionGuard::wsgi_request(&env.path_info);
    let result = run_application_inner(app, env, response);
    if result.is_ok() {
        guard.succeed();
    }
    result
}

fn run_application_inner(
    app: &dyn Application,
    env: &RequestEnvironment,
    response: &mut ResponseWriter<ConnectionWriter>,
) -> io::Result<()> {
    let mut body = app.call(env, response)?;

    let mut result = Ok(());
    for item in body.by_ref() {
        match item.and_then(|chunk| response.write(&chunk)) {
            Ok(()) => {}
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    if result.is_ok() && !response.headers_sent() {
        result = response.write(b"");
    }

    // Explicit rather than incidental: the body's Drop (its `release` hook,
    // if any) runs here, right after the last write, not merely "eventually"
    // whenever this stack frame unwinds.
    drop(body);

    result
}

/// Processes one accepted connection against `app`: scoped shutdown,
/// header parse, environment synthesis, application call, response write.
/// Wrapped in the `scgi_request` traceable action.
pub fn process_connection(stream: UnixStream, app: &dyn Application) -> io::Result<()> {
    let mut guard = ActionGuard::scgi_request();
    let result = process_connection_inner(stream, app);
    if result.is_ok() {
        guard.succeed();
    }
    result
}

fn process_connection_inner(stream: UnixStream, app: &dyn Application) -> io::Result<()> {
    let mut body_reader = stream.try_clone()?;
    let response_stream = stream.try_clone()?;
    let shutdown = ScopedShutdown::new(stream);
    let _ = &shutdown; // held for its Drop impl (scoped shutdown-then-close)

    let (headers, leftover) = read_header_block(&mut body_reader)?;
    let connection_input = Cursor::new(leftover).chain(body_reader);
    let env = environment::synthesize(headers, connection_input);

    let out: ConnectionWriter = Box::new(response_stream);
    let mut response = ResponseWriter::new(out);

    run_application(app, &env, &mut response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn scgi_request(path_info_and_query: &str, body: &[u8]) -> Vec<u8> {
        let mut header_block = Vec::new();
        let mut push = |k: &str, v: &str| {
            header_block.extend_from_slice(k.as_bytes());
            header_block.push(0);
            header_block.extend_from_slice(v.as_bytes());
            header_block.push(0);
        };
        push("CONTENT_LENGTH", &body.len().to_string());
        push("SCGI", "1");
        push("REQUEST_METHOD", "GET");
        push("REQUEST_URI", path_info_and_query);

        let mut request = Vec::new();
        request.extend_from_slice(header_block.len().to_string().as_bytes());
        request.push(b':');
        request.extend_from_slice(&header_block);
        request.push(b',');
        request.extend_from_slice(body);
        request
    }

    /// A single-chunk body whose `Drop` flips a shared flag, standing in
    /// for the original's `response_obj.closed` check on a `BytesIO`
    /// returned directly as the application's response (spec.md §8
    /// property 9).
    struct ReleaseTrackingBody {
        chunk: Option<Bytes>,
        released: Arc<AtomicBool>,
    }

    impl Iterator for ReleaseTrackingBody {
        type Item = io::Result<Bytes>;
        fn next(&mut self) -> Option<Self::Item> {
            self.chunk.take().map(Ok)
        }
    }

    impl Drop for ReleaseTrackingBody {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn process_connection_round_trips_a_request_and_releases_the_body() {
        let (client, server) = UnixStream::pair().expect("socketpair");
        let released = Arc::new(AtomicBool::new(false));
        let released_for_app = released.clone();

        let app = move |env: &RequestEnvironment,
                         response: &mut ResponseWriter<ConnectionWriter>|
              -> io::Result<ResponseBody> {
            assert_eq!(env.path_info, "/deepthought");
            assert_eq!(env.query_string, "q=1");
            response
                .start_response(
                    "200 OK",
                    &[("X-Is-Ok".to_string(), "true".to_string())],
                    None,
                )
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let body: ResponseBody = Box::new(ReleaseTrackingBody {
                chunk: Some(Bytes::from_static(b"some data")),
                released: released_for_app.clone(),
            });
            Ok(body)
        };

        let writer = std::thread::spawn(move || {
            let mut client = client;
            client
                .write_all(&scgi_request("/deepthought?q=1", b""))
                .unwrap();
            let mut response = Vec::new();
            client.read_to_end(&mut response).unwrap();
            response
        });

        process_connection(server, &app).expect("request processed");
        let response = writer.join().expect("writer thread");

        assert_eq!(
            response,
            b"Status: 200 OK\r\nX-Is-Ok: true\r\n\r\nsome data".to_vec()
        );
        assert!(
            released.load(Ordering::SeqCst),
            "response body was not released after the last chunk"
        );
    }

    #[test]
    fn process_connection_flushes_headers_once_for_an_empty_body() {
        let (client, server) = UnixStream::pair().expect("socketpair");

        let app = |_: &RequestEnvironment,
                    response: &mut ResponseWriter<ConnectionWriter>|
              -> io::Result<ResponseBody> {
            response
                .start_response("204 No Content", &[], None)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let body: ResponseBody = Box::new(std::iter::empty());
            Ok(body)
        };

        let writer = std::thread::spawn(move || {
            let mut client = client;
            client
                .write_all(&scgi_request("/empty", b""))
                .unwrap();
            let mut response = Vec::new();
            client.read_to_end(&mut response).unwrap();
            response
        });

        process_connection(server, &app).expect("request processed");
        let response = writer.join().expect("writer thread");

        assert_eq!(response, b"Status: 204 No Content\r\n\r\n".to_vec());
    }

    #[test]
    fn scoped_shutdown_suppresses_a_transport_error_on_drop() {
        let (client, server) = UnixStream::pair().expect("socketpair");
        drop(client); // peer already gone: shutdown(RDWR) below may error
        let guard = ScopedShutdown::new(server);
        drop(guard); // must not panic even though the peer is already closed
    }
}
