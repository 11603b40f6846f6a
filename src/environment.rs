//! Request environment synthesizer (component D).
//!
//! Turns a parsed [`HeaderMap`](crate::header::HeaderMap) into a
//! [`RequestEnvironment`]: the fixed gateway-added keys a WSGI-style hosting
//! contract expects, laid out as concrete fields rather than folded into the
//! header map itself, plus the original headers verbatim for anything
//! application-specific.

use std::collections::HashMap;
use std::io::{self, Read};

use crate::header::{self, HeaderMap};

/// `wsgi.version`. Always `(1, 0)`: this gateway speaks one fixed protocol
/// revision.
pub const WSGI_VERSION: (u32, u32) = (1, 0);

/// A fully synthesized request environment: every SCGI header the client
/// sent, plus the fixed keys a hosting contract adds before invoking the
/// application.
///
/// Not `Clone`/`Debug`: `input` is a boxed `Read` trait object (the
/// connection's own byte stream, or a fresh empty one), neither of which a
/// trait object can derive.
pub struct RequestEnvironment {
    /// Every header from the SCGI block, verbatim (ISO-8859-1 decoded).
    pub headers: HashMap<String, String>,

    pub wsgi_version: (u32, u32),
    pub url_scheme: String,
    pub multithread: bool,
    pub multiprocess: bool,
    pub run_once: bool,

    /// `wsgi.input`: the connection's input stream when `CONTENT_LENGTH` is
    /// non-zero, or an empty stream otherwise.
    pub input: Box<dyn Read + Send>,

    /// `wsgi.errors`: the process-wide error stream every request shares.
    pub errors: io::Stderr,

    pub path_info: String,
    pub query_string: String,
    pub script_name: String,

    /// `CONTENT_LENGTH`, parsed as a decimal integer. `None` if the header
    /// was absent or not a valid decimal integer, in which case the body is
    /// treated as empty (`has_body` is `false`).
    pub content_length: Option<u64>,
}

/// Applies the rules of component D, in order, to `headers`.
///
/// `connection_input` is handed back as `wsgi.input` verbatim when
/// `CONTENT_LENGTH` is non-zero; otherwise it is dropped in favor of a
/// fresh empty stream, per rule 4.
pub fn synthesize<R>(headers: HeaderMap, connection_input: R) -> RequestEnvironment
where
    R: Read + Send + 'static,
{
    let content_length = header::get(&headers, "CONTENT_LENGTH").and_then(|v| v.parse().ok());
    let has_body = content_length.map(|n| n != 0).unwrap_or(false);
    let input: Box<dyn Read + Send> = if has_body {
        Box::new(connection_input)
    } else {
        Box::new(io::empty())
    };

    let mut url_scheme = "http".to_string();
    if let Some(https) = header::get(&headers, "HTTPS") {
        if https == "on" || https == "1" {
            url_scheme = "https".to_string();
        }
    }

    let existing_query_string = header::get(&headers, "QUERY_STRING").map(|s| s.to_string());
    let (path_info, query_string) = match header::get(&headers, "REQUEST_URI") {
        Some(uri) => match uri.split_once('?') {
            Some((path, query)) => (
                path.to_string(),
                existing_query_string.unwrap_or_else(|| query.to_string()),
            ),
            None => (uri.to_string(), existing_query_string.unwrap_or_default()),
        },
        None => (String::new(), existing_query_string.unwrap_or_default()),
    };

    let header_map: HashMap<String, String> = headers.into_iter().collect();

    RequestEnvironment {
        headers: header_map,
        wsgi_version: WSGI_VERSION,
        url_scheme,
        multithread: false,
        multiprocess: true,
        run_once: false,
        input,
        errors: io::stderr(),
        path_info,
        query_string,
        script_name: String::new(),
        content_length,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn has_body(env: &RequestEnvironment) -> bool {
        env.content_length.map(|n| n != 0).unwrap_or(false)
    }

    #[test]
    fn protocol_sample_environment() {
        let env = synthesize(
            headers(&[
                ("X_PASSED_THROUGH", "1"),
                ("HTTPS", "on"),
                ("CONTENT_LENGTH", "27"),
                ("REQUEST_URI", "http://blah/foo?bar=1"),
            ]),
            Cursor::new(b"What is the answer to life?".to_vec()),
        );
        assert_eq!(env.url_scheme, "https");
        assert!(has_body(&env));
        assert_eq!(env.content_length, Some(27));
        assert_eq!(env.path_info, "http://blah/foo");
        assert_eq!(env.query_string, "bar=1");
        assert_eq!(env.script_name, "");
        assert_eq!(env.wsgi_version, (1, 0));
        assert!(!env.multithread);
        assert!(env.multiprocess);
        assert!(!env.run_once);
        let _: &io::Stderr = &env.errors; // wsgi.errors is always present
        assert_eq!(
            env.headers.get("X_PASSED_THROUGH").map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn https_ignored_does_not_promote_scheme() {
        let env = synthesize(headers(&[("HTTPS", "ignored")]), Cursor::new(Vec::new()));
        assert_eq!(env.url_scheme, "http");
    }

    #[test]
    fn https_one_promotes_scheme() {
        let env = synthesize(headers(&[("HTTPS", "1")]), Cursor::new(Vec::new()));
        assert_eq!(env.url_scheme, "https");
    }

    #[test]
    fn preexisting_query_string_is_not_overwritten() {
        let env = synthesize(
            headers(&[("REQUEST_URI", "/foo?new=1"), ("QUERY_STRING", "old=1")]),
            Cursor::new(Vec::new()),
        );
        assert_eq!(env.path_info, "/foo");
        assert_eq!(env.query_string, "old=1");
    }

    #[test]
    fn missing_request_uri_defaults_empty() {
        let env = synthesize(headers(&[]), Cursor::new(Vec::new()));
        assert_eq!(env.path_info, "");
        assert_eq!(env.query_string, "");
    }

    #[test]
    fn zero_content_length_has_no_body() {
        let env = synthesize(
            headers(&[("CONTENT_LENGTH", "0")]),
            Cursor::new(Vec::new()),
        );
        assert!(!has_body(&env));
        assert_eq!(env.content_length, Some(0));
    }

    #[test]
    fn request_uri_without_query_string() {
        let env = synthesize(
            headers(&[("REQUEST_URI", "/deepthought")]),
            Cursor::new(Vec::new()),
        );
        assert_eq!(env.path_info, "/deepthought");
        assert_eq!(env.query_string, "");
    }

    #[test]
    fn has_body_reads_through_connection_input() {
        let mut env = synthesize(
            headers(&[("CONTENT_LENGTH", "5")]),
            Cursor::new(b"hello".to_vec()),
        );
        let mut buf = Vec::new();
        env.input.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }
}
