//! SCGI header parser (component C).
//!
//! Reads one netstring from the front of a connection's buffered bytes and
//! splits its payload on NUL bytes into a [`HeaderMap`]. Header bytes are
//! decoded as ISO-8859-1 (Latin-1) rather than UTF-8 so that every byte
//! round-trips losslessly to a `char`, per the hosting contract's handling
//! of non-UTF-8 header bytes (spec §4.D / §9).

use crate::error::ScgiHeaderError;
use crate::netstring;

/// An ordered sequence of SCGI header name/value pairs. Order is
/// insignificant per spec, but a `Vec` avoids needing `Hash` on lookups
/// that only ever happen a handful of times per request.
pub type HeaderMap = Vec<(String, String)>;

/// Decodes bytes as ISO-8859-1: every byte maps directly to the Unicode
/// scalar value of the same number, so no byte sequence is ever rejected.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Attempts to parse one SCGI header block from the front of `buf`.
///
/// Returns `Ok(Some((consumed, headers)))` when a complete, well-formed
/// header block was found, `Ok(None)` if `buf` doesn't yet hold a complete
/// netstring, or `Err` if the netstring framing or header structure is
/// invalid.
pub fn parse(buf: &[u8]) -> Result<Option<(usize, HeaderMap)>, ScgiHeaderError> {
    let (consumed, payload) = match netstring::decode(buf) {
        Ok(Some(found)) => found,
        Ok(None) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let fields: Vec<&[u8]> = payload.split(|&b| b == 0).collect();
    // A payload terminated by NUL splits into N "key\0value\0...\0" pairs
    // plus one trailing empty slice after the final NUL.
    match fields.last() {
        Some(last) if last.is_empty() => {}
        _ => return Err(ScgiHeaderError::NotNulTerminated),
    }
    let fields = &fields[..fields.len() - 1];

    if fields.len() % 2 != 0 {
        return Err(ScgiHeaderError::OddFieldCount);
    }

    let mut headers = HeaderMap::with_capacity(fields.len() / 2);
    for pair in fields.chunks_exact(2) {
        headers.push((decode_latin1(pair[0]), decode_latin1(pair[1])));
    }

    Ok(Some((consumed, headers)))
}

/// Looks up a header by name, case-sensitively, as SCGI headers are
/// conventionally all-uppercase and the gateway never normalizes case.
pub fn get<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTOCOL_SAMPLE: &[u8] = b"70:CONTENT_LENGTH\027\0SCGI\01\0REQUEST_METHOD\0POST\0REQUEST_URI\0/deepthought\0,What is the answer to life?";

    #[test]
    fn parses_the_protocol_sample() {
        let (consumed, headers) = parse(PROTOCOL_SAMPLE).unwrap().unwrap();
        assert_eq!(
            headers,
            vec![
                ("CONTENT_LENGTH".to_string(), "27".to_string()),
                ("SCGI".to_string(), "1".to_string()),
                ("REQUEST_METHOD".to_string(), "POST".to_string()),
                ("REQUEST_URI".to_string(), "/deepthought".to_string()),
            ]
        );
        assert_eq!(&PROTOCOL_SAMPLE[consumed..], b"What is the answer to life?");
    }

    #[test]
    fn latin1_byte_round_trips() {
        let payload = b"29:CONTENT_LENGTH\x001\x00X_LATIN_1\x00\xbf\x00,";
        let (_, headers) = parse(payload).unwrap().unwrap();
        assert_eq!(get(&headers, "X_LATIN_1"), Some("\u{00bf}"));
    }

    #[test]
    fn missing_trailing_null_fails() {
        let payload = b"21:missing trailing null,";
        assert!(matches!(
            parse(payload),
            Err(ScgiHeaderError::NotNulTerminated)
        ));
    }

    #[test]
    fn odd_field_count_fails() {
        // "KEY\0" alone: one field, no matching value, and it IS the
        // required trailing-empty terminator... so force an odd count by
        // adding an unterminated extra key.
        let payload = b"8:KEY\0a\0b\0,"; // KEY, a, b, "" -> odd count (3) after dropping trailer
        assert!(matches!(parse(payload), Err(ScgiHeaderError::OddFieldCount)));
    }

    #[test]
    fn incomplete_input_waits_for_more() {
        assert!(matches!(parse(b"10:abc"), Ok(None)));
    }
}
