//! Netstring codec (component B).
//!
//! A netstring is `length ":" payload ","`, where `length` is the ASCII
//! decimal byte count of `payload`. Used as the outermost framing of the
//! SCGI header block (component C reads exactly one netstring per request).
//!
//! [`decode`] operates on a single in-memory buffer and reports `Ok(None)`
//! when the buffer doesn't yet hold a complete netstring, mirroring the
//! "try to consume, ask for more" shape of `tokio_util::codec::Decoder`
//! without requiring a `Decoder` impl of its own — callers that do want
//! incremental consumption from a byte stream call this once per arrival of
//! new bytes, same as the header parser in [`crate::header`] does.

use crate::error::NetstringError;

/// Upper bound on the number of ASCII digits read for the length prefix.
/// Caps the maximum representable netstring payload under 10 MiB
/// (`9,999,999` bytes) and bounds allocation before the length is even
/// fully parsed.
const MAX_LENGTH_DIGITS: usize = 7;

/// Attempts to decode one netstring from the front of `buf`.
///
/// Returns `Ok(Some((consumed, payload)))` when a complete netstring was
/// found at the start of `buf`, where `consumed` is the total number of
/// bytes occupied by the netstring (length prefix + `:` + payload + `,`)
/// and `payload` borrows the payload bytes out of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet contain a complete netstring
/// but nothing read so far is invalid — the caller should wait for more
/// bytes and retry.
///
/// Returns `Err` as soon as the input is provably malformed: a non-digit
/// (and non-`:`) byte in the length prefix, more than
/// [`MAX_LENGTH_DIGITS`] digits, an empty length, or a missing `,`
/// terminator.
pub fn decode(buf: &[u8]) -> Result<Option<(usize, &[u8])>, NetstringError> {
    let mut digits_end = None;
    for (i, &b) in buf.iter().enumerate().take(MAX_LENGTH_DIGITS + 1) {
        if b == b':' {
            digits_end = Some(i);
            break;
        }
        if !b.is_ascii_digit() {
            return Err(NetstringError::NotADigit);
        }
        if i == MAX_LENGTH_DIGITS {
            return Err(NetstringError::LengthTooLong);
        }
    }

    let digits_end = match digits_end {
        Some(i) => i,
        // No ':' found within the scanned prefix and no violation was hit
        // above, so buf must be <= MAX_LENGTH_DIGITS bytes of plain digits:
        // wait for more data.
        None => return Ok(None),
    };

    if digits_end == 0 {
        return Err(NetstringError::NotADigit);
    }

    // Safe: every byte up to digits_end was verified to be an ASCII digit.
    let length: usize = std::str::from_utf8(&buf[..digits_end])
        .unwrap()
        .parse()
        .map_err(|_| NetstringError::LengthTooLong)?;

    let payload_start = digits_end + 1;
    let payload_end = payload_start + length;
    let terminator_index = payload_end;

    if buf.len() <= terminator_index {
        return Ok(None); // payload and/or terminator not fully arrived yet
    }

    if buf[terminator_index] != b',' {
        return Err(NetstringError::MissingComma);
    }

    Ok(Some((terminator_index + 1, &buf[payload_start..payload_end])))
}

/// Encodes `payload` as a netstring. Not needed by the production read
/// path (the gateway only ever consumes netstrings, never emits them) but
/// kept so the round-trip law `decode(encode(b)) == b` is a single
/// function call to verify, and because a symmetric encoder is the natural
/// counterpart to [`decode`].
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 16);
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(payload);
    out.push(b',');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip_examples() {
        assert_eq!(decode(b"0:,").unwrap(), Some((3, &b""[..])));
        assert_eq!(decode(b"1:a,").unwrap(), Some((4, &b"a"[..])));
        assert_eq!(decode(b"5:hello,").unwrap(), Some((8, &b"hello"[..])));
    }

    #[test]
    fn bounds_failures() {
        assert!(matches!(decode(b""), Ok(None)));
        assert!(matches!(decode(b"xxx"), Err(NetstringError::NotADigit)));
        assert!(matches!(
            decode(b"12345678:ignored,"),
            Err(NetstringError::LengthTooLong)
        ));
        // Missing terminator: incomplete in-buffer, not yet provably wrong.
        assert!(matches!(decode(b"1:a"), Ok(None)));
    }

    #[test]
    fn missing_terminator_byte_present_is_an_error() {
        // Once the byte that should be ',' has actually arrived and isn't,
        // that's a hard failure rather than "need more data".
        assert!(matches!(
            decode(b"1:ax"),
            Err(NetstringError::MissingComma)
        ));
    }

    #[test]
    fn empty_length_is_an_error() {
        assert!(matches!(decode(b":,"), Err(NetstringError::NotADigit)));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode(&bytes);
        }

        #[test]
        fn round_trip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let encoded = encode(&payload);
            let (consumed, decoded) = decode(&encoded).unwrap().expect("complete netstring");
            prop_assert_eq!(consumed, encoded.len());
            prop_assert_eq!(decoded, payload.as_slice());
        }
    }
}
