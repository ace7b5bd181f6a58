//! Multi-string decoding (spec.md §4.A, tested by scenario S2).
//!
//! A PC/SC "multi-string" is a sequence of UTF-8 strings, each
//! NUL-terminated, with the whole sequence terminated by a second NUL
//! (an empty trailing string).

/// Error returned when a byte buffer is not a well-formed multi-string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("buffer is not a NUL-terminated multi-string")]
pub struct NotAMultiString;

/// Decode a multi-string into its non-empty components.
///
/// An input starting with a NUL byte yields the empty list. A buffer
/// missing the final terminating empty string is rejected.
pub fn decode_multistring(buf: &[u8]) -> Result<Vec<String>, NotAMultiString> {
    if buf.is_empty() {
        return Err(NotAMultiString);
    }
    if buf[0] == 0 {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        let rest = &buf[pos..];
        let nul = rest.iter().position(|&b| b == 0).ok_or(NotAMultiString)?;
        if nul == 0 {
            // terminating empty string
            return Ok(out);
        }
        let s = std::str::from_utf8(&rest[..nul]).map_err(|_| NotAMultiString)?;
        out.push(s.to_string());
        pos += nul + 1;
        if pos >= buf.len() {
            // ran off the end without a terminating empty string
            return Err(NotAMultiString);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_two_strings() {
        let bytes = b"AB\0cde\0\0";
        assert_eq!(decode_multistring(bytes).unwrap(), vec!["AB", "cde"]);
    }

    #[test]
    fn s2_empty_list() {
        let bytes = b"\0";
        assert_eq!(decode_multistring(bytes).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn s2_missing_terminator_fails() {
        let bytes = b"A\0";
        assert!(decode_multistring(bytes).is_err());
    }
}
