//! UTF-8 validation for TEXT payloads and close reasons.
//!
//! `std::str::from_utf8` already enforces RFC 3629 exactly (no overlong
//! encodings, no surrogates, nothing above U+10FFFF); [`Utf8Validator`]
//! extends it to streaming input by carrying the trailing bytes of an
//! incomplete scalar between chunks, which is what fragmented TEXT
//! messages need when a code point straddles a frame boundary.

/// Validate a complete buffer.
pub fn validate(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_ok()
}

/// Streaming validator. Feed chunks in order; call [`finish`](Self::finish)
/// at the end of the logical message.
#[derive(Debug, Default)]
pub struct Utf8Validator {
    partial: [u8; 4],
    partial_len: usize,
}

impl Utf8Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next chunk. Returns `false` as soon as the stream can no
    /// longer be a prefix of valid UTF-8.
    pub fn feed(&mut self, mut chunk: &[u8]) -> bool {
        // Finish a scalar left over from the previous chunk one byte at a
        // time; a scalar is at most 4 bytes so this loops at most 3 times.
        while self.partial_len > 0 && !chunk.is_empty() {
            self.partial[self.partial_len] = chunk[0];
            self.partial_len += 1;
            chunk = &chunk[1..];
            match std::str::from_utf8(&self.partial[..self.partial_len]) {
                Ok(_) => {
                    self.partial_len = 0;
                }
                Err(e) if e.error_len().is_some() => return false,
                Err(_) => {} // still incomplete
            }
        }

        match std::str::from_utf8(chunk) {
            Ok(_) => true,
            Err(e) => {
                if e.error_len().is_some() {
                    return false;
                }
                // Incomplete trailing scalar; carry it into the next chunk.
                let tail = &chunk[e.valid_up_to()..];
                self.partial[..tail.len()].copy_from_slice(tail);
                self.partial_len = tail.len();
                true
            }
        }
    }

    /// True when the stream ended on a scalar boundary. Resets the state
    /// either way so the validator can be reused for the next message.
    pub fn finish(&mut self) -> bool {
        let complete = self.partial_len == 0;
        self.partial_len = 0;
        complete
    }

    pub fn reset(&mut self) {
        self.partial_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_stream(chunks: &[&[u8]]) -> bool {
        let mut v = Utf8Validator::new();
        for c in chunks {
            if !v.feed(c) {
                return false;
            }
        }
        v.finish()
    }

    #[test]
    fn accepts_ascii_and_multibyte() {
        assert!(validate(b"hello"));
        assert!(validate("héllo — 世界 🦀".as_bytes()));
        assert!(validate(b""));
    }

    #[test]
    fn rejects_classic_invalid_sequences() {
        assert!(!validate(&[0xFF]));
        assert!(!validate(&[0xC0, 0xAF])); // overlong '/'
        assert!(!validate(&[0xE0, 0x80, 0x80])); // overlong NUL
        assert!(!validate(&[0xED, 0xA0, 0x80])); // surrogate U+D800
        assert!(!validate(&[0xF4, 0x90, 0x80, 0x80])); // above U+10FFFF
        assert!(!validate(&[0xC3])); // truncated
    }

    #[test]
    fn boundary_code_points() {
        assert!(validate(&[0xF4, 0x8F, 0xBF, 0xBF])); // U+10FFFF
        assert!(validate(&[0xED, 0x9F, 0xBF])); // U+D7FF
        assert!(validate(&[0xEE, 0x80, 0x80])); // U+E000
    }

    #[test]
    fn scalar_split_across_chunks() {
        // "é" = C3 A9, "世" = E4 B8 96, "🦀" = F0 9F A6 80
        assert!(valid_stream(&[&[0xC3], &[0xA9]]));
        assert!(valid_stream(&[&[0xE4, 0xB8], &[0x96]]));
        assert!(valid_stream(&[&[0xF0], &[0x9F, 0xA6], &[0x80]]));
        assert!(valid_stream(&[b"abc", &[0xE4], &[0xB8], &[0x96, b'x']]));
    }

    #[test]
    fn split_invalid_sequences_rejected() {
        assert!(!valid_stream(&[&[0xED, 0xA0], &[0x80]])); // surrogate across chunks
        assert!(!valid_stream(&[&[0xC3], &[0x28]])); // bad continuation byte
    }

    #[test]
    fn dangling_partial_fails_finish() {
        let mut v = Utf8Validator::new();
        assert!(v.feed(&[0xE4, 0xB8]));
        assert!(!v.finish());
        // finish resets: the validator is reusable afterwards
        assert!(v.feed(b"ok"));
        assert!(v.finish());
    }

    #[test]
    fn empty_chunks_are_neutral() {
        assert!(valid_stream(&[b"", &[0xC3], b"", &[0xA9], b""]));
    }
}
