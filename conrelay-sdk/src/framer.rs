//! Line framing for the console byte stream.
//!
//! The console terminates lines with CR, LF or CRLF depending on the server
//! build, and TCP reads split them at arbitrary points. [`LineFramer`]
//! buffers the unterminated tail of each read and hands back only complete
//! lines. Framing happens on bytes, so a multi-byte UTF-8 character split
//! across two reads is reassembled before it is decoded.

use std::borrow::Cow;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Incremental splitter for a CR / LF / CRLF delimited stream.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Unterminated remainder of previous chunks. Never holds CR or LF.
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every line it completes, in arrival order.
    ///
    /// Empty segments (from `\r\n`, blank lines, or a CRLF pair split
    /// across two chunks) are dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        for (i, &byte) in chunk.iter().enumerate() {
            if byte != CR && byte != LF {
                continue;
            }
            self.buf.extend_from_slice(&chunk[start..i]);
            start = i + 1;
            if !self.buf.is_empty() {
                lines.push(decode(&self.buf));
                self.buf.clear();
            }
        }

        self.buf.extend_from_slice(&chunk[start..]);
        lines
    }

    /// The buffered partial line, decoded lossily.
    ///
    /// Used to spot a password prompt the server sends without a trailing
    /// terminator.
    pub fn partial(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.buf)
    }

    /// Number of buffered bytes not yet terminated.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Forget any buffered partial line (new connection).
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(e) => {
            tracing::debug!(error = %e, len = bytes.len(), "Console line is not valid UTF-8; decoding lossily");
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_in_second_chunk_completes_line() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"partial-A").is_empty());
        assert_eq!(framer.feed(b"partial-Bterm\n"), vec!["partial-Apartial-Bterm"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn partial_chunks_join_without_interim_emission() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"partial-A").is_empty());
        assert!(framer.feed(b"partial-B").is_empty());
        assert_eq!(framer.feed(b"\n"), vec!["partial-Apartial-B"]);
    }

    #[test]
    fn multi_line_chunk_in_order() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"A\nB\nC\n"), vec!["A", "B", "C"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn trailing_partial_retained() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"Line one\nPartial"), vec!["Line one"]);
        assert_eq!(framer.partial(), "Partial");
        assert_eq!(framer.feed(b" tail\n"), vec!["Partial tail"]);
    }

    #[test]
    fn cr_lf_and_crlf_are_equivalent() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"one\rtwo\nthree\r\nfour\r\n"), vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn crlf_split_across_chunks_yields_no_empty_line() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"first\r"), vec!["first"]);
        assert_eq!(framer.feed(b"\nsecond\r\n"), vec!["second"]);
    }

    #[test]
    fn blank_lines_are_dropped() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"\n\n\r\nx\n\n"), vec!["x"]);
    }

    #[test]
    fn lines_never_contain_terminators() {
        let mut framer = LineFramer::new();
        let mut out = Vec::new();
        for chunk in [&b"a\r"[..], b"\nb", b"c\r\r\nd\n", b"e"] {
            out.extend(framer.feed(chunk));
        }
        assert_eq!(out, vec!["a", "bc", "d"]);
        assert!(out.iter().all(|l| !l.contains('\r') && !l.contains('\n')));
        assert_eq!(framer.partial(), "e");
    }

    #[test]
    fn utf8_split_across_chunks_is_reassembled() {
        let bytes = "Spieler Jürgen joined\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut framer = LineFramer::new();
        assert!(framer.feed(&bytes[..split]).is_empty());
        assert_eq!(framer.feed(&bytes[split..]), vec!["Spieler Jürgen joined"]);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"bad \xFF byte\n");
        assert_eq!(lines, vec!["bad \u{FFFD} byte"]);
    }

    #[test]
    fn reset_discards_partial() {
        let mut framer = LineFramer::new();
        framer.feed(b"stale");
        framer.reset();
        assert_eq!(framer.feed(b"fresh\n"), vec!["fresh"]);
    }
}
