//! Record framing for the server-sent text stream.
//!
//! The transport hands over bytes in arbitrary slices: a record, a UTF-8
//! character or even a `\r\n` pair may straddle two reads. The splitter keeps
//! whatever is incomplete and only releases whole records.

use serde::{Deserialize, Serialize};

/// How records are delimited in the text stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Every line is a record (`data: {...}\n`).
    #[default]
    Line,
    /// Records are separated by a blank line and may span several lines.
    Event,
}

impl Framing {
    /// Delimiter between two records.
    pub fn delimiter(self) -> &'static str {
        match self {
            Framing::Line => "\n",
            Framing::Event => "\n\n",
        }
    }
}

/// Split `buffer` into complete records plus the incomplete remainder.
///
/// Records are returned without their delimiter. The remainder must be kept
/// and prepended to the next read.
pub fn split_records(buffer: &str, framing: Framing) -> (Vec<&str>, &str) {
    let delimiter = framing.delimiter();
    let mut records = Vec::new();
    let mut rest = buffer;

    while let Some(pos) = rest.find(delimiter) {
        records.push(&rest[..pos]);
        rest = &rest[pos + delimiter.len()..];
    }

    (records, rest)
}

/// Accumulates transport bytes and yields complete records.
#[derive(Debug, Default)]
pub struct RecordSplitter {
    framing: Framing,
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    utf8_tail: Vec<u8>,
}

impl RecordSplitter {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            text: String::new(),
            utf8_tail: Vec::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Append one transport read and return every record it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.append_utf8(bytes);

        if self.text.contains("\r\n") {
            self.text = self.text.replace("\r\n", "\n");
        }

        let (records, rest) = split_records(&self.text, self.framing);
        let records: Vec<String> = records.into_iter().map(str::to_owned).collect();
        let consumed = self.text.len() - rest.len();
        self.text.drain(..consumed);

        records
    }

    /// Bytes received but not yet part of a complete record.
    pub fn pending_len(&self) -> usize {
        self.text.len() + self.utf8_tail.len()
    }

    /// Drop whatever is buffered and return it, lossily decoded.
    pub fn take_remainder(&mut self) -> String {
        let mut remainder = std::mem::take(&mut self.text);
        if !self.utf8_tail.is_empty() {
            remainder.push_str(&String::from_utf8_lossy(&self.utf8_tail));
            self.utf8_tail.clear();
        }
        remainder
    }

    pub fn reset(&mut self) {
        self.text.clear();
        self.utf8_tail.clear();
    }

    fn append_utf8(&mut self, bytes: &[u8]) {
        let mut input = std::mem::take(&mut self.utf8_tail);
        input.extend_from_slice(bytes);

        loop {
            match std::str::from_utf8(&input) {
                Ok(s) => {
                    self.text.push_str(s);
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&input[..valid]) {
                        self.text.push_str(prefix);
                    }
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            input.drain(..valid + len);
                        }
                        None => {
                            // Sequence cut by the read boundary
                            self.utf8_tail = input.split_off(valid);
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_line_records_keeps_remainder() {
        let (records, rest) = split_records("data: a\ndata: b\ndata: c", Framing::Line);
        assert_eq!(records, vec!["data: a", "data: b"]);
        assert_eq!(rest, "data: c");
    }

    #[test]
    fn split_event_records_on_blank_line() {
        let (records, rest) = split_records("data: a\n\nevent: x\ndata: b\n\ndata:", Framing::Event);
        assert_eq!(records, vec!["data: a", "event: x\ndata: b"]);
        assert_eq!(rest, "data:");
    }

    #[test]
    fn split_without_delimiter_returns_everything_as_remainder() {
        let (records, rest) = split_records("data: partial", Framing::Line);
        assert!(records.is_empty());
        assert_eq!(rest, "data: partial");
    }

    #[test]
    fn splitter_reassembles_record_across_reads() {
        let mut splitter = RecordSplitter::new(Framing::Line);
        assert!(splitter.push(b"data: {\"ty").is_empty());
        assert!(splitter.push(b"pe\":1}").is_empty());
        let records = splitter.push(b"\ndata: next");
        assert_eq!(records, vec!["data: {\"type\":1}"]);
        assert_eq!(splitter.pending_len(), "data: next".len());
    }

    #[test]
    fn splitter_normalizes_crlf_split_across_reads() {
        let mut splitter = RecordSplitter::new(Framing::Event);
        assert!(splitter.push(b"data: a\r\n\r").is_empty());
        let records = splitter.push(b"\ndata: b\r\n\r\n");
        assert_eq!(records, vec!["data: a", "data: b"]);
        assert_eq!(splitter.pending_len(), 0);
    }

    #[test]
    fn splitter_carries_incomplete_utf8_sequence() {
        let mut splitter = RecordSplitter::new(Framing::Line);
        let text = "data: é\n".as_bytes();
        // 'é' is two bytes; cut between them
        let cut = text.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(splitter.push(&text[..cut]).is_empty());
        let records = splitter.push(&text[cut..]);
        assert_eq!(records, vec!["data: é"]);
    }

    #[test]
    fn splitter_replaces_invalid_utf8() {
        let mut splitter = RecordSplitter::new(Framing::Line);
        let records = splitter.push(b"data: \xFFok\n");
        assert_eq!(records, vec!["data: \u{FFFD}ok"]);
    }

    #[test]
    fn take_remainder_drains_buffer() {
        let mut splitter = RecordSplitter::new(Framing::Line);
        splitter.push(b"data: tail");
        assert_eq!(splitter.take_remainder(), "data: tail");
        assert_eq!(splitter.pending_len(), 0);
    }
}
