//! Decoding child output into normalised text lines.

use crate::error::{CmdError, Result};
use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};
use std::fmt;
use std::str::FromStr;

/// Text encoding used to decode a child's output streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEncoding(&'static Encoding);

impl OutputEncoding {
    /// Look up an encoding by its WHATWG label (`utf-8`, `latin1`, `sjis`, ...)
    pub fn for_label(label: &str) -> Result<Self> {
        Encoding::for_label(label.trim().as_bytes())
            .map(OutputEncoding)
            .ok_or_else(|| CmdError::UnknownEncoding(label.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    pub(crate) fn line_decoder(&self) -> LineDecoder {
        LineDecoder::new(self.0)
    }
}

impl Default for OutputEncoding {
    fn default() -> Self {
        OutputEncoding(UTF_8)
    }
}

impl FromStr for OutputEncoding {
    type Err = CmdError;

    fn from_str(s: &str) -> Result<Self> {
        Self::for_label(s)
    }
}

impl fmt::Display for OutputEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Streaming decoder that turns raw output chunks into `\n`-terminated lines.
///
/// Chunks may split multi-byte sequences; the decoder carries the partial
/// sequence over to the next chunk. `\r\n` is normalised to `\n` and the last
/// line is terminated even if the stream did not end with a newline.
pub(crate) struct LineDecoder {
    decoder: Decoder,
    pending: String,
    text: String,
}

impl LineDecoder {
    fn new(encoding: &'static Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder_with_bom_removal(),
            pending: String::new(),
            text: String::new(),
        }
    }

    pub(crate) fn feed(&mut self, chunk: &[u8]) {
        self.decode(chunk, false);
        self.flush_lines();
    }

    pub(crate) fn finish(mut self) -> String {
        self.decode(&[], true);
        self.flush_lines();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.push_line(&rest);
        }
        self.text
    }

    fn decode(&mut self, mut input: &[u8], last: bool) {
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(input.len())
                .unwrap_or(input.len() * 3 + 4);
            self.pending.reserve(needed);

            let (result, read, _) = self.decoder.decode_to_string(input, &mut self.pending, last);
            input = &input[read..];

            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn flush_lines(&mut self) {
        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            self.push_line(&line[..end]);
        }
    }

    fn push_line(&mut self, line: &str) {
        self.text.push_str(line.strip_suffix('\r').unwrap_or(line));
        self.text.push('\n');
    }
}
