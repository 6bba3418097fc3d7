//! Line splitting for streamed bodies.
//!
//! Network chunks can end anywhere, including in the middle of a UTF-8
//! sequence, so bytes are buffered until a full line is available.

#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Feeds a chunk and returns every line it completed, without the line
    /// terminator (`\n` or `\r\n`).
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.buf[start..end]));
            start = end + 1;
        }
        self.buf.drain(..start);

        lines
    }

    /// Whatever is left after the last line terminator.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = decode_line(&self.buf);
        self.buf.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Collects the `data:` payloads of a `text/event-stream` body. Multi-line
/// data fields are joined with `\n`; comments and other fields are skipped.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    lines: LineBuffer,
    data: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut events = Vec::new();
        for line in self.lines.push(chunk) {
            self.line(line, &mut events);
        }
        events
    }

    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if let Some(line) = self.lines.finish() {
            self.line(line, &mut events);
        }
        self.dispatch(&mut events);
        events
    }

    fn line(&mut self, line: String, events: &mut Vec<String>) {
        if line.is_empty() {
            self.dispatch(events);
        } else if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.strip_prefix(' ').unwrap_or(data).to_owned());
        }
    }

    fn dispatch(&mut self, events: &mut Vec<String>) {
        if !self.data.is_empty() {
            events.push(self.data.join("\n"));
            self.data.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_survive_arbitrary_chunking() {
        let body = "first\r\nsécond\nthird";
        let bytes = body.as_bytes();

        for split in 0..bytes.len() {
            let mut lines = LineBuffer::default();
            let mut out = lines.push(&bytes[..split]);
            out.extend(lines.push(&bytes[split..]));
            out.extend(lines.finish());
            assert_eq!(out, ["first", "sécond", "third"], "split at {split}");
        }
    }

    #[test]
    fn events_are_dispatched_on_blank_lines() {
        let mut sse = SseDecoder::default();
        assert!(sse.push(b"data: {\"a\":1}\r\n").is_empty());
        assert_eq!(sse.push(b"\r\ndata: {\"a\":2}\r\n\r\n"), ["{\"a\":1}", "{\"a\":2}"]);
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let mut sse = SseDecoder::default();
        let events = sse.push(b": keep-alive\nevent: message\nid: 4\ndata:x\ndata: y\n\n");
        assert_eq!(events, ["x\ny"]);
    }

    #[test]
    fn unterminated_event_is_flushed_on_finish() {
        let mut sse = SseDecoder::default();
        assert!(sse.push(b"data: tail").is_empty());
        assert_eq!(sse.finish(), ["tail"]);
        assert!(sse.finish().is_empty());
    }
}
