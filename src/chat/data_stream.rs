//! The line protocol spoken to the browser while a reply is generated.
//!
//! Each line is `<type>:<json>\n`:
//! - `0:` a text delta (JSON string)
//! - `3:` an error message (JSON string)
//! - `d:` end of stream, `{"finishReason": "stop" | "error"}`

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::sse::LineBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Error(String),
    Finish(FinishReason),
}

impl Frame {
    pub fn encode(&self) -> String {
        let (prefix, value) = match self {
            Frame::Text(text) => ('0', json!(text)),
            Frame::Error(message) => ('3', json!(message)),
            Frame::Finish(reason) => ('d', json!({ "finishReason": reason })),
        };
        format!("{prefix}:{value}\n")
    }

    fn decode(line: &str) -> Option<Frame> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Finish {
            finish_reason: FinishReason,
        }

        let (prefix, payload) = line.split_once(':')?;
        match prefix {
            "0" => serde_json::from_str(payload).ok().map(Frame::Text),
            "3" => serde_json::from_str(payload).ok().map(Frame::Error),
            "d" => serde_json::from_str::<Finish>(payload).ok().map(|f| Frame::Finish(f.finish_reason)),
            _ => None,
        }
    }
}

/// Reader side of the protocol, for clients of the chat endpoint. Lines may
/// be split across chunks; unknown prefixes and malformed payloads are
/// skipped.
#[derive(Debug, Default)]
pub struct DataStreamDecoder {
    lines: LineBuffer,
}

impl DataStreamDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.lines.push(chunk).iter().filter_map(|line| Frame::decode(line)).collect()
    }

    pub fn finish(&mut self) -> Option<Frame> {
        self.lines.finish().as_deref().and_then(Frame::decode)
    }

    /// Decodes a whole body and concatenates its text deltas.
    pub fn collect_text(body: &[u8]) -> String {
        let mut decoder = DataStreamDecoder::default();
        decoder.push(body)
            .into_iter()
            .chain(decoder.finish())
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_frames() {
        assert_eq!(Frame::Text("Let's \"move\" on\n".into()).encode(), "0:\"Let's \\\"move\\\" on\\n\"\n");
        assert_eq!(Frame::Error("quota".into()).encode(), "3:\"quota\"\n");
        assert_eq!(Frame::Finish(FinishReason::Stop).encode(), "d:{\"finishReason\":\"stop\"}\n");
    }

    #[test]
    fn decodes_split_lines() {
        let body = [
            Frame::Text("1. Could you ".into()),
            Frame::Text("say that again?".into()),
            Frame::Finish(FinishReason::Stop),
        ]
        .iter()
        .map(Frame::encode)
        .collect::<String>();

        let (head, tail) = body.as_bytes().split_at(7);
        let mut decoder = DataStreamDecoder::default();
        let mut frames = decoder.push(head);
        assert!(frames.is_empty());
        frames.extend(decoder.push(tail));

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2], Frame::Finish(FinishReason::Stop));
    }

    #[test]
    fn skips_noise() {
        let body = b"f:{\"messageId\":\"x\"}\n0:not json\n0:\"ok\"\n8:[]\n";
        assert_eq!(DataStreamDecoder::collect_text(body), "ok");
    }

    #[test]
    fn collect_text_handles_missing_trailing_newline() {
        assert_eq!(DataStreamDecoder::collect_text(b"0:\"a\"\n0:\"b\""), "ab");
    }
}
