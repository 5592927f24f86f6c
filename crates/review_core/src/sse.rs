//! Incremental decoder for `text/event-stream` framing.

use shared::protocol::SseMessage;

/// Accumulates raw bytes and emits complete SSE messages as frames close.
/// Chunk boundaries may fall anywhere, including mid-line.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk of bytes and returns every message completed by it, in
    /// arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        if self.buffer.contains('\r') {
            // Normalize CRLF so frame ends are always "\n\n". A trailing lone
            // CR stays buffered until its LF arrives in the next chunk.
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut messages = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..end + 2).collect();
            if let Some(msg) = parse_frame(&frame) {
                messages.push(msg);
            }
        }
        messages
    }
}

fn parse_frame(frame: &str) -> Option<SseMessage> {
    let mut event = String::new();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = value.to_string(),
            "data" => data_lines.push(value),
            // id/retry fields are legal SSE but unused by this protocol.
            _ => {}
        }
    }

    if event.is_empty() && data_lines.is_empty() {
        return None;
    }
    if event.is_empty() {
        event = "message".to_string();
    }

    Some(SseMessage {
        event,
        data: data_lines.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_frame() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.feed(b"event: issues\ndata: []\n\n");
        assert_eq!(
            messages,
            vec![SseMessage {
                event: "issues".to_string(),
                data: "[]".to_string(),
            }]
        );
    }

    #[test]
    fn buffers_across_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: com").is_empty());
        assert!(decoder.feed(b"plete\n").is_empty());
        let messages = decoder.feed(b"\n");
        assert_eq!(messages[0].event, "complete");
        assert_eq!(messages[0].data, "");
    }

    #[test]
    fn joins_multiple_data_lines_with_newline() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.feed(b"event: error\ndata: first\ndata: second\n\n");
        assert_eq!(messages[0].data, "first\nsecond");
    }

    #[test]
    fn frame_without_data_line_keeps_empty_payload() {
        // The server omits the data line entirely for an empty issues batch.
        let mut decoder = SseDecoder::new();
        let messages = decoder.feed(b"event: issues\n\n");
        assert_eq!(messages[0].event, "issues");
        assert_eq!(messages[0].data, "");
    }

    #[test]
    fn ignores_comment_lines_and_crlf() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.feed(b": keep-alive\r\nevent: complete\r\n\r\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, "complete");
    }

    #[test]
    fn emits_multiple_frames_from_one_chunk() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.feed(b"event: issues\ndata: [1]\n\nevent: complete\n\n");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].event, "issues");
        assert_eq!(messages[1].event, "complete");
    }
}
