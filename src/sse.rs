//! Incremental Server-Sent-Events decoder.
//!
//! Bytes are fed as they arrive from the HTTP body; complete messages are
//! returned once their terminating blank line has been seen. Only the `event`
//! and `data` fields matter to the device protocol; `id` and `retry` are
//! accepted and dropped.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseMessage {
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(message) = self.process_line(&line) {
                messages.push(message);
            }
        }

        messages
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data.is_empty() && event.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_event() {
        let mut parser = SseParser::default();
        let msgs = parser.feed(b"event: state\ndata: {\"id\":\"climate-ac\"}\n\n");
        assert_eq!(
            msgs,
            vec![SseMessage {
                event: "state".to_string(),
                data: "{\"id\":\"climate-ac\"}".to_string(),
            }]
        );
    }

    #[test]
    fn handles_split_chunks_and_crlf() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: pi").is_empty());
        assert!(parser.feed(b"ng\r\ndata: ").is_empty());
        let msgs = parser.feed(b"{}\r\n\r\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].event, "ping");
        assert_eq!(msgs[0].data, "{}");
    }

    #[test]
    fn multiline_data_and_default_event() {
        let mut parser = SseParser::default();
        let msgs = parser.feed(b"data: one\ndata: two\n\n");
        assert_eq!(msgs[0].event, "message");
        assert_eq!(msgs[0].data, "one\ntwo");
    }

    #[test]
    fn ignores_comments_ids_and_retry() {
        let mut parser = SseParser::default();
        let msgs = parser.feed(b": keep-alive\nretry: 30000\nid: 7\nevent: log\ndata: boot\n\n\n");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].event, "log");
        assert_eq!(msgs[0].data, "boot");
    }

    #[test]
    fn several_messages_in_one_chunk() {
        let mut parser = SseParser::default();
        let msgs = parser.feed(b"event: ping\ndata: \n\nevent: state\ndata: {}\n\n");
        let events: Vec<&str> = msgs.iter().map(|m| m.event.as_str()).collect();
        assert_eq!(events, vec!["ping", "state"]);
    }
}
