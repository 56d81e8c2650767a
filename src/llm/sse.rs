//! Incremental server-sent events parser
//!
//! Bytes arrive in arbitrary chunks, so a frame (or a multi-byte character)
//! may be split across reads. Input is buffered as raw bytes and only decoded
//! once a complete frame is available.

/// Parser yielding the `data:` payload of each complete frame
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed bytes and drain every complete frame's payload
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        let mut payloads = Vec::new();

        while let Some(split) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..split + 2).collect();
            let frame = String::from_utf8_lossy(&frame[..split]);
            if let Some(payload) = data_payload(&frame) {
                if payload != "[DONE]" {
                    payloads.push(payload);
                }
            }
        }

        payloads
    }

    /// Payload of a trailing frame that was never terminated
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let frame = String::from_utf8_lossy(&rest);
        data_payload(&frame).filter(|payload| payload != "[DONE]")
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn data_payload(frame: &str) -> Option<String> {
    let lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    let payload = lines.join("\n");
    if payload.trim().is_empty() {
        None
    } else {
        Some(payload)
    }
}
