//! Minimal SSE framing for the llama.cpp completion stream.
//!
//! The backend emits `data: {json}` lines separated by blank lines. Chunks
//! arrive on arbitrary byte boundaries; this buffer reassembles complete
//! lines and yields the data payloads.

use bytes::{Buf, BytesMut};

pub struct SseLineBuffer {
    buf: BytesMut,
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Feed raw bytes; returns the `data:` payloads of every line completed
    /// by this chunk, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if let Some(data) = line.strip_prefix(b"data: ").or_else(|| line.strip_prefix(b"data:"))
            {
                if !data.is_empty() {
                    out.push(String::from_utf8_lossy(data).into_owned());
                }
            }
        }
        out
    }

    /// Bytes still buffered (an incomplete trailing line).
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}
