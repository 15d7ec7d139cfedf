use std::collections::VecDeque;

/// Keeps the last `cap` bytes of a byte stream.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    cap: usize,
    buf: VecDeque<u8>,
    total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub text: String,
    pub truncated: bool,
    /// Bytes observed, including the ones that were dropped.
    pub bytes: usize,
}

impl CapturedOutput {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            bytes: text.len(),
            text,
            truncated: false,
        }
    }
}

impl CaptureBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: VecDeque::with_capacity(cap.min(8 * 1024)),
            total: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len();
        if self.cap == 0 {
            return;
        }
        if chunk.len() >= self.cap {
            self.buf.clear();
            self.buf.extend(&chunk[chunk.len() - self.cap..]);
            return;
        }
        let overflow = (self.buf.len() + chunk.len()).saturating_sub(self.cap);
        self.buf.drain(..overflow);
        self.buf.extend(chunk);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn dropped_bytes(&self) -> usize {
        self.total - self.buf.len()
    }

    /// Decodes the kept tail (invalid UTF-8 replaced). A marker line is
    /// prepended when earlier bytes were dropped.
    pub fn finish(self) -> CapturedOutput {
        self.finish_with(|tail| tail.to_string())
    }

    /// Like [`finish`](Self::finish) but passes the decoded tail through
    /// `transform` before the marker is added.
    pub fn finish_with(self, transform: impl FnOnce(&str) -> String) -> CapturedOutput {
        let dropped = self.dropped_bytes();
        let (front, back) = self.buf.as_slices();
        let mut raw = Vec::with_capacity(front.len() + back.len());
        raw.extend_from_slice(front);
        raw.extend_from_slice(back);
        let tail = transform(&String::from_utf8_lossy(&raw));

        let text = if dropped > 0 {
            format!("[... {dropped} earlier bytes truncated ...]\n{tail}")
        } else {
            tail
        };
        CapturedOutput {
            text,
            truncated: dropped > 0,
            bytes: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_everything_under_cap() {
        let mut buf = CaptureBuffer::new(64);
        buf.push(b"hello ");
        buf.push(b"world\n");
        let out = buf.finish();
        assert_eq!(out.text, "hello world\n");
        assert!(!out.truncated);
        assert_eq!(out.bytes, 12);
    }

    #[test]
    fn keeps_tail_and_marks_truncation() {
        let mut buf = CaptureBuffer::new(4);
        buf.push(b"abc");
        buf.push(b"defg");
        assert_eq!(buf.dropped_bytes(), 3);
        let out = buf.finish();
        assert_eq!(out.text, "[... 3 earlier bytes truncated ...]\ndefg");
        assert!(out.truncated);
        assert_eq!(out.bytes, 7);
    }

    #[test]
    fn oversized_chunk_keeps_its_own_tail() {
        let mut buf = CaptureBuffer::new(3);
        buf.push(b"x");
        buf.push(b"123456");
        assert_eq!(buf.len(), 3);
        assert!(buf.finish().text.ends_with("456"));
    }

    #[test]
    fn transform_runs_before_marker() {
        let mut buf = CaptureBuffer::new(4);
        buf.push(b"xxab\r\n");
        let out = buf.finish_with(|t| t.replace("\r\n", "\n"));
        assert_eq!(out.text, "[... 2 earlier bytes truncated ...]\nab\n");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut buf = CaptureBuffer::new(16);
        buf.push(&[b'o', b'k', 0xff, b'\n']);
        assert_eq!(buf.finish().text, "ok\u{fffd}\n");
    }
}
