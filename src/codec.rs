//! Message framing over a byte stream.
//!
//! Two schemes are supported: newline-delimited JSON (the MCP stdio
//! convention) and `Content-Length` header framing. Both decoders cope with
//! frames split across any number of reads.
//!
//! Frames are yielded as raw bytes. Text decoding belongs to the JSON parser,
//! so a frame that is not valid UTF-8 is rejected there like any other
//! malformed message.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::types::McpError;

/// Header blocks larger than this without a terminator are rejected.
const MAX_HEADER_LEN: usize = 8 * 1024;

/// Largest inbound frame body accepted, in bytes.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Framing {
    /// One message per `\n`-terminated line.
    #[default]
    Lines,
    /// `Content-Length: N` header block, blank line, then N bytes.
    ContentLength,
}

#[derive(Debug)]
pub struct FrameCodec {
    framing: Framing,
    // Lines: where to resume scanning for '\n'.
    next_index: usize,
    // Content-Length: body length once the header block has been consumed.
    body_len: Option<usize>,
}

impl FrameCodec {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            next_index: 0,
            body_len: None,
        }
    }

    fn decode_line(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, McpError> {
        loop {
            let Some(offset) = buf[self.next_index..].iter().position(|b| *b == b'\n') else {
                if buf.len() > MAX_FRAME_LEN {
                    return Err(McpError::Framing(format!(
                        "line exceeds {} bytes without a terminator",
                        MAX_FRAME_LEN
                    )));
                }
                self.next_index = buf.len();
                return Ok(None);
            };
            let line = buf.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if let Some(frame) = line_to_frame(line) {
                return Ok(Some(frame));
            }
        }
    }

    fn decode_content_length(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, McpError> {
        if self.body_len.is_none() {
            // Tolerate stray line breaks between messages.
            while buf.first().is_some_and(|b| *b == b'\r' || *b == b'\n') {
                buf.advance(1);
            }
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                if buf.len() > MAX_HEADER_LEN {
                    return Err(McpError::Framing("header block too large".into()));
                }
                return Ok(None);
            };
            let header = buf.split_to(end + 4);
            let len = parse_content_length(&header[..end])?;
            if len > MAX_FRAME_LEN {
                return Err(McpError::Framing(format!(
                    "Content-Length {} exceeds the {} byte limit",
                    len, MAX_FRAME_LEN
                )));
            }
            self.body_len = Some(len);
        }

        let len = self.body_len.unwrap_or_default();
        if buf.len() < len {
            buf.reserve(len - buf.len());
            return Ok(None);
        }
        let body = buf.split_to(len);
        self.body_len = None;
        Ok(Some(body.freeze()))
    }
}

/// Strip the line terminator; blank lines carry no frame.
fn line_to_frame(mut line: BytesMut) -> Option<Bytes> {
    while line.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
        line.truncate(line.len() - 1);
    }
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        None
    } else {
        Some(line.freeze())
    }
}

fn parse_content_length(header: &[u8]) -> Result<usize, McpError> {
    let text = std::str::from_utf8(header)
        .map_err(|_| McpError::Framing("header block is not UTF-8".into()))?;
    let value = text
        .split("\r\n")
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim())
        })
        .ok_or_else(|| McpError::Framing("missing Content-Length header".into()))?;
    value
        .parse()
        .map_err(|e| McpError::Framing(format!("invalid Content-Length {:?}: {}", value, e)))
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = McpError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, McpError> {
        match self.framing {
            Framing::Lines => self.decode_line(buf),
            Framing::ContentLength => self.decode_content_length(buf),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, McpError> {
        if let Some(frame) = self.decode(buf)? {
            return Ok(Some(frame));
        }
        match self.framing {
            Framing::Lines => {
                // Unterminated final line.
                let rest = buf.split();
                self.next_index = 0;
                Ok(line_to_frame(rest))
            }
            Framing::ContentLength => {
                if self.body_len.is_none() && buf.iter().all(|b| b.is_ascii_whitespace()) {
                    buf.clear();
                    Ok(None)
                } else {
                    Err(McpError::Framing("stream ended inside a frame".into()))
                }
            }
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = McpError;

    fn encode(&mut self, payload: String, dst: &mut BytesMut) -> Result<(), McpError> {
        match self.framing {
            Framing::Lines => {
                dst.reserve(payload.len() + 1);
                dst.put_slice(payload.as_bytes());
                dst.put_u8(b'\n');
            }
            Framing::ContentLength => {
                let header = format!("Content-Length: {}\r\n\r\n", payload.len());
                dst.reserve(header.len() + payload.len());
                dst.put_slice(header.as_bytes());
                dst.put_slice(payload.as_bytes());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(codec: &mut FrameCodec, buf: &mut BytesMut, chunk: &[u8]) -> Vec<String> {
        buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(String::from_utf8(frame.to_vec()).unwrap());
        }
        frames
    }

    #[test]
    fn test_lines_split_across_reads() {
        let mut codec = FrameCodec::new(Framing::Lines);
        let mut buf = BytesMut::new();
        assert!(feed(&mut codec, &mut buf, br#"{"id":1,"met"#).is_empty());
        assert!(feed(&mut codec, &mut buf, br#"hod":"ping"}"#).is_empty());
        let frames = feed(&mut codec, &mut buf, b"\r\n\n{\"id\":2}\n{\"id\"");
        assert_eq!(frames, vec![r#"{"id":1,"method":"ping"}"#, r#"{"id":2}"#]);
        assert_eq!(&buf[..], br#"{"id""#);
    }

    #[test]
    fn test_lines_final_unterminated_line() {
        let mut codec = FrameCodec::new(Framing::Lines);
        let mut buf = BytesMut::from(&b"{\"id\":3}"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some(&br#"{"id":3}"#[..]));
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_content_length_split_across_reads() {
        let mut codec = FrameCodec::new(Framing::ContentLength);
        let mut buf = BytesMut::new();
        assert!(feed(&mut codec, &mut buf, b"Content-Type: application/json\r\nContent-Le").is_empty());
        assert!(feed(&mut codec, &mut buf, b"ngth: 8\r\n\r\n{\"id\"").is_empty());
        let frames = feed(&mut codec, &mut buf, b":1}content-length:2\r\n\r\n{}");
        assert_eq!(frames, vec![r#"{"id":1}"#, "{}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_content_length_missing_header() {
        let mut codec = FrameCodec::new(Framing::ContentLength);
        let mut buf = BytesMut::from(&b"X-Other: 1\r\n\r\n{}"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(McpError::Framing(_))));
    }

    #[test]
    fn test_content_length_truncated_body_at_eof() {
        let mut codec = FrameCodec::new(Framing::ContentLength);
        let mut buf = BytesMut::from(&b"Content-Length: 10\r\n\r\n{}"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(matches!(codec.decode_eof(&mut buf), Err(McpError::Framing(_))));
    }

    #[test]
    fn test_content_length_over_limit_is_rejected() {
        let mut codec = FrameCodec::new(Framing::ContentLength);
        let mut buf = BytesMut::from(&b"Content-Length: 18446744073709551615\r\n\r\n{}"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(McpError::Framing(_))));

        let mut codec = FrameCodec::new(Framing::ContentLength);
        let header = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_LEN + 1);
        let mut buf = BytesMut::from(header.as_bytes());
        assert!(matches!(codec.decode(&mut buf), Err(McpError::Framing(_))));
        assert!(buf.capacity() < MAX_FRAME_LEN);
    }

    #[test]
    fn test_unterminated_line_over_limit_is_rejected() {
        let mut codec = FrameCodec::new(Framing::Lines);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&vec![b'x'; MAX_FRAME_LEN]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"xx");
        assert!(matches!(codec.decode(&mut buf), Err(McpError::Framing(_))));
    }

    #[test]
    fn test_invalid_utf8_passes_through_untouched() {
        let mut codec = FrameCodec::new(Framing::Lines);
        let mut buf = BytesMut::from(&b"{\"message\":\"\xff\xfe\"}\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"{\"message\":\"\xff\xfe\"}");
    }

    #[test]
    fn test_encode() {
        let mut buf = BytesMut::new();
        FrameCodec::new(Framing::Lines)
            .encode(r#"{"id":1}"#.to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"{\"id\":1}\n");

        let mut buf = BytesMut::new();
        FrameCodec::new(Framing::ContentLength)
            .encode(r#"{"id":1}"#.to_string(), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"Content-Length: 8\r\n\r\n{\"id\":1}");
    }
}
