//! Line-based codec for tokio.
//!
//! Reads `\n`-terminated lines (stripping an optional `\r`) and writes lines
//! with a `\r\n` terminator. Server links are allowed longer lines than the
//! 512-byte client limit, so the cap is configurable.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Default line cap for server links.
pub const DEFAULT_MAX_LINE_LEN: usize = 16 * 1024;

/// Newline-delimited line codec.
#[derive(Debug)]
pub struct LineCodec {
    /// Index of the next byte to scan for a newline.
    next_index: usize,
    max_len: usize,
}

impl LineCodec {
    /// Codec with the default line cap.
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LINE_LEN)
    }

    /// Codec with a custom line cap.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(ProtocolError::MessageTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            // The uplink is not obliged to send valid UTF-8 in realnames or
            // message bodies; replace rather than drop the link.
            let text = String::from_utf8_lossy(&line);
            Ok(Some(text.trim_end_matches(['\r', '\n']).to_owned()))
        } else {
            self.next_index = src.len();
            if src.len() > self.max_len {
                return Err(ProtocolError::MessageTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }
            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        let body = line.trim_end_matches(['\r', '\n']);
        dst.reserve(body.len() + 2);
        dst.extend_from_slice(body.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :0AA\r\nPING");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :0AA".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"PING");
    }

    #[test]
    fn resumes_partial_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("SVINFO 6 6");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b" 0 :1307151136\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("SVINFO 6 6 0 :1307151136".to_string())
        );
    }

    #[test]
    fn replaces_invalid_utf8() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #c :\xff\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG #c :"));
    }

    #[test]
    fn rejects_long_lines() {
        let mut codec = LineCodec::with_max_len(10);
        let mut buf = BytesMut::from("this is way too long\n");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::MessageTooLong { .. })
        ));
    }

    #[test]
    fn encodes_with_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("PONG :0AA".to_string(), &mut buf).unwrap();
        codec.encode("EB\r\n".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :0AA\r\nEB\r\n");
    }
}
