// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame codec.
//!
//! Every frame is a `Content-Length: N` header block followed by exactly N
//! body bytes. The codec knows nothing about the body: handshake frames carry
//! JSON, later frames carry sealed RPC messages.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::engine_core::constants::limits;
use crate::engine_core::errors::TransportError;

// State machine for header/body reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Head,
    Body(usize),
}

#[derive(Debug)]
pub struct FrameCodec {
    state: DecodeState,
}

impl FrameCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DecodeState::Head,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Index just past the blank line ending the header block, if present.
/// Accepts both `\r\n\r\n` and bare `\n\n`.
fn header_end(src: &[u8]) -> Option<usize> {
    for i in 1..src.len() {
        if src[i] != b'\n' {
            continue;
        }
        if src[i - 1] == b'\n' {
            return Some(i + 1);
        }
        if i >= 3 && src[i - 1] == b'\r' && src[i - 2] == b'\n' && src[i - 3] == b'\r' {
            return Some(i + 1);
        }
    }
    None
}

fn parse_content_length(header: &str) -> Result<usize, TransportError> {
    let mut len = None;
    for line in header.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            let parsed = value.trim().parse::<usize>().map_err(|_| {
                TransportError::Framing(format!("Invalid Content-Length value '{}'", value.trim()))
            })?;
            len = Some(parsed);
        }
    }
    match len {
        Some(0) | None => Err(TransportError::Framing(
            "Missing or invalid Content-Length header".to_string(),
        )),
        Some(n) => Ok(n),
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Head => {
                    let Some(end) = header_end(src) else {
                        if src.len() > limits::MAX_HEADER_SIZE_BYTES {
                            return Err(TransportError::Framing("Header too large".to_string()));
                        }
                        return Ok(None);
                    };
                    if end > limits::MAX_HEADER_SIZE_BYTES {
                        return Err(TransportError::Framing("Header too large".to_string()));
                    }

                    let header_bytes = src.split_to(end);
                    let header = std::str::from_utf8(&header_bytes).map_err(|_| {
                        TransportError::Framing("Invalid UTF-8 in headers".to_string())
                    })?;
                    let len = parse_content_length(header)?;
                    if len as u64 > limits::MAX_MESSAGE_SIZE_BYTES {
                        return Err(TransportError::Framing(format!(
                            "Message length {} exceeds max limit",
                            len
                        )));
                    }
                    trace!("Frame header: {} body bytes", len);
                    src.reserve(len);
                    self.state = DecodeState::Body(len);
                }
                DecodeState::Body(len) => {
                    if src.len() < len {
                        return Ok(None);
                    }
                    self.state = DecodeState::Head;
                    return Ok(Some(src.split_to(len)));
                }
            }
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.is_empty() {
            return Err(TransportError::Framing("Refusing to send empty frame".to_string()));
        }
        if item.len() as u64 > limits::MAX_MESSAGE_SIZE_BYTES {
            return Err(TransportError::Framing(format!(
                "Message length {} exceeds max limit",
                item.len()
            )));
        }
        let header = format!("Content-Length: {}\r\n\r\n", item.len());
        dst.reserve(header.len() + item.len());
        dst.extend_from_slice(header.as_bytes());
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_across_partial_reads() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"Content-Length: 5\r\n\r\nhel"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"loContent-Length: 2\n\nok");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"hello");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"ok");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_is_case_insensitive_and_ignores_others() {
        let mut codec = FrameCodec::new();
        let mut buf =
            BytesMut::from(&b"X-Trace: 1\r\ncontent-length:  3 \r\n\r\nabc"[..]);
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"abc");
    }

    #[test]
    fn test_missing_length_is_an_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&b"X-Trace: 1\r\n\r\n{}"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::Framing(_))
        ));
    }

    #[test]
    fn test_limits_enforced() {
        let mut codec = FrameCodec::new();
        let mut oversized = BytesMut::from(
            format!("Content-Length: {}\r\n\r\n", limits::MAX_MESSAGE_SIZE_BYTES + 1).as_bytes(),
        );
        assert!(codec.decode(&mut oversized).is_err());

        let mut codec = FrameCodec::new();
        let mut endless = BytesMut::from(&vec![b'a'; limits::MAX_HEADER_SIZE_BYTES + 1][..]);
        assert!(codec.decode(&mut endless).is_err());
    }

    #[test]
    fn test_encode_writes_header() {
        let mut codec = FrameCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(Bytes::from_static(b"{}"), &mut dst).unwrap();
        assert_eq!(&dst[..], b"Content-Length: 2\r\n\r\n{}");

        assert!(codec.encode(Bytes::new(), &mut dst).is_err());
    }
}
