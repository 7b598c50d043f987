//! Length-prefixed wire codec.
//!
//! Every frame on the wire is `[len: u32 BE][kind: u8][body]`, where `len`
//! counts the kind tag plus the body. `WireCodec` implements
//! [`tokio_util::codec::Decoder`] and [`Encoder`] so a [`Framed`] transport
//! can drive it directly. An incomplete buffer is not an error (`Ok(None)`,
//! the caller reads more bytes); an internally inconsistent buffer is fatal
//! and surfaces as a [`FrameError`].
//!
//! [`Framed`]: tokio_util::codec::Framed

use std::io;

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;

/// Length of the `u32` prefix preceding each frame body.
const LEN_PREFIX: usize = 4;

/// Fatal wire-level decode and encode failures.
///
/// Any of these terminates the connection; a partially received frame is
/// reported by `Decoder::decode` returning `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Declared frame length exceeds the configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    Oversized {
        /// Length declared by the prefix.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// A zero-length frame cannot carry a kind tag.
    #[error("empty frame not permitted")]
    Empty,
    /// The kind tag (or a tag-like flag byte) is not part of the protocol.
    #[error("unknown frame kind {0:#04x}")]
    UnknownKind(u8),
    /// The body ended before a fixed-width field was complete.
    #[error("truncated frame body: have {have}, need {need}")]
    Truncated {
        /// Bytes available.
        have: usize,
        /// Bytes the field requires.
        need: usize,
    },
    /// Textual fields must be valid UTF-8.
    #[error("frame text is not valid UTF-8")]
    InvalidText(#[from] std::str::Utf8Error),
    /// Transport failure reported through the codec.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Codec translating between byte buffers and [`Frame`] values.
#[derive(Clone, Copy, Debug)]
pub struct WireCodec {
    max_frame_length: usize,
}

impl WireCodec {
    /// Construct a codec enforcing `max_frame_length` on decoded frames.
    #[must_use]
    pub const fn new(max_frame_length: usize) -> Self { Self { max_frame_length } }

    /// Inspect the configured maximum frame length.
    #[must_use]
    pub const fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for WireCodec {
    fn default() -> Self { Self::new(1024 * 1024) }
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }
        let len = usize::try_from(u32::from_be_bytes([src[0], src[1], src[2], src[3]]))
            .unwrap_or(usize::MAX);
        if len == 0 {
            return Err(FrameError::Empty);
        }
        if len > self.max_frame_length {
            return Err(FrameError::Oversized {
                size: len,
                max: self.max_frame_length,
            });
        }
        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }
        src.advance(LEN_PREFIX);
        let body = src.split_to(len);
        Frame::read_body(&body).map(Some)
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = frame.body_len();
        if len > self.max_frame_length {
            return Err(FrameError::Oversized {
                size: len,
                max: self.max_frame_length,
            });
        }
        dst.reserve(LEN_PREFIX + len);
        // body_len is bounded by max_frame_length, itself well under u32::MAX
        dst.extend_from_slice(&u32::try_from(len).map_err(|_| FrameError::Oversized {
            size: len,
            max: u32::MAX as usize,
        })?
        .to_be_bytes());
        frame.write_body(dst)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn encode(frame: Frame) -> BytesMut {
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(frame, &mut buf).expect("encode failed");
        buf
    }

    #[rstest]
    #[case(Frame::Request { id: 7, query: "select * from stocks".into() })]
    #[case(Frame::Response { id: 7, payload: r#"{"status":"ok"}"#.into() })]
    #[case(Frame::Push { topic: "stocks".into(), payload: r#"{"action":"add"}"#.into() })]
    #[case(Frame::Error { id: Some(3), message: "table not found".into() })]
    #[case(Frame::Error { id: None, message: "server shutting down".into() })]
    fn round_trips(#[case] frame: Frame) {
        let mut buf = encode(frame.clone());
        let decoded = WireCodec::default()
            .decode(&mut buf)
            .expect("decode failed")
            .expect("frame missing");
        assert_eq!(decoded, frame);
        assert!(buf.is_empty(), "decoder must consume the whole frame");
    }

    #[test]
    fn incomplete_buffer_is_not_an_error() {
        let full = encode(Frame::Request {
            id: 1,
            query: "key stocks".into(),
        });
        let mut codec = WireCodec::default();
        let mut buf = BytesMut::new();
        for &byte in &full[..full.len() - 1] {
            buf.extend_from_slice(&[byte]);
            assert!(codec.decode(&mut buf).expect("decode failed").is_none());
        }
        buf.extend_from_slice(&full[full.len() - 1..]);
        assert!(codec.decode(&mut buf).expect("decode failed").is_some());
    }

    #[test]
    fn two_frames_in_one_buffer_decode_in_order() {
        let mut buf = encode(Frame::Response {
            id: 1,
            payload: "{}".into(),
        });
        buf.extend_from_slice(&encode(Frame::Push {
            topic: "t".into(),
            payload: "{}".into(),
        }));
        let mut codec = WireCodec::default();
        let first = codec.decode(&mut buf).expect("decode failed");
        assert!(matches!(first, Some(Frame::Response { id: 1, .. })));
        let second = codec.decode(&mut buf).expect("decode failed");
        assert!(matches!(second, Some(Frame::Push { .. })));
        assert!(codec.decode(&mut buf).expect("decode failed").is_none());
    }

    #[test]
    fn zero_length_frame_is_malformed() {
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        let err = WireCodec::default().decode(&mut buf).expect_err("must fail");
        assert!(matches!(err, FrameError::Empty));
    }

    #[test]
    fn declared_length_over_max_is_malformed() {
        let mut codec = WireCodec::new(16);
        assert_eq!(codec.max_frame_length(), 16);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 17, 1][..]);
        let err = codec.decode(&mut buf).expect_err("must fail");
        assert!(matches!(err, FrameError::Oversized { size: 17, max: 16 }));
    }

    #[rstest]
    // unknown kind tag
    #[case(vec![0x7f], FrameError::UnknownKind(0x7f))]
    // response body shorter than its id field
    #[case(vec![0x02, 0, 0, 0], FrameError::Truncated { have: 3, need: 8 })]
    // push topic length pointing past the body
    #[case(vec![0x03, 0, 9, b'a'], FrameError::Truncated { have: 1, need: 9 })]
    // error flag byte out of range
    #[case(vec![0x04, 2], FrameError::UnknownKind(2))]
    fn malformed_bodies_are_fatal(#[case] body: Vec<u8>, #[case] expected: FrameError) {
        let mut buf = BytesMut::new();
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body);
        let err = WireCodec::default().decode(&mut buf).expect_err("must fail");
        assert_eq!(format!("{err}"), format!("{expected}"));
    }

    #[test]
    fn non_utf8_query_text_is_malformed() {
        let mut buf = BytesMut::new();
        let body = [0x01, 0, 0, 0, 0, 0, 0, 0, 1, 0xff, 0xfe];
        #[allow(clippy::cast_possible_truncation)]
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body);
        let err = WireCodec::default().decode(&mut buf).expect_err("must fail");
        assert!(matches!(err, FrameError::InvalidText(_)));
    }

    #[test]
    fn encode_rejects_oversized_frame() {
        let mut codec = WireCodec::new(8);
        let mut buf = BytesMut::new();
        let frame = Frame::Request {
            id: 1,
            query: "select * from big".into(),
        };
        let err = codec.encode(frame, &mut buf).expect_err("must fail");
        assert!(matches!(err, FrameError::Oversized { .. }));
    }
}
