//! Logical wire frames and their body layout.
//!
//! A frame is one complete protocol unit: a client request, a server
//! response, an unsolicited push tied to a subscription, or a server error.
//! The body layout here is the server-defined contract; the length prefix
//! that precedes each body on the wire is handled by
//! [`crate::codec::WireCodec`].

use bytes::{BufMut, BytesMut};

use crate::{codec::FrameError, error::SessionError};

/// Kind tag for a client request body.
pub const KIND_REQUEST: u8 = 0x01;
/// Kind tag for a server response body.
pub const KIND_RESPONSE: u8 = 0x02;
/// Kind tag for an unsolicited push body.
pub const KIND_PUSH: u8 = 0x03;
/// Kind tag for a server error body.
pub const KIND_ERROR: u8 = 0x04;

/// One complete wire-format unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Client command carrying the query text, correlated by `id`.
    Request {
        /// Request identifier, unique per connection lifetime.
        id: u64,
        /// SQL-like command text.
        query: String,
    },
    /// Server reply to the request with the matching `id`.
    Response {
        /// Identifier of the request this answers.
        id: u64,
        /// JSON result document.
        payload: String,
    },
    /// Server-initiated message with no matching request.
    Push {
        /// Topic the push belongs to (the subscribed table).
        topic: String,
        /// JSON event document.
        payload: String,
    },
    /// Server-reported failure, optionally tied to a request.
    Error {
        /// Identifier of the failed request, if the server could attribute it.
        id: Option<u64>,
        /// Human-readable failure description.
        message: String,
    },
}

impl Frame {
    /// Construct a request frame, validating the query text.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidQuery`] when the query is empty,
    /// whitespace-only, or longer than `max_len` bytes.
    pub fn request(id: u64, query: &str, max_len: usize) -> Result<Self, SessionError> {
        if query.trim().is_empty() {
            return Err(SessionError::InvalidQuery("query text is empty".into()));
        }
        if query.len() > max_len {
            return Err(SessionError::InvalidQuery(format!(
                "query is {} bytes, limit is {max_len}",
                query.len()
            )));
        }
        Ok(Self::Request {
            id,
            query: query.to_owned(),
        })
    }

    /// Kind tag carried on the wire for this frame.
    #[must_use]
    pub const fn kind(&self) -> u8 {
        match self {
            Self::Request { .. } => KIND_REQUEST,
            Self::Response { .. } => KIND_RESPONSE,
            Self::Push { .. } => KIND_PUSH,
            Self::Error { .. } => KIND_ERROR,
        }
    }

    /// Append this frame's body (kind tag included) to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Oversized`] when a push topic exceeds the u16
    /// length prefix.
    pub(crate) fn write_body(&self, dst: &mut BytesMut) -> Result<(), FrameError> {
        dst.put_u8(self.kind());
        match self {
            Self::Request { id, query } => {
                dst.put_u64(*id);
                dst.put_slice(query.as_bytes());
            }
            Self::Response { id, payload } => {
                dst.put_u64(*id);
                dst.put_slice(payload.as_bytes());
            }
            Self::Push { topic, payload } => {
                let topic_len = u16::try_from(topic.len()).map_err(|_| FrameError::Oversized {
                    size: topic.len(),
                    max: usize::from(u16::MAX),
                })?;
                dst.put_u16(topic_len);
                dst.put_slice(topic.as_bytes());
                dst.put_slice(payload.as_bytes());
            }
            Self::Error { id, message } => {
                match id {
                    Some(id) => {
                        dst.put_u8(1);
                        dst.put_u64(*id);
                    }
                    None => dst.put_u8(0),
                }
                dst.put_slice(message.as_bytes());
            }
        }
        Ok(())
    }

    /// Number of body bytes `write_body` will produce.
    pub(crate) fn body_len(&self) -> usize {
        1 + match self {
            Self::Request { query, .. } => 8 + query.len(),
            Self::Response { payload, .. } => 8 + payload.len(),
            Self::Push { topic, payload } => 2 + topic.len() + payload.len(),
            Self::Error { id, message } => 1 + if id.is_some() { 8 } else { 0 } + message.len(),
        }
    }

    /// Parse a complete frame body (kind tag included).
    pub(crate) fn read_body(body: &[u8]) -> Result<Self, FrameError> {
        let (&kind, rest) = body
            .split_first()
            .ok_or(FrameError::Truncated { have: 0, need: 1 })?;
        match kind {
            KIND_REQUEST => {
                let (id, text) = split_id(rest)?;
                Ok(Self::Request {
                    id,
                    query: utf8(text)?,
                })
            }
            KIND_RESPONSE => {
                let (id, payload) = split_id(rest)?;
                Ok(Self::Response {
                    id,
                    payload: utf8(payload)?,
                })
            }
            KIND_PUSH => {
                if rest.len() < 2 {
                    return Err(FrameError::Truncated {
                        have: rest.len(),
                        need: 2,
                    });
                }
                let topic_len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
                let rest = &rest[2..];
                if rest.len() < topic_len {
                    return Err(FrameError::Truncated {
                        have: rest.len(),
                        need: topic_len,
                    });
                }
                let (topic, payload) = rest.split_at(topic_len);
                Ok(Self::Push {
                    topic: utf8(topic)?,
                    payload: utf8(payload)?,
                })
            }
            KIND_ERROR => {
                let (&flag, rest) = rest
                    .split_first()
                    .ok_or(FrameError::Truncated { have: 0, need: 1 })?;
                match flag {
                    0 => Ok(Self::Error {
                        id: None,
                        message: utf8(rest)?,
                    }),
                    1 => {
                        let (id, message) = split_id(rest)?;
                        Ok(Self::Error {
                            id: Some(id),
                            message: utf8(message)?,
                        })
                    }
                    other => Err(FrameError::UnknownKind(other)),
                }
            }
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

fn split_id(bytes: &[u8]) -> Result<(u64, &[u8]), FrameError> {
    if bytes.len() < 8 {
        return Err(FrameError::Truncated {
            have: bytes.len(),
            need: 8,
        });
    }
    let (id, rest) = bytes.split_at(8);
    let id = u64::from_be_bytes([
        id[0], id[1], id[2], id[3], id[4], id[5], id[6], id[7],
    ]);
    Ok((id, rest))
}

fn utf8(bytes: &[u8]) -> Result<String, FrameError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_empty_query() {
        let err = Frame::request(1, "   ", 1024).expect_err("must reject");
        assert!(matches!(err, SessionError::InvalidQuery(_)));
    }

    #[test]
    fn request_rejects_oversized_query() {
        let long = "x".repeat(17);
        let err = Frame::request(1, &long, 16).expect_err("must reject");
        assert!(matches!(err, SessionError::InvalidQuery(_)));
    }

    #[test]
    fn request_accepts_query_at_limit() {
        let query = "x".repeat(16);
        assert!(Frame::request(1, &query, 16).is_ok());
    }
}
