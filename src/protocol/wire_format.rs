//! Wire format encoding and decoding.
//!
//! Every frame starts with a 16-byte transport header:
//! ```text
//! ┌──────────────┬──────────┬──────────┐
//! │ Reserved (Q) │ Data len │ Marker   │
//! │ 8 bytes      │ 4 bytes  │ 4 bytes  │
//! │ uint64 BE    │ uint32 BE│ uint32 BE│
//! └──────────────┴──────────┴──────────┘
//! ```
//!
//! followed by `data_len` body bytes. The body opens with the message header:
//! ```text
//! ┌──────────┬──────────────┬──────────┐
//! │ Msg ID   │ Client index │ Context  │   requests (client -> dataplane)
//! │ uint16 BE│ uint32 BE    │ uint32 BE│
//! ├──────────┼──────────┬───┴──────────┘
//! │ Msg ID   │ Context  │                  replies (dataplane -> client)
//! │ uint16 BE│ uint32 BE│
//! └──────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{Error, Result};

/// Transport header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Size of the message ID + context prefix of every inbound body.
pub const MSG_HEADER_SIZE: usize = 6;

/// Offset of the client index/context window inside an outbound request body.
pub const REQUEST_HEADER_OFFSET: usize = 2;

/// Size of the client index/context window (client index u32 + context u32).
pub const REQUEST_HEADER_SIZE: usize = 8;

/// Default buffer size of the reader/writer wrappers; also the body write chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default maximum accepted body length (1 GB).
pub const DEFAULT_MAX_BODY_SIZE: u32 = 1_073_741_824;

/// Decoded transport header.
///
/// `q` and `gc_mark_timestamp` are carried through unchanged but never
/// interpreted; writers always set them to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Reserved/alignment field.
    pub q: u64,
    /// Body length in bytes.
    pub data_len: u32,
    /// Marker field.
    pub gc_mark_timestamp: u32,
}

impl Header {
    /// Header for an outbound body of `data_len` bytes.
    pub fn new(data_len: u32) -> Self {
        Self {
            q: 0,
            data_len,
            gc_mark_timestamp: 0,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use binapi_sockclient::protocol::Header;
    ///
    /// let bytes = Header::new(100).encode();
    /// assert_eq!(bytes.len(), 16);
    /// assert_eq!(&bytes[8..12], &100u32.to_be_bytes());
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.q.to_be_bytes());
        buf[8..12].copy_from_slice(&self.data_len.to_be_bytes());
        buf[12..16].copy_from_slice(&self.gc_mark_timestamp.to_be_bytes());
        buf
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let buf: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        let mut q = [0u8; 8];
        q.copy_from_slice(&buf[0..8]);
        Some(Self {
            q: u64::from_be_bytes(q),
            data_len: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            gc_mark_timestamp: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Body length as `usize`.
    #[inline]
    pub fn body_len(&self) -> usize {
        self.data_len as usize
    }
}

/// Message ID and context at the start of an inbound body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Numeric message ID (negotiated via the message table).
    pub msg_id: u16,
    /// Correlation value echoed from the request.
    pub context: u32,
}

impl MsgHeader {
    /// Decode the 6-byte prefix of a body.
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < MSG_HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "message too short for header ({} < {} bytes)",
                body.len(),
                MSG_HEADER_SIZE
            )));
        }
        Ok(Self {
            msg_id: u16::from_be_bytes([body[0], body[1]]),
            context: u32::from_be_bytes([body[2], body[3], body[4], body[5]]),
        })
    }
}

/// Client index/context pair stamped into an outbound request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Server-assigned client index.
    pub client_index: u32,
    /// Caller-chosen correlation value.
    pub context: u32,
}

impl RequestHeader {
    /// Overwrite bytes `2..10` of `body` with this header.
    ///
    /// The body must already reserve that window (the codec writes zeros there).
    pub fn encode_into(&self, body: &mut [u8]) -> Result<()> {
        let body_len = body.len();
        let window = body
            .get_mut(REQUEST_HEADER_OFFSET..REQUEST_HEADER_OFFSET + REQUEST_HEADER_SIZE)
            .ok_or_else(|| {
                Error::Protocol(format!(
                    "request body of {} bytes has no room for the client index/context window",
                    body_len
                ))
            })?;
        window[0..4].copy_from_slice(&self.client_index.to_be_bytes());
        window[4..8].copy_from_slice(&self.context.to_be_bytes());
        Ok(())
    }
}
