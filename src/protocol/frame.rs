//! Inbound message view with typed accessors.
//!
//! Wraps one received frame body. Uses `bytes::Bytes` so the same body can be
//! handed to a callback or queued on a channel without copying.
//!
//! # Example
//!
//! ```
//! use binapi_sockclient::protocol::InboundMessage;
//! use bytes::Bytes;
//!
//! let body = Bytes::from_static(&[0x00, 0x0B, 0x00, 0x00, 0x00, 0x2A, 0xFF]);
//! let msg = InboundMessage::decode(body).unwrap();
//!
//! assert_eq!(msg.msg_id(), 11);
//! assert_eq!(msg.context(), 42);
//! assert_eq!(msg.payload(), &[0xFF]);
//! ```

use bytes::Bytes;

use super::wire_format::{MsgHeader, MSG_HEADER_SIZE};
use crate::error::Result;

/// A received message: decoded sub-header plus the full body.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Decoded message ID and context.
    pub header: MsgHeader,
    /// Full body, including the 6-byte message header.
    pub data: Bytes,
}

impl InboundMessage {
    /// Decode the message header from the start of `data`.
    pub fn decode(data: Bytes) -> Result<Self> {
        let header = MsgHeader::decode(&data)?;
        Ok(Self { header, data })
    }

    /// Get the numeric message ID.
    #[inline]
    pub fn msg_id(&self) -> u16 {
        self.header.msg_id
    }

    /// Get the context value.
    #[inline]
    pub fn context(&self) -> u32 {
        self.header.context
    }

    /// Get the full body (what the external codec decodes).
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the bytes after the message header.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[MSG_HEADER_SIZE..]
    }

    /// Consume the message and return the body.
    #[inline]
    pub fn into_data(self) -> Bytes {
        self.data
    }
}
