//! Session handshake messages.
//!
//! The create request and its reply are the only messages whose numeric ID
//! is known before the message table exists. Everything else, including the
//! delete request, is resolved through the table returned by create.

use bytes::{BufMut, BytesMut};

use crate::codec::{get_fixed, get_i32, get_u16, get_u32, put_fixed_str, Message, MessageType};
use crate::error::Result;

/// Fixed, protocol-wide message ID of `sockclnt_create`.
pub const SOCKCLNT_CREATE_MSG_ID: u16 = 15;

/// Context marker written into the create request.
pub const CREATE_MSG_CONTEXT: u8 = 123;

/// Context marker written into the delete request.
pub const DELETE_MSG_CONTEXT: u8 = 124;

/// Table name prefix identifying the per-session delete message.
pub const SOCKCLNT_DELETE_PREFIX: &str = "sockclnt_delete_";

/// Width of the fixed name fields in create request and message table entries.
pub const MESSAGE_NAME_LEN: usize = 64;

/// Session open request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SockclntCreate {
    /// Client name registered with the dataplane (truncated to 64 bytes).
    pub name: String,
}

impl Message for SockclntCreate {
    const NAME: &'static str = "sockclnt_create";
    const CRC: &'static str = "455fb9c4";
    const TYPE: MessageType = MessageType::Reply;

    fn encode_payload(&self, buf: &mut BytesMut) {
        put_fixed_str(buf, &self.name, MESSAGE_NAME_LEN);
    }

    fn decode_payload(buf: &mut &[u8]) -> Result<Self> {
        let raw = get_fixed(buf, MESSAGE_NAME_LEN, "name")?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Ok(Self {
            name: String::from_utf8_lossy(&raw[..end]).into_owned(),
        })
    }
}

/// One `(id, name)` pair of the negotiated message table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTableEntry {
    /// Numeric message ID.
    pub index: u16,
    /// Name as sent, padding and version marker still attached.
    pub name: String,
}

/// Session open reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SockclntCreateReply {
    /// Response code (negative on failure).
    pub response: i32,
    /// Assigned client index.
    pub index: u32,
    /// Number of message table entries (u16 on the wire).
    pub count: u32,
    /// Message table.
    pub message_table: Vec<MessageTableEntry>,
}

impl Message for SockclntCreateReply {
    const NAME: &'static str = "sockclnt_create_reply";
    const CRC: &'static str = "35166268";
    const TYPE: MessageType = MessageType::Reply;

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_i32(self.response);
        buf.put_u32(self.index);
        let count = u16::try_from(self.message_table.len()).unwrap_or(u16::MAX);
        buf.put_u16(count);
        for entry in self.message_table.iter().take(count as usize) {
            buf.put_u16(entry.index);
            put_fixed_str(buf, &entry.name, MESSAGE_NAME_LEN);
        }
    }

    fn decode_payload(buf: &mut &[u8]) -> Result<Self> {
        let response = get_i32(buf, "response")?;
        let index = get_u32(buf, "index")?;
        let count = get_u16(buf, "count")?;

        let mut message_table = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let id = get_u16(buf, "message_table.index")?;
            let raw = get_fixed(buf, MESSAGE_NAME_LEN, "message_table.name")?;
            message_table.push(MessageTableEntry {
                index: id,
                name: String::from_utf8_lossy(raw).into_owned(),
            });
        }

        Ok(Self {
            response,
            index,
            count: u32::from(count),
            message_table,
        })
    }
}

/// Session close request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SockclntDelete {
    /// Client index being released.
    pub index: u32,
}

impl Message for SockclntDelete {
    const NAME: &'static str = "sockclnt_delete";
    const CRC: &'static str = "8ac76db6";
    const TYPE: MessageType = MessageType::Request;

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_u32(self.index);
    }

    fn decode_payload(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            index: get_u32(buf, "index")?,
        })
    }
}

/// Session close reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SockclntDeleteReply {
    /// Response code.
    pub response: i32,
}

impl Message for SockclntDeleteReply {
    const NAME: &'static str = "sockclnt_delete_reply";
    const CRC: &'static str = "8f38b1ee";
    const TYPE: MessageType = MessageType::Reply;

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_i32(self.response);
    }

    fn decode_payload(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            response: get_i32(buf, "response")?,
        })
    }
}
