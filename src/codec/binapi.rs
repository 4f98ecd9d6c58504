//! Big-endian binary API codec.
//!
//! Every encoded message is `msg_id (u16)` followed by a type-dependent
//! header and then the message payload:
//!
//! | [`MessageType`] | header after msg id          | total |
//! |-----------------|------------------------------|-------|
//! | `Request`       | client_index u32, context u32 | 10    |
//! | `Reply`         | context u32                   | 6     |
//! | `Event`         | client_index u32              | 6     |
//! | `Other`         | (none)                        | 2     |
//!
//! Header fields are encoded as zero; the writer stamps the real client
//! index and context just before the frame goes out.
//!
//! # Example
//!
//! ```
//! use binapi_sockclient::codec::MsgCodec;
//! use binapi_sockclient::control::SockclntDelete;
//!
//! let encoded = MsgCodec::encode(&SockclntDelete { index: 7 }, 11);
//! assert_eq!(encoded.len(), 10 + 4);
//! assert_eq!(&encoded[0..2], &11u16.to_be_bytes());
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Error, Result};

/// Header shape of a message, which decides the bytes between msg id and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Client request: client index + context.
    Request,
    /// Reply to a request: context only.
    Reply,
    /// Unsolicited event: client index only.
    Event,
    /// Message ID only.
    Other,
}

impl MessageType {
    /// Encoded header length, including the 2-byte message ID.
    pub const fn header_len(self) -> usize {
        match self {
            MessageType::Request => 10,
            MessageType::Reply | MessageType::Event => 6,
            MessageType::Other => 2,
        }
    }

    /// Offset of the 4-byte context field, if this type carries one.
    pub const fn context_offset(self) -> Option<usize> {
        match self {
            MessageType::Request => Some(6),
            MessageType::Reply => Some(2),
            MessageType::Event | MessageType::Other => None,
        }
    }
}

/// A binary API message with a known name, CRC and payload layout.
pub trait Message: Sized {
    /// Message name as it appears in the message table.
    const NAME: &'static str;
    /// Schema fingerprint (CRC) as it appears in the message table.
    const CRC: &'static str;
    /// Header shape.
    const TYPE: MessageType;

    /// Append the payload (everything after the header).
    fn encode_payload(&self, buf: &mut BytesMut);

    /// Parse the payload (everything after the header).
    fn decode_payload(buf: &mut &[u8]) -> Result<Self>;
}

/// Binary API codec.
///
/// A marker struct with static methods, no state.
pub struct MsgCodec;

impl MsgCodec {
    /// Encode `msg` with numeric ID `msg_id`, header fields zeroed.
    pub fn encode<M: Message>(msg: &M, msg_id: u16) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(M::TYPE.header_len() + 64);
        buf.put_u16(msg_id);
        match M::TYPE {
            MessageType::Request => {
                buf.put_u32(0);
                buf.put_u32(0);
            }
            MessageType::Reply | MessageType::Event => buf.put_u32(0),
            MessageType::Other => {}
        }
        msg.encode_payload(&mut buf);
        buf.to_vec()
    }

    /// Decode `data` (a full message body, header included) as `M`.
    pub fn decode<M: Message>(data: &[u8]) -> Result<M> {
        let header_len = M::TYPE.header_len();
        if data.len() < header_len {
            return Err(Error::Decode(format!(
                "{}: {} bytes is shorter than the {}-byte header",
                M::NAME,
                data.len(),
                header_len
            )));
        }
        let mut buf = &data[header_len..];
        M::decode_payload(&mut buf)
    }

    /// Read the message ID of an encoded message.
    pub fn msg_id(data: &[u8]) -> Option<u16> {
        Some(u16::from_be_bytes([*data.first()?, *data.get(1)?]))
    }
}

fn need(buf: &[u8], n: usize, field: &str) -> Result<()> {
    if buf.len() < n {
        return Err(Error::Decode(format!(
            "field {}: need {} bytes, {} left",
            field,
            n,
            buf.len()
        )));
    }
    Ok(())
}

/// Read a big-endian u16 field.
pub fn get_u16(buf: &mut &[u8], field: &str) -> Result<u16> {
    need(buf, 2, field)?;
    Ok(buf.get_u16())
}

/// Read a big-endian u32 field.
pub fn get_u32(buf: &mut &[u8], field: &str) -> Result<u32> {
    need(buf, 4, field)?;
    Ok(buf.get_u32())
}

/// Read a big-endian i32 field.
pub fn get_i32(buf: &mut &[u8], field: &str) -> Result<i32> {
    need(buf, 4, field)?;
    Ok(buf.get_i32())
}

/// Read a fixed-width byte field verbatim (padding included).
pub fn get_fixed<'a>(buf: &mut &'a [u8], len: usize, field: &str) -> Result<&'a [u8]> {
    need(buf, len, field)?;
    let slice: &'a [u8] = *buf;
    let (head, tail) = slice.split_at(len);
    *buf = tail;
    Ok(head)
}

/// Write `s` into a fixed-width field, truncating or NUL-padding to `len`.
pub fn put_fixed_str(buf: &mut BytesMut, s: &str, len: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, len - n);
}
