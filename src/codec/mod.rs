//! Codec module - binary API message encoding/decoding.
//!
//! The session core only needs this for its own handshake messages, but the
//! same [`Message`] trait and [`MsgCodec`] work for any application message
//! whose body layout is known.
//!
//! # Design
//!
//! The codec is a marker struct with static methods rather than a trait
//! object. Each message type describes its own header shape
//! ([`MessageType`]) and payload through the [`Message`] trait.
//!
//! # Example
//!
//! ```
//! use binapi_sockclient::codec::MsgCodec;
//! use binapi_sockclient::control::{SockclntCreate, SOCKCLNT_CREATE_MSG_ID};
//!
//! let req = SockclntCreate { name: "probe".to_string() };
//! let encoded = MsgCodec::encode(&req, SOCKCLNT_CREATE_MSG_ID);
//! assert_eq!(encoded.len(), 6 + 64);
//! ```

mod binapi;

pub use binapi::{
    get_fixed, get_i32, get_u16, get_u32, put_fixed_str, Message, MessageType, MsgCodec,
};
