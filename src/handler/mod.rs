//! Handler module - delivery of inbound messages.
//!
//! Provides:
//! - [`MessageSink`] - callback, bounded channel, or log-and-drop
//! - [`SinkSlot`] - shared holder that lets the sink change while connected
//!
//! # Example
//!
//! ```
//! use binapi_sockclient::handler::MessageSink;
//!
//! let sink = MessageSink::callback(|msg_id, data| {
//!     println!("message {} ({} bytes)", msg_id, data.len());
//! });
//!
//! let (channel_sink, _rx) = MessageSink::channel(64);
//! # let _ = (sink, channel_sink);
//! ```

mod sink;

pub use sink::{MessageSink, MsgCallback, SinkSlot};
