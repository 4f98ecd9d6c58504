//! # binapi-sockclient
//!
//! Async client for a dataplane binary API served over a Unix socket.
//!
//! The crate implements the session and transport engine: waiting for the
//! socket to appear, dialing it (with a seqpacket fallback for older
//! servers), the `sockclnt_create` / `sockclnt_delete` handshake that
//! negotiates the message ID table, length-prefixed framing, serialized
//! writes and a background reader that dispatches inbound messages.
//!
//! ## Architecture
//!
//! - **Framing**: 16-byte header (reserved u64, length u32, marker u32), then the body
//! - **Handshake**: fixed-ID create request, per-session message table in the reply
//! - **Dispatch**: one reader task per session feeding a callback or bounded channel
//!
//! ## Example
//!
//! ```ignore
//! use binapi_sockclient::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), binapi_sockclient::Error> {
//!     let mut session = Session::builder().client_name("probe").build();
//!     session.set_msg_callback(|msg_id, data| {
//!         println!("received message {} ({} bytes)", msg_id, data.len());
//!     });
//!
//!     session.wait_ready().await?;
//!     session.connect().await?;
//!     let id = session.get_msg_id("show_version", "51077d14")?;
//!     println!("show_version has ID {}", id);
//!     session.disconnect().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod reader;

pub use client::{Session, SessionBuilder};
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use handler::MessageSink;
pub use protocol::InboundMessage;
pub use writer::MsgSender;
