//! Probe - connect to the API socket and ping the dataplane.
//!
//! This example demonstrates:
//! - Waiting for the API socket to appear
//! - Opening a session and resolving a message ID from the negotiated table
//! - Sending a request and receiving the reply on a bounded channel
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=binapi_sockclient=debug cargo run --example probe -- /run/vpp/api.sock
//! ```

use std::time::Duration;

use binapi_sockclient::codec::{Message, MessageType, MsgCodec};
use binapi_sockclient::Session;
use bytes::BytesMut;
use tracing_subscriber::EnvFilter;

/// `control_ping` carries no payload.
struct ControlPing;

impl Message for ControlPing {
    const NAME: &'static str = "control_ping";
    const CRC: &'static str = "51077d14";
    const TYPE: MessageType = MessageType::Request;

    fn encode_payload(&self, _buf: &mut BytesMut) {}

    fn decode_payload(_buf: &mut &[u8]) -> binapi_sockclient::Result<Self> {
        Ok(ControlPing)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut builder = Session::builder().client_name("probe").log_msg_table(true);
    if let Some(path) = std::env::args().nth(1) {
        builder = builder.socket_path(path);
    }
    let mut session = builder.build();
    let mut replies = session.subscribe(16);

    session.wait_ready().await?;
    session.connect().await?;
    println!(
        "connected to {} as client {:?} ({} messages)",
        session.socket_path().display(),
        session.client_index(),
        session.msg_table().map_or(0, |t| t.len())
    );

    let ping_id = session.get_msg_id(ControlPing::NAME, ControlPing::CRC)?;
    let mut msg = MsgCodec::encode(&ControlPing, ping_id);
    session.send_msg(1, &mut msg).await?;

    match tokio::time::timeout(Duration::from_secs(2), replies.recv()).await {
        Ok(Some(reply)) => println!(
            "reply: ID={} context={} ({} bytes)",
            reply.msg_id(),
            reply.context(),
            reply.data().len()
        ),
        Ok(None) => println!("reader stopped before a reply arrived"),
        Err(_) => println!("no reply within 2s"),
    }

    session.disconnect().await?;
    Ok(())
}
