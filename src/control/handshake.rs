//! Session open/close exchanges.
//!
//! Open sends `sockclnt_create` with the fixed ID 15 and waits for the
//! reply carrying the client index and message table. Close resolves
//! `sockclnt_delete` through that table, sends it and waits briefly for
//! the reply. Both requests carry a context marker so their replies can be
//! told apart from application replies still in flight.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use super::messages::{
    SockclntCreate, SockclntCreateReply, SockclntDelete, SockclntDeleteReply,
    CREATE_MSG_CONTEXT, DELETE_MSG_CONTEXT, SOCKCLNT_CREATE_MSG_ID,
};
use super::msg_table::MsgTable;
use crate::codec::{Message, MsgCodec};
use crate::error::{Error, Result};
use crate::protocol::{FrameReader, MsgHeader};
use crate::writer::Writer;

/// Result of a successful open.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Client index assigned by the dataplane.
    pub client_index: u32,
    /// Response code from the create reply.
    pub response: i32,
    /// Negotiated message table.
    pub msg_table: MsgTable,
}

/// Run the create exchange.
///
/// Fails on write error, read error, decode error or when no reply arrives
/// within `timeout`. The message table is dumped at debug level when
/// `log_msg_table` is set.
pub async fn open_session<R, W>(
    reader: &mut FrameReader<R>,
    writer: &Writer<W>,
    client_name: &str,
    timeout: Duration,
    log_msg_table: bool,
) -> Result<SessionInfo>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let request = SockclntCreate {
        name: client_name.to_string(),
    };
    let mut msg = MsgCodec::encode(&request, SOCKCLNT_CREATE_MSG_ID);
    set_context_marker::<SockclntCreate>(&mut msg, CREATE_MSG_CONTEXT);

    tracing::debug!("sending sockclntCreate ({} bytes): {:02X?}", msg.len(), msg);
    writer.write_frame(&msg).await?;

    let body = read_reply(reader, CREATE_MSG_CONTEXT, timeout, "sockclnt_create reply").await?;
    let reply: SockclntCreateReply = MsgCodec::decode(&body).map_err(|e| {
        tracing::debug!("Decoding sockclnt_create_reply failed: {}", e);
        e
    })?;

    tracing::debug!(
        "SockclntCreateReply: Response={} Index={} Count={}",
        reply.response,
        reply.index,
        reply.count
    );

    let msg_table = MsgTable::from_entries(&reply.message_table);
    if log_msg_table {
        dump_msg_table(&msg_table);
    }

    Ok(SessionInfo {
        client_index: reply.index,
        response: reply.response,
        msg_table,
    })
}

/// Run the delete exchange.
///
/// Skipped with a warning when the table had no delete message. With no
/// `reader` the request is sent but the reply is not awaited. A reply that
/// does not arrive within `timeout` is not an error.
pub async fn close_session<R, W>(
    reader: Option<&mut FrameReader<R>>,
    writer: &Writer<W>,
    client_index: u32,
    delete_msg_id: Option<u16>,
    timeout: Duration,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(delete_msg_id) = delete_msg_id else {
        tracing::warn!("sockclnt_delete not found in message table, skipping session delete");
        return Ok(());
    };

    let mut msg = MsgCodec::encode(&SockclntDelete { index: client_index }, delete_msg_id);
    set_context_marker::<SockclntDelete>(&mut msg, DELETE_MSG_CONTEXT);

    tracing::debug!("sending sockclntDelete ({} bytes): {:02X?}", msg.len(), msg);
    writer.write_frame(&msg).await?;

    let Some(reader) = reader else {
        tracing::debug!("reader unavailable, not waiting for sockclnt_delete reply");
        return Ok(());
    };

    let body = match read_reply(reader, DELETE_MSG_CONTEXT, timeout, "sockclnt_delete reply").await
    {
        Ok(body) => body,
        Err(e) if e.is_timeout() => {
            tracing::debug!("{}", e);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let reply: SockclntDeleteReply = MsgCodec::decode(&body)?;
    tracing::debug!("SockclntDeleteReply: Response={}", reply.response);
    Ok(())
}

/// Write `marker` into the low byte of the message's context field.
fn set_context_marker<M: Message>(msg: &mut [u8], marker: u8) {
    if let Some(offset) = M::TYPE.context_offset() {
        if let Some(byte) = msg.get_mut(offset + 3) {
            *byte = marker;
        }
    }
}

/// Read frames until one carries `marker` as its context, within `timeout`.
async fn read_reply<R>(
    reader: &mut FrameReader<R>,
    marker: u8,
    timeout: Duration,
    operation: &'static str,
) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let wait = async {
        loop {
            let body = reader.read_frame().await?;
            let header = MsgHeader::decode(&body)?;
            if header.context == u32::from(marker) {
                return Ok::<Bytes, Error>(body);
            }
            tracing::debug!(
                "skipping message ID={} context={} while waiting for {}",
                header.msg_id,
                header.context,
                operation
            );
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, timeout }),
    }
}

fn dump_msg_table(table: &MsgTable) {
    let mut entries: Vec<_> = table.iter().collect();
    entries.sort_by_key(|(_, id)| *id);

    tracing::debug!("message table ({} entries):", entries.len());
    for (name, id) in entries {
        tracing::debug!(" - {:4}: {:?}", id, name);
    }
}
