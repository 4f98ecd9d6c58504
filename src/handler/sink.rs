//! Dispatch target for inbound messages.
//!
//! The reader loop hands every decoded message to the current
//! [`MessageSink`]. The sink lives in a shared [`SinkSlot`] so it can be
//! replaced while the session is connected; the loop snapshots it once per
//! message.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::protocol::InboundMessage;

/// Synchronous message callback: `(msg_id, full body)`.
pub type MsgCallback = Arc<dyn Fn(u16, Bytes) + Send + Sync>;

/// Where inbound messages go.
#[derive(Clone, Default)]
pub enum MessageSink {
    /// No target set; messages are logged and dropped.
    #[default]
    Discard,
    /// Invoke a callback inline on the reader task.
    Callback(MsgCallback),
    /// Queue on a bounded channel, waiting for capacity.
    Channel(mpsc::Sender<InboundMessage>),
}

impl MessageSink {
    /// Build a callback sink.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(u16, Bytes) + Send + Sync + 'static,
    {
        MessageSink::Callback(Arc::new(f))
    }

    /// Build a channel sink and return its receiver.
    ///
    /// `capacity` is clamped to at least 1.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (MessageSink::Channel(tx), rx)
    }

    /// Deliver one message.
    ///
    /// A full channel suspends the caller until the consumer catches up. A
    /// closed channel drops the message with a warning. A panicking callback
    /// is caught and logged.
    pub async fn dispatch(&self, msg: InboundMessage) {
        match self {
            MessageSink::Discard => {
                tracing::warn!(
                    "no message callback set, dropping message: ID={} len={}",
                    msg.msg_id(),
                    msg.data().len()
                );
            }
            MessageSink::Callback(callback) => {
                let msg_id = msg.msg_id();
                let data = msg.into_data();
                let result = panic::catch_unwind(AssertUnwindSafe(|| callback(msg_id, data)));
                if let Err(payload) = result {
                    tracing::warn!(
                        "message callback panicked on ID={}: {}",
                        msg_id,
                        panic_message(payload.as_ref())
                    );
                }
            }
            MessageSink::Channel(tx) => {
                if let Err(e) = tx.send(msg).await {
                    tracing::warn!(
                        "message receiver dropped, dropping message: ID={}",
                        e.0.msg_id()
                    );
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for MessageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageSink::Discard => f.write_str("Discard"),
            MessageSink::Callback(_) => f.write_str("Callback(..)"),
            MessageSink::Channel(tx) => f
                .debug_struct("Channel")
                .field("capacity", &tx.capacity())
                .field("closed", &tx.is_closed())
                .finish(),
        }
    }
}

/// Shared, replaceable [`MessageSink`].
#[derive(Debug, Clone, Default)]
pub struct SinkSlot {
    inner: Arc<RwLock<MessageSink>>,
}

impl SinkSlot {
    /// Create a slot holding `sink`.
    pub fn new(sink: MessageSink) -> Self {
        Self {
            inner: Arc::new(RwLock::new(sink)),
        }
    }

    /// Replace the sink. Takes effect from the next message.
    pub fn set(&self, sink: MessageSink) {
        match self.inner.write() {
            Ok(mut guard) => *guard = sink,
            Err(poisoned) => *poisoned.into_inner() = sink,
        }
    }

    /// Snapshot the current sink.
    pub fn current(&self) -> MessageSink {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
