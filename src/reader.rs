//! Background reader loop.
//!
//! One task per session drains the socket: read a frame, decode its
//! message header, hand it to the current [`MessageSink`]. The task owns
//! the [`FrameReader`] and gives it back when it ends, so the session can
//! read the delete reply after the loop stops.
//!
//! The loop ends when the shutdown signal is set or the read side reports
//! end of stream. Disconnect sets the signal and then shuts down the read
//! half of the socket, which wakes a read that is still pending. A dispatch
//! waiting on a full channel is raced against the signal.
//!
//! [`MessageSink`]: crate::handler::MessageSink

use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::handler::SinkSlot;
use crate::protocol::{FrameReader, InboundMessage};

/// Spawn the reader loop inside `span`.
pub(crate) fn spawn_reader_loop<R>(
    reader: FrameReader<R>,
    sink: SinkSlot,
    shutdown: oneshot::Receiver<()>,
    span: tracing::Span,
) -> JoinHandle<FrameReader<R>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(reader_loop(reader, sink, shutdown).instrument(span))
}

async fn reader_loop<R>(
    mut reader: FrameReader<R>,
    sink: SinkSlot,
    mut shutdown: oneshot::Receiver<()>,
) -> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    loop {
        if shutdown_requested(&mut shutdown) {
            tracing::debug!("reader loop: shutdown requested");
            break;
        }

        let body = match reader.read_frame().await {
            Ok(body) => body,
            Err(e) if e.is_disconnect() => {
                tracing::debug!("reader loop: connection closed ({})", e);
                break;
            }
            Err(e) => {
                tracing::debug!("reader loop: read failed: {}", e);
                continue;
            }
        };

        let msg = match InboundMessage::decode(body) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("reader loop: decoding message header failed: {}", e);
                continue;
            }
        };

        tracing::trace!(
            "recvMsg (ID={} ctx={}) ({} bytes): {:02X?}",
            msg.msg_id(),
            msg.context(),
            msg.data().len(),
            msg.data()
        );

        // A full channel must not keep the loop from seeing the shutdown signal.
        let target = sink.current();
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::debug!("reader loop: shutdown requested during dispatch");
                break;
            }
            _ = target.dispatch(msg) => {}
        }
    }

    tracing::debug!("reader loop quit");
    reader
}

/// Non-blocking check. A dropped sender counts as a request.
fn shutdown_requested(shutdown: &mut oneshot::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MessageSink;
    use crate::protocol::FrameWriter;
    use crate::transport::SocketControl;
    use std::time::Duration;
    use tokio::io::duplex;
    use tokio::net::UnixStream;

    fn frame_body(msg_id: u16, context: u32, payload: &[u8]) -> Vec<u8> {
        let mut body = msg_id.to_be_bytes().to_vec();
        body.extend_from_slice(&context.to_be_bytes());
        body.extend_from_slice(payload);
        body
    }

    #[tokio::test]
    async fn test_dispatches_in_order_and_stops_at_eof() {
        let (client, server) = duplex(64 * 1024);
        let (sink, mut rx) = MessageSink::channel(16);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = spawn_reader_loop(
            FrameReader::new(client),
            SinkSlot::new(sink),
            shutdown_rx,
            tracing::Span::none(),
        );

        let mut writer = FrameWriter::new(server);
        writer.write_frame(&frame_body(10, 1, b"one")).await.unwrap();
        writer.write_frame(&frame_body(11, 2, b"two")).await.unwrap();
        writer.shutdown().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!((first.msg_id(), first.context()), (10, 1));
        assert_eq!(first.payload(), b"one");
        let second = rx.recv().await.unwrap();
        assert_eq!((second.msg_id(), second.context()), (11, 2));

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop at EOF")
            .unwrap();
    }

    #[tokio::test]
    async fn test_short_body_is_skipped() {
        let (client, server) = duplex(64 * 1024);
        let (sink, mut rx) = MessageSink::channel(16);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = spawn_reader_loop(
            FrameReader::new(client),
            SinkSlot::new(sink),
            shutdown_rx,
            tracing::Span::none(),
        );

        let mut writer = FrameWriter::new(server);
        // Too short for a message header; logged and skipped.
        writer.write_frame(&[0x00, 0x01]).await.unwrap();
        writer.write_frame(&frame_body(12, 3, b"")).await.unwrap();
        writer.shutdown().await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.msg_id(), 12);
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_signal_checked_before_read() {
        let (client, _server) = duplex(1024);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        shutdown_tx.send(()).unwrap();

        let handle = spawn_reader_loop(
            FrameReader::new(client),
            SinkSlot::default(),
            shutdown_rx,
            tracing::Span::none(),
        );

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop ignored shutdown signal")
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_signal_interrupts_full_channel() {
        let (client, server) = duplex(64 * 1024);
        let (sink, rx) = MessageSink::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = spawn_reader_loop(
            FrameReader::new(client),
            SinkSlot::new(sink),
            shutdown_rx,
            tracing::Span::none(),
        );

        let mut writer = FrameWriter::new(server);
        for context in 0..3 {
            writer.write_frame(&frame_body(10, context, b"x")).await.unwrap();
        }

        // First message fills the channel, second blocks in send.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop stuck waiting for channel capacity")
            .unwrap();
        drop(rx);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_skipped() {
        let (client, server) = duplex(64 * 1024);
        let (sink, mut rx) = MessageSink::channel(16);
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let mut reader = FrameReader::new(client);
        reader.set_max_body_size(16);
        let handle = spawn_reader_loop(
            reader,
            SinkSlot::new(sink),
            shutdown_rx,
            tracing::Span::none(),
        );

        let mut writer = FrameWriter::new(server);
        writer.write_frame(&frame_body(9, 1, &[0xAB; 64])).await.unwrap();
        writer.write_frame(&frame_body(12, 2, b"ok")).await.unwrap();
        writer.shutdown().await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!((msg.msg_id(), msg.context()), (12, 2));
        assert_eq!(msg.payload(), b"ok");
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_panicking_callback_keeps_loop_alive() {
        let (client, server) = duplex(64 * 1024);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = MessageSink::callback(move |msg_id, _data| {
            if msg_id == 1 {
                panic!("callback failure");
            }
            let _ = tx.send(msg_id);
        });
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = spawn_reader_loop(
            FrameReader::new(client),
            SinkSlot::new(sink),
            shutdown_rx,
            tracing::Span::none(),
        );

        let mut writer = FrameWriter::new(server);
        writer.write_frame(&frame_body(1, 0, b"")).await.unwrap();
        writer.write_frame(&frame_body(2, 0, b"")).await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(rx.recv().await, Some(2));
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop did not stop at EOF")
            .expect("reader task panicked");
    }

    #[tokio::test]
    async fn test_read_half_shutdown_unblocks_loop() {
        let (client, _server) = UnixStream::pair().unwrap();
        let control = SocketControl::from_stream(&client).unwrap();
        let (read_half, _write_half) = client.into_split();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = spawn_reader_loop(
            FrameReader::new(read_half),
            SinkSlot::default(),
            shutdown_rx,
            tracing::Span::none(),
        );

        // Let the loop block in read.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        shutdown_tx.send(()).unwrap();
        control.shutdown_read().unwrap();

        let reader = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("blocked read was not woken")
            .unwrap();
        assert_eq!(reader.buffered(), 0);
    }
}
