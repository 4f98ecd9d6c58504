//! Integration tests for binapi-sockclient.
//!
//! Every test runs a full session against a fake dataplane that speaks the
//! framing and handshake over a Unix socket in a temporary directory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::net::UnixListener;
use tokio::task::JoinHandle;

use binapi_sockclient::codec::{get_i32, Message, MessageType, MsgCodec};
use binapi_sockclient::control::{
    MessageTableEntry, SockclntCreate, SockclntCreateReply, SockclntDelete, SockclntDeleteReply,
    CREATE_MSG_CONTEXT, SOCKCLNT_CREATE_MSG_ID,
};
use binapi_sockclient::protocol::{FrameReader, FrameWriter, MsgHeader};
use binapi_sockclient::{Error, Session};

const FOO_ID: u16 = 10;
const DELETE_ID: u16 = 11;
const PING_ID: u16 = 12;
const PING_REPLY_ID: u16 = 13;
const CREATE_REPLY_ID: u16 = 16;
const DELETE_REPLY_ID: u16 = 17;
const CLIENT_INDEX: u32 = 7;

#[derive(Debug, PartialEq)]
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

#[derive(Debug, PartialEq)]
struct ControlPingReply {
    retval: i32,
}

impl Message for ControlPingReply {
    const NAME: &'static str = "control_ping_reply";
    const CRC: &'static str = "f6b0b8ca";
    const TYPE: MessageType = MessageType::Reply;

    fn encode_payload(&self, buf: &mut BytesMut) {
        buf.put_i32(self.retval);
    }

    fn decode_payload(buf: &mut &[u8]) -> binapi_sockclient::Result<Self> {
        Ok(Self {
            retval: get_i32(buf, "retval")?,
        })
    }
}

// ============================================================================
// Fake dataplane
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ServerOptions {
    reply_create: bool,
    reply_delete: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            reply_create: true,
            reply_delete: true,
        }
    }
}

#[derive(Debug, Default)]
struct ServerLog {
    create_name: Option<String>,
    create_context: Option<u32>,
    /// (msg_id, client_index, context) of every ping.
    pings: Vec<(u16, u32, u32)>,
    deleted_index: Option<u32>,
}

fn reply_with_context<M: Message>(msg: &M, msg_id: u16, context: u32) -> Vec<u8> {
    let mut body = MsgCodec::encode(msg, msg_id);
    body[2..6].copy_from_slice(&context.to_be_bytes());
    body
}

fn create_reply() -> SockclntCreateReply {
    let entries = [
        (FOO_ID, "foo_1234"),
        (DELETE_ID, "sockclnt_delete_5678\u{13}"),
        (PING_ID, "control_ping_51077d14\u{13}"),
        (PING_REPLY_ID, "control_ping_reply_f6b0b8ca\u{13}"),
    ];
    let message_table: Vec<_> = entries
        .iter()
        .map(|(index, name)| MessageTableEntry {
            index: *index,
            name: name.to_string(),
        })
        .collect();
    SockclntCreateReply {
        response: 0,
        index: CLIENT_INDEX,
        count: message_table.len() as u32,
        message_table,
    }
}

async fn serve(listener: UnixListener, opts: ServerOptions) -> ServerLog {
    let (stream, _) = listener.accept().await.unwrap();
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);
    let mut log = ServerLog::default();

    let Ok(body) = reader.read_frame().await else {
        return log;
    };
    assert_eq!(MsgCodec::msg_id(&body), Some(SOCKCLNT_CREATE_MSG_ID));
    let request: SockclntCreate = MsgCodec::decode(&body).unwrap();
    let context = MsgHeader::decode(&body).unwrap().context;
    log.create_name = Some(request.name);
    log.create_context = Some(context);

    if !opts.reply_create {
        while reader.read_frame().await.is_ok() {}
        return log;
    }

    let reply = reply_with_context(&create_reply(), CREATE_REPLY_ID, context);
    writer.write_frame(&reply).await.unwrap();

    while let Ok(body) = reader.read_frame().await {
        let msg_id = MsgCodec::msg_id(&body).unwrap();
        let client_index = u32::from_be_bytes([body[2], body[3], body[4], body[5]]);
        let context = u32::from_be_bytes([body[6], body[7], body[8], body[9]]);

        match msg_id {
            DELETE_ID => {
                let request: SockclntDelete = MsgCodec::decode(&body).unwrap();
                log.deleted_index = Some(request.index);
                if opts.reply_delete {
                    let reply =
                        reply_with_context(&SockclntDeleteReply { response: 0 }, DELETE_REPLY_ID, context);
                    // The client may already have shut its read side.
                    let _ = writer.write_frame(&reply).await;
                }
            }
            PING_ID => {
                log.pings.push((msg_id, client_index, context));
                let reply =
                    reply_with_context(&ControlPingReply { retval: 0 }, PING_REPLY_ID, context);
                let _ = writer.write_frame(&reply).await;
            }
            other => panic!("unexpected message ID {}", other),
        }
    }

    log
}

struct FakeDataplane {
    _dir: tempfile::TempDir,
    path: PathBuf,
    handle: JoinHandle<ServerLog>,
}

impl FakeDataplane {
    fn start(opts: ServerOptions) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let handle = tokio::spawn(serve(listener, opts));
        Self {
            _dir: dir,
            path,
            handle,
        }
    }

    async fn finish(self) -> ServerLog {
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("fake dataplane did not finish")
            .unwrap()
    }
}

fn session_for(path: &Path) -> Session {
    Session::builder()
        .socket_path(path)
        .legacy_socket_path(None)
        .client_name("integration")
        .connect_timeout(Duration::from_secs(2))
        .disconnect_timeout(Duration::from_millis(100))
        .build()
}

fn ping(session: &Session) -> Vec<u8> {
    let id = session
        .get_msg_id(ControlPing::NAME, ControlPing::CRC)
        .unwrap();
    MsgCodec::encode(&ControlPing, id)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connect_negotiates_table_and_disconnect_deletes() {
    let server = FakeDataplane::start(ServerOptions::default());
    let mut session = session_for(&server.path);

    session.connect().await.unwrap();
    assert!(session.is_connected());
    assert_eq!(session.client_index(), Some(CLIENT_INDEX));
    assert_eq!(session.delete_msg_id(), Some(DELETE_ID));
    assert_eq!(session.get_msg_id("foo", "1234").unwrap(), FOO_ID);
    assert_eq!(session.msg_table().unwrap().len(), 4);

    match session.get_msg_id("foo", "0000") {
        Err(Error::UnknownMessage { name, crc }) => {
            assert_eq!(name, "foo");
            assert_eq!(crc, "0000");
        }
        other => panic!("expected UnknownMessage, got {:?}", other),
    }

    session.disconnect().await.unwrap();
    assert!(!session.is_connected());

    let log = server.finish().await;
    assert_eq!(log.create_name.as_deref(), Some("integration"));
    assert_eq!(log.create_context, Some(u32::from(CREATE_MSG_CONTEXT)));
    assert_eq!(log.deleted_index, Some(CLIENT_INDEX));
}

#[tokio::test]
async fn test_send_and_receive_on_channel() {
    let server = FakeDataplane::start(ServerOptions::default());
    let mut session = session_for(&server.path);
    let mut replies = session.subscribe(8);

    session.connect().await.unwrap();
    let mut msg = ping(&session);
    session.send_msg(42, &mut msg).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), replies.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.msg_id(), PING_REPLY_ID);
    assert_eq!(reply.context(), 42);
    let decoded: ControlPingReply = MsgCodec::decode(reply.data()).unwrap();
    assert_eq!(decoded.retval, 0);

    session.disconnect().await.unwrap();
    let log = server.finish().await;
    assert_eq!(log.pings, vec![(PING_ID, CLIENT_INDEX, 42)]);
}

#[tokio::test]
async fn test_callback_dispatch() {
    let server = FakeDataplane::start(ServerOptions::default());
    let mut session = session_for(&server.path);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    session.set_msg_callback(move |msg_id, data| {
        let _ = tx.send((msg_id, data));
    });

    session.connect().await.unwrap();
    let mut msg = ping(&session);
    session.send_msg(5, &mut msg).await.unwrap();

    let (msg_id, data) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg_id, PING_REPLY_ID);
    assert_eq!(&data[2..6], &5u32.to_be_bytes());

    session.disconnect().await.unwrap();
    server.finish().await;
}

#[tokio::test]
async fn test_concurrent_senders() {
    let server = FakeDataplane::start(ServerOptions::default());
    let mut session = Session::builder()
        .socket_path(&server.path)
        .legacy_socket_path(None)
        .chunk_size(5)
        .build();
    let mut replies = session.subscribe(16);
    session.connect().await.unwrap();

    let template = ping(&session);
    let mut tasks = Vec::new();
    for task_id in 0u32..4 {
        let sender = session.sender().unwrap();
        let template = template.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0u32..20 {
                let mut msg = template.clone();
                sender.send_msg(task_id * 100 + i, &mut msg).await.unwrap();
            }
        }));
    }

    let mut contexts = Vec::new();
    while contexts.len() < 80 {
        let reply = tokio::time::timeout(Duration::from_secs(5), replies.recv())
            .await
            .unwrap()
            .unwrap();
        contexts.push(reply.context());
    }
    for task in tasks {
        task.await.unwrap();
    }

    session.disconnect().await.unwrap();
    let log = server.finish().await;

    assert_eq!(log.pings.len(), 80);
    assert!(log.pings.iter().all(|(_, idx, _)| *idx == CLIENT_INDEX));
    contexts.sort_unstable();
    let mut expected: Vec<u32> = (0..4).flat_map(|t| (0..20).map(move |i| t * 100 + i)).collect();
    expected.sort_unstable();
    assert_eq!(contexts, expected);
}

#[tokio::test]
async fn test_disconnect_unblocks_idle_reader() {
    let server = FakeDataplane::start(ServerOptions {
        reply_create: true,
        reply_delete: false,
    });
    let mut session = session_for(&server.path);
    session.connect().await.unwrap();

    // Reader loop is now blocked in read with nothing to receive.
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), session.disconnect())
        .await
        .expect("disconnect hung on blocked reader")
        .unwrap();
    assert!(!session.is_connected());

    let log = server.finish().await;
    assert_eq!(log.deleted_index, Some(CLIENT_INDEX));
}

#[tokio::test]
async fn test_disconnect_with_undrained_channel() {
    let server = FakeDataplane::start(ServerOptions::default());
    let mut session = session_for(&server.path);
    let replies = session.subscribe(1);
    session.connect().await.unwrap();

    for context in 0..3 {
        let mut msg = ping(&session);
        session.send_msg(context, &mut msg).await.unwrap();
    }

    // One reply fills the channel; the reader is now waiting for capacity.
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(3), session.disconnect())
        .await
        .expect("disconnect hung on a full channel")
        .unwrap();
    assert!(!session.is_connected());
    drop(replies);

    let log = server.finish().await;
    assert_eq!(log.pings.len(), 3);
    assert_eq!(log.deleted_index, Some(CLIENT_INDEX));
}

#[tokio::test]
async fn test_open_timeout_rolls_back() {
    let server = FakeDataplane::start(ServerOptions {
        reply_create: false,
        reply_delete: false,
    });
    let mut session = session_for(&server.path);
    session.set_connect_timeout(Duration::from_millis(100));

    let err = session.connect().await.unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {:?}", err);
    assert!(!session.is_connected());

    // The server sees the socket closed after the rollback.
    let log = server.finish().await;
    assert_eq!(log.create_context, Some(u32::from(CREATE_MSG_CONTEXT)));
}

#[tokio::test]
async fn test_open_fails_when_peer_hangs_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut session = session_for(&path);
    let err = session.connect().await.unwrap_err();
    assert!(err.is_disconnect(), "unexpected error: {:?}", err);
    assert!(!session.is_connected());
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let server = FakeDataplane::start(ServerOptions::default());
    let mut session = session_for(&server.path);
    session.connect().await.unwrap();

    assert!(matches!(
        session.connect().await,
        Err(Error::AlreadyConnected)
    ));

    session.disconnect().await.unwrap();
    server.finish().await;
}

#[tokio::test]
async fn test_send_after_disconnect() {
    let server = FakeDataplane::start(ServerOptions::default());
    let mut session = session_for(&server.path);
    session.connect().await.unwrap();

    let sender = session.sender().unwrap();
    let mut msg = ping(&session);
    session.disconnect().await.unwrap();

    assert!(matches!(
        session.send_msg(1, &mut msg).await,
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        sender.send_msg(1, &mut msg).await,
        Err(Error::NotConnected)
    ));
    // Second disconnect is a no-op.
    session.disconnect().await.unwrap();
    server.finish().await;
}

#[tokio::test]
async fn test_wait_ready_then_connect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api.sock");

    let bind_path = path.clone();
    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let listener = UnixListener::bind(&bind_path).unwrap();
        serve(listener, ServerOptions::default()).await
    });

    let mut session = Session::builder()
        .socket_path(&path)
        .legacy_socket_path(None)
        .max_wait_ready(Duration::from_secs(5))
        .build();
    session.wait_ready().await.unwrap();
    session.connect().await.unwrap();
    assert_eq!(session.client_index(), Some(CLIENT_INDEX));

    session.disconnect().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_legacy_socket_is_used_when_primary_missing() {
    let server = FakeDataplane::start(ServerOptions::default());
    let primary_dir = tempfile::tempdir().unwrap();
    let primary = primary_dir.path().join("dp-api.sock");

    let mut session = Session::builder()
        .socket_path(&primary)
        .legacy_socket_path(Some(server.path.clone()))
        .max_wait_ready(Duration::from_millis(200))
        .build();

    session.wait_ready().await.unwrap();
    assert_eq!(session.socket_path(), server.path.as_path());

    session.connect().await.unwrap();
    assert!(session.is_connected());
    session.disconnect().await.unwrap();
    server.finish().await;
}

#[tokio::test]
async fn test_wait_ready_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::builder()
        .socket_path(dir.path().join("never.sock"))
        .legacy_socket_path(None)
        .max_wait_ready(Duration::from_millis(100))
        .build();

    match session.wait_ready().await {
        Err(Error::WaitTimeout { path, timeout }) => {
            assert!(path.ends_with("never.sock"));
            assert_eq!(timeout, Duration::from_millis(100));
        }
        other => panic!("expected WaitTimeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_drop_releases_connection() {
    let server = FakeDataplane::start(ServerOptions::default());
    let received = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&received);

    let mut session = Session::builder()
        .socket_path(&server.path)
        .legacy_socket_path(None)
        .on_message(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();
    session.connect().await.unwrap();
    drop(session);

    // The server's read loop ends once the client socket is gone.
    let log = server.finish().await;
    assert_eq!(log.deleted_index, None);
    assert_eq!(received.load(Ordering::SeqCst), 0);
}
