//! Control module - session handshake and message ID registry.
//!
//! The binary API assigns message IDs per session. A client first opens a
//! session with `sockclnt_create` (fixed ID 15); the reply carries the
//! client index and the table mapping `"<name>_<crc>"` to numeric IDs.
//! Closing the session sends `sockclnt_delete`, whose ID is itself looked up
//! in that table.
//!
//! # Workflow
//!
//! 1. Connect to the API socket
//! 2. [`open_session`] sends `sockclnt_create`, reads the reply
//! 3. Application traffic uses IDs from [`MsgTable::lookup`]
//! 4. [`close_session`] sends `sockclnt_delete` and waits briefly for the reply
//!
//! # Example
//!
//! ```
//! use binapi_sockclient::control::{MessageTableEntry, MsgTable};
//!
//! let entries = vec![
//!     MessageTableEntry { index: 10, name: "foo_1234".into() },
//!     MessageTableEntry { index: 11, name: "sockclnt_delete_5678".into() },
//! ];
//! let table = MsgTable::from_entries(&entries);
//!
//! assert_eq!(table.lookup("foo", "1234").unwrap(), 10);
//! assert_eq!(table.delete_msg_id(), Some(11));
//! ```

mod handshake;
mod messages;
mod msg_table;

pub use handshake::{close_session, open_session, SessionInfo};
pub use messages::{
    MessageTableEntry, SockclntCreate, SockclntCreateReply, SockclntDelete, SockclntDeleteReply,
    CREATE_MSG_CONTEXT, DELETE_MSG_CONTEXT, MESSAGE_NAME_LEN, SOCKCLNT_CREATE_MSG_ID,
    SOCKCLNT_DELETE_PREFIX,
};
pub use msg_table::{trim_message_name, MsgTable};
