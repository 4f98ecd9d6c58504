//! Message ID registry built from the session create reply.
//!
//! Keys are `"<name>_<crc>"` exactly as the dataplane advertises them after
//! trimming, so two messages that share a name but differ in CRC never
//! collide. The table is built once per session and never mutated.

use std::collections::HashMap;

use super::messages::{MessageTableEntry, SOCKCLNT_DELETE_PREFIX};
use crate::error::{Error, Result};

/// Negotiated `"<name>_<crc>"` to message ID mapping.
#[derive(Debug, Clone, Default)]
pub struct MsgTable {
    ids: HashMap<String, u16>,
    delete_msg_id: Option<u16>,
}

impl MsgTable {
    /// Build the table from raw reply entries.
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a MessageTableEntry>,
    {
        let mut table = Self::default();
        for entry in entries {
            let name = trim_message_name(&entry.name);
            if name.starts_with(SOCKCLNT_DELETE_PREFIX) {
                table.delete_msg_id = Some(entry.index);
            }
            table.ids.insert(name.to_string(), entry.index);
        }
        table
    }

    /// Look up the ID of `name` with schema fingerprint `crc`.
    pub fn lookup(&self, name: &str, crc: &str) -> Result<u16> {
        self.get(&format!("{}_{}", name, crc))
            .ok_or_else(|| Error::UnknownMessage {
                name: name.to_string(),
                crc: crc.to_string(),
            })
    }

    /// Look up by full `"<name>_<crc>"` key.
    pub fn get(&self, key: &str) -> Option<u16> {
        self.ids.get(key).copied()
    }

    /// ID of this session's delete message, if the table advertised one.
    #[inline]
    pub fn delete_msg_id(&self) -> Option<u16> {
        self.delete_msg_id
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over `(key, id)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.ids.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Cut a table name at the first NUL, then drop one trailing `0x13`.
pub fn trim_message_name(raw: &str) -> &str {
    let name = raw.split('\0').next().unwrap_or_default();
    name.strip_suffix('\u{13}').unwrap_or(name)
}
