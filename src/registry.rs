//! Connection registry: one record per normalized `host:port`.

use std::collections::HashMap;
use std::time::Instant;

use bytes::BytesMut;

use crate::backend::SocketId;

/// Handle of one logical connection.
///
/// Stable across socket drops and reconnects for the same `host:port`;
/// never reused once the record is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One logical connection, independent of the socket's live/dead state.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) id: ConnId,
    /// Normalized `host:port`, also the registry key.
    pub(crate) key: Box<str>,
    /// Lowercased host.
    pub(crate) host: Box<str>,
    pub(crate) port: u16,
    /// Handshake completed on the current socket.
    pub(crate) connected: bool,
    /// Live backend socket; absent while logically present but
    /// disconnected.
    pub(crate) socket: Option<SocketId>,
    /// Idle deadline, meaningful while a socket is live.
    pub(crate) expiry: Option<Instant>,
    /// Inbound accumulation for the current socket.
    pub(crate) buffer: BytesMut,
}

/// The sole owning map of connection records.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    entries: HashMap<Box<str>, Connection>,
    index: HashMap<ConnId, Box<str>>,
    next_id: u64,
}

impl Registry {
    /// Existing record for the pair, or a fresh one. The flag is `true`
    /// when a record was created.
    pub fn get_or_create(&mut self, host: &str, port: u16) -> (ConnId, bool) {
        // host name matching is case insensitive
        let host = host.to_ascii_lowercase();
        let key: Box<str> = format!("{host}:{port}").into();

        if let Some(conn) = self.entries.get(&key) {
            return (conn.id, false);
        }

        let id = ConnId(self.next_id);
        self.next_id += 1;

        self.index.insert(id, key.clone());
        self.entries.insert(
            key.clone(),
            Connection {
                id,
                key,
                host: host.into(),
                port,
                connected: false,
                socket: None,
                expiry: None,
                buffer: BytesMut::new(),
            },
        );
        (id, true)
    }

    pub fn get(&self, id: ConnId) -> Option<&Connection> {
        self.entries.get(self.index.get(&id)?)
    }

    pub fn get_mut(&mut self, id: ConnId) -> Option<&mut Connection> {
        self.entries.get_mut(self.index.get(&id)?)
    }

    /// Detach the record; teardown side effects are the caller's.
    pub fn remove(&mut self, id: ConnId) -> Option<Connection> {
        let key = self.index.remove(&id)?;
        self.entries.remove(&key)
    }

    pub fn ids(&self) -> Vec<ConnId> {
        self.index.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
