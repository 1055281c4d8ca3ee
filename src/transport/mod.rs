//! Connection lifecycle and event dispatch.
//!
//! [`HttpTransport`] is the transport context: it owns the connection
//! registry, the timeout queue, the armed-timer bookkeeping, and both
//! collaborators (socket backend and request queue). All work happens
//! inside [`HttpTransport::handle_event`] or one of the caller entry
//! points; nothing blocks and nothing re-enters.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use crate::backend::{Backend, ConnectSetup, Event, SocketId, TransportKind};
use crate::error::TransportError;
use crate::framer;
use crate::registry::{ConnId, Connection, Registry};
use crate::request::Requests;
use crate::timeout::TimeoutQueue;


/// Transport-level knobs.
#[derive(Debug, Clone)]
pub struct Config {
    /// Transport kind requested from the backend.
    pub kind: TransportKind,
    /// Idle window before an unused connection is dropped.
    pub idle_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kind: TransportKind::Tls,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// The transport context.
///
/// Single-threaded and event-fed: the backend's I/O dispatcher calls
/// [`handle_event`](Self::handle_event), callers use
/// [`open`](Self::open) / [`send`](Self::send), and
/// [`shutdown`](Self::shutdown) ends the lifecycle explicitly.
pub struct HttpTransport<B, R> {
    backend: B,
    requests: R,
    registry: Registry,
    timeouts: TimeoutQueue,
    /// Owning connection of each live socket.
    sockets: HashMap<SocketId, ConnId>,
    /// Target of the armed timer, `None` while no timer runs.
    next_timeout: Option<Instant>,
    config: Config,
}

impl<B: Backend, R: Requests> HttpTransport<B, R> {
    pub fn new(backend: B, requests: R) -> Self {
        Self::with_config(backend, requests, Config::default())
    }

    pub fn with_config(backend: B, requests: R, config: Config) -> Self {
        Self {
            backend,
            requests,
            registry: Registry::default(),
            timeouts: TimeoutQueue::default(),
            sockets: HashMap::new(),
            next_timeout: None,
            config,
        }
    }

    /// Handle for `host:port`, connecting or re-establishing as needed.
    ///
    /// The same handle is returned for the same (case-insensitive) pair
    /// until it is dropped; dropping is terminal and a later call gets a
    /// fresh handle.
    pub fn open(&mut self, host: &str, port: u16) -> ConnId {
        let (id, created) = self.registry.get_or_create(host, port);

        if let Some(conn) = self.registry.get(id) {
            if created {
                tracing::debug!("new connection '{}'", conn.key);
            } else if conn.socket.is_none() {
                tracing::debug!("re-establishing '{}'", conn.key);
                self.timeouts.remove(id);
            }
        }

        let needs_connect = self.registry.get(id).is_some_and(|c| c.socket.is_none());
        if needs_connect {
            self.connect(id);
        }
        id
    }

    fn connect(&mut self, id: ConnId) {
        let Some(conn) = self.registry.get_mut(id) else {
            return;
        };
        let setup = ConnectSetup {
            kind: self.config.kind,
            host: conn.host.clone(),
            port: conn.port,
        };
        conn.connected = false;
        conn.buffer.clear();

        let now = self.backend.now();
        let socket = self.backend.connect(setup);
        let expiry = now + self.config.idle_timeout;

        if let Some(conn) = self.registry.get_mut(id) {
            conn.socket = Some(socket);
            conn.expiry = Some(expiry);
        }
        self.sockets.insert(socket, id);
        self.timeouts.insert(id, expiry);

        // start the timeout timer if necessary
        if self.next_timeout.is_none() {
            self.start_timer(now);
        }
    }

    /// Frame and write one message: header block, CRLF, then body.
    pub fn send(
        &mut self,
        id: ConnId,
        header: &str,
        body: Option<&[u8]>,
    ) -> Result<(), TransportError> {
        let conn = self
            .registry
            .get(id)
            .ok_or(TransportError::UnknownConnection(id))?;
        let socket = conn.socket.ok_or(TransportError::NotConnected(id))?;

        let mut frame = BytesMut::new();
        framer::encode(header, body, &mut frame);
        tracing::trace!(
            "outbound on '{}':\n{}",
            conn.key,
            String::from_utf8_lossy(&frame)
        );
        self.backend.send(socket, &frame);
        Ok(())
    }

    /// Ask the request layer for its next queued request and send it, if
    /// the connection is established. Call after queueing work on a
    /// handle that is already connected.
    pub fn pump(&mut self, id: ConnId) {
        if self.registry.get(id).is_some_and(|c| c.connected) {
            self.drive_next(id);
        }
    }

    fn drive_next(&mut self, id: ConnId) {
        if let Some(request) = self.requests.next_request(id) {
            if let Err(err) = self.send(id, &request.header, request.body.as_deref()) {
                tracing::debug!("queued request not sent: {err}");
            }
        }
    }

    /// Feed one backend event through the state machine.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected(socket) => self.on_connected(socket),
            Event::Input(socket, data) => self.on_input(socket, data),
            Event::Error(socket, reason) => self.on_error(socket, &reason),
            Event::TimerFired => self.on_timer(),
        }
    }

    /// Conn owning `socket`, unless the socket went stale (a reconnect
    /// replaced it while its events were still in flight).
    fn resolve(&self, socket: SocketId) -> Option<ConnId> {
        let id = *self.sockets.get(&socket)?;
        let live = self.registry.get(id)?.socket == Some(socket);
        live.then_some(id)
    }

    fn on_connected(&mut self, socket: SocketId) {
        let Some(id) = self.resolve(socket) else {
            tracing::trace!("connected event for stale socket {socket:?}");
            return;
        };
        if let Some(conn) = self.registry.get_mut(id) {
            conn.connected = true;
            tracing::debug!("connected: {}", conn.key);
        }
        self.drive_next(id);
    }

    fn on_input(&mut self, socket: SocketId, data: Bytes) {
        let Some(id) = self.resolve(socket) else {
            tracing::trace!(
                "input for stale socket {socket:?}, {} bytes discarded",
                data.len()
            );
            return;
        };
        if let Some(conn) = self.registry.get_mut(id) {
            conn.buffer.extend_from_slice(&data);
        }

        // drain complete messages; responses may arrive pipelined
        loop {
            let Some(message) = self
                .registry
                .get_mut(id)
                .and_then(|conn| framer::decode(&mut conn.buffer))
            else {
                break;
            };

            if let Some(conn) = self.registry.get(id) {
                tracing::trace!(
                    "inbound on '{}': status {}, {} body bytes",
                    conn.key,
                    message.status(),
                    message.body().len()
                );
            }

            let close = message.is_connection_close();
            self.requests.response(id, message);
            let next = self.requests.pending(id);

            if close {
                // peer drops the socket after this message; the rest of
                // the buffer belongs to the closed stream
                let (socket, host, port) = match self.registry.get_mut(id) {
                    Some(conn) => {
                        tracing::debug!("server requested close '{}'", conn.key);
                        conn.connected = false;
                        conn.buffer.clear();
                        (conn.socket.take(), conn.host.to_string(), conn.port)
                    }
                    None => break,
                };
                if let Some(socket) = socket {
                    self.sockets.remove(&socket);
                    self.backend.disconnect(socket);
                }
                // re-connect right away so queued requests are not lost
                if next {
                    self.open(&host, port);
                }
                break;
            } else if next {
                // trigger sending of the next pending request
                self.drive_next(id);
            }
        }
    }

    fn on_error(&mut self, socket: SocketId, reason: &str) {
        let Some(id) = self.resolve(socket) else {
            tracing::trace!("error event for stale socket {socket:?}: {reason}");
            return;
        };
        self.drop_connection(id, Some(reason));
    }

    fn on_timer(&mut self) {
        let now = self.backend.now();
        // timer has expired
        self.next_timeout = None;

        loop {
            let Some(head) = self.timeouts.head() else {
                break;
            };
            if head.expiry <= now {
                self.drop_connection(head.conn, Some("timeout"));
                // next connection may have timed out too, loop around
            } else {
                // restart timer for the next connection
                self.start_timer(now);
                break;
            }
        }
    }

    fn start_timer(&mut self, now: Instant) {
        let Some(head) = self.timeouts.head() else {
            return;
        };
        self.next_timeout = Some(head.expiry);
        self.backend
            .start_timer(head.expiry.saturating_duration_since(now));
    }

    fn drop_connection(&mut self, id: ConnId, reason: Option<&str>) {
        match self.registry.remove(id) {
            Some(conn) => {
                tracing::debug!(
                    "dropping connection '{}': {}",
                    conn.key,
                    reason.unwrap_or("REASON UNKNOWN")
                );
                self.destroy(conn);
            }
            // keep the queue consistent even if the record is gone
            None => self.timeouts.remove(id),
        }
    }

    fn destroy(&mut self, conn: Connection) {
        tracing::debug!("destroying connection '{}'", conn.key);
        if let Some(socket) = conn.socket {
            self.sockets.remove(&socket);
            self.backend.disconnect(socket);
        }
        self.timeouts.remove(conn.id);
        self.requests.shutdown(conn.id);
    }

    /// Cancel the timer and destroy every connection.
    pub fn shutdown(&mut self) {
        self.backend.cancel_timer();
        self.next_timeout = None;
        for id in self.registry.ids() {
            if let Some(conn) = self.registry.remove(id) {
                self.destroy(conn);
            }
        }
    }

    // ===== Read-only views =====

    /// Handshake completed on a live socket.
    pub fn is_connected(&self, id: ConnId) -> bool {
        self.registry.get(id).is_some_and(|c| c.connected)
    }

    /// Lowercased host and port, while the handle exists.
    pub fn peer(&self, id: ConnId) -> Option<(&str, u16)> {
        self.registry.get(id).map(|c| (&*c.host, c.port))
    }

    /// Idle deadline set when the current socket was opened.
    pub fn expiry(&self, id: ConnId) -> Option<Instant> {
        self.registry.get(id).and_then(|c| c.expiry)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Target of the armed timer, `None` while no timer runs.
    pub fn timer_target(&self) -> Option<Instant> {
        self.next_timeout
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn requests(&self) -> &R {
        &self.requests
    }

    pub fn requests_mut(&mut self) -> &mut R {
        &mut self.requests
    }
}

impl<B, R> std::fmt::Debug for HttpTransport<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("connections", &self.registry.len())
            .field("next_timeout", &self.next_timeout)
            .finish_non_exhaustive()
    }
}
