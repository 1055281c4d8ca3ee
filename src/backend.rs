//! Interface to the socket transport backend.
//!
//! The backend owns the actual TCP/TLS sockets. The transport only ever
//! hands it connect/disconnect/send calls and receives [`Event`]s back;
//! it never blocks on it.

use std::time::{Duration, Instant};

use bytes::Bytes;

/// Identifier of one backend socket.
///
/// Allocated by the backend on [`Backend::connect`]. Events are keyed by
/// it so the transport can discard events from a socket it already let
/// go of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(pub u64);

/// Which transport the backend should establish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tls,
    Tcp,
}

/// Parameters for one outbound connect.
#[derive(Debug, Clone)]
pub struct ConnectSetup {
    pub kind: TransportKind,
    /// Lowercased host name.
    pub host: Box<str>,
    pub port: u16,
}

/// Events a backend delivers into `HttpTransport::handle_event`.
#[derive(Debug)]
pub enum Event {
    /// Handshake completed, the socket can carry data.
    Connected(SocketId),
    /// Raw inbound bytes.
    Input(SocketId, Bytes),
    /// Hard transport failure, fatal to the socket.
    Error(SocketId, String),
    /// The armed idle timer elapsed.
    TimerFired,
}

/// Socket transport primitive.
///
/// Calls never block and never fail synchronously: connect and write
/// failures surface later as [`Event::Error`].
pub trait Backend {
    /// Open a socket. The returned id tags every later event for it.
    fn connect(&mut self, setup: ConnectSetup) -> SocketId;

    /// Tear the socket down.
    fn disconnect(&mut self, socket: SocketId);

    /// Queue raw bytes for writing.
    fn send(&mut self, socket: SocketId, data: &[u8]);

    fn now(&self) -> Instant;

    /// Arm the single shared timer. A later call retargets it.
    fn start_timer(&mut self, delay: Duration);

    fn cancel_timer(&mut self);
}
