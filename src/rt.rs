//! Tokio glue: a plain-TCP backend and the event-drive loop.
//!
//! The transport core is a state machine fed through
//! [`HttpTransport::handle_event`]; this module produces those events.
//! Each socket runs one task forwarding inbound bytes and failures over
//! an unbounded channel, and [`drive`] selects over that channel and the
//! armed idle timer.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::backend::{Backend, ConnectSetup, Event, SocketId, TransportKind};
use crate::request::Requests;
use crate::transport::HttpTransport;

/// Plain-TCP implementation of [`Backend`].
///
/// TLS is delegated to backends that carry it: a [`TransportKind::Tls`]
/// setup is answered with an [`Event::Error`], so the connection drops
/// through the normal path. Connects spawn tasks, so the backend must be
/// used inside a tokio runtime.
#[derive(Debug)]
pub struct TcpBackend {
    events: UnboundedSender<Event>,
    sockets: HashMap<SocketId, UnboundedSender<Vec<u8>>>,
    next_socket: u64,
    deadline: Option<tokio::time::Instant>,
}

impl TcpBackend {
    /// Backend plus the event stream to feed into [`drive`].
    pub fn channel() -> (Self, UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                events,
                sockets: HashMap::new(),
                next_socket: 0,
                deadline: None,
            },
            rx,
        )
    }

    /// Deadline of the armed idle timer.
    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }
}

impl Backend for TcpBackend {
    fn connect(&mut self, setup: ConnectSetup) -> SocketId {
        let socket = SocketId(self.next_socket);
        self.next_socket += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.insert(socket, tx);
        tokio::spawn(socket_task(socket, setup, rx, self.events.clone()));
        socket
    }

    fn disconnect(&mut self, socket: SocketId) {
        // dropping the write channel ends the socket task
        self.sockets.remove(&socket);
    }

    fn send(&mut self, socket: SocketId, data: &[u8]) {
        if let Some(tx) = self.sockets.get(&socket) {
            // a failed send means the task already died and its error
            // event is on the way
            let _ = tx.send(data.to_vec());
        }
    }

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn start_timer(&mut self, delay: Duration) {
        self.deadline = Some(tokio::time::Instant::now() + delay);
    }

    fn cancel_timer(&mut self) {
        self.deadline = None;
    }
}

async fn socket_task(
    socket: SocketId,
    setup: ConnectSetup,
    mut outbound: UnboundedReceiver<Vec<u8>>,
    events: UnboundedSender<Event>,
) {
    if setup.kind != TransportKind::Tcp {
        let _ = events.send(Event::Error(
            socket,
            "tls transport is not available in TcpBackend".into(),
        ));
        return;
    }

    let mut stream = match TcpStream::connect((&*setup.host, setup.port)).await {
        Ok(stream) => stream,
        Err(err) => {
            let _ = events.send(Event::Error(socket, err.to_string()));
            return;
        }
    };
    if events.send(Event::Connected(socket)).is_err() {
        return;
    }

    let mut buffer = BytesMut::with_capacity(4096);
    loop {
        tokio::select! {
            data = outbound.recv() => match data {
                Some(data) => {
                    if let Err(err) = stream.write_all(&data).await {
                        let _ = events.send(Event::Error(socket, err.to_string()));
                        break;
                    }
                }
                // disconnected on our side
                None => break,
            },
            read = stream.read_buf(&mut buffer) => match read {
                Ok(0) => {
                    let _ = events.send(Event::Error(socket, "closed by peer".into()));
                    break;
                }
                Ok(_) => {
                    if events.send(Event::Input(socket, buffer.split().freeze())).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = events.send(Event::Error(socket, err.to_string()));
                    break;
                }
            },
        }
    }
}

/// Pump events and timer fires into the transport.
///
/// Returns when the event channel closes; callers that want to stop
/// earlier wrap the future in a select or timeout of their own.
pub async fn drive<R: Requests>(
    transport: &mut HttpTransport<TcpBackend, R>,
    events: &mut UnboundedReceiver<Event>,
) {
    loop {
        let event = match transport.backend().deadline() {
            Some(deadline) => tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    // the deadline is one-shot; handling the fire re-arms
                    // it when connections remain
                    transport.backend_mut().deadline = None;
                    Event::TimerFired
                }
            },
            None => match events.recv().await {
                Some(event) => event,
                None => break,
            },
        };
        transport.handle_event(event);
    }
}
