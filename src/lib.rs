//! HTTP persistent-connection transport.
//!
//! Owns outbound connections multiplexed by `host:port`, reassembles raw
//! byte streams into discrete messages (fixed-length or chunked bodies),
//! enforces idle timeouts over a single lazily re-armed timer, and
//! re-establishes connections the peer closed while work is still
//! queued.
//!
//! The core ([`HttpTransport`]) is a plain event-fed state machine with
//! two injected collaborators: a socket [`Backend`] and a [`Requests`]
//! queue. [`rt`] carries the tokio glue.
#![warn(missing_debug_implementations)]

pub mod backend;
mod error;
mod framer;
pub mod message;
mod registry;
pub mod request;
pub mod rt;
mod timeout;
mod transport;

pub use backend::{Backend, ConnectSetup, Event, SocketId, TransportKind};
pub use error::TransportError;
pub use message::{Header, Message};
pub use registry::ConnId;
pub use request::{Request, Requests};
pub use transport::{Config, HttpTransport};
