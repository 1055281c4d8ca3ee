use crate::registry::ConnId;

/// Errors surfaced to direct callers.
///
/// Transport failures on live sockets are not here: those arrive as
/// backend error events and drop the connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),
    #[error("connection {0} has no live socket")]
    NotConnected(ConnId),
}
