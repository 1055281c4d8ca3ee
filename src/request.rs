//! Interface to the request queue layer.

use crate::message::Message;
use crate::registry::ConnId;

/// One queued outbound request, ready to be framed.
#[derive(Debug, Clone)]
pub struct Request {
    /// Header block, each line CRLF-terminated.
    pub header: String,
    pub body: Option<Vec<u8>>,
}

/// Hooks into the request queue collaborator.
///
/// The queue decides what to send and when; the transport decides over
/// which socket and notifies it when a connection goes away.
pub trait Requests {
    /// Pull the next queued request for `conn`, if any. The transport
    /// frames and writes whatever is returned.
    fn next_request(&mut self, conn: ConnId) -> Option<Request>;

    /// Deliver a complete decoded message.
    fn response(&mut self, conn: ConnId, message: Message);

    /// Are more requests queued for `conn`?
    fn pending(&self, conn: ConnId) -> bool;

    /// `conn` was destroyed; queued work for it must be discarded or
    /// requeued by the caller's policy.
    fn shutdown(&mut self, conn: ConnId);
}
