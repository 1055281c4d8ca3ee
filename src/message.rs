//! Decoded HTTP message.

use bytes::Bytes;

/// One header field.
#[derive(Debug, Clone)]
pub struct Header {
    pub name: Box<str>,
    pub value: Box<str>,
}

/// A complete message: status line, headers and assembled body.
///
/// Bodies are already de-chunked; callers never see framing artifacts.
#[derive(Debug, Clone)]
pub struct Message {
    pub(crate) status: u16,
    pub(crate) reason: Box<str>,
    pub(crate) headers: Vec<Header>,
    pub(crate) body: Bytes,
}

impl Message {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// First header with a case-insensitively matching name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| &*h.value)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Did the peer announce it will close the socket after this message?
    pub fn is_connection_close(&self) -> bool {
        self.header("connection")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("close"))
    }
}
