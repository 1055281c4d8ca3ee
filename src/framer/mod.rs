//! Incremental message framing.
//!
//! [`decode`] consumes the front of one connection's accumulated buffer.
//! It either extracts a complete message, dropping the consumed prefix so
//! pipelined messages in the remainder decode on the next pass, or
//! returns `None` with the buffer left intact for the next read event.
//!
//! Decoding walks a cursor over the buffer and only advances it on
//! success, so an aborted attempt is simply discarded.

use bytes::{Buf, Bytes, BytesMut};

use crate::message::{Header, Message};


const MAX_HEADERS: usize = 64;

enum BodyFraming {
    Fixed(usize),
    Chunked,
}

/// Decode one complete message from the front of `buffer`.
///
/// `None` means more bytes are needed. Nothing is consumed in that case
/// except stray CR/LF bytes preceding the message, which the protocol
/// tolerates and which are dropped up front.
pub(crate) fn decode(buffer: &mut BytesMut) -> Option<Message> {
    // remove CRLF at the beginning, per the RFC
    let lead = buffer
        .iter()
        .take_while(|&&b| matches!(b, b'\r' | b'\n'))
        .count();
    if lead > 0 {
        buffer.advance(lead);
    }

    let head_end = find_head_end(&buffer[..])?;

    let mut parsed = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut parsed);
    match response.parse(&buffer[..head_end]) {
        Ok(httparse::Status::Complete(_)) => {}
        // A header block that does not parse is indistinguishable from
        // one still arriving in fragments: wait for more bytes.
        Ok(httparse::Status::Partial) | Err(_) => return None,
    }

    let (body, consumed) = match body_framing(&response)? {
        BodyFraming::Fixed(length) => {
            if buffer.len() - head_end < length {
                return None;
            }
            let body = Bytes::copy_from_slice(&buffer[head_end..head_end + length]);
            (body, head_end + length)
        }
        BodyFraming::Chunked => decode_chunked(&buffer[..], head_end)?,
    };

    let message = Message {
        status: response.code.unwrap_or(0),
        reason: response.reason.unwrap_or("").into(),
        headers: response
            .headers
            .iter()
            .map(|h| Header {
                name: h.name.into(),
                value: String::from_utf8_lossy(h.value).into_owned().into_boxed_str(),
            })
            .collect(),
        body,
    };

    buffer.advance(consumed);
    Some(message)
}

/// Frame one outbound message: header block, blank line, then body.
pub(crate) fn encode(header: &str, body: Option<&[u8]>, buf: &mut BytesMut) {
    buf.reserve(header.len() + 2 + body.map_or(0, <[u8]>::len));
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(b"\r\n");
    if let Some(body) = body {
        buf.extend_from_slice(body);
    }
}

/// Offset one past the `CRLF CRLF` header/body separator.
fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|at| at + 4)
}

fn body_framing(response: &httparse::Response) -> Option<BodyFraming> {
    let mut length = None;
    for header in response.headers.iter() {
        if header.name.eq_ignore_ascii_case("transfer-encoding") {
            let value = String::from_utf8_lossy(header.value);
            if value.to_ascii_lowercase().contains("chunked") {
                return Some(BodyFraming::Chunked);
            }
        } else if header.name.eq_ignore_ascii_case("content-length") {
            let value = std::str::from_utf8(header.value).ok()?;
            length = Some(value.trim().parse().ok()?);
        }
    }
    Some(BodyFraming::Fixed(length.unwrap_or(0)))
}

/// Extent of one decoded chunk, kept only while the sequence is walked.
struct PendingChunk {
    start: usize,
    len: usize,
}

/// Walk the chunk sequence starting at `cursor`.
///
/// Returns the assembled body and the total length consumed through the
/// terminator, or `None` while the sequence is not complete yet.
fn decode_chunked(buffer: &[u8], mut cursor: usize) -> Option<(Bytes, usize)> {
    let mut chunks: Vec<PendingChunk> = Vec::new();

    while cursor < buffer.len() {
        let digits = buffer[cursor..]
            .iter()
            .take_while(|b| b.is_ascii_hexdigit())
            .count();
        // no number to read: treat as end of available data
        if digits == 0 {
            return None;
        }
        let digits_str = std::str::from_utf8(&buffer[cursor..cursor + digits]).ok()?;
        let length = usize::from_str_radix(digits_str, 16).ok()?;

        // chunk extensions may sit between the size and its CRLF
        let after_digits = cursor + digits;
        let crlf = buffer[after_digits..]
            .windows(2)
            .position(|w| w == b"\r\n")?;
        let data_start = after_digits + crlf + 2;

        // chunk data plus its trailing CRLF must have arrived in full
        if buffer.len() - data_start < length.saturating_add(2) {
            return None;
        }

        if length == 0 {
            // terminator: assemble the recorded extents in order and
            // consume the final two bytes unchecked
            let total = chunks.iter().map(|c| c.len).sum();
            let mut body = BytesMut::with_capacity(total);
            for chunk in &chunks {
                body.extend_from_slice(&buffer[chunk.start..chunk.start + chunk.len]);
            }
            return Some((body.freeze(), data_start + 2));
        }

        chunks.push(PendingChunk {
            start: data_start,
            len: length,
        });
        cursor = data_start + length + 2;
    }

    None
}
