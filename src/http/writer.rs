//! Response writers.
//!
//! # Responsibilities
//! - Buffer the response (status, headers, body) for one request
//! - Send the header block at most once
//! - Offer a decorator seam (compression) with an explicit finalize step
//!
//! # Design Decisions
//! - Headers are snapshotted when the header block is sent; later header
//!   mutations do not reach the client, as on a real connection
//! - A body write before any header send commits an implicit 200
//! - `finish` is idempotent and is called again by the dispatcher on commit

use std::io;

use axum::http::{HeaderMap, StatusCode};
use bytes::{Bytes, BytesMut};

/// Everything the dispatcher needs to build the outgoing response.
#[derive(Debug)]
pub struct ResponseParts {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Sink for one request's response.
pub trait ResponseWriter: Send {
    /// Headers that will be sent with the header block.
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Send the header block. Calls after the first are ignored.
    fn write_header(&mut self, status: StatusCode);

    /// True once the header block has been sent.
    fn header_sent(&self) -> bool;

    /// Append body bytes, sending an implicit 200 header block first if needed.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Flush any pending state into the underlying writer.
    fn finish(&mut self) -> io::Result<()>;

    /// Finalize and hand over the buffered response.
    fn into_parts(self: Box<Self>) -> ResponseParts;
}

/// The base writer: buffers the whole response in memory.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    headers: HeaderMap,
    sent: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseWriter for BufferedWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.sent.is_none() {
            self.sent = Some((status, self.headers.clone()));
        }
    }

    fn header_sent(&self) -> bool {
        self.sent.is_some()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_header(StatusCode::OK);
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn into_parts(self: Box<Self>) -> ResponseParts {
        let this = *self;
        let (status, headers) = this.sent.unwrap_or((StatusCode::OK, this.headers));
        ResponseParts {
            status,
            headers,
            body: this.body.freeze(),
        }
    }
}
