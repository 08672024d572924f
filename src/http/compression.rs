//! Gzip response compression.
//!
//! # Data Flow
//! ```text
//! Accept-Encoding contains "gzip"?
//!     no  → next()
//!     yes → wrap writer in GzipWriter
//!           → set Content-Encoding: gzip, drop Content-Length
//!           → next()
//!           → finish() (also re-run by the dispatcher on commit)
//! ```
//!
//! # Design Decisions
//! - The decorator forwards the header block untouched, so the inner
//!   writer's send-once guard still applies
//! - The encoder is created on the first body write. A response that never
//!   wrote a body still gets an empty gzip member on `finish`, unless its
//!   status forbids a body (1xx, 204, 304)
//! - Compressed bytes are pushed to the inner writer as the encoder emits them

use std::io::{self, Write};
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::future::BoxFuture;

use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;
use crate::http::writer::{ResponseParts, ResponseWriter};

/// Writer decorator that gzips the body on its way to the inner writer.
pub struct GzipWriter {
    inner: Box<dyn ResponseWriter>,
    encoder: Option<GzEncoder<Vec<u8>>>,
    level: Compression,
    status: Option<StatusCode>,
    finished: bool,
}

impl GzipWriter {
    pub fn new(inner: Box<dyn ResponseWriter>, level: u32) -> Self {
        Self {
            inner,
            encoder: None,
            level: Compression::new(level.min(9)),
            status: None,
            finished: false,
        }
    }

    /// False for statuses that must not carry a body. Unknown counts as allowed.
    fn body_allowed(&self) -> bool {
        match self.status {
            Some(status) => {
                !(status.is_informational()
                    || status == StatusCode::NO_CONTENT
                    || status == StatusCode::NOT_MODIFIED)
            }
            None => true,
        }
    }

    fn drain(&mut self) -> io::Result<()> {
        if let Some(encoder) = self.encoder.as_mut() {
            let pending = encoder.get_mut();
            if !pending.is_empty() {
                self.inner.write(pending)?;
                pending.clear();
            }
        }
        Ok(())
    }
}

impl ResponseWriter for GzipWriter {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if !self.inner.header_sent() {
            self.status = Some(status);
        }
        self.inner.write_header(status);
    }

    fn header_sent(&self) -> bool {
        self.inner.header_sent()
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.finished {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write after gzip stream was finalized",
            ));
        }
        self.write_header(StatusCode::OK);

        let level = self.level;
        let encoder = self
            .encoder
            .get_or_insert_with(|| GzEncoder::new(Vec::new(), level));
        encoder.write_all(data)?;
        self.drain()?;
        Ok(data.len())
    }

    fn finish(&mut self) -> io::Result<()> {
        if !self.finished {
            self.finished = true;
            if self.encoder.is_none() && self.body_allowed() {
                self.write_header(StatusCode::OK);
                self.encoder = Some(GzEncoder::new(Vec::new(), self.level));
            }
            if let Some(encoder) = self.encoder.take() {
                let tail = encoder.finish()?;
                if !tail.is_empty() {
                    self.inner.write(&tail)?;
                }
            }
        }
        self.inner.finish()
    }

    fn into_parts(mut self: Box<Self>) -> ResponseParts {
        if let Err(e) = self.finish() {
            tracing::warn!(error = %e, "Failed to finalize gzip stream");
        }
        self.inner.into_parts()
    }
}

/// True if the `Accept-Encoding` value lists gzip.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding
        .split(',')
        .filter_map(|item| item.split(';').next())
        .any(|coding| coding.trim().eq_ignore_ascii_case("gzip"))
}

/// Compression middleware.
#[derive(Debug, Clone, Copy)]
pub struct Gzip {
    level: u32,
}

impl Gzip {
    /// `level` is the gzip level, 0 (store) to 9 (best).
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new(Compression::default().level())
    }
}

impl Handler for Gzip {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let wants_gzip = ctx
                .header(header::ACCEPT_ENCODING.as_str())
                .is_some_and(accepts_gzip);
            if !wants_gzip {
                ctx.next().await;
                return;
            }

            let level = self.level;
            ctx.wrap_writer(|inner| Box::new(GzipWriter::new(inner, level)));
            ctx.set_header(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            ctx.remove_header(header::CONTENT_LENGTH);

            ctx.next().await;

            // runs on the abort path too: abort only stops later handlers
            ctx.finish_writer();
        })
    }
}

pub fn gzip(level: u32) -> HandlerFn {
    Arc::new(Gzip::new(level))
}
