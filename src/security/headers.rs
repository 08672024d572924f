//! Security response headers.
//!
//! # Responsibilities
//! - Stamp hardening headers on every response before the chain runs
//! - Optional HSTS (disable for plain-HTTP development setups)
//!
//! # Design Decisions
//! - Headers are set before `next()`, so handlers can still override them
//! - Values are fixed at construction; nothing is formatted per request

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue};
use futures_util::future::BoxFuture;

use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;

const PERMISSIONS_POLICY: HeaderName = HeaderName::from_static("permissions-policy");

const HSTS: &str = "max-age=63072000; includeSubDomains; preload";

const CSP: &str = "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
                   img-src 'self' data: https:; font-src 'self'; connect-src 'self'; \
                   frame-ancestors 'none'";

/// Security headers middleware.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn new(hsts: bool) -> Self {
        let mut headers = vec![
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
            (header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("1; mode=block"),
            ),
            (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
            (
                PERMISSIONS_POLICY,
                HeaderValue::from_static("geolocation=(), microphone=()"),
            ),
            (header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP)),
        ];
        if hsts {
            headers.push((header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS)));
        }
        Self { headers }
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Handler for SecurityHeaders {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for (name, value) in &self.headers {
                ctx.set_header(name.clone(), value.clone());
            }
            ctx.next().await;
        })
    }
}

pub fn security_headers(hsts: bool) -> HandlerFn {
    Arc::new(SecurityHeaders::new(hsts))
}
