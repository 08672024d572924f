//! Cross-origin resource sharing.
//!
//! # Data Flow
//! ```text
//! Request
//!     → add Vary: Origin, Access-Control-Request-Method, Access-Control-Request-Headers
//!     → origin not allowed?             → 403 + abort
//!     → preflight (OPTIONS + ACRM)?
//!           method / headers violation  → 403 + abort
//!           otherwise                   → policy headers, Max-Age, 204 + abort
//!     → method not allowed?             → 405 + abort
//!     → policy headers → next()
//! ```
//!
//! # Design Decisions
//! - Policy validated once at construction; a bad policy never reaches traffic
//! - `*.example.com` matches subdomains only, at a dot boundary
//! - A missing `Origin` is treated as the empty origin: only a `*` policy
//!   lets it through, and the method check applies either way
//! - Header values are prebuilt so the request path does no formatting

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::http::chain::{Handler, HandlerFn};
use crate::http::context::Context;
use crate::http::response::HttpError;

const WILDCARD: &str = "*";
const DEFAULT_MAX_AGE_SECS: u64 = 86_400;
const ALL_METHODS: &str = "GET,POST,PUT,DELETE,PATCH,OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With, Accept, Origin";

/// Errors raised when building a [`CorsPolicy`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CorsError {
    #[error("allowed_origins cannot be empty")]
    EmptyOrigins,

    #[error("wildcard origin cannot be used with allow_credentials")]
    WildcardWithCredentials,

    #[error("invalid header value for {field}: {value:?}")]
    InvalidHeaderValue { field: &'static str, value: String },
}

/// User-facing CORS options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsOptions {
    pub allowed_origins: Vec<String>,
    /// Empty means `*`.
    pub allowed_methods: Vec<String>,
    /// Empty means `*`.
    pub allowed_headers: Vec<String>,
    pub expose_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            allowed_origins: vec![WILDCARD.to_string()],
            allowed_methods: vec![WILDCARD.to_string()],
            allowed_headers: vec![WILDCARD.to_string()],
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

fn header_value(field: &'static str, value: String) -> Result<HeaderValue, CorsError> {
    HeaderValue::from_str(&value).map_err(|_| CorsError::InvalidHeaderValue { field, value })
}

/// A validated, immutable CORS policy.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    allowed_methods: Vec<String>,
    allowed_headers: Vec<String>,
    allow_credentials: bool,
    any_origin: bool,
    any_method: bool,
    any_header: bool,
    allow_methods_value: HeaderValue,
    allow_headers_value: Option<HeaderValue>,
    expose_headers_value: Option<HeaderValue>,
    max_age_value: HeaderValue,
}

impl CorsPolicy {
    pub fn new(options: CorsOptions) -> Result<Self, CorsError> {
        let CorsOptions {
            allowed_origins,
            mut allowed_methods,
            mut allowed_headers,
            expose_headers,
            allow_credentials,
            max_age_secs,
        } = options;

        if allowed_origins.is_empty() {
            return Err(CorsError::EmptyOrigins);
        }
        let any_origin = allowed_origins.iter().any(|o| o == WILDCARD);
        if allow_credentials && any_origin {
            return Err(CorsError::WildcardWithCredentials);
        }

        if allowed_methods.is_empty() {
            allowed_methods.push(WILDCARD.to_string());
        }
        if allowed_headers.is_empty() {
            allowed_headers.push(WILDCARD.to_string());
        }
        let any_method = allowed_methods.iter().any(|m| m == WILDCARD);
        let any_header = allowed_headers.iter().any(|h| h == WILDCARD);

        let allow_methods_value = if any_method {
            HeaderValue::from_static(ALL_METHODS)
        } else {
            header_value("allowed_methods", allowed_methods.join(", "))?
        };
        let allow_headers_value = if any_header {
            None
        } else {
            Some(header_value("allowed_headers", allowed_headers.join(", "))?)
        };
        let expose_headers_value = if expose_headers.is_empty() {
            None
        } else {
            Some(header_value("expose_headers", expose_headers.join(", "))?)
        };

        Ok(Self {
            allowed_origins,
            allowed_methods,
            allowed_headers: allowed_headers.iter().map(|h| h.to_ascii_lowercase()).collect(),
            allow_credentials,
            any_origin,
            any_method,
            any_header,
            allow_methods_value,
            allow_headers_value,
            expose_headers_value,
            max_age_value: HeaderValue::from(max_age_secs),
        })
    }

    pub fn allow_credentials(&self) -> bool {
        self.allow_credentials
    }

    /// Exact match, `*`, or a `*.domain` subdomain wildcard.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        if self.any_origin {
            return true;
        }
        self.allowed_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            match allowed.strip_prefix("*.") {
                Some(domain) => origin
                    .strip_suffix(domain)
                    .is_some_and(|rest| rest.ends_with('.')),
                None => false,
            }
        })
    }

    pub fn method_allowed(&self, method: &str) -> bool {
        self.any_method || self.allowed_methods.iter().any(|m| m == method)
    }

    /// First requested header not on the allow-list, lowercased.
    fn rejected_header(&self, requested: &str) -> Option<String> {
        if self.any_header {
            return None;
        }
        requested
            .split(',')
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .find(|h| !self.allowed_headers.contains(h))
    }

    fn apply_headers(&self, ctx: &mut Context, origin: &str, requested_headers: Option<&str>) {
        let allow_origin = if self.any_origin {
            Some(HeaderValue::from_static(WILDCARD))
        } else {
            HeaderValue::from_str(origin).ok()
        };
        if let Some(value) = allow_origin {
            ctx.set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }

        ctx.set_header(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allow_methods_value.clone(),
        );

        let allow_headers = match &self.allow_headers_value {
            Some(value) => Some(value.clone()),
            None => match requested_headers {
                Some(requested) => HeaderValue::from_str(requested).ok(),
                None => Some(HeaderValue::from_static(DEFAULT_ALLOW_HEADERS)),
            },
        };
        if let Some(value) = allow_headers {
            ctx.set_header(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
        }

        if self.allow_credentials {
            ctx.set_header(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(value) = &self.expose_headers_value {
            ctx.set_header(header::ACCESS_CONTROL_EXPOSE_HEADERS, value.clone());
        }
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_origins: vec![WILDCARD.to_string()],
            allowed_methods: vec![WILDCARD.to_string()],
            allowed_headers: vec![WILDCARD.to_string()],
            allow_credentials: false,
            any_origin: true,
            any_method: true,
            any_header: true,
            allow_methods_value: HeaderValue::from_static(ALL_METHODS),
            allow_headers_value: None,
            expose_headers_value: None,
            max_age_value: HeaderValue::from(DEFAULT_MAX_AGE_SECS),
        }
    }
}

/// CORS middleware.
#[derive(Debug, Clone, Default)]
pub struct Cors {
    policy: CorsPolicy,
}

impl Cors {
    pub fn new(policy: CorsPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CorsPolicy {
        &self.policy
    }
}

impl Handler for Cors {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            for vary in [
                header::ORIGIN,
                header::ACCESS_CONTROL_REQUEST_METHOD,
                header::ACCESS_CONTROL_REQUEST_HEADERS,
            ] {
                ctx.add_header(header::VARY, HeaderValue::from(vary));
            }

            let origin = ctx
                .header(header::ORIGIN.as_str())
                .unwrap_or_default()
                .to_owned();
            let policy = &self.policy;

            if !policy.origin_allowed(&origin) {
                tracing::debug!(origin = %origin, "CORS origin rejected");
                ctx.abort_with_error(&HttpError::forbidden("CORS origin not allowed"));
                return;
            }

            let requested_method = ctx
                .header(header::ACCESS_CONTROL_REQUEST_METHOD.as_str())
                .map(str::to_owned);
            let requested_headers = ctx
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS.as_str())
                .filter(|h| !h.trim().is_empty())
                .map(str::to_owned);

            let preflight = *ctx.method() == Method::OPTIONS && requested_method.is_some();
            if preflight {
                if let Some(method) = requested_method.as_deref() {
                    if !policy.method_allowed(method) {
                        ctx.abort_with_error(&HttpError::forbidden("CORS method not allowed"));
                        return;
                    }
                }
                if let Some(rejected) = requested_headers
                    .as_deref()
                    .and_then(|h| policy.rejected_header(h))
                {
                    ctx.abort_with_error(&HttpError::forbidden(format!(
                        "CORS header not allowed: {rejected}"
                    )));
                    return;
                }

                policy.apply_headers(ctx, &origin, requested_headers.as_deref());
                ctx.set_header(header::ACCESS_CONTROL_MAX_AGE, policy.max_age_value.clone());
                ctx.abort();
                ctx.status(StatusCode::NO_CONTENT);
                return;
            }

            if !policy.method_allowed(ctx.method().as_str()) {
                ctx.abort_with_error(&HttpError::method_not_allowed("method not allowed"));
                return;
            }

            policy.apply_headers(ctx, &origin, requested_headers.as_deref());
            ctx.next().await;
        })
    }
}

pub fn cors(policy: CorsPolicy) -> HandlerFn {
    Arc::new(Cors::new(policy))
}
