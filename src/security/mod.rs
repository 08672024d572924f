//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (after request ID):
//!     → headers.rs (hardening response headers)
//!     → cors.rs (origin / method / header policy, preflight replies)
//!     → rate_limit.rs (per-client fixed window)
//!     → limits.rs (body size ceiling for later readers)
//!     → Pass to route handlers
//! ```
//!
//! # Design Decisions
//! - Every check is a chain handler; rejection is abort + JSON envelope
//! - Fail closed: a policy violation never reaches route handlers
//! - No trust in client input beyond the documented identity headers

pub mod cors;
pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use cors::{cors, Cors, CorsError, CorsOptions, CorsPolicy};
pub use headers::{security_headers, SecurityHeaders};
pub use limits::{body_limit, BodyLimit};
pub use rate_limit::{client_identity, rate_limit, RateLimit, RateLimiter};
