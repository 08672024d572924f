//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     (method, pattern, handlers)
//!     → matcher.rs (compile pattern into segments)
//!     → router.rs (append to the method's route list)
//!
//! Incoming Request (method, path)
//!     → router.rs (scan routes for the method in registration order)
//!     → matcher.rs (segment-by-segment match, bind params)
//!     → Return: first match + params, or NoMatch → not-found handler
//! ```
//!
//! # Design Decisions
//! - Routes compiled at registration, immutable afterwards
//! - No regex, no trie: linear scan over compiled segments
//! - Deterministic: same input always matches same route
//! - First match wins (registration order)

pub mod group;
pub mod matcher;
pub mod router;

pub use group::Group;
pub use matcher::{Params, Segment};
pub use router::{RouteEntry, RouteMatch, RouteTable, Router};
