//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Chain:
//!     → recovery.rs (catch panics from everything after it → 500)
//!     → ...
//!     → timeouts.rs (race the rest of the chain against a deadline → 504)
//!     → route handlers
//! ```
//!
//! # Design Decisions
//! - Both are ordinary chain handlers; their scope is "everything after me"
//! - Failures terminate locally via abort and are recorded, never re-raised

pub mod recovery;
pub mod timeouts;

pub use recovery::{recovery, Recovery};
pub use timeouts::{timeout, Timeout};
