//! Cadence Conflict - Resolution of pulled server entries against local state
//!
//! Provides:
//! - [`SyncResolver`]: the five-action decision table (create, update,
//!   restore, destroy, mark-synced) applied to every pulled entry
//! - [`Comparator`]: pluggable last-writer-wins policy per collection
//! - [`ComparatorPolicy`]: comparator selection from configuration
//!
//! Everything in this crate is pure: no I/O, no clocks, no errors at
//! resolution time.

pub mod comparator;
pub mod error;
pub mod policy;
pub mod resolver;

pub use comparator::{Comparator, MaxProgressComparator, UpdatedAtComparator, Winner};
pub use error::ConflictError;
pub use policy::{ComparatorKind, ComparatorPolicy};
pub use resolver::{ResolvedAction, SyncResolver};
