//! `invsync-resolver`: dependency ordering for record sets.
//!
//! Builds the dependency graph between local records, rejects cycles and
//! dangling references, and produces a [`Plan`]: records in an order where
//! every dependency comes first, grouped into levels.

pub mod error;
mod graph;
pub mod lookup;
mod order;
pub mod plan;
pub mod resolver;

pub use error::{LookupError, ResolveError, Unresolved};
pub use lookup::ExternalLookup;
pub use plan::{Link, Plan, Step, Target};
pub use resolver::Resolver;
