//! `invsync-sync`: load, unload and export runs against a remote server.
//!
//! The [`Loader`] walks a resolver plan and finds or creates each record
//! (plus its child entities), the [`Unloader`] deletes a selection in
//! reverse order after checking for remaining remote dependents, and the
//! [`Exporter`] writes the remote catalogue back to disk or compares it
//! with the data root. Every record ends in a terminal [`RecordState`]
//! collected into a [`RunReport`].

pub mod context;
pub mod diff;
pub mod error;
pub mod exporter;
pub mod loader;
mod locate;
mod payload;
pub mod report;
pub mod state;
pub mod unloader;

pub use context::RunContext;
pub use diff::{DiffEntry, DiffReport, Drift};
pub use error::SyncError;
pub use exporter::{ExportReport, Exporter};
pub use loader::{LoadOptions, Loader};
pub use locate::RemoteLookup;
pub use report::{ChildCounts, Operation, RecordReport, RunReport};
pub use state::{Failure, RecordState, SkipReason, TransitionError};
pub use unloader::{UnloadOptions, Unloader};
