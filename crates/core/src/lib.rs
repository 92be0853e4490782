//! `invsync-core`: shared building blocks.
//!
//! Identifiers, entity kinds and the error taxonomy every other crate in the
//! workspace classifies its failures into. No IO lives here.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::{Entity, EntityKind};
pub use error::{Classify, ErrorKind, KeyError};
pub use id::{CategoryPath, EntityKey, PartKey, RemoteId};
