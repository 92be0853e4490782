//! `invsync-remote`: the remote inventory server, behind one trait.
//!
//! [`RemoteApi`] is implemented by [`HttpRemote`] (blocking REST client),
//! [`InMemoryRemote`] (server emulation for tests) and [`DryRun`] (reads
//! through, writes only logged).

pub mod api;
pub mod dry_run;
pub mod error;
pub mod http;
pub mod in_memory;

pub use api::{Payload, Query, RemoteApi, RemoteObject};
pub use dry_run::DryRun;
pub use error::{FieldErrors, RemoteError};
pub use http::{AuthScheme, HttpConfig, HttpRemote};
pub use in_memory::{InMemoryRemote, Op};
