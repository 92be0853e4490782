//! `invsync-records`: the local record store.
//!
//! Reads a data root of JSON files into strictly validated, tagged records
//! (categories, companies, parts, BOM lines) and writes them back in the same
//! layout.

pub mod bom;
pub mod category;
pub mod company;
pub mod error;
pub mod layout;
pub mod part;
pub mod record;
pub mod store;

pub use bom::BomLine;
pub use category::Category;
pub use company::{Address, Company};
pub use error::RecordError;
pub use part::{Part, PartFlags, PartRef, PriceBreak, SupplierAssociation};
pub use record::{Record, RecordEntry, Reference};
pub use store::RecordStore;
