//! The store-driver contract and its in-memory implementation.
//!
//! A [`StoreDriver`] is the only way the repository talks to the document
//! store. The host injects an already pooled driver; the repository never
//! owns its lifecycle. Every driver call is asynchronous and is a suspension
//! point of the calling task.

mod find_options;
pub mod memory;
mod store_driver;
mod update_options;
mod write_result;

pub use find_options::*;
pub use store_driver::*;
pub use update_options::*;
pub use write_result::*;
