//! An in-process [`StoreDriver`](crate::store::StoreDriver).
//!
//! [`InMemoryStore`] evaluates the subset of the document-store query
//! language the repository emits. It keeps a log of the calls it receives
//! and supports one-shot failure injection.

mod matcher;
mod pipeline;
mod store;
mod update;

pub use store::*;
