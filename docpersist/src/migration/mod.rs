//! Non-blocking schema migration.
//!
//! Every stored document carries a schema tag naming the schema version
//! that wrote it. Migrating a collection to a version rewrites, one
//! document per asynchronous step, every document whose tag is missing,
//! not a string, or older than that version:
//!
//! 1. find one legacy document,
//! 2. decode it leniently into the target [`SchemaModel`],
//! 3. re-encode it and unset the fields the model no longer carries,
//! 4. write it back with the tag bumped.
//!
//! A failure aborts the run; documents already rewritten keep their new
//! tag, so a later run resumes where the failed one stopped.

mod event;
mod lease;
mod lenient;
mod schema;
mod task;

pub use event::*;
pub(crate) use lease::*;
pub use lenient::*;
pub use schema::*;
pub use task::{MigrationHandle, MigrationOutcome};
pub(crate) use task::MigrationRun;
