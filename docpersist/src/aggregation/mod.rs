//! Aggregation pipeline construction for paginating nested array elements.
//!
//! The stages are emitted in a fixed order: one `$unwind` per segment of the
//! element path, then `$match`, then `$sort`, `$skip` and `$limit`. Counting
//! appends `$count` last.

mod aggregation_builder;

pub use aggregation_builder::*;
