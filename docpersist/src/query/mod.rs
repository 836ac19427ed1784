//! Predicate composition for document queries.
//!
//! [`QueryBuilder`] turns high-level filter intents (free-text regex, ranges,
//! existence, "all of" array membership, nested element matches) into a
//! store predicate wrapped in an immutable [`Query`].
//!
//! # Examples
//!
//! ```rust
//! use docpersist::query::QueryBuilder;
//!
//! let query = QueryBuilder::new()
//!     .with_eq_or_regex("name", Some("/ali/"))
//!     .with_range("age", Some(18), None::<i32>)
//!     .with_exist("email", Some(true))
//!     .build();
//!
//! assert!(query.as_document().contains_key("name"));
//! ```

mod query;
mod query_builder;

pub use query::*;
pub use query_builder::*;
