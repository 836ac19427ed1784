//! # docpersist - persistence core for document stores
//!
//! `docpersist` sits between a service and a document store reached
//! through an injected [`StoreDriver`](store::StoreDriver). It provides:
//!
//! - **Query building**: [`QueryBuilder`](query::QueryBuilder) turns filter
//!   intents (regex, ranges, existence, "all of" array matches) into a
//!   store predicate.
//! - **Aggregation building**: [`AggregationBuilder`](aggregation::AggregationBuilder)
//!   unwinds nested arrays so they can be filtered, sorted and paged per element.
//! - **Repository**: [`Repository`](repository::Repository) offers paged
//!   search, single-document writes with `$set`/`$unset` translation, bulk
//!   updates and sort-parameter parsing. Every document it writes carries a
//!   schema tag that readers never see.
//! - **Schema migration**: collections are migrated one document per
//!   asynchronous step into a typed model, with lenient decoding, stale
//!   field removal, cancellation and lifecycle events.
//! - **In-memory store**: [`InMemoryStore`](store::memory::InMemoryStore)
//!   implements the driver contract in process memory.
//!
//! ## Quick Start
//!
//! ```rust
//! use docpersist::query::QueryBuilder;
//! use docpersist::repository::Repository;
//! use docpersist::store::memory::InMemoryStore;
//! use docpersist::store::FindOptions;
//! use bson::doc;
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let repository = Repository::builder(Arc::new(InMemoryStore::new()))
//!     .schema_version("1.0")
//!     .build()
//!     .unwrap();
//!
//! repository.store_one_document("users", doc! { "name": "Alice" }).await.unwrap();
//! repository.store_one_document("users", doc! { "name": "alicia" }).await.unwrap();
//!
//! let query = QueryBuilder::new().with_eq_or_regex("name", Some("/ali/")).build();
//! let page = repository
//!     .search_page_object("users", &query, &FindOptions::new(), "users")
//!     .await
//!     .unwrap();
//! assert_eq!(page.total(), 2);
//! # });
//! ```

pub mod aggregation;
pub mod common;
pub mod errors;
pub mod migration;
pub mod query;
pub mod repository;
pub mod store;

#[cfg(test)]
#[ctor::ctor]
fn init() {
    colog::init();
}
