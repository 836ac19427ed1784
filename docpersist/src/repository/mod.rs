//! The repository: paged search, single-document writes, bulk updates and
//! collection migration over an injected [`StoreDriver`](crate::store::StoreDriver).

mod page;
#[allow(clippy::module_inception)]
mod repository;
mod repository_builder;
mod repository_config;
mod sort_param;

pub use page::*;
pub use repository::*;
pub use repository_builder::*;
pub use repository_config::*;
pub use sort_param::*;
