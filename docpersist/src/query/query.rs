use crate::common::DOC_ID;
use bson::{doc, Bson, Document};
use std::fmt::Display;

/// An immutable store predicate.
///
/// A `Query` is produced by [`QueryBuilder::build`](super::QueryBuilder::build)
/// or wrapped directly around a predicate document. Once built it never
/// changes; later builder calls produce new queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filter: Document,
}

impl Query {
    /// A query matching every document.
    pub fn all() -> Self {
        Query { filter: Document::new() }
    }

    /// A query matching the document with the given identifier.
    pub fn by_id(id: impl Into<Bson>) -> Self {
        Query {
            filter: doc! { DOC_ID: id.into() },
        }
    }

    pub fn as_document(&self) -> &Document {
        &self.filter
    }

    pub fn into_document(self) -> Document {
        self.filter
    }

    /// Returns true when the predicate has no constraint.
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }
}

impl From<Document> for Query {
    fn from(filter: Document) -> Self {
        Query { filter }
    }
}

impl From<Query> for Document {
    fn from(query: Query) -> Self {
        query.filter
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.filter)
    }
}
