use crate::common::SortSpec;
use bson::Document;

/// Options controlling a `find` call: ordering, window and projection.
///
/// # Examples
///
/// ```rust
/// use docpersist::common::{SortOrder, SortSpec};
/// use docpersist::store::FindOptions;
///
/// let sort = SortSpec::new().add("age", SortOrder::Descending).unwrap();
/// let options = FindOptions::new().sort(sort).skip(10).limit(20);
/// assert_eq!(options.skip_count(), 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub(crate) sort: Option<SortSpec>,
    pub(crate) skip: Option<u64>,
    pub(crate) limit: Option<u64>,
    pub(crate) projection: Option<Document>,
}

/// Creates `FindOptions` ordered by the given specification.
pub fn order_by(sort: SortSpec) -> FindOptions {
    FindOptions::new().sort(sort)
}

/// Creates `FindOptions` describing a page window.
pub fn window(skip: u64, limit: u64) -> FindOptions {
    FindOptions::new().skip(skip).limit(limit)
}

impl FindOptions {
    pub fn new() -> FindOptions {
        FindOptions::default()
    }

    pub fn sort(mut self, sort: SortSpec) -> FindOptions {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> FindOptions {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> FindOptions {
        self.limit = Some(limit);
        self
    }

    pub fn projection(mut self, projection: Document) -> FindOptions {
        self.projection = Some(projection);
        self
    }

    pub fn sort_spec(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Number of documents to skip; zero when unset.
    pub fn skip_count(&self) -> u64 {
        self.skip.unwrap_or(0)
    }

    /// Maximum number of documents; `None` means unbounded.
    pub fn limit_count(&self) -> Option<u64> {
        self.limit.filter(|limit| *limit > 0)
    }

    pub fn projection_document(&self) -> Option<&Document> {
        self.projection.as_ref()
    }
}
