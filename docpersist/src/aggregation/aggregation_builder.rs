use crate::common::util::path_segments;
use crate::common::{
    SortSpec, COUNT_FIELD, STAGE_COUNT, STAGE_LIMIT, STAGE_MATCH, STAGE_SKIP, STAGE_SORT,
    STAGE_UNWIND,
};
use crate::query::Query;
use bson::{doc, Document};

/// Builds an ordered list of aggregation pipeline stages.
///
/// Stages are kept in groups and concatenated on [`build`](AggregationBuilder::build)
/// as unwind, match, ordering (sort, skip, limit) and finally count, whatever
/// order the methods were called in.
///
/// # Examples
///
/// ```rust
/// use docpersist::aggregation::AggregationBuilder;
/// use docpersist::common::{SortOrder, SortSpec};
/// use docpersist::query::QueryBuilder;
/// use bson::doc;
///
/// let sort = SortSpec::new().add("orders.total", SortOrder::Descending).unwrap();
/// let pipeline = AggregationBuilder::new()
///     .unwind_path("orders")
///     .match_query(&QueryBuilder::new().with("orders.status", Some("open")).build())
///     .sort(&sort, 20, 10)
///     .build();
///
/// assert_eq!(pipeline[0], doc! { "$unwind": "$orders" });
/// assert_eq!(pipeline[1], doc! { "$match": { "orders.status": "open" } });
/// assert_eq!(pipeline[2], doc! { "$sort": { "orders.total": -1 } });
/// assert_eq!(pipeline[3], doc! { "$skip": 20i64 });
/// assert_eq!(pipeline[4], doc! { "$limit": 10i64 });
/// ```
#[derive(Debug, Clone, Default)]
pub struct AggregationBuilder {
    unwind: Vec<Document>,
    filter: Option<Document>,
    ordering: Vec<Document>,
    count: Option<Document>,
}

impl AggregationBuilder {
    pub fn new() -> Self {
        AggregationBuilder::default()
    }

    /// Emits one `$unwind` per segment of a dotted path so that every nested
    /// array level is expanded into individual documents.
    ///
    /// For `"orders.items"` this unwinds `$orders`, then `$orders.items`.
    /// A segment holding a plain value passes through unwinding unchanged.
    pub fn unwind_path(mut self, path: &str) -> Self {
        let mut prefix = String::new();
        for segment in element_path_segments(path) {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(segment);
            self.unwind.push(doc! { STAGE_UNWIND: format!("${}", prefix) });
        }
        self
    }

    /// Adds the `$match` stage. A later call replaces the earlier filter.
    pub fn match_query(mut self, query: &Query) -> Self {
        self.filter = Some(doc! { STAGE_MATCH: query.as_document().clone() });
        self
    }

    /// Adds ordering and windowing: `$sort` (omitted for an empty spec),
    /// `$skip`, and `$limit` (omitted when `limit` is zero).
    pub fn sort(mut self, sort: &SortSpec, offset: u64, limit: u64) -> Self {
        self.ordering.clear();
        if !sort.is_empty() {
            self.ordering.push(doc! { STAGE_SORT: sort.to_document() });
        }
        self.ordering.push(doc! { STAGE_SKIP: to_i64(offset) });
        if limit > 0 {
            self.ordering.push(doc! { STAGE_LIMIT: to_i64(limit) });
        }
        self
    }

    /// Appends a `$count` stage producing a single `{count: n}` document.
    pub fn count(mut self) -> Self {
        self.count = Some(doc! { STAGE_COUNT: COUNT_FIELD });
        self
    }

    pub fn build(&self) -> Vec<Document> {
        let mut stages = self.unwind.clone();
        if let Some(filter) = &self.filter {
            stages.push(filter.clone());
        }
        stages.extend(self.ordering.iter().cloned());
        if let Some(count) = &self.count {
            stages.push(count.clone());
        }
        stages
    }
}

/// The segments of an element path, e.g. `["orders", "items"]` for
/// `"orders.items"`. Empty segments are ignored.
pub fn element_path_segments(path: &str) -> Vec<&str> {
    path_segments(path)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
