use bson::Bson;

/// The outcome of an update call.
///
/// `upserted_id` is set only when an upsert inserted a new document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

impl UpdateResult {
    pub fn new(matched_count: u64, modified_count: u64, upserted_id: Option<Bson>) -> Self {
        UpdateResult {
            matched_count,
            modified_count,
            upserted_id,
        }
    }
}

/// The outcome of a remove call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveResult {
    pub removed_count: u64,
}

impl RemoveResult {
    pub fn new(removed_count: u64) -> Self {
        RemoveResult { removed_count }
    }
}
