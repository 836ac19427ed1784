use crate::common::util::stale_keys;
use crate::common::{OP_EXISTS, OP_LT, OP_NOT, OP_OR, OP_TYPE};
use bson::{doc, Bson, Document};

/// Selects the documents still written by an older schema: the tag is
/// missing, is not a string, or sorts before `version`.
///
/// Versions compare lexicographically, so `"1.10"` sorts before `"1.9"`.
/// Use fixed-width version strings when that matters.
pub fn legacy_filter(tag_field: &str, version: &str) -> Document {
    let mut missing = Document::new();
    missing.insert(tag_field, doc! { OP_EXISTS: false });

    let mut not_string = Document::new();
    not_string.insert(tag_field, doc! { OP_NOT: { OP_TYPE: "string" } });

    let mut older = Document::new();
    older.insert(tag_field, doc! { OP_LT: version });

    doc! { OP_OR: [missing, not_string, older] }
}

/// Explicit nulls for every field of `old` the canonical `new` document no
/// longer carries, skipping `excluded`.
///
/// Merging the result into `new` yields a partial document whose update
/// removes stale fields from the stored copy.
pub fn stale_field_nulls(old: &Document, new: &Document, excluded: &[&str]) -> Document {
    stale_keys(old, new, excluded)
        .into_iter()
        .map(|key| (key, Bson::Null))
        .collect()
}
