use super::Query;
use crate::common::{
    CASE_INSENSITIVE, OP_ALL, OP_ELEM_MATCH, OP_EXISTS, OP_GTE, OP_LTE, OP_NE, OP_OPTIONS,
    OP_REGEX, REGEX_DELIMITER,
};
use bson::{doc, Bson, Document};

/// Incrementally composes a store predicate.
///
/// Every `with*` method consumes the builder, augments the predicate and
/// returns the builder, so calls chain fluently. Methods taking `Option`
/// values are no-ops for `None`, except [`with`](QueryBuilder::with) and
/// [`with_no_exist_null_eq_or_regex`](QueryBuilder::with_no_exist_null_eq_or_regex)
/// which turn `None` into an explicit null match. A later call on the same
/// field replaces the earlier constraint on that field.
///
/// [`build`](QueryBuilder::build) borrows the builder, so it stays usable and
/// previously built queries are never affected by later calls.
///
/// # Examples
///
/// ```rust
/// use docpersist::query::QueryBuilder;
/// use bson::doc;
///
/// let builder = QueryBuilder::new().with("status", Some("open"));
/// let first = builder.build();
/// let builder = builder.with_exist("owner", Some(false));
/// let second = builder.build();
///
/// assert_eq!(first.as_document(), &doc! { "status": "open" });
/// assert_eq!(second.as_document(), &doc! { "status": "open", "owner": null });
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    predicate: Document,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder {
            predicate: Document::new(),
        }
    }

    /// Case-insensitive regex match on `field`. No-op for `None`.
    pub fn with_regex(mut self, field: &str, pattern: Option<&str>) -> Self {
        if let Some(pattern) = pattern {
            self.predicate.insert(field, regex_match(pattern));
        }
        self
    }

    /// For an array field: every pattern must match at least one element,
    /// case-insensitively. No-op for an empty iterable.
    pub fn with_regex_all<I, S>(mut self, field: &str, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let conditions: Vec<Bson> = patterns
            .into_iter()
            .map(|pattern| Bson::Document(doc! { OP_ELEM_MATCH: regex_match(pattern.as_ref()) }))
            .collect();
        if !conditions.is_empty() {
            self.predicate.insert(field, doc! { OP_ALL: conditions });
        }
        self
    }

    /// Inclusive range: `>= from` and/or `<= to`. No-op when both are `None`.
    pub fn with_range<F, T>(mut self, field: &str, from: Option<F>, to: Option<T>) -> Self
    where
        F: Into<Bson>,
        T: Into<Bson>,
    {
        let mut range = Document::new();
        if let Some(from) = from {
            range.insert(OP_GTE, from.into());
        }
        if let Some(to) = to {
            range.insert(OP_LTE, to.into());
        }
        if !range.is_empty() {
            self.predicate.insert(field, range);
        }
        self
    }

    /// `Some(true)`: the field exists and is not null. `Some(false)`: the
    /// field is null or missing. `None`: no-op.
    pub fn with_exist(mut self, field: &str, exists: Option<bool>) -> Self {
        match exists {
            Some(true) => {
                self.predicate
                    .insert(field, doc! { OP_EXISTS: true, OP_NE: Bson::Null });
            }
            Some(false) => {
                self.predicate.insert(field, Bson::Null);
            }
            None => {}
        }
        self
    }

    /// Exact equality, or an explicit null match for `None`.
    pub fn with<V: Into<Bson>>(mut self, field: &str, value: Option<V>) -> Self {
        let value = value.map(Into::into).unwrap_or(Bson::Null);
        self.predicate.insert(field, value);
        self
    }

    /// A `/…/`-delimited value becomes a case-insensitive regex on its inner
    /// text, anything else an exact match. No-op for `None`.
    pub fn with_eq_or_regex(mut self, field: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.predicate.insert(field, eq_or_regex(value));
        }
        self
    }

    /// For an array field: every value, resolved as regex-or-exact, must
    /// match at least one element. No-op for an empty iterable.
    pub fn with_eq_or_regex_all<I, S>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let conditions: Vec<Bson> = values
            .into_iter()
            .map(|value| element_condition(value.as_ref()))
            .collect();
        if !conditions.is_empty() {
            self.predicate.insert(field, doc! { OP_ALL: conditions });
        }
        self
    }

    /// For an array-of-documents field: every value must match `sub_field`
    /// of at least one element (regex-or-exact). No-op for an empty iterable.
    pub fn with_element_eq_or_regex<I, S>(mut self, field: &str, sub_field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let conditions: Vec<Bson> = values
            .into_iter()
            .map(|value| {
                let mut element = Document::new();
                element.insert(sub_field, eq_or_regex(value.as_ref()));
                Bson::Document(doc! { OP_ELEM_MATCH: element })
            })
            .collect();
        if !conditions.is_empty() {
            self.predicate.insert(field, doc! { OP_ALL: conditions });
        }
        self
    }

    /// Same as [`with_eq_or_regex`](QueryBuilder::with_eq_or_regex) for
    /// `Some`; an explicit null match for `None`.
    pub fn with_no_exist_null_eq_or_regex(mut self, field: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => {
                self.predicate.insert(field, eq_or_regex(value));
            }
            None => {
                self.predicate.insert(field, Bson::Null);
            }
        }
        self
    }

    /// Returns the accumulated predicate. The builder remains usable.
    pub fn build(&self) -> Query {
        Query::from(self.predicate.clone())
    }
}

fn regex_match(pattern: &str) -> Document {
    doc! { OP_REGEX: pattern, OP_OPTIONS: CASE_INSENSITIVE }
}

/// Strips `/…/` delimiters, returning the inner pattern.
fn delimited_regex(value: &str) -> Option<&str> {
    if value.len() >= 2 && value.starts_with(REGEX_DELIMITER) && value.ends_with(REGEX_DELIMITER) {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

fn eq_or_regex(value: &str) -> Bson {
    match delimited_regex(value) {
        Some(pattern) => Bson::Document(regex_match(pattern)),
        None => Bson::String(value.to_string()),
    }
}

fn element_condition(value: &str) -> Bson {
    match delimited_regex(value) {
        Some(pattern) => Bson::Document(doc! { OP_ELEM_MATCH: regex_match(pattern) }),
        None => Bson::Document(doc! { OP_ELEM_MATCH: { "$eq": value } }),
    }
}
