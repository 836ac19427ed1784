use crate::common::{PAGE_OFFSET, PAGE_TOTAL};
use crate::errors::PersistResult;
use bson::Document;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One window of a paged search.
///
/// Serializes to `{offset, total, <result_key>: [...]}`; the result key is
/// left out when the window is empty.
///
/// # Examples
///
/// ```rust
/// use docpersist::repository::Page;
/// use bson::doc;
///
/// let page = Page::new(0, 2, "users", vec![doc! { "name": "a" }]);
/// assert_eq!(
///     page.to_document().unwrap(),
///     doc! { "offset": 0i64, "total": 2i64, "users": [{ "name": "a" }] }
/// );
///
/// let empty: Page<bson::Document> = Page::empty(5, 2, "users");
/// assert_eq!(empty.to_document().unwrap(), doc! { "offset": 5i64, "total": 2i64 });
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    offset: u64,
    total: u64,
    result_key: String,
    items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(offset: u64, total: u64, result_key: &str, items: Vec<T>) -> Self {
        Page {
            offset,
            total,
            result_key: result_key.to_string(),
            items,
        }
    }

    /// A page carrying only its position.
    pub fn empty(offset: u64, total: u64, result_key: &str) -> Self {
        Page::new(offset, total, result_key, Vec::new())
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of matches across all pages.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn result_key(&self) -> &str {
        &self.result_key
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Converts every item, stopping at the first failure.
    pub fn try_map<U, F>(self, mut map: F) -> PersistResult<Page<U>>
    where
        F: FnMut(T) -> PersistResult<U>,
    {
        let mut items = Vec::with_capacity(self.items.len());
        for item in self.items {
            items.push(map(item)?);
        }
        Ok(Page {
            offset: self.offset,
            total: self.total,
            result_key: self.result_key,
            items,
        })
    }
}

impl<T: Serialize> Page<T> {
    pub fn to_document(&self) -> PersistResult<Document> {
        Ok(bson::to_document(self)?)
    }
}

impl<T: Serialize> Serialize for Page<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.items.is_empty() { 2 } else { 3 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(PAGE_OFFSET, &self.offset)?;
        map.serialize_entry(PAGE_TOTAL, &self.total)?;
        if !self.items.is_empty() {
            map.serialize_entry(&self.result_key, &self.items)?;
        }
        map.end()
    }
}
