use crate::errors::{ErrorKind, PersistError, PersistResult};
use bson::Document;
use itertools::Itertools;
use std::fmt::Display;

/// Specifies the direction for sorting documents.
///
/// Maps onto the store's numeric convention: `Ascending` is `1`,
/// `Descending` is `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Sort in ascending order (smallest to largest, A-Z, oldest to newest)
    Ascending,
    /// Sort in descending order (largest to smallest, Z-A, newest to oldest)
    Descending,
}

impl SortOrder {
    /// Returns the store direction for this order (`1` or `-1`).
    pub fn direction(&self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    /// Resolves a store direction back into a `SortOrder`.
    ///
    /// Any negative value is descending, everything else ascending.
    pub fn from_direction(direction: i64) -> SortOrder {
        if direction < 0 {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        }
    }
}

/// An ordered mapping from field name to sort direction.
///
/// Field order is significant (the first field is the primary key). A field
/// can appear only once and its name can never be empty.
///
/// # Examples
///
/// ```rust
/// use docpersist::common::{SortOrder, SortSpec};
///
/// let spec = SortSpec::new()
///     .add("name", SortOrder::Ascending).unwrap()
///     .add("age", SortOrder::Descending).unwrap();
/// assert_eq!(spec.to_document(), bson::doc! { "name": 1, "age": -1 });
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    fields: Vec<(String, SortOrder)>,
}

impl SortSpec {
    pub fn new() -> Self {
        SortSpec { fields: Vec::new() }
    }

    /// Appends a field to the sort specification.
    ///
    /// # Errors
    ///
    /// `BadQuery` if the field name is empty or already present.
    pub fn add(mut self, field_name: &str, sort_order: SortOrder) -> PersistResult<Self> {
        if field_name.is_empty() {
            log::error!("Sort field name cannot be empty");
            return Err(PersistError::new(
                "Sort field name cannot be empty",
                ErrorKind::BadQuery,
            ));
        }
        if self.contains(field_name) {
            log::error!("Sort field '{}' is already present", field_name);
            return Err(PersistError::new(
                &format!("Sort field '{}' is already present", field_name),
                ErrorKind::BadQuery,
            ));
        }
        self.fields.push((field_name.to_string(), sort_order));
        Ok(self)
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == field_name)
    }

    pub fn sorting_order(&self) -> &[(String, SortOrder)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Renders the sort as a store sort document, e.g. `{a: 1, b: -1}`.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        for (name, order) in &self.fields {
            document.insert(name.clone(), order.direction());
        }
        document
    }
}

impl Display for SortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .fields
            .iter()
            .map(|(name, order)| match order {
                SortOrder::Ascending => format!("+{}", name),
                SortOrder::Descending => format!("-{}", name),
            })
            .join(", ");
        write!(f, "[{}]", rendered)
    }
}
