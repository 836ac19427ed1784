/// Options for controlling update operations on documents.
///
/// # Examples
///
/// ```rust
/// use docpersist::store::{just_once, multi, upsert, UpdateOptions};
///
/// assert!(!just_once().is_multi());
/// assert!(multi().is_multi());
/// assert!(upsert().is_upsert());
/// assert!(UpdateOptions::new(true, false).is_multi());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    multi: bool,
    upsert: bool,
}

impl UpdateOptions {
    /// Creates a new `UpdateOptions`.
    ///
    /// # Arguments
    ///
    /// * `multi` - If true, update every matching document instead of the first
    /// * `upsert` - If true, insert a new document when nothing matches
    pub fn new(multi: bool, upsert: bool) -> Self {
        Self { multi, upsert }
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn is_upsert(&self) -> bool {
        self.upsert
    }
}

/// Update only the first matching document.
pub fn just_once() -> UpdateOptions {
    UpdateOptions::new(false, false)
}

/// Update every matching document.
pub fn multi() -> UpdateOptions {
    UpdateOptions::new(true, false)
}

/// Update the first matching document or insert one if nothing matches.
pub fn upsert() -> UpdateOptions {
    UpdateOptions::new(false, true)
}
