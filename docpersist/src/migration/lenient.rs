use crate::common::util::stale_keys;
use crate::common::DOC_ID;
use crate::errors::{ErrorKind, PersistError, PersistResult};
use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Flags controlling how forgiving [`decode_lenient`] is.
///
/// The default is fully lenient, which is what schema migration needs:
/// a best-effort reconstruction that never fails on an unexpected shape
/// the target type can absorb.
///
/// # Examples
///
/// ```rust
/// use docpersist::migration::DecodeOptions;
///
/// let options = DecodeOptions::default().ignore_unknown_fields(false);
/// assert!(!options.is_ignore_unknown_fields());
/// assert!(options.is_null_tolerant_primitives());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    ignore_unknown_fields: bool,
    null_tolerant_primitives: bool,
    ignore_invalid_subtypes: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions::lenient()
    }
}

impl DecodeOptions {
    /// All leniency flags enabled.
    pub fn lenient() -> Self {
        DecodeOptions {
            ignore_unknown_fields: true,
            null_tolerant_primitives: true,
            ignore_invalid_subtypes: true,
        }
    }

    /// All leniency flags disabled.
    pub fn strict() -> Self {
        DecodeOptions {
            ignore_unknown_fields: false,
            null_tolerant_primitives: false,
            ignore_invalid_subtypes: false,
        }
    }

    /// Fields absent from the target type are dropped instead of failing the decode.
    pub fn ignore_unknown_fields(mut self, flag: bool) -> Self {
        self.ignore_unknown_fields = flag;
        self
    }

    /// Explicit nulls are treated as absent fields, so fields carrying
    /// `#[serde(default)]` fall back to their default value.
    pub fn null_tolerant_primitives(mut self, flag: bool) -> Self {
        self.null_tolerant_primitives = flag;
        self
    }

    /// Values of a declared polymorphic field whose type tag is not a known
    /// variant are dropped instead of failing the decode.
    pub fn ignore_invalid_subtypes(mut self, flag: bool) -> Self {
        self.ignore_invalid_subtypes = flag;
        self
    }

    pub fn is_ignore_unknown_fields(&self) -> bool {
        self.ignore_unknown_fields
    }

    pub fn is_null_tolerant_primitives(&self) -> bool {
        self.null_tolerant_primitives
    }

    pub fn is_ignore_invalid_subtypes(&self) -> bool {
        self.ignore_invalid_subtypes
    }
}

/// Declares a field holding internally tagged values, e.g. a serde enum
/// annotated with `#[serde(tag = "kind")]`.
///
/// `path` is a dotted path to the field; the field may hold a single
/// document or an array of documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolymorphicField {
    path: String,
    tag: String,
    variants: Vec<String>,
}

impl PolymorphicField {
    pub fn new<I, S>(path: &str, tag: &str, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PolymorphicField {
            path: path.to_string(),
            tag: tag.to_string(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    fn accepts(&self, value: &Bson) -> bool {
        match value {
            Bson::Document(document) => match document.get(&self.tag) {
                Some(Bson::String(variant)) => self.variants.iter().any(|known| known == variant),
                _ => false,
            },
            _ => false,
        }
    }
}

/// A type a collection can be migrated into.
///
/// The type describes itself to the decoder: which leniency flags apply
/// (`None` defers to the repository default) and which of its fields are
/// polymorphic.
///
/// # Examples
///
/// ```rust
/// use docpersist::migration::SchemaModel;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     name: String,
///     #[serde(default)]
///     age: u32,
/// }
///
/// impl SchemaModel for User {}
/// ```
pub trait SchemaModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn decode_options() -> Option<DecodeOptions> {
        None
    }

    fn polymorphic_fields() -> Vec<PolymorphicField> {
        Vec::new()
    }
}

/// Decodes a document into `T` applying the given leniency flags.
///
/// The input is never mutated; preprocessing happens on a copy.
pub fn decode_lenient<T>(
    document: &Document,
    options: &DecodeOptions,
    polymorphic_fields: &[PolymorphicField],
) -> PersistResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut working = document.clone();

    for field in polymorphic_fields {
        check_subtypes(&mut working, field, options.ignore_invalid_subtypes)?;
    }

    if options.null_tolerant_primitives {
        strip_nulls(&mut working);
    }

    let value: T = bson::from_document(working.clone()).map_err(|e| {
        log::error!("Failed to decode document: {}", e);
        PersistError::new_with_cause(
            &format!("Failed to decode document: {}", e),
            ErrorKind::EncodingError,
            PersistError::from(e),
        )
    })?;

    if !options.ignore_unknown_fields {
        let encoded = bson::to_document(&value)?;
        let unknown = stale_keys(&working, &encoded, &[DOC_ID]);
        if !unknown.is_empty() {
            log::error!("Unknown fields in document: {}", unknown.join(", "));
            return Err(PersistError::new(
                &format!("Unknown fields in document: {}", unknown.join(", ")),
                ErrorKind::EncodingError,
            ));
        }
    }
    Ok(value)
}

fn check_subtypes(
    document: &mut Document,
    field: &PolymorphicField,
    drop_invalid: bool,
) -> PersistResult<()> {
    let segments = crate::common::util::path_segments(field.path());
    let Some((last, parents)) = segments.split_last() else {
        return Ok(());
    };

    let mut current = document;
    for segment in parents {
        current = match current.get_mut(*segment) {
            Some(Bson::Document(child)) => child,
            _ => return Ok(()),
        };
    }

    let invalid = |value: &Bson| !matches!(value, Bson::Null) && !field.accepts(value);
    let drop_value = match current.get_mut(*last) {
        Some(Bson::Array(items)) => {
            if items.iter().any(invalid) {
                if !drop_invalid {
                    return Err(invalid_subtype(field));
                }
                log::warn!("Dropping elements with an unknown subtype at '{}'", field.path());
                items.retain(|item| !invalid(item));
            }
            false
        }
        Some(value) => invalid(value),
        None => false,
    };

    if drop_value {
        if !drop_invalid {
            return Err(invalid_subtype(field));
        }
        log::warn!("Dropping value with an unknown subtype at '{}'", field.path());
        current.remove(*last);
    }
    Ok(())
}

fn invalid_subtype(field: &PolymorphicField) -> PersistError {
    log::error!(
        "Invalid subtype at '{}', expected '{}' to be one of [{}]",
        field.path(),
        field.tag(),
        field.variants().join(", ")
    );
    PersistError::new(
        &format!(
            "Invalid subtype at '{}', expected '{}' to be one of [{}]",
            field.path(),
            field.tag(),
            field.variants().join(", ")
        ),
        ErrorKind::EncodingError,
    )
}

fn strip_nulls(document: &mut Document) {
    let nulls: Vec<String> = document
        .iter()
        .filter(|(_, value)| matches!(value, Bson::Null))
        .map(|(key, _)| key.clone())
        .collect();
    for key in nulls {
        document.remove(&key);
    }

    for (_, value) in document.iter_mut() {
        match value {
            Bson::Document(child) => strip_nulls(child),
            Bson::Array(items) => {
                for item in items.iter_mut() {
                    if let Bson::Document(child) = item {
                        strip_nulls(child);
                    }
                }
            }
            _ => {}
        }
    }
}
