use crate::common::util::{bson_equals, get_path, remove_path, set_path};
use crate::common::{DOC_ID, OP_SET, OP_UNSET};
use crate::errors::{ErrorKind, PersistError, PersistResult};
use bson::{Bson, Document};

/// Applies an update expression to a document in place.
///
/// Only `$set` and `$unset` are understood. Returns whether the document
/// actually changed.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> PersistResult<bool> {
    if update.is_empty() {
        log::error!("Update expression is empty");
        return Err(PersistError::new(
            "Update expression is empty",
            ErrorKind::DriverFailure,
        ));
    }

    let original = document.clone();
    for (operator, argument) in update {
        let Bson::Document(fields) = argument else {
            log::error!("Argument of {} must be a document", operator);
            return Err(PersistError::new(
                &format!("Argument of {} must be a document", operator),
                ErrorKind::DriverFailure,
            ));
        };

        match operator.as_str() {
            OP_SET => {
                for (path, value) in fields {
                    guard_id(&original, path, Some(value))?;
                    set_path(document, path, value.clone());
                }
            }
            OP_UNSET => {
                for (path, _) in fields {
                    guard_id(&original, path, None)?;
                    remove_path(document, path);
                }
            }
            other => {
                log::error!("Unsupported update operator '{}'", other);
                return Err(PersistError::new(
                    &format!("Unsupported update operator '{}'", other),
                    ErrorKind::DriverFailure,
                ));
            }
        }
    }
    Ok(original != *document)
}

fn guard_id(original: &Document, path: &str, value: Option<&Bson>) -> PersistResult<()> {
    if path != DOC_ID {
        return Ok(());
    }
    let unchanged = match (get_path(original, DOC_ID), value) {
        (Some(current), Some(next)) => bson_equals(current, next),
        (None, Some(_)) => true,
        _ => false,
    };
    if unchanged {
        Ok(())
    } else {
        log::error!("Performing an update on the path '_id' would modify the immutable field");
        Err(PersistError::new(
            "Performing an update on the path '_id' would modify the immutable field",
            ErrorKind::DriverFailure,
        ))
    }
}

/// Builds the document inserted by an upsert: the equality fields of the
/// query followed by the update expression.
pub(crate) fn upsert_seed(query: &Document, update: &Document) -> PersistResult<Document> {
    let mut seed = Document::new();
    for (key, condition) in query {
        if key.starts_with('$') {
            continue;
        }
        let is_operator = matches!(
            condition,
            Bson::Document(inner) if inner.keys().next().is_some_and(|k| k.starts_with('$'))
        );
        if !is_operator {
            set_path(&mut seed, key, condition.clone());
        }
    }
    apply_update(&mut seed, update)?;
    Ok(seed)
}
