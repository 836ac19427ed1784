use super::matcher::{matches, resolve};
use crate::common::util::{
    as_i64, compare_bson, get_path, is_inclusion_projection, is_truthy, remove_path, set_path,
};
use crate::common::{
    DOC_ID, STAGE_COUNT, STAGE_LIMIT, STAGE_MATCH, STAGE_SKIP, STAGE_SORT, STAGE_UNWIND,
};
use crate::errors::{ErrorKind, PersistError, PersistResult};
use bson::{Bson, Document};
use std::cmp::Ordering;

const STAGE_PROJECT: &str = "$project";

/// Runs an aggregation pipeline over a snapshot of a collection.
pub(crate) fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
) -> PersistResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, argument)), None) = (entries.next(), entries.next()) else {
            return Err(stage_error("a pipeline stage must have exactly one operator"));
        };

        documents = match name.as_str() {
            STAGE_MATCH => {
                let filter = argument
                    .as_document()
                    .ok_or_else(|| stage_error("$match requires a document"))?;
                let mut kept = Vec::with_capacity(documents.len());
                for document in documents {
                    if matches(&document, filter)? {
                        kept.push(document);
                    }
                }
                kept
            }
            STAGE_UNWIND => unwind(documents, argument)?,
            STAGE_SORT => {
                let spec = argument
                    .as_document()
                    .ok_or_else(|| stage_error("$sort requires a document"))?;
                sort_documents(&mut documents, spec);
                documents
            }
            STAGE_SKIP => {
                let skip = non_negative(argument, STAGE_SKIP)?;
                documents.into_iter().skip(skip).collect()
            }
            STAGE_LIMIT => {
                let limit = non_negative(argument, STAGE_LIMIT)?;
                if limit == 0 {
                    return Err(stage_error("$limit must be positive"));
                }
                documents.truncate(limit);
                documents
            }
            STAGE_COUNT => {
                let field = argument
                    .as_str()
                    .filter(|field| !field.is_empty() && !field.starts_with('$'))
                    .ok_or_else(|| stage_error("$count requires a non-empty field name"))?;
                if documents.is_empty() {
                    Vec::new()
                } else {
                    let mut result = Document::new();
                    match i32::try_from(documents.len()) {
                        Ok(count) => result.insert(field, count),
                        Err(_) => result.insert(field, documents.len() as i64),
                    };
                    vec![result]
                }
            }
            STAGE_PROJECT => {
                let projection = argument
                    .as_document()
                    .ok_or_else(|| stage_error("$project requires a document"))?;
                documents
                    .iter()
                    .map(|document| apply_projection(document, projection))
                    .collect()
            }
            other => {
                return Err(stage_error(&format!("unsupported pipeline stage '{}'", other)));
            }
        };
    }
    Ok(documents)
}

fn unwind(documents: Vec<Document>, argument: &Bson) -> PersistResult<Vec<Document>> {
    let (path, preserve) = match argument {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(options) => (
            options
                .get_str("path")
                .map_err(|_| stage_error("$unwind requires a path"))?,
            options.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
        ),
        _ => return Err(stage_error("$unwind requires a path")),
    };
    let path = path
        .strip_prefix('$')
        .ok_or_else(|| stage_error("$unwind path must start with '$'"))?;

    let mut output = Vec::new();
    for document in documents {
        match get_path(&document, path) {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items.clone() {
                    let mut copy = document.clone();
                    set_path(&mut copy, path, item);
                    output.push(copy);
                }
            }
            Some(Bson::Array(_)) | Some(Bson::Null) | None => {
                if preserve {
                    output.push(document);
                }
            }
            Some(_) => output.push(document),
        }
    }
    Ok(output)
}

fn non_negative(argument: &Bson, stage: &str) -> PersistResult<usize> {
    as_i64(argument)
        .filter(|value| *value >= 0)
        .map(|value| value as usize)
        .ok_or_else(|| stage_error(&format!("{} requires a non-negative integer", stage)))
}

/// Stable multi-key sort following the store's cross-type ordering.
/// Missing fields sort as null.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &Document) {
    let keys: Vec<(&str, bool)> = spec
        .iter()
        .map(|(field, direction)| (field.as_str(), as_i64(direction).unwrap_or(1) >= 0))
        .collect();

    documents.sort_by(|left, right| {
        for (field, ascending) in &keys {
            let left_value = sort_key(left, field);
            let right_value = sort_key(right, field);
            let ordering = compare_bson(&left_value, &right_value);
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn sort_key(document: &Document, field: &str) -> Bson {
    resolve(document, field)
        .first()
        .map(|value| (*value).clone())
        .unwrap_or(Bson::Null)
}

/// Applies an inclusion or exclusion projection.
///
/// A projection is inclusive when any field other than `_id` is truthy, or
/// when it names only `_id` and includes it. `_id` is kept unless excluded.
pub(crate) fn apply_projection(document: &Document, projection: &Document) -> Document {
    if is_inclusion_projection(projection) {
        let mut projected = Document::new();
        let keep_id = projection.get(DOC_ID).map(is_truthy).unwrap_or(true);
        if keep_id {
            if let Some(id) = document.get(DOC_ID) {
                projected.insert(DOC_ID, id.clone());
            }
        }
        for (field, flag) in projection {
            if field == DOC_ID || !is_truthy(flag) {
                continue;
            }
            if let Some(value) = get_path(document, field) {
                set_path(&mut projected, field, value.clone());
            }
        }
        projected
    } else {
        let mut projected = document.clone();
        for (field, flag) in projection {
            if !is_truthy(flag) {
                remove_path(&mut projected, field);
            }
        }
        projected
    }
}

fn stage_error(message: &str) -> PersistError {
    log::error!("Invalid aggregation pipeline: {}", message);
    PersistError::new(
        &format!("Invalid aggregation pipeline: {}", message),
        ErrorKind::DriverFailure,
    )
}
