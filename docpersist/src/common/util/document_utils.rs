use crate::common::FIELD_SEPARATOR;
use bson::{Bson, Document};
use std::cmp::Ordering;

/// Splits a dotted field path into its segments, dropping empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split(FIELD_SEPARATOR).filter(|s| !s.is_empty()).collect()
}

/// Returns the value at a dotted path, descending through embedded documents only.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let segments = path_segments(path);
    let (last, parents) = segments.split_last()?;
    let mut current = document;
    for segment in parents {
        match current.get(*segment) {
            Some(Bson::Document(child)) => current = child,
            _ => return None,
        }
    }
    current.get(*last)
}

/// Sets the value at a dotted path, creating (or replacing non-document)
/// intermediate values with embedded documents.
pub fn set_path(document: &mut Document, path: &str, value: Bson) {
    let segments = path_segments(path);
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = document;
    for segment in parents {
        let needs_child = !matches!(current.get(*segment), Some(Bson::Document(_)));
        if needs_child {
            current.insert(segment.to_string(), Document::new());
        }
        current = match current.get_mut(*segment) {
            Some(Bson::Document(child)) => child,
            _ => return,
        };
    }
    current.insert(last.to_string(), value);
}

/// Removes the value at a dotted path, returning it when present.
pub fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    let segments = path_segments(path);
    let (last, parents) = segments.split_last()?;
    let mut current = document;
    for segment in parents {
        current = match current.get_mut(*segment) {
            Some(Bson::Document(child)) => child,
            _ => return None,
        };
    }
    current.remove(*last)
}

/// Lists the top-level keys present in `old` but absent from `new`,
/// skipping any key in `excluded`.
pub fn stale_keys(old: &Document, new: &Document, excluded: &[&str]) -> Vec<String> {
    old.keys()
        .filter(|key| !new.contains_key(key.as_str()))
        .filter(|key| !excluded.contains(&key.as_str()))
        .cloned()
        .collect()
}

/// Interprets a projection or flag value the way the store does:
/// `0`, `false` and `null` are falsy, everything else truthy.
pub fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(d) => *d != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Whether a projection selects fields (inclusion) rather than hiding them.
///
/// Any truthy field other than `_id` makes it inclusive. A projection naming
/// only `_id` is inclusive when `_id` is truthy.
pub fn is_inclusion_projection(projection: &Document) -> bool {
    let mut id_included = false;
    let mut other_excluded = false;
    for (field, flag) in projection {
        if field == crate::common::DOC_ID {
            id_included = is_truthy(flag);
        } else if is_truthy(flag) {
            return true;
        } else {
            other_excluded = true;
        }
    }
    id_included && !other_excluded
}

/// Reads a numeric value as `f64` if it is one of the numeric types.
pub fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(i) => Some(*i as f64),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(d) => Some(*d),
        _ => None,
    }
}

/// Reads a numeric value as `i64` if it is integral.
pub fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        Bson::Double(d) if d.fract() == 0.0 => Some(*d as i64),
        _ => None,
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Whether two values belong to the same comparison bracket
/// (all numeric types share one bracket).
pub fn same_type_bracket(a: &Bson, b: &Bson) -> bool {
    type_rank(a) == type_rank(b)
}

/// Total order over values following the store's cross-type ordering:
/// null < numbers < strings < documents < arrays < binary < object ids
/// < booleans < dates < timestamps < regexes.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_bson(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn compare_documents(a: &Document, b: &Document) -> Ordering {
    for ((left_key, left), (right_key, right)) in a.iter().zip(b.iter()) {
        let ordering = left_key
            .cmp(right_key)
            .then_with(|| compare_bson(left, right));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

/// Equality that treats numerically equal values of different numeric
/// types as equal (`1 == 1i64 == 1.0`).
pub fn bson_equals(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| bson_equals(l, r))
        }
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|((lk, lv), (rk, rv))| lk == rk && bson_equals(lv, rv))
        }
        _ => match (as_f64(a), as_f64(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}
