use crate::common::util::{as_i64, bson_equals, compare_bson, path_segments, same_type_bracket};
use crate::errors::{ErrorKind, PersistError, PersistResult};
use bson::{Bson, Document};
use regex::Regex;
use std::cmp::Ordering;

/// Evaluates a store predicate against a document.
///
/// Supports implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
/// `$in`, `$nin`, `$exists`, `$regex`/`$options`, `$all`, `$elemMatch`,
/// `$size`, `$type`, `$not`, and the logical `$and`, `$or`, `$nor`.
/// Dotted paths descend through embedded documents and fan out over arrays.
pub(crate) fn matches(document: &Document, filter: &Document) -> PersistResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches(document, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, condition)? {
                    if matches(document, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for sub in sub_filters(key, condition)? {
                    if matches(document, sub)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            operator if operator.starts_with('$') => {
                return Err(unsupported("top-level operator", operator));
            }
            field => {
                let values = resolve(document, field);
                matches_condition(&values, condition)?
            }
        };

        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(operator: &str, condition: &'a Bson) -> PersistResult<Vec<&'a Document>> {
    match condition {
        Bson::Array(items) => items
            .iter()
            .map(|item| match item {
                Bson::Document(sub) => Ok(sub),
                _ => Err(PersistError::new(
                    &format!("{} entries must be documents", operator),
                    ErrorKind::DriverFailure,
                )),
            })
            .collect(),
        _ => Err(PersistError::new(
            &format!("{} requires an array", operator),
            ErrorKind::DriverFailure,
        )),
    }
}

/// Collects every value reachable through a dotted path.
///
/// An empty result means the field is missing. Arrays met on the way fan
/// out over their document elements; a numeric segment indexes an array.
pub(crate) fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path_segments(path);
    let mut values = Vec::new();
    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = document.get(*first) {
            collect(value, rest, &mut values);
        }
    }
    values
}

fn collect<'a>(value: &'a Bson, segments: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(child) => {
            if let Some(next) = child.get(*segment) {
                collect(next, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    collect(item, rest, out);
                }
                return;
            }
            for item in items {
                if let Bson::Document(child) = item {
                    if let Some(next) = child.get(*segment) {
                        collect(next, rest, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Values plus the elements of any array value.
fn expand<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut expanded = Vec::with_capacity(values.len());
    for value in values {
        expanded.push(*value);
        if let Bson::Array(items) = value {
            expanded.extend(items.iter());
        }
    }
    expanded
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(document) => document.keys().next().is_some_and(|key| key.starts_with('$')),
        _ => false,
    }
}

fn matches_condition(values: &[&Bson], condition: &Bson) -> PersistResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(condition) => {
            apply_operators(values, operators)
        }
        Bson::RegularExpression(regex) => {
            let pattern = compile(&regex.pattern, &regex.options)?;
            Ok(regex_matches(values, &pattern))
        }
        target => Ok(equals_any(values, target)),
    }
}

fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    if let Bson::Null = target {
        if values.is_empty() {
            return true;
        }
    }
    expand(values).iter().any(|value| bson_equals(value, target))
}

fn apply_operators(values: &[&Bson], operators: &Document) -> PersistResult<bool> {
    for (operator, argument) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => equals_any(values, argument),
            "$ne" => !equals_any(values, argument),
            "$gt" => compare_any(values, argument, |o| o == Ordering::Greater),
            "$gte" => compare_any(values, argument, |o| o != Ordering::Less),
            "$lt" => compare_any(values, argument, |o| o == Ordering::Less),
            "$lte" => compare_any(values, argument, |o| o != Ordering::Greater),
            "$in" => in_list(values, argument)?,
            "$nin" => !in_list(values, argument)?,
            "$exists" => crate::common::util::is_truthy(argument) != values.is_empty(),
            "$regex" => {
                let options = operators.get_str("$options").unwrap_or("");
                let pattern = match argument {
                    Bson::String(pattern) => compile(pattern, options)?,
                    Bson::RegularExpression(regex) => compile(&regex.pattern, &regex.options)?,
                    _ => return Err(unsupported("$regex argument", &argument.to_string())),
                };
                regex_matches(values, &pattern)
            }
            "$options" => true,
            "$all" => all_of(values, argument)?,
            "$elemMatch" => elem_match(values, argument)?,
            "$size" => {
                let size = as_i64(argument)
                    .ok_or_else(|| unsupported("$size argument", &argument.to_string()))?;
                values
                    .iter()
                    .any(|value| matches!(value, Bson::Array(items) if items.len() as i64 == size))
            }
            "$type" => type_matches(values, argument)?,
            "$not" => !matches_condition(values, argument)?,
            other => return Err(unsupported("operator", other)),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn compare_any<F>(values: &[&Bson], argument: &Bson, accept: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    expand(values)
        .iter()
        .filter(|value| same_type_bracket(value, argument))
        .any(|value| accept(compare_bson(value, argument)))
}

fn in_list(values: &[&Bson], argument: &Bson) -> PersistResult<bool> {
    match argument {
        Bson::Array(candidates) => Ok(candidates
            .iter()
            .any(|candidate| equals_any(values, candidate))),
        _ => Err(unsupported("$in argument", &argument.to_string())),
    }
}

fn all_of(values: &[&Bson], argument: &Bson) -> PersistResult<bool> {
    let Bson::Array(required) = argument else {
        return Err(unsupported("$all argument", &argument.to_string()));
    };
    if required.is_empty() {
        return Ok(false);
    }
    for condition in required {
        let satisfied = match condition {
            Bson::Document(inner) if inner.contains_key("$elemMatch") => {
                elem_match(values, inner.get("$elemMatch").unwrap_or(&Bson::Null))?
            }
            target => equals_any(values, target),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn elem_match(values: &[&Bson], argument: &Bson) -> PersistResult<bool> {
    let Bson::Document(criteria) = argument else {
        return Err(unsupported("$elemMatch argument", &argument.to_string()));
    };
    let operator_form = is_operator_document(argument);

    for value in values {
        let Bson::Array(items) = value else {
            continue;
        };
        for item in items {
            let satisfied = if operator_form {
                apply_operators(&[item], criteria)?
            } else {
                match item {
                    Bson::Document(element) => matches(element, criteria)?,
                    _ => false,
                }
            };
            if satisfied {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn type_matches(values: &[&Bson], argument: &Bson) -> PersistResult<bool> {
    let aliases: Vec<&Bson> = match argument {
        Bson::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    for alias in aliases {
        for value in expand(values) {
            if has_type(value, alias)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn has_type(value: &Bson, alias: &Bson) -> PersistResult<bool> {
    let name = match alias {
        Bson::String(name) => name.as_str(),
        numeric => match as_i64(numeric) {
            Some(1) => "double",
            Some(2) => "string",
            Some(3) => "object",
            Some(4) => "array",
            Some(7) => "objectId",
            Some(8) => "bool",
            Some(9) => "date",
            Some(10) => "null",
            Some(16) => "int",
            Some(18) => "long",
            _ => return Err(unsupported("$type alias", &numeric.to_string())),
        },
    };
    Ok(match name {
        "double" => matches!(value, Bson::Double(_)),
        "string" => matches!(value, Bson::String(_)),
        "object" => matches!(value, Bson::Document(_)),
        "array" => matches!(value, Bson::Array(_)),
        "objectId" => matches!(value, Bson::ObjectId(_)),
        "bool" => matches!(value, Bson::Boolean(_)),
        "date" => matches!(value, Bson::DateTime(_)),
        "null" => matches!(value, Bson::Null),
        "int" => matches!(value, Bson::Int32(_)),
        "long" => matches!(value, Bson::Int64(_)),
        "number" => matches!(
            value,
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
        ),
        other => return Err(unsupported("$type alias", other)),
    })
}

fn compile(pattern: &str, options: &str) -> PersistResult<Regex> {
    let flags: String = options.chars().filter(|c| matches!(c, 'i' | 'm' | 's' | 'x')).collect();
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };
    Regex::new(&source).map_err(|e| {
        log::error!("Invalid regex pattern '{}': {}", pattern, e);
        PersistError::new(
            &format!("Invalid regex pattern '{}': {}", pattern, e),
            ErrorKind::DriverFailure,
        )
    })
}

fn regex_matches(values: &[&Bson], pattern: &Regex) -> bool {
    expand(values).iter().any(|value| match value {
        Bson::String(text) => pattern.is_match(text),
        Bson::Symbol(text) => pattern.is_match(text),
        _ => false,
    })
}

fn unsupported(what: &str, name: &str) -> PersistError {
    log::error!("Unsupported {} '{}'", what, name);
    PersistError::new(&format!("Unsupported {} '{}'", what, name), ErrorKind::DriverFailure)
}
