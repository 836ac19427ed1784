use crate::common::{SortOrder, SortSpec};
use crate::errors::{ErrorKind, PersistError, PersistResult};

/// Parses `+field`, `-field` and `field` tokens into a [`SortSpec`].
///
/// Tokens are trimmed. A missing token, an empty field name, a field the
/// `key_validator` rejects and a field already listed earlier all fail
/// with [`ErrorKind::BadQuery`]. The error code is `prefix[index]`, or
/// `prefix[index].field` once the field name is known.
///
/// # Examples
///
/// ```rust
/// use docpersist::repository::query_param_to_sort;
///
/// let sort = query_param_to_sort([Some("+name"), Some("-age")], "sort", None).unwrap();
/// assert_eq!(sort.to_string(), "[+name, -age]");
///
/// let error = query_param_to_sort([Some("+a"), Some("-b"), Some("a")], "sort", None).unwrap_err();
/// assert_eq!(error.code(), Some("sort[2].a"));
/// ```
pub fn query_param_to_sort<I, S>(
    tokens: I,
    error_code_prefix: &str,
    key_validator: Option<&dyn Fn(&str) -> bool>,
) -> PersistResult<SortSpec>
where
    I: IntoIterator<Item = Option<S>>,
    S: AsRef<str>,
{
    let mut sort = SortSpec::new();
    for (index, token) in tokens.into_iter().enumerate() {
        let Some(token) = token else {
            return Err(bad_sort_token(error_code_prefix, index, None, "sort token is missing"));
        };

        let token = token.as_ref().trim();
        let (field, order) = if let Some(field) = token.strip_prefix('-') {
            (field, SortOrder::Descending)
        } else if let Some(field) = token.strip_prefix('+') {
            (field, SortOrder::Ascending)
        } else {
            (token, SortOrder::Ascending)
        };

        let field = field.trim();
        if field.is_empty() {
            return Err(bad_sort_token(error_code_prefix, index, None, "sort field is empty"));
        }
        if let Some(validator) = key_validator {
            if !validator(field) {
                return Err(bad_sort_token(
                    error_code_prefix,
                    index,
                    Some(field),
                    "sort field is not allowed",
                ));
            }
        }
        if sort.contains(field) {
            return Err(bad_sort_token(
                error_code_prefix,
                index,
                Some(field),
                "sort field is used more than once",
            ));
        }
        sort = sort.add(field, order)?;
    }
    Ok(sort)
}

fn bad_sort_token(prefix: &str, index: usize, field: Option<&str>, reason: &str) -> PersistError {
    let code = match field {
        Some(field) => format!("{}[{}].{}", prefix, index, field),
        None => format!("{}[{}]", prefix, index),
    };
    log::error!("Invalid sort parameter {}: {}", code, reason);
    PersistError::with_code(
        &format!("Invalid sort parameter {}: {}", code, reason),
        ErrorKind::BadQuery,
        &code,
    )
}
