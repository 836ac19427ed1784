use backtrace::Backtrace;
use parking_lot::RwLock;
use serde::{de, ser};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for persistence operations.
///
/// Every failure surfaced by a repository, a store driver or the migration
/// engine is tagged with one of these kinds so callers can branch on the
/// category without parsing messages.
///
/// # Examples
///
/// ```rust
/// use docpersist::errors::{ErrorKind, PersistError, PersistResult};
///
/// fn example() -> PersistResult<()> {
///     Err(PersistError::new("document not found", ErrorKind::NotFound))
/// }
/// assert!(example().is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// An update or delete targeted zero documents when one was required
    NotFound,
    /// An upsert neither inserted nor modified exactly one document
    NotAdded,
    /// A malformed query parameter, e.g. an invalid sort token
    BadQuery,
    /// A schema migration aborted on a document it could not migrate
    MigrationFailure,
    /// A migration for the same collection is already running in this process
    MigrationInProgress,
    /// A migration was cancelled before it finished
    MigrationCancelled,
    /// Any error reported by the underlying store driver
    DriverFailure,
    /// Error converting between typed values and documents
    EncodingError,
    /// Error in event publication or listener registration
    EventError,
    /// Invalid repository configuration
    ConfigError,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::NotAdded => write!(f, "Not added"),
            ErrorKind::BadQuery => write!(f, "Bad query"),
            ErrorKind::MigrationFailure => write!(f, "Migration failure"),
            ErrorKind::MigrationInProgress => write!(f, "Migration in progress"),
            ErrorKind::MigrationCancelled => write!(f, "Migration cancelled"),
            ErrorKind::DriverFailure => write!(f, "Driver failure"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::ConfigError => write!(f, "Configuration error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type of the persistence layer.
///
/// `PersistError` carries a message, an [`ErrorKind`], an optional
/// machine-readable code (used by query-parameter validation, e.g. `sort[2].a`)
/// and an optional cause. The error is cheap to clone so a single migration
/// failure can be handed both to event listeners and to the waiting caller.
///
/// # Examples
///
/// ```rust
/// use docpersist::errors::{ErrorKind, PersistError};
///
/// let cause = PersistError::new("connection reset", ErrorKind::DriverFailure);
/// let err = PersistError::new_with_cause("migration aborted", ErrorKind::MigrationFailure, cause);
/// assert_eq!(err.kind(), &ErrorKind::MigrationFailure);
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct PersistError {
    message: String,
    error_kind: ErrorKind,
    code: Option<String>,
    cause: Option<Box<PersistError>>,
    backtrace: Arc<RwLock<Backtrace>>,
}

impl PersistError {
    /// Creates a new `PersistError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        PersistError {
            message: message.to_string(),
            error_kind,
            code: None,
            cause: None,
            backtrace: Arc::new(RwLock::new(Backtrace::new_unresolved())),
        }
    }

    /// Creates a new `PersistError` wrapping the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: PersistError) -> Self {
        PersistError {
            message: message.to_string(),
            error_kind,
            code: None,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(RwLock::new(Backtrace::new_unresolved())),
        }
    }

    /// Creates a new `PersistError` with a machine-readable error code.
    pub fn with_code(message: &str, error_kind: ErrorKind, code: &str) -> Self {
        let mut error = PersistError::new(message, error_kind);
        error.code = Some(code.to_string());
        error
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn cause(&self) -> Option<&PersistError> {
        self.cause.as_deref()
    }

    /// Returns the innermost error of the cause chain.
    pub fn root_cause(&self) -> &PersistError {
        let mut current = self;
        while let Some(cause) = current.cause() {
            current = cause;
        }
        current
    }
}

impl Display for PersistError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for PersistError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let code = self.code.as_deref().map(|c| format!(" [{}]", c)).unwrap_or_default();
        match &self.cause {
            Some(cause) => write!(f, "{}{}\nCaused by: {:?}", self.message, code, cause),
            None => {
                let mut backtrace = self.backtrace.write();
                backtrace.resolve();
                write!(f, "{}{}\n{:?}", self.message, code, *backtrace)
            }
        }
    }
}

impl Error for PersistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

impl ser::Error for PersistError {
    fn custom<T: Display>(msg: T) -> Self {
        PersistError::new(&msg.to_string(), ErrorKind::EncodingError)
    }
}

impl de::Error for PersistError {
    fn custom<T: Display>(msg: T) -> Self {
        PersistError::new(&msg.to_string(), ErrorKind::EncodingError)
    }
}

impl From<bson::ser::Error> for PersistError {
    fn from(err: bson::ser::Error) -> Self {
        PersistError::new(
            &format!("Document serialization failed: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<bson::de::Error> for PersistError {
    fn from(err: bson::de::Error) -> Self {
        PersistError::new(
            &format!("Document deserialization failed: {}", err),
            ErrorKind::EncodingError,
        )
    }
}

impl From<String> for PersistError {
    fn from(msg: String) -> Self {
        PersistError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for PersistError {
    fn from(msg: &str) -> Self {
        PersistError::new(msg, ErrorKind::InternalError)
    }
}
