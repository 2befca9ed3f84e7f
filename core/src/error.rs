#[cfg(feature = "rusqlite")]
use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the template engine.
///
/// Driver errors are wrapped with the original preserved; every other
/// variant carries a rendered message assembled by the failing layer.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Malformed template text. `column` is 1-based in the source string.
    #[error("cannot parse expression: {message} (near column {column})")]
    Parse { column: usize, message: String },

    /// A type sample is missing, duplicated, or otherwise unusable.
    #[error("{0}")]
    PrepareType(String),

    /// Asterisk misuse, arity mismatch, or an unknown tag in an expression.
    #[error("{0}")]
    PrepareShape(String),

    /// Invalid runtime input arguments.
    #[error("{0}")]
    Bind(String),

    /// Output routing or population failure.
    #[error("{0}")]
    Scan(String),

    /// A value could not be converted to or from the requested field type.
    #[error("{0}")]
    Conversion(String),

    /// Error passed through from the underlying SQL driver.
    #[cfg(feature = "rusqlite")]
    #[error("driver error: {0}")]
    Driver(Arc<rusqlite::Error>),

    /// The query produced no rows.
    #[error("no rows in result set")]
    NoRows,

    /// Operation on a completed transaction.
    #[error("transaction has already been committed or rolled back")]
    TxDone,
}

#[cfg(feature = "rusqlite")]
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Driver(Arc::new(err))
    }
}

impl Error {
    /// Prefixes the message of a rendered-message variant with `context`.
    ///
    /// Sentinels (`NoRows`, `TxDone`), parse errors, and driver errors keep
    /// their identity so callers can still match on them.
    pub fn context(self, context: &str) -> Error {
        match self {
            Error::PrepareType(msg) => Error::PrepareType(format!("{context}: {msg}")),
            Error::PrepareShape(msg) => Error::PrepareShape(format!("{context}: {msg}")),
            Error::Bind(msg) => Error::Bind(format!("{context}: {msg}")),
            Error::Scan(msg) => Error::Scan(format!("{context}: {msg}")),
            Error::Conversion(msg) => Error::Conversion(format!("{context}: {msg}")),
            other => other,
        }
    }

    /// Returns the wrapped driver error, if this is a driver failure.
    #[cfg(feature = "rusqlite")]
    pub fn driver_error(&self) -> Option<&rusqlite::Error> {
        match self {
            Error::Driver(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message_variants() {
        let err = Error::Bind("type \"Person\" provided more than once".into());
        let err = err.context("invalid input parameter");
        assert_eq!(
            err.to_string(),
            "invalid input parameter: type \"Person\" provided more than once"
        );
    }

    #[test]
    fn context_preserves_sentinels() {
        assert!(matches!(Error::NoRows.context("cannot get result"), Error::NoRows));
        assert!(matches!(Error::TxDone.context("cannot get result"), Error::TxDone));
    }
}
