//! Error taxonomy for metadata resolution, relation mutation and fetching.
//!
//! Configuration and cardinality errors always carry the offending class and
//! property so integration mistakes can be traced back to the declaration.

use crate::relation::Cardinality;

/// Crate-wide result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the relation and fetch engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or incomplete declarative metadata, detected at first resolution
    #[error("configuration error on {class}::{property}: {message}")]
    Configuration {
        class: String,
        property: String,
        message: String,
    },

    /// A to-one mutator was used on a to-many relation, or the reverse
    #[error("cardinality violation on {class}::{property}: expected a {expected} relation, {property} is {actual}")]
    Cardinality {
        class: String,
        property: String,
        expected: &'static str,
        actual: Cardinality,
    },

    /// A deferred property was accessed on an entity whose session is gone
    #[error("{class}::{property} is not resolvable without a session")]
    NoSession { class: String, property: String },

    /// Primary key fields cannot change once the entity exists
    #[error("primary key field {class}::{property} is immutable once the entity exists")]
    ImmutablePrimaryKey { class: String, property: String },

    /// Property is neither a structure field nor a declared relation/fetch
    #[error("unknown property {class}::{property}")]
    UnknownProperty { class: String, property: String },

    /// A relation received an entity of the wrong class
    #[error("{class}::{property} expects an entity of class {expected}, got {actual}")]
    RelatedClassMismatch {
        class: String,
        property: String,
        expected: String,
        actual: String,
    },

    /// Class was never registered
    #[error("unknown entity class {0}")]
    UnknownClass(String),

    /// A row or entity lacks (part of) its primary key
    #[error("primary key of {class} is missing or incomplete")]
    MissingPrimaryKey { class: String },

    /// A single-item fetch required a row and got none
    #[error("no {class} matched the query")]
    NotFound { class: String },

    /// Execution collaborator failure
    #[error("query execution failed: {0}")]
    Execution(String),

    /// A value could not be converted to the expected shape
    #[error("value conversion failed: {0}")]
    Conversion(String),

    /// Transaction scope misuse or a rolled back transaction
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Failure raised by a user callback (fetch join, setter, getter, factory)
    #[error(transparent)]
    Callback(Box<dyn std::error::Error + Send + Sync>),

    /// PostgreSQL error from `may_postgres`
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] may_postgres::Error),
}

impl Error {
    pub(crate) fn configuration(
        class: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Configuration {
            class: class.into(),
            property: property.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unknown_property(class: impl Into<String>, property: impl Into<String>) -> Self {
        Error::UnknownProperty {
            class: class.into(),
            property: property.into(),
        }
    }

    /// Wrap an arbitrary error raised from inside a user callback
    pub fn callback<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Callback(Box::new(err))
    }

    /// True for the fail-fast metadata error kind
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_message_names_class_and_property() {
        let err = Error::configuration("DummyPerson", "dogs", "mid class is required");
        let msg = err.to_string();
        assert!(msg.contains("DummyPerson::dogs"));
        assert!(msg.contains("mid class is required"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_cardinality_message() {
        let err = Error::Cardinality {
            class: "DummyPerson".to_string(),
            property: "dogs".to_string(),
            expected: "to-one",
            actual: Cardinality::ManyToMany,
        };
        let msg = err.to_string();
        assert!(msg.contains("DummyPerson::dogs"));
        assert!(msg.contains("to-one"));
        assert!(msg.contains("manyToMany"));
    }

    #[test]
    fn test_callback_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = Error::callback(io);
        assert_eq!(err.to_string(), "boom");
        assert!(!err.is_configuration());
    }
}
