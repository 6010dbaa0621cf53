//! Error taxonomy shared by the encoder, the decoder and bound functions.
//!
//! Every variant is a plain returned value. The only place an [`Error`] turns
//! into a VM-level raise is the trampoline in [`crate::bind`], which uses
//! [`Error::name`] as the message.

use std::fmt;

/// Marshalling error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The stack value has a different tag than the target type requires
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    /// The VM could not convert the value, or it does not fit the target type
    NotConvertible { target: &'static str },
    /// A required struct field has no matching table key
    MissingValue { field: &'static str },
    /// A string does not name any variant of the target enum
    InvalidEnumTagName { name: String },
    /// A union table key does not name any variant of the target union
    InvalidTagName { name: String },
    /// A union table has no entries
    TableIsEmpty,
    /// The empty marker type was decoded from a table with entries
    TableIsNotEmpty,
    /// A union table has more than one entry
    MultipleTags,
    /// An allocation failed or exceeded the decode budget, or the VM stack cannot grow
    OutOfMemory,
    /// Nested decoding went deeper than the configured limit
    DepthExceeded { limit: usize },
    /// A borrowed decode targeted a value produced by a metamethod
    BorrowedTemporary,
    /// A protected call failed; carries the VM error message
    Runtime { message: String },
    /// A chunk failed to load
    Syntax { message: String },
    /// Invalid configuration
    Config { message: String },
}

impl Error {
    /// Variant name, used verbatim as the VM error message
    pub fn name(&self) -> &'static str {
        match self {
            Self::WrongType { .. } => "WrongType",
            Self::NotConvertible { .. } => "NotConvertible",
            Self::MissingValue { .. } => "MissingValue",
            Self::InvalidEnumTagName { .. } => "InvalidEnumTagName",
            Self::InvalidTagName { .. } => "InvalidTagName",
            Self::TableIsEmpty => "TableIsEmpty",
            Self::TableIsNotEmpty => "TableIsNotEmpty",
            Self::MultipleTags => "MultipleTags",
            Self::OutOfMemory => "OutOfMemory",
            Self::DepthExceeded { .. } => "DepthExceeded",
            Self::BorrowedTemporary => "BorrowedTemporary",
            Self::Runtime { .. } => "Runtime",
            Self::Syntax { .. } => "Syntax",
            Self::Config { .. } => "Config",
        }
    }

    pub fn wrong_type(expected: &'static str, found: &'static str) -> Self {
        Self::WrongType { expected, found }
    }

    pub fn not_convertible(target: &'static str) -> Self {
        Self::NotConvertible { target }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongType { expected, found } => {
                write!(f, "wrong type: expected {}, found {}", expected, found)
            }
            Self::NotConvertible { target } => {
                write!(f, "value is not convertible to {}", target)
            }
            Self::MissingValue { field } => {
                write!(f, "missing value for field '{}'", field)
            }
            Self::InvalidEnumTagName { name } => {
                write!(f, "'{}' is not a variant name of the enum", name)
            }
            Self::InvalidTagName { name } => {
                write!(f, "'{}' is not a variant name of the union", name)
            }
            Self::TableIsEmpty => write!(f, "union table is empty"),
            Self::TableIsNotEmpty => write!(f, "table is not empty"),
            Self::MultipleTags => write!(f, "union table has more than one key"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::DepthExceeded { limit } => {
                write!(f, "nesting deeper than {} levels", limit)
            }
            Self::BorrowedTemporary => {
                write!(f, "cannot borrow a value produced by a metamethod")
            }
            Self::Runtime { message } => write!(f, "runtime error: {}", message),
            Self::Syntax { message } => write!(f, "syntax error: {}", message),
            Self::Config { message } => write!(f, "invalid configuration: {}", message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_variants() {
        assert_eq!(Error::wrong_type("table", "nil").name(), "WrongType");
        assert_eq!(Error::TableIsEmpty.name(), "TableIsEmpty");
        assert_eq!(Error::MissingValue { field: "x" }.name(), "MissingValue");
        assert_eq!(Error::runtime("boom").name(), "Runtime");
    }

    #[test]
    fn display_carries_context() {
        let err = Error::wrong_type("table", "number");
        assert_eq!(err.to_string(), "wrong type: expected table, found number");

        let err = Error::InvalidEnumTagName {
            name: "Purple".to_string(),
        };
        assert!(err.to_string().contains("Purple"));
    }
}
