use std::fmt;

use bson::spec::ElementType;

#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    /// The driver value lies outside the closed canonical type set.
    Unsupported(ElementType),
    Malformed(String),
    /// Order canonicalization would collapse two fields with this name.
    DuplicateField(String),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(t) => write!(f, "unexpected type {t:?}"),
            Self::Malformed(msg) => write!(f, "malformed bson: {msg}"),
            Self::DuplicateField(name) => {
                write!(f, "duplicate field names are not handled: {name:?}")
            }
        }
    }
}

impl std::error::Error for ValueError {}

impl From<bson::error::Error> for ValueError {
    fn from(e: bson::error::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
