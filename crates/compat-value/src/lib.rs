//! Canonical document model used to compare replies from two servers.
//!
//! Driver values are converted into [`Value`] / [`Document`], rewritten by a
//! [`Fixer`], and compared with [`compare_documents`] and friends.

mod convert;
mod diff;
mod document;
mod error;
pub mod fix;
mod value;

pub use convert::{
    IntoCanonical, convert, convert_document, convert_documents, convert_raw_document,
};
pub use diff::{Outcome, compare_document_slices, compare_documents, compare_values, unified};
pub use document::{Array, Document};
pub use error::ValueError;
pub use fix::Fixer;
pub use value::{Binary, Decimal128, Regex, Value};

pub use bson;
