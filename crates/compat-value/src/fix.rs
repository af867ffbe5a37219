//! Rewrites applied to canonical documents before they are compared.
//!
//! Every pass is idempotent and is a no-op on documents that lack the
//! fields it targets.

use crate::document::Document;
use crate::error::ValueError;
use crate::value::Value;

/// Fields that only exist on replicated or sharded deployments.
pub const CLUSTER_FIELDS: [&str; 5] = [
    "$clusterTime",
    "electionId",
    "operationTime",
    "opTime",
    "commitQuorum",
];

/// Presence of any of these marks a document as an update reply.
pub const UPDATE_MARKER_FIELDS: [&str; 3] = ["nMatched", "nModified", "nUpserted"];

/// Counters narrowed to 32 bits on update replies.
///
/// This is a narrow accommodation for a known integer width difference in
/// update replies, not a general numeric normalization.
pub const UPDATE_COUNTER_FIELDS: [&str; 4] = ["nMatched", "nModified", "nUpserted", "n"];

/// Applies the fix passes for one comparison.
///
/// When the target is the reference implementation itself, its field order
/// and integer widths are ground truth and only cluster fields are stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixer {
    reference_target: bool,
}

impl Fixer {
    pub fn new(reference_target: bool) -> Self {
        Self { reference_target }
    }

    pub fn reference_target(&self) -> bool {
        self.reference_target
    }

    /// Fixes for the expected (reference) side.
    pub fn fix_expected(&self, expected: &mut Document) -> Result<(), ValueError> {
        strip_cluster_fields(expected);
        if !self.reference_target {
            sort_fields(expected)?;
        }
        Ok(())
    }

    /// Fixes for the actual (target) side.
    pub fn fix_actual(&self, actual: &mut Document) -> Result<(), ValueError> {
        strip_cluster_fields(actual);
        if !self.reference_target {
            sort_fields(actual)?;
            narrow_update_counters(actual);
        }
        Ok(())
    }
}

pub fn strip_cluster_fields(doc: &mut Document) {
    for name in CLUSTER_FIELDS {
        doc.remove(name);
    }
}

/// Sort field names lexicographically, recursing into nested documents.
///
/// Arrays are left untouched, including documents inside them.
pub fn sort_fields(doc: &mut Document) -> Result<(), ValueError> {
    let mut names: Vec<&str> = doc.field_names();
    names.sort_unstable();
    if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
        return Err(ValueError::DuplicateField(dup[0].to_owned()));
    }

    let fields = doc.fields_mut();
    for (_, value) in fields.iter_mut() {
        if let Value::Document(nested) = value {
            sort_fields(nested)?;
        }
    }
    fields.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(())
}

/// Replace `Int64` update counters with `Int32` values.
///
/// Only applies to documents carrying at least one of
/// [`UPDATE_MARKER_FIELDS`], so generic replies that merely contain `n`
/// are left alone. Values outside the `i32` range are kept as they are.
pub fn narrow_update_counters(doc: &mut Document) {
    if !UPDATE_MARKER_FIELDS.iter().any(|f| doc.contains(f)) {
        return;
    }

    for name in UPDATE_COUNTER_FIELDS {
        let narrowed = match doc.get(name) {
            Some(Value::Int64(n)) => i32::try_from(*n).ok(),
            _ => None,
        };
        if let Some(n) = narrowed {
            doc.replace(name, Value::Int32(n));
        }
    }
}
