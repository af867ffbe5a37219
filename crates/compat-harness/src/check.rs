use compat_value::{Fixer, Outcome, ValueError};
use serde::Serialize;

/// A fatal assertion failure. Ends the current sub-test only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("aborted: {reason}")]
pub struct Abort {
    pub reason: String,
}

impl Abort {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<ValueError> for Abort {
    fn from(e: ValueError) -> Self {
        Self::new(e.to_string())
    }
}

/// Assertion context for one sub-test.
///
/// Non-fatal failures are recorded and logged; the caller keeps going so
/// later assertions can surface more diagnostics.
#[derive(Debug, Clone)]
pub struct Checker {
    reference_target: bool,
    failures: Vec<String>,
    notes: Vec<String>,
}

impl Checker {
    /// `reference_target` is true when the system under test is the
    /// reference implementation itself.
    pub fn new(reference_target: bool) -> Self {
        Self {
            reference_target,
            failures: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn reference_target(&self) -> bool {
        self.reference_target
    }

    pub fn fixer(&self) -> Fixer {
        Fixer::new(self.reference_target)
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.failures.push(message);
    }

    /// Informational output kept alongside failures, e.g. the actual
    /// message hidden by a loose comparison.
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{message}");
        self.notes.push(message);
    }

    /// Record `outcome`, returning whether it passed.
    pub fn check(&mut self, outcome: Outcome) -> bool {
        if outcome.passed {
            return true;
        }
        self.fail(outcome.diff.unwrap_or_else(|| "Not equal".to_string()));
        false
    }

    /// Non-fatal boolean assertion.
    pub fn ensure(&mut self, cond: bool, message: impl Into<String>) -> bool {
        if !cond {
            self.fail(message);
        }
        cond
    }

    /// Fatal boolean assertion.
    pub fn require(&self, cond: bool, reason: impl Into<String>) -> Result<(), Abort> {
        if cond { Ok(()) } else { Err(Abort::new(reason)) }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<String>) {
        (self.failures, self.notes)
    }
}
