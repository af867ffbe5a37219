use std::fmt;

use bson::{Document, RawDocumentBuf};

use crate::backend::WriteModel;

/// Failure reported by a server, or by the client while talking to it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Write(#[from] WriteException),
    #[error(transparent)]
    BulkWrite(#[from] BulkWriteException),
    /// Transport and decoding failures. These have no comparator.
    #[error("{message}")]
    Other { message: String },
}

impl ServerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "CommandError",
            Self::Write(_) => "WriteException",
            Self::BulkWrite(_) => "BulkWriteException",
            Self::Other { .. } => "Other",
        }
    }
}

/// Top-level failure of a single command.
#[derive(Debug, Clone, Default, PartialEq, thiserror::Error)]
#[error("({name}) {message}")]
pub struct CommandError {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub labels: Vec<String>,
    /// Server reply the error was decoded from. Never compared.
    pub raw: Option<RawDocumentBuf>,
}

impl CommandError {
    pub fn new(code: i32, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteError {
    /// Position of the failing write within the request.
    pub index: usize,
    pub code: i32,
    pub message: String,
    pub details: Option<Document>,
    pub raw: Option<RawDocumentBuf>,
}

impl WriteError {
    pub fn new(index: usize, code: i32, message: impl Into<String>) -> Self {
        Self {
            index,
            code,
            message: message.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteConcernError {
    pub name: String,
    pub code: i32,
    pub message: String,
    pub details: Option<Document>,
    pub raw: Option<RawDocumentBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteException {
    pub write_errors: Vec<WriteError>,
    pub write_concern_error: Option<WriteConcernError>,
    pub labels: Vec<String>,
    pub raw: Option<RawDocumentBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkWriteError {
    pub error: WriteError,
    /// The write model that failed, when known.
    pub request: Option<WriteModel>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteException {
    pub write_errors: Vec<BulkWriteError>,
    pub write_concern_error: Option<WriteConcernError>,
    pub labels: Vec<String>,
}

fn write_summary<'a>(
    f: &mut fmt::Formatter<'_>,
    prefix: &str,
    messages: impl Iterator<Item = &'a str>,
    concern: Option<&WriteConcernError>,
) -> fmt::Result {
    write!(f, "{prefix}: ")?;
    let messages: Vec<&str> = messages.collect();
    if !messages.is_empty() {
        write!(f, "write errors: [{}]", messages.join(", "))?;
    }
    if let Some(wce) = concern {
        if !messages.is_empty() {
            write!(f, ", ")?;
        }
        write!(f, "write concern error: ({}) {}", wce.name, wce.message)?;
    }
    Ok(())
}

impl fmt::Display for WriteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_summary(
            f,
            "write exception",
            self.write_errors.iter().map(|e| e.message.as_str()),
            self.write_concern_error.as_ref(),
        )
    }
}

impl std::error::Error for WriteException {}

impl fmt::Display for BulkWriteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_summary(
            f,
            "bulk write exception",
            self.write_errors.iter().map(|e| e.error.message.as_str()),
            self.write_concern_error.as_ref(),
        )
    }
}

impl std::error::Error for BulkWriteException {}

// ── Raw payload ─────────────────────────────────────────────────

/// Clear every opaque payload in `err`, including nested write and
/// write-concern errors.
pub fn unset_raw(err: &mut ServerError) {
    match err {
        ServerError::Command(e) => e.raw = None,
        ServerError::Write(e) => {
            e.raw = None;
            for we in &mut e.write_errors {
                we.raw = None;
            }
            if let Some(wce) = &mut e.write_concern_error {
                wce.raw = None;
            }
        }
        ServerError::BulkWrite(e) => {
            for we in &mut e.write_errors {
                we.error.raw = None;
            }
            if let Some(wce) = &mut e.write_concern_error {
                wce.raw = None;
            }
        }
        ServerError::Other { .. } => {}
    }
}
