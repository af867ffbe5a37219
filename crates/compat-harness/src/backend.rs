//! Collaborators the harness drives: the context, the collection handle and
//! its cursors, and the setup that pairs target and reference collections.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bson::{Document, RawDocumentBuf, doc};

use crate::error::HarnessError;
use crate::server_error::ServerError;

// ── Context ─────────────────────────────────────────────────────

/// Cancellation flag plus optional deadline. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context that also expires after `timeout`. An earlier
    /// existing deadline wins. A timeout too large to represent adds no
    /// deadline.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(existing), Some(new)) => Some(existing.min(new)),
            (existing, new) => existing.or(new),
        };
        Self {
            cancelled: Arc::clone(&self.cancelled),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the context is done, if it is.
    pub fn err(&self) -> Option<&'static str> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Some("context canceled");
        }
        match self.deadline {
            Some(d) if Instant::now() >= d => Some("context deadline exceeded"),
            _ => None,
        }
    }
}

// ── Models ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    /// Documents per batch; later batches are fetched with getMore.
    pub batch_size: Option<u32>,
}

impl FindOptions {
    pub fn sorted_by_id() -> Self {
        Self {
            sort: Some(doc! { "_id": 1 }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        document: Document,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
    UpdateOne {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    UpdateMany {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        upsert: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    pub keys: Document,
    pub name: Option<String>,
    pub unique: bool,
}

impl IndexModel {
    pub fn new(keys: Document) -> Self {
        Self {
            keys,
            name: None,
            unique: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    pub inserted_count: i64,
    pub matched_count: i64,
    pub modified_count: i64,
    pub deleted_count: i64,
    pub upserted_count: i64,
}

impl BulkWriteResult {
    pub fn is_empty(&self) -> bool {
        self.inserted_count == 0
            && self.matched_count == 0
            && self.modified_count == 0
            && self.deleted_count == 0
            && self.upserted_count == 0
    }

    pub fn to_document(&self) -> Document {
        doc! {
            "insertedCount": self.inserted_count,
            "matchedCount": self.matched_count,
            "modifiedCount": self.modified_count,
            "deletedCount": self.deleted_count,
            "upsertedCount": self.upserted_count,
        }
    }
}

// ── Driver ──────────────────────────────────────────────────────

/// Server-side cursor handle.
pub trait Cursor: Send {
    /// Server cursor id; zero once exhausted.
    fn id(&self) -> i64;

    /// Next document, issuing getMore as batches run out. Documents stay
    /// raw so that duplicate field names reach the comparison.
    fn next(&mut self, ctx: &Context) -> Result<Option<RawDocumentBuf>, ServerError>;

    fn close(&mut self, ctx: &Context) -> Result<(), ServerError>;
}

/// One collection on one server.
///
/// Replies are returned as raw BSON, exactly as the server sent them.
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    fn run_command(&self, ctx: &Context, command: Document)
    -> Result<RawDocumentBuf, ServerError>;

    fn find(
        &self,
        ctx: &Context,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Box<dyn Cursor>, ServerError>;

    fn aggregate(&self, ctx: &Context, pipeline: &[Document])
    -> Result<Box<dyn Cursor>, ServerError>;

    fn bulk_write(
        &self,
        ctx: &Context,
        models: &[WriteModel],
        ordered: bool,
    ) -> Result<BulkWriteResult, ServerError>;

    /// Returns the names of the created indexes.
    fn create_indexes(
        &self,
        ctx: &Context,
        models: &[IndexModel],
    ) -> Result<Vec<String>, ServerError>;

    fn list_indexes(&self, ctx: &Context) -> Result<Vec<RawDocumentBuf>, ServerError>;
}

// ── Setup ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupOpts {
    /// Named datasets to load, one collection pair per provider.
    pub providers: Vec<String>,
    /// Also pair up a collection that does not exist on either side.
    pub add_nonexistent_collection: bool,
}

/// Paired handles for one scenario. `target[i]` pairs with `compat[i]`.
pub struct CompatSetup {
    pub ctx: Context,
    pub target: Vec<Box<dyn Collection>>,
    pub compat: Vec<Box<dyn Collection>>,
}

pub trait Setup: Send + Sync {
    fn setup(&self, opts: &SetupOpts) -> Result<CompatSetup, HarnessError>;
}
