#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::Mutex;

use bson::{Bson, Document, RawDocumentBuf, Timestamp, doc};
use compat_harness::{
    BulkWriteError, BulkWriteException, BulkWriteResult, Collection, CommandError, CompatSetup,
    Context, Cursor, FindOptions, HarnessConfig, HarnessError, IndexModel, ServerError, Setup,
    SetupOpts, TargetKind, WriteError, WriteModel,
};

pub const DATABASE: &str = "test";
pub const NONEXISTENT: &str = "nonexistent";

/// Which server a fake collection imitates.
///
/// The target answers like a compatible implementation: fields come back in
/// a different order, update counters are 64-bit, some messages are
/// reworded and distinct values come back in reverse order. The reference
/// decorates replies with cluster metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Reference,
    Target,
}

// ── Datasets ────────────────────────────────────────────────────

pub fn provider(name: &str) -> Option<Vec<Document>> {
    match name {
        "values" => Some(vec![
            doc! { "_id": 1, "v": "foo", "n": 1 },
            doc! { "_id": 2, "v": "bar", "n": 2 },
            doc! { "_id": 3, "v": "foo", "n": 3 },
            doc! { "_id": 4, "v": 42, "n": 4 },
        ]),
        "small" => Some(vec![doc! { "_id": 1, "v": "foo" }]),
        _ => None,
    }
}

pub fn config() -> HarnessConfig {
    compat_harness::logging::init("debug");
    HarnessConfig {
        target: TargetKind::Compatible,
        parallelism: 2,
        ..HarnessConfig::default()
    }
}

pub fn values_setup() -> SetupOpts {
    SetupOpts {
        providers: vec!["values".into()],
        add_nonexistent_collection: true,
    }
}

// ── Setup ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FakeSetup {
    /// Return one more target collection than compat collections.
    pub lopsided: bool,
    /// Hand out an already cancelled context.
    pub cancelled: bool,
}

impl Setup for FakeSetup {
    fn setup(&self, opts: &SetupOpts) -> Result<CompatSetup, HarnessError> {
        let mut target: Vec<Box<dyn Collection>> = Vec::new();
        let mut compat: Vec<Box<dyn Collection>> = Vec::new();

        for name in &opts.providers {
            let docs = provider(name)
                .ok_or_else(|| HarnessError::Setup(format!("unknown provider {name:?}")))?;
            target.push(Box::new(FakeCollection::new(name, Flavor::Target, docs.clone())));
            compat.push(Box::new(FakeCollection::new(name, Flavor::Reference, docs)));
        }
        if opts.add_nonexistent_collection {
            target.push(Box::new(FakeCollection::missing(NONEXISTENT, Flavor::Target)));
            compat.push(Box::new(FakeCollection::missing(NONEXISTENT, Flavor::Reference)));
        }
        if self.lopsided {
            target.push(Box::new(FakeCollection::missing("extra", Flavor::Target)));
        }

        let ctx = Context::new();
        if self.cancelled {
            ctx.cancel();
        }
        Ok(CompatSetup {
            ctx,
            target,
            compat,
        })
    }
}

// ── Collection ──────────────────────────────────────────────────

struct State {
    exists: bool,
    docs: Vec<Document>,
    /// (name, keys), `_id_` first.
    indexes: Vec<(String, Document)>,
}

pub struct FakeCollection {
    name: String,
    flavor: Flavor,
    state: Mutex<State>,
}

impl FakeCollection {
    pub fn new(name: &str, flavor: Flavor, docs: Vec<Document>) -> Self {
        Self {
            name: name.to_string(),
            flavor,
            state: Mutex::new(State {
                exists: true,
                docs,
                indexes: vec![("_id_".into(), doc! { "_id": 1 })],
            }),
        }
    }

    pub fn missing(name: &str, flavor: Flavor) -> Self {
        let coll = Self::new(name, flavor, Vec::new());
        coll.state.lock().unwrap().exists = false;
        coll
    }

    fn ns(&self) -> String {
        format!("{DATABASE}.{}", self.name)
    }

    /// Shape a stored or computed document the way this flavor returns it.
    fn present(&self, doc: Document) -> Document {
        match self.flavor {
            Flavor::Reference => doc,
            Flavor::Target => reversed(doc),
        }
    }

    fn reply(&self, mut body: Document) -> Document {
        body.insert("ok", 1.0);
        match self.flavor {
            Flavor::Reference => {
                body.insert(
                    "$clusterTime",
                    doc! { "clusterTime": Timestamp { time: 1, increment: 1 } },
                );
                body.insert("operationTime", Timestamp { time: 1, increment: 1 });
                body
            }
            Flavor::Target => reversed(body),
        }
    }

    fn command_error(&self, code: i32, name: &str, reference: &str, target: &str) -> ServerError {
        let message = match self.flavor {
            Flavor::Reference => reference,
            Flavor::Target => target,
        };
        ServerError::Command(CommandError {
            raw: Some(self.raw_error(code, message)),
            ..CommandError::new(code, name, message)
        })
    }

    fn raw_error(&self, code: i32, message: &str) -> RawDocumentBuf {
        let mut body = doc! { "ok": 0.0, "errmsg": message, "code": code };
        if self.flavor == Flavor::Reference {
            body.insert("operationTime", Timestamp { time: 1, increment: 1 });
        }
        raw(&body)
    }

    /// The target repeats field `a`, which an owned document cannot hold.
    fn duplicate_fields(&self) -> RawDocumentBuf {
        match self.flavor {
            Flavor::Reference => raw(&self.reply(doc! { "a": 1 })),
            Flavor::Target => {
                let mut bytes = vec![0u8; 4];
                for n in [1i32, 2] {
                    bytes.extend_from_slice(b"\x10a\x00");
                    bytes.extend_from_slice(&n.to_le_bytes());
                }
                bytes.extend_from_slice(b"\x01ok\x00");
                bytes.extend_from_slice(&1.0f64.to_le_bytes());
                bytes.push(0);
                let len = bytes.len() as i32;
                bytes[..4].copy_from_slice(&len.to_le_bytes());
                RawDocumentBuf::from_bytes(bytes).unwrap()
            }
        }
    }

    fn count(&self, cmd: &Document) -> Result<Document, ServerError> {
        let filter = cmd.get_document("query").cloned().unwrap_or_default();
        let skip = match cmd.get("skip") {
            None | Some(Bson::Null) => 0,
            Some(Bson::Int32(n)) => i64::from(*n),
            Some(Bson::Int64(n)) => *n,
            Some(Bson::Double(f)) => *f as i64,
            Some(other) => {
                return Err(self.command_error(
                    14,
                    "TypeMismatch",
                    &format!(
                        "BSON field 'count.skip' is the wrong type '{}', expected types '[long, int, decimal, double]'",
                        type_alias(other)
                    ),
                    "skip must be a number",
                ));
            }
        };
        let limit = cmd.get_i64("limit").unwrap_or(0).abs();

        let state = self.state.lock().unwrap();
        let matched = state.docs.iter().filter(|d| matches(d, &filter)).count() as i64;
        let mut n = if skip < 0 { 0 } else { (matched - skip).max(0) };
        if limit > 0 {
            n = n.min(limit);
        }
        Ok(self.reply(doc! { "n": n as i32 }))
    }

    fn distinct(&self, cmd: &Document) -> Result<Document, ServerError> {
        let key = cmd.get_str("key").unwrap_or_default();
        let filter = cmd.get_document("query").cloned().unwrap_or_default();

        let state = self.state.lock().unwrap();
        let mut values: Vec<Bson> = Vec::new();
        for doc in state.docs.iter().filter(|d| matches(d, &filter)) {
            if let Some(v) = doc.get(key) {
                if !values.contains(v) {
                    values.push(v.clone());
                }
            }
        }
        if self.flavor == Flavor::Target {
            values.reverse();
        }
        Ok(self.reply(doc! { "values": values }))
    }

    fn update(&self, cmd: &Document) -> Result<Document, ServerError> {
        let updates = cmd.get_array("updates").cloned().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        let (mut n, mut modified) = (0i64, 0i64);
        for spec in updates.iter().filter_map(Bson::as_document) {
            let filter = spec.get_document("q").cloned().unwrap_or_default();
            let set = spec
                .get_document("u")
                .and_then(|u| u.get_document("$set"))
                .cloned()
                .unwrap_or_default();
            for doc in state.docs.iter_mut().filter(|d| matches(d, &filter)) {
                n += 1;
                if apply_set(doc, &set) {
                    modified += 1;
                }
            }
        }
        drop(state);

        let body = match self.flavor {
            Flavor::Reference => doc! { "n": n as i32, "nModified": modified as i32 },
            Flavor::Target => doc! { "n": n, "nModified": modified },
        };
        Ok(self.reply(body))
    }

    fn find_and_modify(&self, cmd: &Document) -> Result<Document, ServerError> {
        let filter = cmd.get_document("query").cloned().unwrap_or_default();
        let remove = cmd.get_bool("remove").unwrap_or(false);
        if !remove {
            return Err(self.command_error(
                9,
                "FailedToParse",
                "Either an update or remove=true must be specified",
                "Either an update or remove=true must be specified",
            ));
        }

        let mut state = self.state.lock().unwrap();
        let pos = state.docs.iter().position(|d| matches(d, &filter));
        let value = match pos {
            Some(i) => Bson::Document(self.present(state.docs.remove(i))),
            None => Bson::Null,
        };
        let n = i32::from(pos.is_some());
        drop(state);
        Ok(self.reply(doc! { "lastErrorObject": { "n": n }, "value": value }))
    }

    fn drop_indexes(&self, cmd: &Document) -> Result<Document, ServerError> {
        let mut state = self.state.lock().unwrap();
        if !state.exists {
            return Err(self.command_error(
                26,
                "NamespaceNotFound",
                &format!("ns not found {}", self.ns()),
                &format!("ns not found {}", self.ns()),
            ));
        }
        let was = state.indexes.len() as i32;
        match cmd.get("index") {
            Some(Bson::String(s)) if s == "*" => state.indexes.truncate(1),
            Some(Bson::String(name)) => {
                let Some(pos) = state.indexes.iter().position(|(n, _)| n == name) else {
                    return Err(self.command_error(
                        27,
                        "IndexNotFound",
                        &format!("index not found with name [{name}]"),
                        &format!("index {name:?} not found"),
                    ));
                };
                state.indexes.remove(pos);
            }
            _ => {
                return Err(self.command_error(
                    2,
                    "BadValue",
                    "invalid index specification",
                    "invalid index specification",
                ));
            }
        }
        drop(state);
        Ok(self.reply(doc! { "nIndexesWas": was }))
    }
}

impl Collection for FakeCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn run_command(
        &self,
        _ctx: &Context,
        command: Document,
    ) -> Result<RawDocumentBuf, ServerError> {
        let Some(name) = command.keys().next().cloned() else {
            return Err(ServerError::Other {
                message: "empty command".into(),
            });
        };
        let reply = match name.as_str() {
            "count" => self.count(&command),
            "distinct" => self.distinct(&command),
            "update" => self.update(&command),
            "findAndModify" => self.find_and_modify(&command),
            "dropIndexes" => self.drop_indexes(&command),
            "ping" => Ok(self.reply(doc! {})),
            "dupFields" => return Ok(self.duplicate_fields()),
            other => Err(self.command_error(
                59,
                "CommandNotFound",
                &format!("no such command: '{other}'"),
                &format!("no such command: '{other}'"),
            )),
        }?;
        Ok(raw(&reply))
    }

    fn find(
        &self,
        _ctx: &Context,
        filter: &Document,
        options: &FindOptions,
    ) -> Result<Box<dyn Cursor>, ServerError> {
        let state = self.state.lock().unwrap();
        let mut docs: Vec<Document> = state
            .docs
            .iter()
            .filter(|d| matches(d, filter))
            .cloned()
            .collect();
        drop(state);

        if options.sort.is_some() {
            docs.sort_by(|a, b| cmp_ids(a.get("_id"), b.get("_id")));
        }
        let skip = options.skip.unwrap_or(0).max(0) as usize;
        let limit = match options.limit {
            Some(n) if n > 0 => n as usize,
            _ => usize::MAX,
        };
        let docs = docs
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|d| self.present(d))
            .collect();
        Ok(Box::new(FakeCursor::new(docs, options.batch_size)))
    }

    fn aggregate(
        &self,
        _ctx: &Context,
        pipeline: &[Document],
    ) -> Result<Box<dyn Cursor>, ServerError> {
        let state = self.state.lock().unwrap();
        let exists = state.exists;
        let mut docs = state.docs.clone();
        drop(state);

        for (i, stage) in pipeline.iter().enumerate() {
            let Some((name, spec)) = stage.iter().next() else {
                continue;
            };
            match name.as_str() {
                "$collStats" if i == 0 => {
                    docs = match spec {
                        Bson::Null => vec![doc! {}],
                        Bson::Document(opts) => {
                            let mut stats = doc! { "ns": self.ns() };
                            if opts.contains_key("count") {
                                stats.insert("count", docs.len() as i32);
                            }
                            if !exists {
                                stats = doc! {};
                            }
                            vec![stats]
                        }
                        _ => {
                            return Err(self.command_error(
                                5447000,
                                "Location5447000",
                                "$collStats must take a nested object",
                                "$collStats must take a document",
                            ));
                        }
                    };
                }
                "$match" => {
                    let filter = spec.as_document().cloned().unwrap_or_default();
                    docs.retain(|d| matches(d, &filter));
                }
                "$sort" => docs.sort_by(|a, b| cmp_ids(a.get("_id"), b.get("_id"))),
                other => {
                    return Err(self.command_error(
                        40324,
                        "Location40324",
                        &format!("Unrecognized pipeline stage name: '{other}'"),
                        &format!("Unrecognized pipeline stage name: {other:?}"),
                    ));
                }
            }
        }

        let docs = docs.into_iter().map(|d| self.present(d)).collect();
        Ok(Box::new(FakeCursor::new(docs, None)))
    }

    fn bulk_write(
        &self,
        _ctx: &Context,
        models: &[WriteModel],
        ordered: bool,
    ) -> Result<BulkWriteResult, ServerError> {
        let mut state = self.state.lock().unwrap();
        let mut res = BulkWriteResult::default();
        let mut errors = Vec::new();

        for (index, model) in models.iter().enumerate() {
            match model {
                WriteModel::InsertOne { document } => {
                    let id = document.get("_id");
                    if id.is_some() && state.docs.iter().any(|d| d.get("_id") == id) {
                        let message = match self.flavor {
                            Flavor::Reference => format!(
                                "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {} }}",
                                self.ns(),
                                id.map(ToString::to_string).unwrap_or_default()
                            ),
                            Flavor::Target => "E11000 duplicate key error".to_string(),
                        };
                        errors.push(BulkWriteError {
                            error: WriteError {
                                raw: Some(self.raw_error(11000, &message)),
                                ..WriteError::new(index, 11000, message)
                            },
                            request: Some(model.clone()),
                        });
                        if ordered {
                            break;
                        }
                        continue;
                    }
                    state.exists = true;
                    state.docs.push(document.clone());
                    res.inserted_count += 1;
                }
                WriteModel::DeleteOne { filter } => {
                    if let Some(pos) = state.docs.iter().position(|d| matches(d, filter)) {
                        state.docs.remove(pos);
                        res.deleted_count += 1;
                    }
                }
                WriteModel::DeleteMany { filter } => {
                    let before = state.docs.len();
                    state.docs.retain(|d| !matches(d, filter));
                    res.deleted_count += (before - state.docs.len()) as i64;
                }
                WriteModel::UpdateOne { filter, update, .. } => {
                    let set = update.get_document("$set").cloned().unwrap_or_default();
                    if let Some(doc) = state.docs.iter_mut().find(|d| matches(d, filter)) {
                        res.matched_count += 1;
                        if apply_set(doc, &set) {
                            res.modified_count += 1;
                        }
                    }
                }
                WriteModel::UpdateMany { filter, update, .. } => {
                    let set = update.get_document("$set").cloned().unwrap_or_default();
                    for doc in state.docs.iter_mut().filter(|d| matches(d, filter)) {
                        res.matched_count += 1;
                        if apply_set(doc, &set) {
                            res.modified_count += 1;
                        }
                    }
                }
                WriteModel::ReplaceOne {
                    filter,
                    replacement,
                    ..
                } => {
                    if let Some(doc) = state.docs.iter_mut().find(|d| matches(d, filter)) {
                        res.matched_count += 1;
                        let mut next = doc! { "_id": doc.get("_id").cloned().unwrap_or(Bson::Null) };
                        next.extend(replacement.clone());
                        if *doc != next {
                            *doc = next;
                            res.modified_count += 1;
                        }
                    }
                }
            }
        }

        if errors.is_empty() {
            return Ok(res);
        }
        Err(ServerError::BulkWrite(BulkWriteException {
            write_errors: errors,
            write_concern_error: None,
            labels: Vec::new(),
        }))
    }

    fn create_indexes(
        &self,
        _ctx: &Context,
        models: &[IndexModel],
    ) -> Result<Vec<String>, ServerError> {
        if models.is_empty() {
            return Err(self.command_error(
                2,
                "BadValue",
                "Must specify at least one index to create",
                "Must specify at least one index to create",
            ));
        }

        let mut state = self.state.lock().unwrap();
        let mut pending = state.indexes.clone();
        let mut names = Vec::new();
        for model in models {
            let name = model.name.clone().unwrap_or_else(|| default_index_name(&model.keys));
            if let Some((existing, _)) = pending
                .iter()
                .find(|(n, keys)| *keys == model.keys && *n != name)
            {
                return Err(self.command_error(
                    85,
                    "IndexOptionsConflict",
                    &format!("Index already exists with a different name: {existing}"),
                    &format!("Index already exists with different name: {existing}"),
                ));
            }
            if let Some((_, keys)) = pending.iter().find(|(n, _)| *n == name) {
                if *keys != model.keys {
                    return Err(self.command_error(
                        86,
                        "IndexKeySpecsConflict",
                        &format!("An existing index has the same name as the requested index: {name}"),
                        &format!("Index with name {name} already exists with different key specs"),
                    ));
                }
                continue;
            }
            pending.push((name.clone(), model.keys.clone()));
            names.push(name);
        }

        state.exists = true;
        state.indexes = pending;
        Ok(names)
    }

    fn list_indexes(&self, _ctx: &Context) -> Result<Vec<RawDocumentBuf>, ServerError> {
        let state = self.state.lock().unwrap();
        if !state.exists {
            return Err(self.command_error(
                26,
                "NamespaceNotFound",
                &format!("ns does not exist: {}", self.ns()),
                &format!("ns does not exist: {}", self.ns()),
            ));
        }
        Ok(state
            .indexes
            .iter()
            .map(|(name, keys)| {
                raw(&self.present(doc! { "v": 2, "key": keys.clone(), "name": name.as_str() }))
            })
            .collect())
    }
}

// ── Cursor ──────────────────────────────────────────────────────

/// Serves documents in batches; the id stays non-zero until drained.
pub struct FakeCursor {
    docs: std::vec::IntoIter<RawDocumentBuf>,
    batch_size: usize,
    served_in_batch: usize,
    batches: usize,
    closed: bool,
}

impl FakeCursor {
    pub fn new(docs: Vec<Document>, batch_size: Option<u32>) -> Self {
        Self {
            docs: docs.iter().map(raw).collect::<Vec<_>>().into_iter(),
            batch_size: batch_size.map_or(usize::MAX, |n| n.max(1) as usize),
            served_in_batch: 0,
            batches: 1,
            closed: false,
        }
    }
}

impl Cursor for FakeCursor {
    fn id(&self) -> i64 {
        if self.closed || self.docs.len() == 0 {
            0
        } else {
            42
        }
    }

    fn next(&mut self, _ctx: &Context) -> Result<Option<RawDocumentBuf>, ServerError> {
        if self.closed {
            return Err(ServerError::Other {
                message: "cursor is closed".into(),
            });
        }
        if self.served_in_batch == self.batch_size {
            // getMore
            self.batches += 1;
            self.served_in_batch = 0;
        }
        let next = self.docs.next();
        if next.is_some() {
            self.served_in_batch += 1;
        }
        Ok(next)
    }

    fn close(&mut self, _ctx: &Context) -> Result<(), ServerError> {
        self.closed = true;
        Ok(())
    }
}

// ── Document helpers ────────────────────────────────────────────

pub fn raw(doc: &Document) -> RawDocumentBuf {
    RawDocumentBuf::try_from(doc).unwrap()
}

fn reversed(doc: Document) -> Document {
    let mut fields: Vec<(String, Bson)> = doc.into_iter().collect();
    fields.reverse();
    fields.into_iter().collect()
}

/// Equality-only filter: every field must match exactly.
fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

fn apply_set(doc: &mut Document, set: &Document) -> bool {
    let mut changed = false;
    for (k, v) in set {
        if doc.get(k) != Some(v) {
            doc.insert(k.clone(), v.clone());
            changed = true;
        }
    }
    changed
}

fn cmp_ids(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    fn rank(v: Option<&Bson>) -> (u8, i64, String) {
        match v {
            Some(Bson::Int32(n)) => (1, i64::from(*n), String::new()),
            Some(Bson::Int64(n)) => (1, *n, String::new()),
            Some(Bson::String(s)) => (2, 0, s.clone()),
            Some(other) => (3, 0, other.to_string()),
            None => (0, 0, String::new()),
        }
    }
    rank(a).cmp(&rank(b))
}

fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(k, v)| format!("{k}_{v}"))
        .collect::<Vec<_>>()
        .join("_")
}

fn type_alias(v: &Bson) -> &'static str {
    match v {
        Bson::String(_) => "string",
        Bson::Boolean(_) => "bool",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        _ => "other",
    }
}
