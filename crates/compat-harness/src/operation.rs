use bson::{Bson, Document, RawDocumentBuf, doc};
use compat_value::fix::CLUSTER_FIELDS;
use compat_value::{
    Document as CanonicalDocument, Value, ValueError, convert_document, convert_raw_document,
};

use crate::backend::{BulkWriteResult, Collection, Context, FindOptions, IndexModel, WriteModel};
use crate::helpers::{fetch_all, find_all};
use crate::server_error::ServerError;

/// One operation issued identically against the target and the reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Arbitrary command; the collection name is inserted as the value of
    /// the leading `command` field.
    Command { command: String, body: Document },
    Count {
        filter: Document,
        /// Sent as-is so that invalid types reach the server.
        skip: Bson,
        limit: i64,
    },
    Distinct { key: String, filter: Document },
    Find { filter: Document, options: FindOptions },
    /// A trailing `$sort` on `_id` is added unless the pipeline sorts.
    Aggregate { pipeline: Vec<Document> },
    BulkWrite { models: Vec<WriteModel>, ordered: bool },
    FindAndModify { body: Document },
    CreateIndexes { models: Vec<IndexModel> },
    DropIndexes { index: Bson },
}

/// Reply of one operation. Server documents are kept raw.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Document(RawDocumentBuf),
    Documents(Vec<RawDocumentBuf>),
    Bulk(BulkWriteResult),
    IndexNames(Vec<String>),
}

impl Response {
    /// Canonical documents to compare. Duplicate field names in raw replies
    /// are preserved.
    pub fn to_canonical(&self) -> Result<Vec<CanonicalDocument>, ValueError> {
        match self {
            Self::Document(d) => Ok(vec![convert_raw_document(d)?]),
            Self::Documents(docs) => docs.iter().map(|d| convert_raw_document(d)).collect(),
            Self::Bulk(res) => Ok(vec![convert_document(&res.to_document())?]),
            Self::IndexNames(names) => {
                Ok(vec![convert_document(&doc! { "names": names.clone() })?])
            }
        }
    }
}

/// What an operation returned, plus the collection state it left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub response: Response,
    /// Documents sorted by `_id` after a write, or the index list after an
    /// index change. `None` for read-only operations.
    pub state: Option<Vec<RawDocumentBuf>>,
}

impl Operation {
    pub fn name(&self) -> &str {
        match self {
            Self::Command { command, .. } => command,
            Self::Count { .. } => "count",
            Self::Distinct { .. } => "distinct",
            Self::Find { .. } => "find",
            Self::Aggregate { .. } => "aggregate",
            Self::BulkWrite { .. } => "bulkWrite",
            Self::FindAndModify { .. } => "findAndModify",
            Self::CreateIndexes { .. } => "createIndexes",
            Self::DropIndexes { .. } => "dropIndexes",
        }
    }

    pub fn execute(
        &self,
        ctx: &Context,
        coll: &dyn Collection,
    ) -> Result<Observation, ServerError> {
        let name = coll.name();
        let (response, state) = match self {
            Self::Command { command, body } => {
                let mut cmd = Document::new();
                cmd.insert(command.as_str(), name);
                cmd.extend(body.clone());
                (Response::Document(coll.run_command(ctx, cmd)?), None)
            }
            Self::Count {
                filter,
                skip,
                limit,
            } => {
                let cmd = doc! {
                    "count": name,
                    "query": filter.clone(),
                    "skip": skip.clone(),
                    "limit": *limit,
                };
                (Response::Document(coll.run_command(ctx, cmd)?), None)
            }
            Self::Distinct { key, filter } => {
                let cmd = doc! {
                    "distinct": name,
                    "key": key.as_str(),
                    "query": filter.clone(),
                };
                (Response::Document(coll.run_command(ctx, cmd)?), None)
            }
            Self::Find { filter, options } => {
                let cursor = coll.find(ctx, filter, options)?;
                (Response::Documents(fetch_all(ctx, cursor)?), None)
            }
            Self::Aggregate { pipeline } => {
                let cursor = coll.aggregate(ctx, &with_id_sort(pipeline))?;
                (Response::Documents(fetch_all(ctx, cursor)?), None)
            }
            Self::BulkWrite { models, ordered } => {
                let res = coll.bulk_write(ctx, models, *ordered)?;
                (Response::Bulk(res), Some(find_all(ctx, coll)?))
            }
            Self::FindAndModify { body } => {
                let mut cmd = doc! { "findAndModify": name };
                cmd.extend(body.clone());
                let reply = coll.run_command(ctx, cmd)?;
                (Response::Document(reply), Some(find_all(ctx, coll)?))
            }
            Self::CreateIndexes { models } => {
                let names = coll.create_indexes(ctx, models)?;
                (Response::IndexNames(names), Some(coll.list_indexes(ctx)?))
            }
            Self::DropIndexes { index } => {
                let cmd = doc! { "dropIndexes": name, "index": index.clone() };
                let reply = coll.run_command(ctx, cmd)?;
                (Response::Document(reply), Some(coll.list_indexes(ctx)?))
            }
        };
        Ok(Observation { response, state })
    }

    /// Whether `response` counts as a non-empty result for this operation.
    /// A reply that cannot be converted counts as empty.
    pub fn is_non_empty(&self, response: &Response) -> bool {
        let Ok(docs) = response.to_canonical() else {
            return false;
        };
        match (self, response) {
            (Self::Count { .. }, Response::Document(_)) => docs
                .iter()
                .any(|d| d.get("n").and_then(Value::as_f64).is_some_and(|n| n > 0.0)),
            (Self::Distinct { .. }, Response::Document(_)) => docs.iter().any(|d| {
                d.get("values")
                    .and_then(Value::as_array)
                    .is_some_and(|values| !values.is_empty())
            }),
            (Self::Aggregate { .. }, Response::Documents(_)) => {
                docs.iter().any(|d| !d.is_empty())
            }
            (_, Response::Document(_)) => docs.iter().any(|d| {
                d.field_names()
                    .into_iter()
                    .any(|k| k != "ok" && !CLUSTER_FIELDS.contains(&k))
            }),
            (_, Response::Documents(raw)) => !raw.is_empty(),
            (_, Response::Bulk(res)) => !res.is_empty(),
            (_, Response::IndexNames(names)) => !names.is_empty(),
        }
    }
}

/// Results are otherwise ordered differently by the two implementations.
fn with_id_sort(pipeline: &[Document]) -> Vec<Document> {
    let mut out = pipeline.to_vec();
    let sorts = pipeline.iter().any(|stage| stage.contains_key("$sort"));
    if !sorts && !pipeline.is_empty() {
        out.push(doc! { "$sort": { "_id": 1 } });
    }
    out
}
