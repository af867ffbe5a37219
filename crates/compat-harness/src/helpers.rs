use bson::{Document, RawDocumentBuf, doc};
use compat_value::{IntoCanonical, Value};

use crate::backend::{Collection, Context, Cursor, FindOptions};
use crate::check::Abort;
use crate::server_error::ServerError;

/// Drain `cursor` and close it. The cursor is closed even when iteration
/// fails; an iteration error takes precedence over a close error.
pub fn fetch_all(
    ctx: &Context,
    mut cursor: Box<dyn Cursor>,
) -> Result<Vec<RawDocumentBuf>, ServerError> {
    let mut docs = Vec::new();
    let drained = loop {
        match cursor.next(ctx) {
            Ok(Some(doc)) => docs.push(doc),
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    let closed = cursor.close(ctx);
    drained?;
    closed?;
    Ok(docs)
}

/// Documents matching `filter`, sorted by `_id`.
pub fn filter_all(
    ctx: &Context,
    coll: &dyn Collection,
    filter: &Document,
) -> Result<Vec<RawDocumentBuf>, ServerError> {
    let cursor = coll.find(ctx, filter, &FindOptions::sorted_by_id())?;
    fetch_all(ctx, cursor)
}

/// Every document in the collection, sorted by `_id`.
pub fn find_all(
    ctx: &Context,
    coll: &dyn Collection,
) -> Result<Vec<RawDocumentBuf>, ServerError> {
    filter_all(ctx, coll, &doc! {})
}

/// `_id` of each document, in order. A document without `_id` aborts.
pub fn collect_ids<D>(docs: &[D]) -> Result<Vec<Value>, Abort>
where
    for<'a> &'a D: IntoCanonical,
{
    let mut ids = Vec::with_capacity(docs.len());
    for doc in docs {
        let doc = doc.into_canonical()?;
        let Some(id) = doc.get("_id") else {
            return Err(Abort::new(format!(
                "document without _id: {}",
                doc.dump().trim_end()
            )));
        };
        ids.push(id.clone());
    }
    Ok(ids)
}

/// Field names of `doc` in order, duplicates included.
pub fn collect_keys<D: IntoCanonical>(doc: D) -> Result<Vec<String>, Abort> {
    let doc = doc.into_canonical()?;
    Ok(doc.field_names().into_iter().map(str::to_string).collect())
}

/// `{_id: i}` for every `i` in `[start, end)`.
pub fn generate_documents(start: i32, end: i32) -> Vec<Document> {
    (start..end).map(|i| doc! { "_id": i }).collect()
}
