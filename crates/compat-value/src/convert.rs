use bson::raw::{RawArray, RawBsonRef, RawDocument, RawDocumentBuf};
use bson::Bson;

use crate::document::{Array, Document};
use crate::error::ValueError;
use crate::value::{Binary, Decimal128, Regex, Value};

/// Convert a driver value into its canonical form.
///
/// Composite values recurse in order. The input is never mutated.
pub fn convert(value: &Bson) -> Result<Value, ValueError> {
    Ok(match value {
        Bson::Document(doc) => Value::Document(convert_document(doc)?),
        Bson::Array(arr) => {
            let mut out = Array::with_capacity(arr.len());
            for v in arr {
                out.push(convert(v)?);
            }
            Value::Array(out)
        }

        // scalars, in canonical order
        Bson::Double(f) => Value::Double(*f),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Binary(b) => Value::Binary(Binary {
            subtype: u8::from(b.subtype),
            bytes: b.bytes.clone(),
        }),
        Bson::ObjectId(oid) => Value::ObjectId(oid.bytes()),
        Bson::Boolean(b) => Value::Boolean(*b),
        Bson::DateTime(dt) => Value::DateTime(dt.timestamp_millis()),
        Bson::Null => Value::Null,
        Bson::RegularExpression(re) => Value::Regex(Regex {
            pattern: re.pattern.as_str().to_owned(),
            options: re.options.as_str().to_owned(),
        }),
        Bson::Int32(n) => Value::Int32(*n),
        Bson::Timestamp(ts) => {
            Value::Timestamp((u64::from(ts.time) << 32) | u64::from(ts.increment))
        }
        Bson::Int64(n) => Value::Int64(*n),
        Bson::Decimal128(d) => Value::Decimal128(split_decimal(d.bytes())),

        other => return Err(ValueError::Unsupported(other.element_type())),
    })
}

/// Split little-endian decimal128 bytes into (high, low) halves.
fn split_decimal(bytes: [u8; 16]) -> Decimal128 {
    let mut low = [0u8; 8];
    let mut high = [0u8; 8];
    low.copy_from_slice(&bytes[..8]);
    high.copy_from_slice(&bytes[8..]);
    Decimal128 {
        high: u64::from_le_bytes(high),
        low: u64::from_le_bytes(low),
    }
}

pub fn convert_document(doc: &bson::Document) -> Result<Document, ValueError> {
    let mut out = Document::with_capacity(doc.len());
    for (k, v) in doc {
        out.add(k.as_str(), convert(v)?);
    }
    Ok(out)
}

pub fn convert_documents(docs: &[bson::Document]) -> Result<Vec<Document>, ValueError> {
    docs.iter().map(convert_document).collect()
}

/// Convert a raw document, keeping duplicate field names.
pub fn convert_raw_document(doc: &RawDocument) -> Result<Document, ValueError> {
    let mut out = Document::new();
    for elem in doc.iter() {
        let (key, value) = elem?;
        out.add(key.as_str(), convert_raw(value)?);
    }
    Ok(out)
}

fn convert_raw_array(arr: &RawArray) -> Result<Array, ValueError> {
    let mut out = Array::new();
    for elem in arr {
        out.push(convert_raw(elem?)?);
    }
    Ok(out)
}

fn convert_raw(value: RawBsonRef<'_>) -> Result<Value, ValueError> {
    match value {
        RawBsonRef::Document(d) => Ok(Value::Document(convert_raw_document(d)?)),
        RawBsonRef::Array(a) => Ok(Value::Array(convert_raw_array(a)?)),
        // Scalars share the owned conversion rules.
        scalar => {
            let owned: Bson = scalar.to_owned().try_into()?;
            convert(&owned)
        }
    }
}

/// Types that can be converted into a canonical [`Document`].
///
/// Implemented for [`bson::Document`], [`RawDocument`], [`RawDocumentBuf`] and
/// already canonical documents.
pub trait IntoCanonical {
    fn into_canonical(self) -> Result<Document, ValueError>;
}

impl IntoCanonical for &bson::Document {
    fn into_canonical(self) -> Result<Document, ValueError> {
        convert_document(self)
    }
}

impl IntoCanonical for &RawDocument {
    fn into_canonical(self) -> Result<Document, ValueError> {
        convert_raw_document(self)
    }
}

impl IntoCanonical for &RawDocumentBuf {
    fn into_canonical(self) -> Result<Document, ValueError> {
        convert_raw_document(self)
    }
}

impl IntoCanonical for &Document {
    fn into_canonical(self) -> Result<Document, ValueError> {
        Ok(self.clone())
    }
}
