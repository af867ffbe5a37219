use std::fmt::Write as _;

use crate::document::{Array, Document};

/// A canonical value.
///
/// Mirrors the closed value model of the wire protocol under test. There is
/// no generic map variant: anything outside this set is rejected during
/// conversion.
#[derive(Debug, Clone)]
pub enum Value {
    Double(f64),
    String(String),
    Binary(Binary),
    ObjectId([u8; 12]),
    Boolean(bool),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Null,
    Regex(Regex),
    Int32(i32),
    /// Replication timestamp: seconds in the high 32 bits, ordinal in the low 32.
    Timestamp(u64),
    Int64(i64),
    Decimal128(Decimal128),
    Document(Document),
    Array(Array),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regex {
    pub pattern: String,
    pub options: String,
}

/// A 128-bit decimal kept as its two raw 64-bit halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal128 {
    pub high: u64,
    pub low: u64,
}

impl Value {
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Numeric view used for counters; `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(f) => Some(*f),
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Indented, type-revealing rendering used in failure output.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        write_value(&mut out, self, 0);
        out.push('\n');
        out
    }
}

/// Test-oriented equality:
/// - double NaNs are equal to each other;
/// - double zeros are compared with their sign;
/// - no conversion between numeric types is attempted.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => {
                if a.is_nan() {
                    return b.is_nan();
                }
                if *a == 0.0 && *b == 0.0 {
                    return a.is_sign_negative() == b.is_sign_negative();
                }
                a == b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::ObjectId(a), Value::ObjectId(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Regex(a), Value::Regex(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Decimal128(a), Value::Decimal128(b)) => a == b,
            (Value::Document(a), Value::Document(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Document> for Value {
    fn from(d: Document) -> Self {
        Value::Document(d)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

// ── Rendering ───────────────────────────────────────────────

const INDENT: &str = "  ";

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

pub(crate) fn write_document(out: &mut String, doc: &Document, depth: usize) {
    if doc.is_empty() {
        out.push_str("{}");
        return;
    }
    out.push_str("{\n");
    for (name, value) in doc.iter() {
        write_indent(out, depth + 1);
        let _ = write!(out, "{name:?}: ");
        write_value(out, value, depth + 1);
        out.push_str(",\n");
    }
    write_indent(out, depth);
    out.push('}');
}

pub(crate) fn write_array(out: &mut String, arr: &Array, depth: usize) {
    if arr.is_empty() {
        out.push_str("[]");
        return;
    }
    out.push_str("[\n");
    for value in arr.iter() {
        write_indent(out, depth + 1);
        write_value(out, value, depth + 1);
        out.push_str(",\n");
    }
    write_indent(out, depth);
    out.push(']');
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Double(f) if f.is_nan() => out.push_str("NaN"),
        Value::Double(f) => {
            let _ = write!(out, "{f:?}");
        }
        Value::String(s) => {
            let _ = write!(out, "{s:?}");
        }
        Value::Binary(b) => {
            let _ = write!(out, "Binary({}:{})", b.subtype, hex(&b.bytes));
        }
        Value::ObjectId(oid) => {
            let _ = write!(out, "ObjectId({})", hex(oid));
        }
        Value::Boolean(b) => {
            let _ = write!(out, "{b}");
        }
        Value::DateTime(ms) => {
            let _ = write!(out, "DateTime({ms})");
        }
        Value::Null => out.push_str("null"),
        Value::Regex(r) => {
            let _ = write!(out, "/{}/{}", r.pattern, r.options);
        }
        Value::Int32(n) => {
            let _ = write!(out, "{n}");
        }
        Value::Timestamp(ts) => {
            let _ = write!(out, "Timestamp({}, {})", ts >> 32, ts & 0xffff_ffff);
        }
        Value::Int64(n) => {
            let _ = write!(out, "int64({n})");
        }
        Value::Decimal128(d) => {
            let _ = write!(out, "Decimal128({:#018x}, {:#018x})", d.high, d.low);
        }
        Value::Document(d) => write_document(out, d, depth),
        Value::Array(a) => write_array(out, a, depth),
    }
}
