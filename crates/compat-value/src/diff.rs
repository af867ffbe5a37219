use std::fmt::Write as _;

use serde::Serialize;

use crate::document::{Array, Document};
use crate::value::Value;

/// Lines of context kept around each change.
const CONTEXT: usize = 1;

/// Result of one comparison: pass/fail plus a readable diff on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub passed: bool,
    pub diff: Option<String>,
}

impl Outcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            diff: None,
        }
    }

    /// Failure carrying both renderings and their unified diff.
    pub fn mismatch(expected: &str, actual: &str) -> Self {
        Self {
            passed: false,
            diff: Some(format!(
                "Not equal: \nexpected: {expected}\nactual  : {actual}\n{}",
                unified(expected, actual)
            )),
        }
    }
}

pub fn compare_values(expected: &Value, actual: &Value) -> Outcome {
    if expected == actual {
        return Outcome::pass();
    }
    Outcome::mismatch(&expected.dump(), &actual.dump())
}

pub fn compare_documents(expected: &Document, actual: &Document) -> Outcome {
    if expected == actual {
        return Outcome::pass();
    }
    Outcome::mismatch(&expected.dump(), &actual.dump())
}

/// Compares lengths first, then elements in order.
pub fn compare_document_slices(expected: &[Document], actual: &[Document]) -> Outcome {
    if expected.len() == actual.len() && expected.iter().zip(actual).all(|(e, a)| e == a) {
        return Outcome::pass();
    }
    Outcome::mismatch(&dump_slice(expected), &dump_slice(actual))
}

fn dump_slice(docs: &[Document]) -> String {
    let arr: Array = docs.iter().cloned().map(Value::Document).collect();
    arr.dump()
}

// ── Unified diff ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

/// Line-level unified diff between two texts.
///
/// Returns an empty string when the texts are identical.
pub fn unified(expected: &str, actual: &str) -> String {
    let a: Vec<&str> = expected.lines().collect();
    let b: Vec<&str> = actual.lines().collect();
    let ops = edit_script(&a, &b);

    if ops.iter().all(|(op, _, _)| *op == Op::Equal) {
        return String::new();
    }

    let mut out = String::from("--- expected\n+++ actual\n");
    let changes: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, (op, _, _))| *op != Op::Equal)
        .map(|(i, _)| i)
        .collect();

    let mut i = 0;
    while i < changes.len() {
        let start = changes[i].saturating_sub(CONTEXT);
        let mut end = (changes[i] + CONTEXT + 1).min(ops.len());
        i += 1;
        while i < changes.len() && changes[i].saturating_sub(CONTEXT) <= end {
            end = (changes[i] + CONTEXT + 1).min(ops.len());
            i += 1;
        }
        write_hunk(&mut out, &ops[start..end], &a, &b);
    }
    out
}

/// Each entry is (op, position in `a`, position in `b`) before the op applies.
fn edit_script(a: &[&str], b: &[&str]) -> Vec<(Op, usize, usize)> {
    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        if i < a.len() && j < b.len() && a[i] == b[j] {
            ops.push((Op::Equal, i, j));
            i += 1;
            j += 1;
        } else if i < a.len() && (j == b.len() || lcs[i + 1][j] >= lcs[i][j + 1]) {
            ops.push((Op::Delete, i, j));
            i += 1;
        } else {
            ops.push((Op::Insert, i, j));
            j += 1;
        }
    }
    ops
}

fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{len}", start + 1),
    }
}

fn write_hunk(out: &mut String, ops: &[(Op, usize, usize)], a: &[&str], b: &[&str]) {
    let (_, a_start, b_start) = ops[0];
    let a_len = ops.iter().filter(|(op, _, _)| *op != Op::Insert).count();
    let b_len = ops.iter().filter(|(op, _, _)| *op != Op::Delete).count();

    let _ = writeln!(
        out,
        "@@ -{} +{} @@",
        format_range(a_start, a_len),
        format_range(b_start, b_len)
    );
    for &(op, i, j) in ops {
        let _ = match op {
            Op::Equal => writeln!(out, " {}", a[i]),
            Op::Delete => writeln!(out, "-{}", a[i]),
            Op::Insert => writeln!(out, "+{}", b[j]),
        };
    }
}
