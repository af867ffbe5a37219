//! Assertions comparing documents and errors produced by the target and the
//! reference implementation.
//!
//! Every function returns `Ok(passed)` for a completed comparison and
//! `Err(Abort)` when no meaningful comparison is possible.

use std::fmt::Debug;

use compat_value::{
    Document, IntoCanonical, Outcome, Value, compare_document_slices, compare_documents,
};

use crate::check::{Abort, Checker};
use crate::server_error::{
    BulkWriteException, CommandError, ServerError, WriteError, WriteException, unset_raw,
};

// ── Documents ───────────────────────────────────────────────────

fn fix_pair(ck: &Checker, expected: &mut Document, actual: &mut Document) -> Result<(), Abort> {
    let fixer = ck.fixer();
    fixer.fix_expected(expected)?;
    fixer.fix_actual(actual)?;
    Ok(())
}

fn fixed_slices<E, A>(
    ck: &Checker,
    expected: &[E],
    actual: &[A],
) -> Result<(Vec<Document>, Vec<Document>), Abort>
where
    for<'a> &'a E: IntoCanonical,
    for<'a> &'a A: IntoCanonical,
{
    let fixer = ck.fixer();
    let mut e = Vec::with_capacity(expected.len());
    for doc in expected {
        let mut doc = doc.into_canonical()?;
        fixer.fix_expected(&mut doc)?;
        e.push(doc);
    }
    let mut a = Vec::with_capacity(actual.len());
    for doc in actual {
        let mut doc = doc.into_canonical()?;
        fixer.fix_actual(&mut doc)?;
        a.push(doc);
    }
    Ok((e, a))
}

/// Compare two documents after conversion and fixing.
pub fn assert_equal_documents<E, A>(ck: &mut Checker, expected: E, actual: A) -> Result<bool, Abort>
where
    E: IntoCanonical,
    A: IntoCanonical,
{
    let mut e = expected.into_canonical()?;
    let mut a = actual.into_canonical()?;
    fix_pair(ck, &mut e, &mut a)?;
    Ok(ck.check(compare_documents(&e, &a)))
}

/// Compare two result sets: equal length first, then element-wise in order.
///
/// Elements may be owned, raw or canonical documents; raw ones keep
/// duplicate field names.
pub fn assert_equal_document_slices<E, A>(
    ck: &mut Checker,
    expected: &[E],
    actual: &[A],
) -> Result<bool, Abort>
where
    for<'a> &'a E: IntoCanonical,
    for<'a> &'a A: IntoCanonical,
{
    let (e, a) = fixed_slices(ck, expected, actual)?;
    Ok(ck.check(compare_document_slices(&e, &a)))
}

/// Like [`assert_equal_document_slices`], but only field names are
/// compared. For replies whose values are not deterministic.
pub fn assert_equal_keys<E, A>(
    ck: &mut Checker,
    expected: &[E],
    actual: &[A],
) -> Result<bool, Abort>
where
    for<'a> &'a E: IntoCanonical,
    for<'a> &'a A: IntoCanonical,
{
    let (e, a) = fixed_slices(ck, expected, actual)?;
    let e: Vec<Document> = e.iter().map(keys_only).collect();
    let a: Vec<Document> = a.iter().map(keys_only).collect();
    Ok(ck.check(compare_document_slices(&e, &a)))
}

fn keys_only(doc: &Document) -> Document {
    doc.iter()
        .map(|(name, value)| {
            let value = match value {
                Value::Document(nested) => Value::Document(keys_only(nested)),
                _ => Value::Null,
            };
            (name.to_string(), value)
        })
        .collect()
}

// ── Errors ──────────────────────────────────────────────────────

fn check_equal<T: PartialEq + Debug>(ck: &mut Checker, expected: &T, actual: &T) -> bool {
    if expected == actual {
        return true;
    }
    ck.check(Outcome::mismatch(
        &format!("{expected:#?}\n"),
        &format!("{actual:#?}\n"),
    ))
}

/// Generic mismatch between values of different shapes.
fn mismatch<E: Debug, A: Debug>(ck: &mut Checker, expected: &E, actual: &A) -> bool {
    ck.check(Outcome::mismatch(
        &format!("{expected:#?}\n"),
        &format!("{actual:#?}\n"),
    ))
}

fn log_messages(ck: &mut Checker, expected: &str, actual: &str) {
    ck.note(format!("expected message: {expected}\nactual message: {actual}"));
}

fn require_no_raw<T>(raw: &Option<T>) -> Result<(), Abort> {
    if raw.is_some() {
        return Err(Abort::new("expected error must not carry a raw payload"));
    }
    Ok(())
}

/// Exact comparison of any two errors, ignoring raw payloads.
///
/// Errors of different kinds cannot be compared and abort.
pub fn assert_equal_error(
    ck: &mut Checker,
    expected: &ServerError,
    actual: &ServerError,
) -> Result<bool, Abort> {
    if expected.kind() != actual.kind() {
        return Err(Abort::new(format!(
            "expected {} ({expected}), actual is {} ({actual})",
            expected.kind(),
            actual.kind()
        )));
    }

    let mut e = expected.clone();
    let mut a = actual.clone();
    unset_raw(&mut e);
    unset_raw(&mut a);

    let passed = check_equal(ck, &e, &a);
    if !passed {
        log_messages(ck, &e.to_string(), &a.to_string());
    }
    Ok(passed)
}

/// `actual` must be a command error equal to `expected`, raw aside.
pub fn assert_equal_command_error(
    ck: &mut Checker,
    expected: &CommandError,
    actual: &ServerError,
) -> Result<bool, Abort> {
    let ServerError::Command(a) = actual else {
        return Ok(mismatch(ck, expected, actual));
    };
    require_no_raw(&expected.raw)?;

    let mut e = expected.clone();
    e.raw = a.raw.clone();
    let passed = check_equal(ck, &e, a);
    if !passed {
        log_messages(ck, &e.message, &a.message);
    }
    Ok(passed)
}

/// Like [`assert_equal_command_error`], but a known rewording of the message
/// is accepted from a non-reference target.
pub fn assert_equal_alt_command_error(
    ck: &mut Checker,
    expected: &CommandError,
    alt_message: &str,
    actual: &ServerError,
) -> Result<bool, Abort> {
    let ServerError::Command(a) = actual else {
        return Ok(mismatch(ck, expected, actual));
    };
    require_no_raw(&expected.raw)?;

    let mut e = expected.clone();
    e.raw = a.raw.clone();
    if ck.reference_target() || alt_message.is_empty() || e == *a {
        let passed = check_equal(ck, &e, a);
        if !passed {
            log_messages(ck, &e.message, &a.message);
        }
        return Ok(passed);
    }

    e.message = alt_message.to_string();
    let passed = check_equal(ck, &e, a);
    if !passed {
        log_messages(ck, &expected.message, &a.message);
    }
    Ok(passed)
}

/// Single write error out of a write exception that must hold exactly one.
fn sole_write_error(actual: &ServerError) -> Option<&WriteError> {
    match actual {
        ServerError::Write(we) if we.write_errors.len() == 1 => we.write_errors.first(),
        _ => None,
    }
}

/// `actual` must be a write exception holding exactly one write error
/// equal to `expected`. Anything else is a plain mismatch.
pub fn assert_equal_write_error(
    ck: &mut Checker,
    expected: &WriteError,
    actual: &ServerError,
) -> Result<bool, Abort> {
    let Some(a) = sole_write_error(actual) else {
        return Ok(mismatch(ck, expected, actual));
    };
    require_no_raw(&expected.raw)?;

    let mut e = expected.clone();
    e.raw = a.raw.clone();
    let passed = check_equal(ck, &e, a);
    if !passed {
        log_messages(ck, &e.message, &a.message);
    }
    Ok(passed)
}

pub fn assert_equal_alt_write_error(
    ck: &mut Checker,
    expected: &WriteError,
    alt_message: &str,
    actual: &ServerError,
) -> Result<bool, Abort> {
    let Some(a) = sole_write_error(actual) else {
        return Ok(mismatch(ck, expected, actual));
    };
    require_no_raw(&expected.raw)?;

    let mut e = expected.clone();
    e.raw = a.raw.clone();
    if ck.reference_target() || alt_message.is_empty() || e == *a {
        let passed = check_equal(ck, &e, a);
        if !passed {
            log_messages(ck, &e.message, &a.message);
        }
        return Ok(passed);
    }

    e.message = alt_message.to_string();
    let passed = check_equal(ck, &e, a);
    if !passed {
        log_messages(ck, &expected.message, &a.message);
    }
    Ok(passed)
}

// ── Loose comparison ────────────────────────────────────────────

fn as_command<'a>(err: &'a ServerError, side: &str) -> Result<&'a CommandError, Abort> {
    match err {
        ServerError::Command(e) => Ok(e),
        other => Err(Abort::new(format!(
            "{side} is {} ({other}), not CommandError",
            other.kind()
        ))),
    }
}

fn as_write<'a>(err: &'a ServerError, side: &str) -> Result<&'a WriteException, Abort> {
    match err {
        ServerError::Write(e) if e.write_errors.len() == 1 => Ok(e),
        ServerError::Write(e) => Err(Abort::new(format!(
            "{side} has {} write errors, expected one",
            e.write_errors.len()
        ))),
        other => Err(Abort::new(format!(
            "{side} is {} ({other}), not WriteException",
            other.kind()
        ))),
    }
}

fn as_bulk<'a>(err: &'a ServerError, side: &str) -> Result<&'a BulkWriteException, Abort> {
    match err {
        ServerError::BulkWrite(e) => Ok(e),
        other => Err(Abort::new(format!(
            "{side} is {} ({other}), not BulkWriteException",
            other.kind()
        ))),
    }
}

/// Both must be command errors that agree on everything but the message.
pub fn assert_matches_command_error(
    ck: &mut Checker,
    expected: &ServerError,
    actual: &ServerError,
) -> Result<bool, Abort> {
    let mut a = as_command(actual, "actual")?.clone();
    let mut e = as_command(expected, "expected")?.clone();
    a.raw = None;
    e.raw = None;

    let actual_message = std::mem::replace(&mut a.message, e.message.clone());
    let passed = check_equal(ck, &e, &a);
    if !passed {
        log_messages(ck, &e.message, &actual_message);
    }
    Ok(passed)
}

/// Both must be write exceptions with exactly one write error; those agree
/// on everything but the message.
pub fn assert_matches_write_error(
    ck: &mut Checker,
    expected: &ServerError,
    actual: &ServerError,
) -> Result<bool, Abort> {
    let mut a = as_write(actual, "actual")?.write_errors[0].clone();
    let mut e = as_write(expected, "expected")?.write_errors[0].clone();
    a.raw = None;
    e.raw = None;

    let actual_message = std::mem::replace(&mut a.message, e.message.clone());
    let passed = check_equal(ck, &e, &a);
    if !passed {
        log_messages(ck, &e.message, &actual_message);
    }
    Ok(passed)
}

/// Both must be bulk write exceptions with the same number of write errors.
/// A length mismatch fails without looking at individual errors.
pub fn assert_matches_bulk_exception(
    ck: &mut Checker,
    expected: &ServerError,
    actual: &ServerError,
) -> Result<bool, Abort> {
    let a = as_bulk(actual, "actual")?;
    let e = as_bulk(expected, "expected")?;

    if a.write_errors.len() != e.write_errors.len() {
        let passed = mismatch(ck, expected, actual);
        log_messages(ck, &bulk_messages(e), &bulk_messages(a));
        return Ok(passed);
    }

    let mut passed = true;
    for (we, expected_we) in a.write_errors.iter().zip(&e.write_errors) {
        let mut fixed = expected_we.clone();
        fixed.error.message = we.error.message.clone();
        fixed.error.raw = we.error.raw.clone();
        if !check_equal(ck, &fixed, we) {
            log_messages(ck, &expected_we.error.message, &we.error.message);
            passed = false;
        }
    }
    Ok(passed)
}

fn bulk_messages(e: &BulkWriteException) -> String {
    let messages: Vec<&str> = e
        .write_errors
        .iter()
        .map(|we| we.error.message.as_str())
        .collect();
    format!("[{}]", messages.join(", "))
}

/// Route to the loose comparator for the kind of `expected`.
pub fn assert_matches_error(
    ck: &mut Checker,
    expected: &ServerError,
    actual: &ServerError,
) -> Result<bool, Abort> {
    match expected {
        ServerError::Command(_) => assert_matches_command_error(ck, expected, actual),
        ServerError::Write(_) => assert_matches_write_error(ck, expected, actual),
        ServerError::BulkWrite(_) => assert_matches_bulk_exception(ck, expected, actual),
        ServerError::Other { message } => Err(Abort::new(format!(
            "unknown error type {message:?}, expected one of [CommandError, WriteException, BulkWriteException]"
        ))),
    }
}
