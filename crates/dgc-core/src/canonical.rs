//! Canonical JSON (RFC 8785) for deterministic hashing.
//!
//! Every hash in the DGC backbone — payload hashes, proof hashes, event
//! hashes, idempotency request hashes — is computed over canonical JSON so
//! that independently serializing services agree byte-for-byte.
//!
//! Canonicalization here always starts from parsed data: either a
//! `serde_json::Value` (idempotency hashing of request bodies) or a typed
//! struct serialized through serde (`canonical_json_of`). Because hashing
//! never runs over raw text, duplicate object keys cannot reach the
//! canonicalizer; the JSON parser has already collapsed them.
//!
//! The output discipline:
//!
//! - object members in lexicographic key order, no whitespace
//! - amounts travel as strings, so numbers are restricted to integers in
//!   the `i64` range; anything else fails rather than hash ambiguously
//! - strings must already be Unicode NFC, and escape only `"`, `\`, and
//!   the C0 control range (short escapes where JSON defines them)
//! - nesting is capped at [`MAX_DEPTH`] levels
//!
//! `canonicalize_value` is idempotent: parsing its output and
//! canonicalizing again reproduces the same bytes.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Maximum nesting depth accepted by the canonicalizer.
pub const MAX_DEPTH: usize = 128;

/// How much of an offending string an error message carries.
const SAMPLE_LEN: usize = 40;

/// Errors produced by canonicalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// A number that is not an integer in the `i64` range. Gram amounts and
    /// prices travel as strings; the only numbers left in hashed payloads
    /// are counters and codes, which must stay integral.
    #[error("non-integer number '{repr}' cannot be canonicalized")]
    NonIntegerNumber {
        /// Textual form of the rejected number.
        repr: String,
    },

    /// A string that is not Unicode NFC normalized.
    #[error("string '{sample}' is not NFC normalized")]
    NonNfcString {
        /// Leading characters of the offending string.
        sample: String,
    },

    /// Nesting beyond [`MAX_DEPTH`] levels.
    #[error("nesting exceeds the {MAX_DEPTH}-level canonicalization limit")]
    TooDeep,

    /// The value could not be serialized to JSON at all.
    #[error("serialization failed: {message}")]
    Serialize {
        /// Description of the serde failure.
        message: String,
    },
}

/// Renders a parsed JSON value in canonical form.
///
/// # Errors
///
/// Returns [`CanonicalError`] on non-integer numbers, non-NFC strings, or
/// excessive nesting.
pub fn canonicalize_value(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    write_canonical(&mut out, value, MAX_DEPTH)?;
    Ok(out)
}

/// Serializes a value with serde and renders the result canonically.
///
/// # Errors
///
/// Returns [`CanonicalError::Serialize`] when serde serialization fails,
/// plus the constraint errors of [`canonicalize_value`].
pub fn canonical_json_of<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let json = serde_json::to_value(value).map_err(|e| CanonicalError::Serialize {
        message: e.to_string(),
    })?;
    canonicalize_value(&json)
}

/// Single-pass render: constraints are checked as output is produced, so an
/// invalid value never yields partial canonical bytes to a caller.
///
/// `budget` counts remaining depth and hits zero one level past
/// [`MAX_DEPTH`].
fn write_canonical(out: &mut String, value: &Value, budget: usize) -> Result<(), CanonicalError> {
    if budget == 0 {
        return Err(CanonicalError::TooDeep);
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => write_integer(out, number)?,
        Value::String(text) => write_text(out, text)?,
        Value::Array(items) => {
            out.push('[');
            let mut first = true;
            for item in items {
                if !first {
                    out.push(',');
                }
                first = false;
                write_canonical(out, item, budget - 1)?;
            }
            out.push(']');
        },
        Value::Object(members) => {
            // Sort the member pairs rather than trusting the map's own
            // iteration order; serde_json's ordering is a feature flag away
            // from changing underneath us.
            let mut entries: Vec<(&String, &Value)> = members.iter().collect();
            entries.sort_unstable_by(|left, right| left.0.cmp(right.0));

            out.push('{');
            let mut first = true;
            for (key, member) in entries {
                if !first {
                    out.push(',');
                }
                first = false;
                write_text(out, key)?;
                out.push(':');
                write_canonical(out, member, budget - 1)?;
            }
            out.push('}');
        },
    }
    Ok(())
}

/// Accepts exactly the integers representable in an `i64`; everything else
/// (floats, big unsigned values) is rejected with its textual form.
fn write_integer(out: &mut String, number: &Number) -> Result<(), CanonicalError> {
    match number.as_i64() {
        Some(value) => {
            let _ = write!(out, "{value}");
            Ok(())
        },
        None => Err(CanonicalError::NonIntegerNumber {
            repr: number.to_string(),
        }),
    }
}

/// Emits a string with RFC 8785 minimal escaping after confirming it is
/// already NFC. U+007F and the C1 range pass through unescaped.
fn write_text(out: &mut String, text: &str) -> Result<(), CanonicalError> {
    // Compare the NFC stream against the original without allocating a
    // normalized copy.
    if !text.nfc().eq(text.chars()) {
        return Err(CanonicalError::NonNfcString {
            sample: text.chars().take(SAMPLE_LEN).collect(),
        });
    }

    out.push('"');
    for ch in text.chars() {
        match ch as u32 {
            0x22 => out.push_str("\\\""),
            0x5c => out.push_str("\\\\"),
            code @ 0x00..=0x1f => {
                // JSON's short escapes for the C0 range, \uXXXX otherwise.
                match code {
                    0x08 => out.push_str("\\b"),
                    0x09 => out.push_str("\\t"),
                    0x0a => out.push_str("\\n"),
                    0x0c => out.push_str("\\f"),
                    0x0d => out.push_str("\\r"),
                    other => {
                        let _ = write!(out, "\\u{other:04x}");
                    },
                }
            },
            _ => out.push(ch),
        }
    }
    out.push('"');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(text: &str) -> Result<String, CanonicalError> {
        let value: Value = serde_json::from_str(text).expect("test input parses");
        canonicalize_value(&value)
    }

    #[test]
    fn members_emit_in_key_order_without_whitespace() {
        assert_eq!(
            canonical(r#"{ "z": 1, "a": 2, "m": 3 }"#).unwrap(),
            r#"{"a":2,"m":3,"z":1}"#
        );
        assert_eq!(
            canonical(r#"{"outer": {"z": 1, "a": 2}}"#).unwrap(),
            r#"{"outer":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn arrays_keep_element_order() {
        assert_eq!(canonical("[3, 1, 2]").unwrap(), "[3,1,2]");
    }

    #[test]
    fn scalars() {
        assert_eq!(canonical("null").unwrap(), "null");
        assert_eq!(canonical("true").unwrap(), "true");
        assert_eq!(canonical("false").unwrap(), "false");
        assert_eq!(canonical("-42").unwrap(), "-42");
        assert_eq!(canonical(r#""hi""#).unwrap(), r#""hi""#);
        assert_eq!(canonical("{}").unwrap(), "{}");
        assert_eq!(canonical("[]").unwrap(), "[]");
    }

    #[test]
    fn parse_then_canonicalize_is_idempotent() {
        for input in [
            r#"{"z": 1, "a": 2}"#,
            r#"{"nested": {"b": 2, "a": 1}, "top": "value"}"#,
            r#"[1, 2, {"y": 3, "x": 4}]"#,
        ] {
            let once = canonical(input).unwrap();
            let again = canonical(&once).unwrap();
            assert_eq!(once, again, "input {input}");
        }
    }

    #[test]
    fn equivalent_key_orders_hash_identically() {
        let left = canonical(r#"{"b": {"y": 1, "x": 2}, "a": 1}"#).unwrap();
        let right = canonical(r#"{"a": 1, "b": {"x": 2, "y": 1}}"#).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn floats_are_rejected_with_their_repr() {
        let err = canonical(r#"{"x": 1.5}"#).unwrap_err();
        assert!(matches!(
            err,
            CanonicalError::NonIntegerNumber { ref repr } if repr == "1.5"
        ));
        assert!(canonical("[1, 2.5]").is_err());
    }

    #[test]
    fn unsigned_values_past_i64_are_rejected() {
        let big = (i64::MAX as u64) + 1;
        let err = canonical(&format!(r#"{{"x": {big}}}"#)).unwrap_err();
        assert!(matches!(err, CanonicalError::NonIntegerNumber { .. }));
    }

    #[test]
    fn i64_bounds_are_accepted() {
        let min = i64::MIN;
        let max = i64::MAX;
        assert!(canonical(&format!("[{min}, {max}]")).is_ok());
    }

    #[test]
    fn non_nfc_strings_are_rejected_in_values_and_keys() {
        // e + combining acute (U+0301) is not NFC; the NFC form is U+00E9.
        let err = canonical(r#"{"key": "e\u0301"}"#).unwrap_err();
        assert!(matches!(err, CanonicalError::NonNfcString { .. }));
        assert!(canonical(r#"{"e\u0301": 1}"#).is_err());
        assert!(canonical(r#"{"key": "\u00e9"}"#).is_ok());
    }

    #[test]
    fn nesting_past_the_limit_is_rejected() {
        let mut deep = Value::from(0);
        for _ in 0..=MAX_DEPTH {
            deep = serde_json::json!({ "n": deep });
        }
        assert!(matches!(
            canonicalize_value(&deep),
            Err(CanonicalError::TooDeep)
        ));
    }

    #[test]
    fn nesting_at_the_limit_is_accepted() {
        let mut deep = Value::from(0);
        for _ in 0..MAX_DEPTH - 1 {
            deep = serde_json::json!({ "n": deep });
        }
        assert!(canonicalize_value(&deep).is_ok());
    }

    #[test]
    fn short_escapes_and_unicode_escapes() {
        assert_eq!(
            canonical(r#"{"text": "line1\nline2\ttab"}"#).unwrap(),
            r#"{"text":"line1\nline2\ttab"}"#
        );
        assert_eq!(
            canonical(r#"{"text": "say \"hi\" \\"}"#).unwrap(),
            r#"{"text":"say \"hi\" \\"}"#
        );
        let rendered = canonicalize_value(&serde_json::json!({ "c": "\u{0001}" })).unwrap();
        assert_eq!(rendered, "{\"c\":\"\\u0001\"}");
    }

    #[test]
    fn del_and_c1_pass_through_raw() {
        let rendered =
            canonicalize_value(&serde_json::json!({ "t": "\u{007F}\u{0085}" })).unwrap();
        assert!(!rendered.contains("\\u007f"));
        assert!(!rendered.contains("\\u0085"));
        assert!(rendered.contains('\u{007F}'));
    }

    #[test]
    fn no_partial_output_reaches_the_caller_on_failure() {
        // The writer fails midway, but the public API surfaces only Err.
        let poisoned = serde_json::json!({ "a": 1, "b": 2.5, "c": 3 });
        assert!(canonicalize_value(&poisoned).is_err());
    }

    #[test]
    fn typed_structs_canonicalize_through_serde() {
        #[derive(Serialize)]
        struct Probe {
            zeta: i64,
            alpha: &'static str,
        }
        let rendered = canonical_json_of(&Probe { zeta: 1, alpha: "x" }).unwrap();
        assert_eq!(rendered, r#"{"alpha":"x","zeta":1}"#);
    }
}
