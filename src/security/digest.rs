//! Canonical serialization and integrity digests.
//!
//! The canonical form is a JSON document with object keys sorted, `", "` and
//! `": "` separators and every non-ASCII character escaped as a lowercase
//! `\uXXXX` sequence. Clients written in other languages produce the same bytes
//! with their standard "sorted keys, ASCII only" JSON encoders.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io;
use subtle::ConstantTimeEq;

struct CanonicalFormatter;

impl serde_json::ser::Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Rebuilds objects with keys inserted in sorted order, whatever map
/// implementation `serde_json` was compiled with.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), sorted(&map[key.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Deterministic serialization of a set of message fields.
pub fn canonical_json(fields: &Map<String, Value>) -> String {
    let value = sorted(&Value::Object(fields.clone()));
    let mut buf = Vec::with_capacity(128);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    // Serializing a Value into a Vec cannot fail.
    let _ = value.serialize(&mut serializer);
    String::from_utf8(buf).unwrap_or_default()
}

/// Lowercase hex SHA-256 of `canonical_json(fields) || secret`.
pub fn compute_digest(fields: &Map<String, Value>, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(fields).as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of a supplied digest against the recomputed one.
pub fn digest_matches(fields: &Map<String, Value>, secret: &str, supplied: &str) -> bool {
    let expected = compute_digest(fields, secret);
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}
