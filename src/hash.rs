// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Canonical Block Hashing
//!
//! Every block hash is BLAKE3 over the canonical JSON encoding of the
//! block's fields *except* `hash`.
//!
//! # Canonical Form
//! ```text
//! {"action":…,"index":…,"payload":…,"prevHash":…,"timestamp":…}
//! ```
//! - Object keys sorted by byte order, at every nesting level
//! - No whitespace
//! - Strings and numbers written by serde_json
//! - `prevHash` as lowercase hex
//!
//! The key ordering is produced here explicitly rather than relying on the
//! map type serde_json was compiled with.

use crate::error::{KernelError, KernelResult};
use crate::types::{Action, Digest, Payload};
use serde_json::{Map, Number, Value};

/// Writes `value` in canonical form.
pub fn write_canonical(value: &Value, out: &mut Vec<u8>) -> KernelResult<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(key.clone()), out)?;
                out.push(b':');
                write_canonical(val, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out)?,
    }
    Ok(())
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) -> KernelResult<()> {
    serde_json::to_writer(&mut *out, value).map_err(|e| KernelError::Encoding(e.to_string()))
}

/// Canonical bytes of a block without its `hash` field.
pub fn canonical_bytes(
    index: u64,
    timestamp: f64,
    action: Action,
    payload: &Payload,
    prev_hash: &Digest,
) -> KernelResult<Vec<u8>> {
    let ts = Number::from_f64(timestamp)
        .ok_or_else(|| KernelError::Encoding(format!("non-finite timestamp {}", timestamp)))?;

    let mut fields = Map::new();
    fields.insert("action".into(), Value::String(action.as_str().into()));
    fields.insert("index".into(), Value::Number(index.into()));
    fields.insert("payload".into(), payload.as_value().clone());
    fields.insert("prevHash".into(), Value::String(prev_hash.to_hex()));
    fields.insert("timestamp".into(), Value::Number(ts));

    let mut out = Vec::with_capacity(256);
    write_canonical(&Value::Object(fields), &mut out)?;
    Ok(out)
}

pub fn block_hash(
    index: u64,
    timestamp: f64,
    action: Action,
    payload: &Payload,
    prev_hash: &Digest,
) -> KernelResult<Digest> {
    let bytes = canonical_bytes(index, timestamp, action, payload, prev_hash)?;
    Ok(Digest::of(&bytes))
}
