// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Action-specific block payloads.
//!
//! A payload is a free-form JSON value. The constructors below fix the
//! shape each action uses so readers (revert, CLI, audits) can rely on it.

use crate::types::Digest;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    pub fn from_value(value: Value) -> Self {
        Payload(value)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Payload(Value::String(s.into()))
    }

    /// `{prompt, output}`
    pub fn generate(prompt: &str, output: &str) -> Self {
        Payload(json!({ "prompt": prompt, "output": output }))
    }

    /// `{descriptor, result, checkpoint, digest}`
    pub fn poison(descriptor: Value, result: &str, checkpoint: &str, digest: &Digest) -> Self {
        Payload(json!({
            "descriptor": descriptor,
            "result": result,
            "checkpoint": checkpoint,
            "digest": digest.to_hex(),
        }))
    }

    /// `{checkpoint, digest}`; both null when the clean state is pristine.
    pub fn mark_clean(checkpoint: Option<&str>, digest: Option<&Digest>) -> Self {
        Payload(json!({
            "checkpoint": checkpoint,
            "digest": digest.map(|d| d.to_hex()),
        }))
    }

    /// `{restored, marker, removed}`
    ///
    /// `removed` lists `[index, action, hash]` for every block dropped by the
    /// rollback so the evidence of what was superseded stays on the chain.
    pub fn revert(restored: Option<&str>, marker: Option<u64>, removed: &[crate::Block]) -> Self {
        let removed: Vec<Value> = removed
            .iter()
            .map(|b| json!([b.index, b.action.as_str(), b.hash.to_hex()]))
            .collect();
        Payload(json!({
            "restored": restored,
            "marker": marker,
            "removed": removed,
        }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Checkpoint name this payload refers to, if any.
    pub fn checkpoint(&self) -> Option<&str> {
        self.0.get("checkpoint").and_then(Value::as_str)
    }

    /// One-line human summary, used by the CLI timeline.
    pub fn summary(&self, max: usize) -> String {
        let raw = match &self.0 {
            Value::String(s) => s.clone(),
            Value::Object(map) => {
                if let Some(Value::String(p)) = map.get("prompt") {
                    p.clone()
                } else if let Some(Value::String(c)) = map.get("checkpoint") {
                    format!("checkpoint={}", c)
                } else if let Some(Value::Array(r)) = map.get("removed") {
                    format!("removed {} block(s)", r.len())
                } else {
                    self.0.to_string()
                }
            }
            other => other.to_string(),
        };
        if raw.chars().count() > max {
            let mut s: String = raw.chars().take(max.saturating_sub(1)).collect();
            s.push('…');
            s
        } else {
            raw
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload(value)
    }
}
