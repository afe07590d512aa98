//! Legacy agent config support
//!
//! Older agent folders carry a flatter `config.json`: a single `systemPrompt`
//! instead of `agentDescription`, and top-level `temperature` / `maxTokens`
//! instead of `modelParams`. Keys are upgraded in memory only; the user's file
//! is never rewritten.

use serde_json::{Map, Value};
use tracing::warn;

/// Rewrite legacy keys in place. Returns the legacy keys that were upgraded.
pub fn migrate_legacy_keys(value: &mut Value) -> Vec<&'static str> {
    let Some(obj) = value.as_object_mut() else {
        return Vec::new();
    };

    let mut migrated = Vec::new();

    if let Some(prompt) = obj.remove("systemPrompt") {
        if obj.contains_key("agentDescription") {
            warn!("Both systemPrompt and agentDescription set; ignoring systemPrompt");
        } else {
            obj.insert("agentDescription".to_string(), prompt);
        }
        migrated.push("systemPrompt");
    }

    for (legacy, param) in [("temperature", "temperature"), ("maxTokens", "max_tokens")] {
        let Some(v) = obj.remove(legacy) else {
            continue;
        };
        let params = obj
            .entry("modelParams")
            .or_insert_with(|| Value::Object(Map::new()));
        match params.as_object_mut() {
            Some(params) if !params.contains_key(param) => {
                params.insert(param.to_string(), v);
            }
            Some(_) => warn!("Both {} and modelParams.{} set; ignoring {}", legacy, param, legacy),
            // Let typed parsing report the malformed modelParams
            None => {}
        }
        migrated.push(legacy);
    }

    migrated
}
