//! Deep-merging of JSON configuration documents, used to materialize the
//! per-job configuration files the slicer is invoked with.

use std::path::Path;

use serde_json::Value;

use crate::Result;

/// Merge `overrides` on top of `target`, returning a new document.
///
/// Objects are merged field by field, recursively. An override array is
/// appended to an existing array (it replaces the value outright when the
/// target holds no array under that key). Anything else replaces. Neither
/// input is mutated.
pub fn merge_deep(target: &Value, overrides: &Value) -> Value {
    let (Value::Object(target_map), Value::Object(override_map)) = (target, overrides) else {
        // On a type mismatch the object side wins, mirroring the scalar
        // handling below where a non-object override replaces the value.
        return if target.is_object() {
            target.clone()
        } else {
            overrides.clone()
        };
    };

    let mut output = target_map.clone();
    for (key, override_value) in override_map {
        let merged = match (target_map.get(key), override_value) {
            (Some(Value::Array(existing)), Value::Array(appended)) => {
                let mut combined = existing.clone();
                combined.extend(appended.iter().cloned());
                Value::Array(combined)
            }
            (Some(existing), Value::Object(_)) => merge_deep(existing, override_value),
            _ => override_value.clone(),
        };
        output.insert(key.clone(), merged);
    }
    Value::Object(output)
}

/// Read and parse the JSON file at `source`, merge `overrides` on top,
/// and write the result pretty-printed to `destination`. The source file
/// is never touched.
pub async fn materialize(source: &Path, overrides: &Value, destination: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(source).await?;
    let parsed: Value = serde_json::from_str(&content)?;
    let merged = merge_deep(&parsed, overrides);
    tokio::fs::write(destination, serde_json::to_string_pretty(&merged)?).await?;
    tracing::debug!(path = %destination.display(), "wrote merged configuration");
    Ok(())
}
