//! Template helpers bound as named values before any output renders.

use crate::collections::{apply_field_map, iterate};
use crate::error::EvalError;
use crate::evaluator::{json_eq, Evaluator};
use cuekit_compiler::helpers::TemplateHelper;
use serde_json::{Map, Value as JsonValue};

impl Evaluator<'_> {
    /// Evaluate `helper` and bind it under its name, next to the lets.
    pub fn bind_helper(&mut self, helper: &TemplateHelper) -> Result<(), EvalError> {
        let value = match helper {
            TemplateHelper::StructArray { source, fields, .. } => {
                let source = self.value(source)?;
                let mut out = Map::new();
                for field in fields {
                    let items = match source.get(&field.name) {
                        Some(list) => iterate(list, &field.name)?,
                        None => Vec::new(),
                    };
                    let mapped = items
                        .iter()
                        .map(|item| JsonValue::Object(apply_field_map(item, &field.mappings)))
                        .collect();
                    out.insert(field.name.clone(), JsonValue::Array(mapped));
                }
                JsonValue::Object(out)
            }
            TemplateHelper::Concat { source, fields, .. } => {
                let mut out = Vec::new();
                for field in fields {
                    let list = self
                        .reference(source)
                        .and_then(|s| s.get(field).cloned())
                        .unwrap_or(JsonValue::Null);
                    out.extend(iterate(&list, field)?);
                }
                JsonValue::Array(out)
            }
            TemplateHelper::Dedupe { source, key, .. } => {
                let list = self.reference(source).unwrap_or(JsonValue::Null);
                JsonValue::Array(first_per_key(iterate(&list, source)?, key))
            }
        };
        tracing::debug!(name = helper.name(), "bound helper");
        self.bind_value(helper.name(), value);
        Ok(())
    }
}

/// Keep the first entry for each `key` value; entries without the key stay.
fn first_per_key(items: Vec<JsonValue>, key: &str) -> Vec<JsonValue> {
    let mut seen: Vec<JsonValue> = Vec::new();
    let mut unique = Vec::new();
    for item in items {
        match item.get(key) {
            Some(k) if seen.iter().any(|s| json_eq(s, k)) => continue,
            Some(k) => seen.push(k.clone()),
            None => {}
        }
        unique.push(item);
    }
    unique
}
