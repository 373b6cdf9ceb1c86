//! Health and status evaluation against a rendered workload.

use crate::document;
use crate::evaluator::{compare, display};
use cuekit_compiler::health::{ConditionCheck, HealthExpr, StatusFields};
use serde_json::{Map, Value as JsonValue};

/// Whether `output` (the workload as seen in `context.output`) is healthy.
pub fn is_healthy(expr: &HealthExpr, output: &JsonValue) -> bool {
    match expr {
        HealthExpr::Condition { kind, check } => {
            let first = document::get(output, "status.conditions")
                .and_then(JsonValue::as_array)
                .and_then(|conds| {
                    conds
                        .iter()
                        .find(|c| c.get("type").and_then(JsonValue::as_str) == Some(kind.as_str()))
                });
            let field_is = |field: &str, expected: &str| {
                first.and_then(|c| c.get(field)).and_then(JsonValue::as_str) == Some(expected)
            };
            match check {
                ConditionCheck::Exists => first.is_some(),
                ConditionCheck::Status(status) => field_is("status", status),
                ConditionCheck::Reason(reason) => field_is("reason", reason),
            }
        }
        HealthExpr::Field { path, op, value } => document::get(output, path)
            .is_some_and(|found| compare(found, *op, value)),
        HealthExpr::FieldRef { path, op, other } => {
            match (document::get(output, path), document::get(output, other)) {
                (Some(left), Some(right)) => compare(left, *op, right),
                _ => false,
            }
        }
        HealthExpr::Phase { path, phases } => document::get(output, path)
            .and_then(JsonValue::as_str)
            .is_some_and(|phase| phases.iter().any(|p| p == phase)),
        HealthExpr::Exists { path, negate } => document::get(output, path).is_some() != *negate,
        HealthExpr::And(parts) => parts.iter().all(|p| is_healthy(p, output)),
        HealthExpr::Or(parts) => parts.iter().any(|p| is_healthy(p, output)),
        HealthExpr::Not(inner) => !is_healthy(inner, output),
        HealthExpr::Always => true,
    }
}

/// The derived fields, plus `message` with every `\(name)` replaced.
pub fn custom_status(status: &StatusFields, output: &JsonValue) -> Map<String, JsonValue> {
    let mut doc = JsonValue::Object(Map::new());
    for field in &status.fields {
        let value = document::get(output, &field.source)
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| field.default.clone());
        document::set(&mut doc, &field.name, value);
    }
    if let Some(message) = &status.message {
        let mut text = message.clone();
        for field in &status.fields {
            let shown = document::get(&doc, &field.name).map(display).unwrap_or_default();
            text = text.replace(&format!("\\({})", field.name), &shown);
        }
        document::set(&mut doc, "message", JsonValue::String(text));
    }
    match doc {
        JsonValue::Object(map) => map,
        _ => Map::new(),
    }
}
