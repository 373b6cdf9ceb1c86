//! Builders for the `customStatus` and `healthPolicy` texts.
//!
//! Both texts are evaluated by the platform against the applied workload,
//! visible as `context.output`. [`HealthExpr`] composes the `isHealth`
//! expression; [`StatusFields`] derives display fields with defaults and a
//! message.
//!
//! ```rust
//! use cuekit_compiler::health::{health_policy, HealthExpr};
//! use cuekit_compiler::prelude::*;
//!
//! let ready = HealthExpr::all_true(["Ready", "Synced"]);
//! let policy = health_policy(&ready);
//! assert!(policy.ends_with("isHealth: (len(_readyCond) > 0 && _readyCond[0].status == \"True\") && (len(_syncedCond) > 0 && _syncedCond[0].status == \"True\")"));
//!
//! let def = Definition::component("web").health(&ready);
//! assert_eq!(def.health_policy.as_deref(), Some(policy.as_str()));
//! ```

use crate::ast::CompOp;
use crate::translate::{quote, Translator};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

const OUTPUT: &str = "context.output";

/// What a condition check compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionCheck {
    /// The first matching condition has this `status`.
    Status(String),
    /// The first matching condition has this `reason`.
    Reason(String),
    /// A condition of the type is present.
    Exists,
}

/// A health predicate over the workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HealthExpr {
    /// An entry of `status.conditions` selected by `type`.
    Condition { kind: String, check: ConditionCheck },
    /// A field compared to a literal. A missing field fails.
    Field {
        path: String,
        op: CompOp,
        value: JsonValue,
    },
    /// Two fields compared.
    FieldRef {
        path: String,
        op: CompOp,
        other: String,
    },
    /// The field equals one of the phases.
    Phase { path: String, phases: Vec<String> },
    Exists { path: String, negate: bool },
    And(Vec<HealthExpr>),
    Or(Vec<HealthExpr>),
    Not(Box<HealthExpr>),
    Always,
}

impl HealthExpr {
    pub fn condition_true(kind: impl Into<String>) -> Self {
        Self::condition(kind, ConditionCheck::Status("True".to_string()))
    }

    pub fn condition(kind: impl Into<String>, check: ConditionCheck) -> Self {
        HealthExpr::Condition {
            kind: kind.into(),
            check,
        }
    }

    pub fn field(path: impl Into<String>, op: CompOp, value: impl Into<JsonValue>) -> Self {
        HealthExpr::Field {
            path: path.into(),
            op,
            value: value.into(),
        }
    }

    pub fn field_ref(path: impl Into<String>, op: CompOp, other: impl Into<String>) -> Self {
        HealthExpr::FieldRef {
            path: path.into(),
            op,
            other: other.into(),
        }
    }

    /// `status.phase` is one of `phases`.
    pub fn phase<I, S>(phases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HealthExpr::Phase {
            path: "status.phase".to_string(),
            phases: phases.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        HealthExpr::Exists {
            path: path.into(),
            negate: false,
        }
    }

    pub fn not_exists(path: impl Into<String>) -> Self {
        HealthExpr::Exists {
            path: path.into(),
            negate: true,
        }
    }

    pub fn all_true<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HealthExpr::And(kinds.into_iter().map(Self::condition_true).collect())
    }

    pub fn any_true<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HealthExpr::Or(kinds.into_iter().map(Self::condition_true).collect())
    }

    pub fn negate(self) -> Self {
        HealthExpr::Not(Box::new(self))
    }

    /// Lines defining the condition lookups the expression reads, in first
    /// use order and without repeats.
    pub fn preamble(&self) -> Vec<String> {
        let mut kinds: Vec<&str> = Vec::new();
        self.condition_kinds(&mut kinds);
        kinds
            .into_iter()
            .map(|kind| {
                format!(
                    "{}: *[for c in {}.status.conditions if c.type == {} {{c}}] | []",
                    condition_var(kind),
                    OUTPUT,
                    quote(kind)
                )
            })
            .collect()
    }

    fn condition_kinds<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            HealthExpr::Condition { kind, .. } => {
                if !out.contains(&kind.as_str()) {
                    out.push(kind);
                }
            }
            HealthExpr::And(parts) | HealthExpr::Or(parts) => {
                parts.iter().for_each(|p| p.condition_kinds(out))
            }
            HealthExpr::Not(inner) => inner.condition_kinds(out),
            _ => {}
        }
    }

    /// The boolean expression.
    pub fn to_cue(&self) -> String {
        match self {
            HealthExpr::Condition { kind, check } => {
                let var = condition_var(kind);
                match check {
                    ConditionCheck::Exists => format!("len({}) > 0", var),
                    ConditionCheck::Status(status) => {
                        format!("len({0}) > 0 && {0}[0].status == {1}", var, quote(status))
                    }
                    ConditionCheck::Reason(reason) => {
                        format!("len({0}) > 0 && {0}[0].reason == {1}", var, quote(reason))
                    }
                }
            }
            HealthExpr::Field { path, op, value } => {
                let field = output_path(path);
                let tr = Translator::new("\t");
                format!("{0} != _|_ && {0} {1} {2}", field, op.as_str(), tr.literal(value))
            }
            HealthExpr::FieldRef { path, op, other } => {
                format!("{} {} {}", output_path(path), op.as_str(), output_path(other))
            }
            HealthExpr::Phase { path, phases } => {
                let field = output_path(path);
                let checks: Vec<String> = phases
                    .iter()
                    .map(|p| format!("{} == {}", field, quote(p)))
                    .collect();
                match checks.len() {
                    0 => "false".to_string(),
                    1 => checks.join(""),
                    _ => format!("({})", checks.join(" || ")),
                }
            }
            HealthExpr::Exists { path, negate } => {
                let op = if *negate { "==" } else { "!=" };
                format!("{} {} _|_", output_path(path), op)
            }
            HealthExpr::And(parts) => join(parts, " && ", "true"),
            HealthExpr::Or(parts) => join(parts, " || ", "false"),
            HealthExpr::Not(inner) => format!("!({})", inner.to_cue()),
            HealthExpr::Always => "true".to_string(),
        }
    }
}

fn join(parts: &[HealthExpr], sep: &str, empty: &str) -> String {
    match parts {
        [] => empty.to_string(),
        [single] => single.to_cue(),
        _ => parts
            .iter()
            .map(|p| format!("({})", p.to_cue()))
            .collect::<Vec<_>>()
            .join(sep),
    }
}

/// `Ready` -> `_readyCond`
pub fn condition_var(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => format!("_{}{}Cond", first.to_lowercase(), chars.as_str()),
        None => "_cond".to_string(),
    }
}

fn output_path(path: &str) -> String {
    format!("{}.{}", OUTPUT, path)
}

/// The full `healthPolicy` text: condition lookups, then `isHealth`.
pub fn health_policy(expr: &HealthExpr) -> String {
    let mut lines = expr.preamble();
    lines.push(format!("isHealth: {}", expr.to_cue()));
    lines.join("\n")
}

/// A display field read from the workload with a fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusField {
    /// `name` or `group.name`.
    pub name: String,
    /// Path under `context.output`.
    pub source: String,
    pub default: JsonValue,
}

/// Fields and a message for `customStatus`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusFields {
    pub fields: Vec<StatusField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn int_field(self, name: impl Into<String>, source: impl Into<String>, default: i64) -> Self {
        self.field(name, source, JsonValue::from(default))
    }

    pub fn string_field(
        self,
        name: impl Into<String>,
        source: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        self.field(name, source, JsonValue::from(default.into()))
    }

    fn field(mut self, name: impl Into<String>, source: impl Into<String>, default: JsonValue) -> Self {
        self.fields.push(StatusField {
            name: name.into(),
            source: source.into(),
            default,
        });
        self
    }

    /// Message text; `\(name)` interpolates a field.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(text.into());
        self
    }

    pub fn build(&self) -> String {
        let tr = Translator::new("\t");
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| {
                let ty = match &field.default {
                    JsonValue::Number(n) if n.is_i64() => "int",
                    JsonValue::Number(_) => "number",
                    JsonValue::Bool(_) => "bool",
                    _ => "string",
                };
                let default = format!("*{} | {}", tr.literal(&field.default), ty);
                let source = output_path(&field.source);
                match field.name.split_once('.') {
                    Some((group, leaf)) => format!(
                        "{group}: {{\n\t{leaf}: {default}\n}} & {{\n\tif {source} != _|_ {{\n\t\t{leaf}: {source}\n\t}}\n}}"
                    ),
                    None => format!(
                        "{name}: {default} & {{\n\tif {source} != _|_ {{\n\t\t{name}: {source}\n\t}}\n}}",
                        name = field.name
                    ),
                }
            })
            .collect();
        if let Some(message) = &self.message {
            parts.push(format!("message: \"{}\"", message));
        }
        parts.join("\n")
    }
}
