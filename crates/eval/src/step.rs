//! Workflow step rendering.
//!
//! Builtin calls are not executed. Each call whose guard holds is recorded
//! with its resolved `$params`, next to the plain fields the step sets.

use crate::context::RuntimeContext;
use crate::error::EvalError;
use crate::evaluator::Evaluator;
use cuekit_compiler::step::{StepAction, StepTemplate};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// A builtin call with resolved parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltinCall {
    pub builtin: String,
    #[serde(rename = "$params")]
    pub params: Map<String, JsonValue>,
}

/// The actions of a step that apply for one context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedStep {
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub calls: IndexMap<String, BuiltinCall>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, JsonValue>,
}

impl RenderedStep {
    pub fn call(&self, name: &str) -> Option<&BuiltinCall> {
        self.calls.get(name)
    }

    /// True when a suspend builtin applies.
    pub fn suspends(&self) -> bool {
        self.calls
            .values()
            .any(|call| call.builtin == cuekit_compiler::step::SUSPEND_BUILTIN)
    }
}

pub fn render_step(step: &StepTemplate, ctx: &RuntimeContext) -> Result<RenderedStep, EvalError> {
    let mut ev = Evaluator::new(ctx);
    let mut rendered = RenderedStep::default();
    for action in &step.actions {
        if !ev.guard(action.cond())? {
            continue;
        }
        match action {
            StepAction::Builtin {
                name,
                builtin,
                params,
                ..
            } => {
                let mut resolved = Map::new();
                for (key, value) in params {
                    let value = ev.value(value)?;
                    if !value.is_null() {
                        resolved.insert(key.clone(), value);
                    }
                }
                rendered.calls.insert(
                    name.clone(),
                    BuiltinCall {
                        builtin: builtin.clone(),
                        params: resolved,
                    },
                );
            }
            StepAction::Set { field, value, .. } => {
                let value = ev.value(value)?;
                rendered.fields.insert(field.clone(), value);
            }
        }
    }
    tracing::debug!(calls = rendered.calls.len(), "rendered step");
    Ok(rendered)
}
