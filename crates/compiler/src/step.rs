//! Workflow step bodies.
//!
//! A step template is a flat list of actions: calls into a platform builtin
//! (`deploy: multicluster.#Deploy & { $params: {...} }`) and plain value
//! assignments, each optionally wrapped in `if cond { ... }`.
//!
//! ```rust
//! use cuekit_compiler::prelude::*;
//! use cuekit_compiler::step::{compile_step, StepTemplate};
//!
//! let policies = Param::array("policies");
//! let auto = Param::bool("auto").default_value(true);
//! let step = StepTemplate::new()
//!     .suspend_if(auto.eq(false), "Waiting approval to the deploy step")
//!     .builtin("deploy", "multicluster.#Deploy", [("policies", Value::from(&policies))]);
//!
//! let text = compile_step(&step, &EmitOptions::default());
//! assert!(text.contains("deploy: multicluster.#Deploy & {"));
//! ```

use crate::ast::{Condition, Value};
use crate::serializer::EmitOptions;
use crate::translate::{cue_label, Imports, Translator};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The builtin a suspend action calls.
pub const SUSPEND_BUILTIN: &str = "builtin.#Suspend";

/// One statement of a step body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepAction {
    /// `name: builtin & { $params: {...} }`
    Builtin {
        name: String,
        builtin: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        params: IndexMap<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cond: Option<Condition>,
    },
    /// `field: value`
    Set {
        field: String,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cond: Option<Condition>,
    },
}

impl StepAction {
    pub fn cond(&self) -> Option<&Condition> {
        match self {
            StepAction::Builtin { cond, .. } | StepAction::Set { cond, .. } => cond.as_ref(),
        }
    }
}

/// Actions of a workflow step, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub actions: Vec<StepAction>,
}

impl StepTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `builtin` and bind the call to `name`. An empty name is derived
    /// from the builtin reference, see [`action_name`].
    pub fn builtin<I, K>(self, name: &str, builtin: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.push_builtin(None, name, builtin, params)
    }

    pub fn builtin_if<I, K>(self, cond: Condition, name: &str, builtin: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.push_builtin(Some(cond), name, builtin, params)
    }

    pub fn set(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push_set(None, field, value)
    }

    pub fn set_if(
        self,
        cond: Condition,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.push_set(Some(cond), field, value)
    }

    /// Suspend the workflow with `message` while `cond` holds.
    pub fn suspend_if(self, cond: Condition, message: impl Into<String>) -> Self {
        self.push_builtin(
            Some(cond),
            "",
            SUSPEND_BUILTIN,
            [("message", Value::lit(message.into()))],
        )
    }

    fn push_builtin<I, K>(
        mut self,
        cond: Option<Condition>,
        name: &str,
        builtin: &str,
        params: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let name = if name.is_empty() {
            action_name(builtin)
        } else {
            name.to_string()
        };
        self.actions.push(StepAction::Builtin {
            name,
            builtin: builtin.to_string(),
            params: params.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            cond,
        });
        self
    }

    fn push_set(
        mut self,
        cond: Option<Condition>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.actions.push(StepAction::Set {
            field: field.into(),
            value: value.into(),
            cond,
        });
        self
    }

    /// Packages referenced by any action.
    pub fn imports(&self) -> Imports {
        let mut imports = Imports::new();
        for action in &self.actions {
            if let Some(cond) = action.cond() {
                imports.visit_condition(cond);
            }
            match action {
                StepAction::Builtin { params, .. } => {
                    params.values().for_each(|v| imports.visit_value(v));
                }
                StepAction::Set { value, .. } => imports.visit_value(value),
            }
        }
        imports
    }
}

/// The lower-cased part after `#`: `multicluster.#Deploy` -> `deploy`.
pub fn action_name(builtin: &str) -> String {
    match builtin.split_once('#') {
        Some((_, name)) if !name.contains('#') => name.to_lowercase(),
        _ => builtin.to_lowercase(),
    }
}

/// The step body, unindented.
pub fn compile_step(step: &StepTemplate, opts: &EmitOptions) -> String {
    let tr = Translator::new(&opts.indent);
    let ind = opts.indent.as_str();
    let mut out = String::new();
    for action in &step.actions {
        let statement = match action {
            StepAction::Builtin {
                name,
                builtin,
                params,
                ..
            } => {
                if params.is_empty() {
                    format!("{}: {} & {{\n}}", cue_label(name), builtin)
                } else {
                    let lines: Vec<String> = params
                        .iter()
                        .map(|(key, value)| format!("{}: {}", cue_label(key), tr.value(value)))
                        .collect();
                    format!(
                        "{}: {} & {{\n{}$params: {}\n}}",
                        cue_label(name),
                        builtin,
                        ind,
                        indent_tail(&tr.block(&lines), ind)
                    )
                }
            }
            StepAction::Set { field, value, .. } => {
                format!("{}: {}", cue_label(field), tr.value(value))
            }
        };
        match action.cond() {
            Some(cond) => {
                out.push_str(&format!("if {} {{\n", tr.condition(cond)));
                for line in statement.lines() {
                    out.push_str(ind);
                    out.push_str(line);
                    out.push('\n');
                }
                out.push_str("}\n");
            }
            None => {
                out.push_str(&statement);
                out.push('\n');
            }
        }
    }
    tracing::trace!(actions = step.actions.len(), "compiled step");
    out
}

/// Indent every line after the first by one level.
fn indent_tail(text: &str, ind: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| if i == 0 { line.to_string() } else { format!("{ind}{line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{stdlib, Param};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_action_name() {
        assert_eq!(action_name("multicluster.#Deploy"), "deploy");
        assert_eq!(action_name("builtin.#Suspend"), "suspend");
        assert_eq!(action_name("Apply"), "apply");
    }

    #[test]
    fn test_deploy_step_body() {
        let auto = Param::bool("auto").default_value(true);
        let policies = Param::array("policies");
        let parallelism = Param::int("parallelism").default_value(5);
        let step = StepTemplate::new()
            .suspend_if(auto.eq(false), "Waiting approval to the deploy step \"deploy\"")
            .builtin(
                "deploy",
                "multicluster.#Deploy",
                [
                    ("policies", Value::from(&policies)),
                    ("parallelism", Value::from(&parallelism)),
                ],
            );
        assert_eq!(
            compile_step(&step, &EmitOptions::default()),
            "if parameter.auto == false {\n\
             \tsuspend: builtin.#Suspend & {\n\
             \t\t$params: {\n\
             \t\t\tmessage: \"Waiting approval to the deploy step \\\"deploy\\\"\"\n\
             \t\t}\n\
             \t}\n\
             }\n\
             deploy: multicluster.#Deploy & {\n\
             \t$params: {\n\
             \t\tpolicies: parameter.policies\n\
             \t\tparallelism: parameter.parallelism\n\
             \t}\n\
             }\n"
        );
    }

    #[test]
    fn test_set_actions_and_imports() {
        let name = Param::string("name");
        let step = StepTemplate::new()
            .builtin("apply", "kube.#Apply", Vec::<(String, Value)>::new())
            .set("object", Value::reference("apply.$returns.value"))
            .set_if(
                name.is_set(),
                "message",
                stdlib::to_upper(Value::from(&name)),
            );
        let text = compile_step(&step, &EmitOptions::default());
        assert!(text.starts_with("apply: kube.#Apply & {\n}\nobject: apply.$returns.value\n"));
        assert!(text.contains("if parameter.name != _|_ {\n\tmessage: strings.ToUpper(parameter.name)\n}\n"));
        assert_eq!(step.imports().iter().collect::<Vec<_>>(), vec!["strings"]);
    }
}
