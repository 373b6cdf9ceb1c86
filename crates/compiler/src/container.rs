//! Patching one container of the workload by name.
//!
//! Traits that edit a container (`command`, `env`, `securityContext`, ...)
//! share one shape: a `#PatchParams` schema, a `PatchContainer` body that
//! looks the container up in `context.output.spec.template.spec.containers`
//! and reports `err` when it is missing, a `patch` keyed by container name,
//! and an `errs` list collecting every `err`.
//!
//! ```rust
//! use cuekit_compiler::prelude::*;
//! use cuekit_compiler::container::{ContainerField, ContainerPatch, FieldGuard};
//!
//! let command = ContainerPatch::new()
//!     .default_to_context()
//!     .field(ContainerField::new("command").strategy("replace").guard(FieldGuard::NotNull))
//!     .field(ContainerField::new("args").strategy("replace").guard(FieldGuard::NotNull));
//!
//! let def = Definition::new_trait("command")
//!     .template(Template::new().patch_container(command));
//! let cue = def.to_cue().unwrap();
//! assert!(cue.contains("PatchContainer: {"));
//! assert!(cue.contains("parameter: #PatchParams"));
//! ```

use crate::serializer::EmitOptions;
use crate::translate::{cue_label, Translator};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// The parameter naming the target container.
pub const CONTAINER_NAME: &str = "containerName";

const DEFAULT_MULTI_DESCRIPTION: &str = "Specify the settings for multiple containers";

/// When a guarded field is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldGuard {
    /// The parameter is present. The schema field is optional.
    IsSet,
    /// The parameter is not null. The schema default is `null`.
    NotNull,
    /// The parameter is not the empty string. The schema default is `""`.
    NotEmpty,
}

impl FieldGuard {
    fn test(&self) -> &'static str {
        match self {
            FieldGuard::IsSet => "!= _|_",
            FieldGuard::NotNull => "!= null",
            FieldGuard::NotEmpty => "!= \"\"",
        }
    }

    /// The schema default implied by the guard.
    pub fn implied_default(&self) -> Option<JsonValue> {
        match self {
            FieldGuard::IsSet => None,
            FieldGuard::NotNull => Some(JsonValue::Null),
            FieldGuard::NotEmpty => Some(JsonValue::String(String::new())),
        }
    }
}

/// One container field set from one `#PatchParams` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerField {
    pub param: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<FieldGuard>,
    /// Schema type; inferred from the target when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cue_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ContainerField {
    /// A field whose parameter and container field share `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            target: name.clone(),
            param: name,
            strategy: None,
            guard: None,
            cue_type: None,
            default: None,
            description: None,
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn guard(mut self, guard: FieldGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn cue_type(mut self, ty: impl Into<String>) -> Self {
        self.cue_type = Some(ty.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<JsonValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Explicit default, else the one the guard implies.
    pub fn effective_default(&self) -> Option<JsonValue> {
        self.default
            .clone()
            .or_else(|| self.guard.and_then(|g| g.implied_default()))
    }

    fn schema_type(&self) -> String {
        if let Some(ty) = &self.cue_type {
            return ty.clone();
        }
        match self.target.as_str() {
            "imagePullPolicy" => "\"IfNotPresent\" | \"Always\" | \"Never\"".to_string(),
            "command" | "args" => "[...string]".to_string(),
            _ => "string".to_string(),
        }
    }
}

/// Fields written under one container field, e.g. `securityContext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerGroup {
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ContainerField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<ContainerGroup>,
}

impl ContainerGroup {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            fields: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn field(mut self, field: ContainerField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn group(mut self, group: ContainerGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Every field of the group and its subgroups, depth first.
    pub fn all_fields(&self) -> Vec<&ContainerField> {
        let mut out: Vec<&ContainerField> = self.fields.iter().collect();
        for group in &self.groups {
            out.extend(group.all_fields());
        }
        out
    }
}

/// The container patch of a trait.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPatch {
    /// An empty container name falls back to `context.name`.
    #[serde(default)]
    pub default_to_context: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<ContainerField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<ContainerGroup>,
    /// Array parameter of per-container settings; enables multi mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_param: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_description: Option<String>,
}

impl ContainerPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_to_context(mut self) -> Self {
        self.default_to_context = true;
        self
    }

    pub fn field(mut self, field: ContainerField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn group(mut self, group: ContainerGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Also accept a list of settings under `param`, one per container.
    pub fn multiple(mut self, param: impl Into<String>, description: Option<&str>) -> Self {
        self.multi_param = Some(param.into());
        self.multi_description = description.map(str::to_string);
        self
    }

    /// Flat fields followed by every group field, depth first.
    pub fn all_fields(&self) -> Vec<&ContainerField> {
        let mut out: Vec<&ContainerField> = self.fields.iter().collect();
        for group in &self.groups {
            out.extend(group.all_fields());
        }
        out
    }
}

/// `#PatchParams`, `PatchContainer`, `patch`, `parameter` and `errs`,
/// unindented.
pub fn compile_container_patch(cp: &ContainerPatch, opts: &EmitOptions) -> String {
    let tr = Translator::new(&opts.indent);
    let ind = opts.indent.as_str();
    let mut out = Out::new(ind);

    out.line(0, "#PatchParams: {");
    out.line(
        1,
        "// +usage=Specify the name of the target container, if not set, use the component name",
    );
    out.line(1, &format!("{}: *\"\" | string", CONTAINER_NAME));
    for field in cp.all_fields() {
        let usage = field
            .description
            .clone()
            .unwrap_or_else(|| format!("Specify the {} of the container", field.param));
        out.line(1, &format!("// +usage={}", usage));
        let label = cue_label(&field.param);
        let ty = field.schema_type();
        match field.effective_default() {
            Some(default) => out.line(1, &format!("{}: *{} | {}", label, tr.literal(&default), ty)),
            None if field.guard == Some(FieldGuard::IsSet) => {
                out.line(1, &format!("{}?: {}", label, ty))
            }
            None => out.line(1, &format!("{}: {}", label, ty)),
        }
    }
    out.line(0, "}");

    out.line(0, "PatchContainer: {");
    out.line(1, "_params: #PatchParams");
    out.line(1, &format!("name: _params.{}", CONTAINER_NAME));
    out.line(1, "_baseContainers: context.output.spec.template.spec.containers");
    out.line(
        1,
        "_matchContainers_: [for _container_ in _baseContainers if _container_.name == name {_container_}]",
    );
    out.line(1, "_baseContainer: *_|_ | {...}");
    out.line(1, "if len(_matchContainers_) == 0 {");
    out.line(2, "err: \"container \\(name) not found\"");
    out.line(1, "}");
    out.line(1, "if len(_matchContainers_) > 0 {");
    for field in &cp.fields {
        write_container_field(&mut out, field, 2);
    }
    for group in &cp.groups {
        write_container_group(&mut out, group, 2);
    }
    out.line(1, "}");
    out.line(0, "}");

    out.line(0, "patch: spec: template: spec: {");
    match &cp.multi_param {
        Some(multi) => {
            out.line(1, &format!("if parameter.{} == _|_ {{", multi));
            write_single_entry(&mut out, cp, 2);
            out.line(1, "}");
            out.line(1, &format!("if parameter.{} != _|_ {{", multi));
            out.line(2, "// +patchKey=name");
            out.line(2, &format!("containers: [for c in parameter.{} {{", multi));
            out.line(3, &format!("if c.{} == \"\" {{", CONTAINER_NAME));
            out.line(4, &format!("err: \"{} must be set for {}\"", CONTAINER_NAME, multi));
            out.line(3, "}");
            out.line(3, &format!("if c.{} != \"\" {{", CONTAINER_NAME));
            out.line(4, "PatchContainer & {_params: c}");
            out.line(3, "}");
            out.line(2, "}]");
            out.line(1, "}");
        }
        None => write_single_entry(&mut out, cp, 1),
    }
    out.line(0, "}");

    match &cp.multi_param {
        Some(multi) => {
            out.line(0, "parameter: #PatchParams | close({");
            let usage = cp
                .multi_description
                .as_deref()
                .unwrap_or(DEFAULT_MULTI_DESCRIPTION);
            out.line(1, &format!("// +usage={}", usage));
            out.line(1, &format!("{}: [...#PatchParams]", cue_label(multi)));
            out.line(0, "})");
        }
        None => out.line(0, "parameter: #PatchParams"),
    }
    out.line(
        0,
        "errs: [for c in patch.spec.template.spec.containers if c.err != _|_ {c.err}]",
    );
    tracing::trace!(fields = cp.all_fields().len(), "compiled container patch");
    out.text
}

/// `containers: [{PatchContainer & {_params: {...}}}]` for the top-level
/// parameters.
fn write_single_entry(out: &mut Out<'_>, cp: &ContainerPatch, depth: usize) {
    out.line(depth, "// +patchKey=name");
    out.line(depth, "containers: [{");
    out.line(depth + 1, "PatchContainer & {_params: {");
    let at = depth + 2;
    if cp.default_to_context {
        out.line(at, &format!("if parameter.{} == \"\" {{", CONTAINER_NAME));
        out.line(at + 1, &format!("{}: context.name", CONTAINER_NAME));
        out.line(at, "}");
        out.line(at, &format!("if parameter.{} != \"\" {{", CONTAINER_NAME));
        out.line(at + 1, &format!("{0}: parameter.{0}", CONTAINER_NAME));
        out.line(at, "}");
    } else {
        out.line(at, &format!("{0}: parameter.{0}", CONTAINER_NAME));
    }
    for field in cp.all_fields() {
        let label = cue_label(&field.param);
        out.line(at, &format!("{}: parameter.{}", label, field.param));
    }
    out.line(depth + 1, "}}");
    out.line(depth, "}]");
}

fn write_container_field(out: &mut Out<'_>, field: &ContainerField, depth: usize) {
    let mut at = depth;
    if let Some(guard) = field.guard {
        out.line(depth, &format!("if _params.{} {} {{", field.param, guard.test()));
        at += 1;
    }
    if let Some(strategy) = &field.strategy {
        out.line(at, &format!("// +patchStrategy={}", strategy));
    }
    out.line(
        at,
        &format!("{}: _params.{}", cue_label(&field.target), field.param),
    );
    if field.guard.is_some() {
        out.line(depth, "}");
    }
}

fn write_container_group(out: &mut Out<'_>, group: &ContainerGroup, depth: usize) {
    out.line(depth, &format!("{}: {{", cue_label(&group.target)));
    for field in &group.fields {
        write_container_field(out, field, depth + 1);
    }
    for sub in &group.groups {
        write_container_group(out, sub, depth + 1);
    }
    out.line(depth, "}");
}

/// Line buffer with a fixed indent unit.
struct Out<'a> {
    ind: &'a str,
    text: String,
}

impl<'a> Out<'a> {
    fn new(ind: &'a str) -> Self {
        Self {
            ind,
            text: String::new(),
        }
    }

    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.text.push_str(self.ind);
        }
        self.text.push_str(text);
        self.text.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw() -> EmitOptions {
        EmitOptions {
            format: false,
            ..EmitOptions::default()
        }
    }

    #[test]
    fn test_single_container_patch() {
        let cp = ContainerPatch::new()
            .default_to_context()
            .field(
                ContainerField::new("command")
                    .strategy("replace")
                    .guard(FieldGuard::NotNull)
                    .description("Specify the command to use in the target container"),
            );
        assert_eq!(
            compile_container_patch(&cp, &raw()),
            "#PatchParams: {\n\
             \t// +usage=Specify the name of the target container, if not set, use the component name\n\
             \tcontainerName: *\"\" | string\n\
             \t// +usage=Specify the command to use in the target container\n\
             \tcommand: *null | [...string]\n\
             }\n\
             PatchContainer: {\n\
             \t_params: #PatchParams\n\
             \tname: _params.containerName\n\
             \t_baseContainers: context.output.spec.template.spec.containers\n\
             \t_matchContainers_: [for _container_ in _baseContainers if _container_.name == name {_container_}]\n\
             \t_baseContainer: *_|_ | {...}\n\
             \tif len(_matchContainers_) == 0 {\n\
             \t\terr: \"container \\(name) not found\"\n\
             \t}\n\
             \tif len(_matchContainers_) > 0 {\n\
             \t\tif _params.command != null {\n\
             \t\t\t// +patchStrategy=replace\n\
             \t\t\tcommand: _params.command\n\
             \t\t}\n\
             \t}\n\
             }\n\
             patch: spec: template: spec: {\n\
             \t// +patchKey=name\n\
             \tcontainers: [{\n\
             \t\tPatchContainer & {_params: {\n\
             \t\t\tif parameter.containerName == \"\" {\n\
             \t\t\t\tcontainerName: context.name\n\
             \t\t\t}\n\
             \t\t\tif parameter.containerName != \"\" {\n\
             \t\t\t\tcontainerName: parameter.containerName\n\
             \t\t\t}\n\
             \t\t\tcommand: parameter.command\n\
             \t\t}}\n\
             \t}]\n\
             }\n\
             parameter: #PatchParams\n\
             errs: [for c in patch.spec.template.spec.containers if c.err != _|_ {c.err}]\n"
        );
    }

    #[test]
    fn test_groups_and_multi_mode() {
        let cp = ContainerPatch::new()
            .group(
                ContainerGroup::new("securityContext")
                    .field(
                        ContainerField::new("privileged")
                            .cue_type("bool")
                            .default_value(false),
                    )
                    .group(
                        ContainerGroup::new("capabilities").field(
                            ContainerField::new("addCapabilities")
                                .target("add")
                                .cue_type("[...string]")
                                .guard(FieldGuard::IsSet),
                        ),
                    ),
            )
            .multiple("containers", None);
        let text = compile_container_patch(&cp, &raw());
        assert!(text.contains("\tprivileged: *false | bool\n\taddCapabilities?: [...string]\n"));
        assert!(text.contains(
            "\t\tsecurityContext: {\n\
             \t\t\tprivileged: _params.privileged\n\
             \t\t\tcapabilities: {\n\
             \t\t\t\tif _params.addCapabilities != _|_ {\n\
             \t\t\t\t\tadd: _params.addCapabilities\n\
             \t\t\t\t}\n\
             \t\t\t}\n\
             \t\t}\n"
        ));
        assert!(text.contains("\tif parameter.containers == _|_ {\n\t\t// +patchKey=name\n\t\tcontainers: [{\n"));
        assert!(text.contains("\t\t\t\tcontainerName: parameter.containerName\n"));
        assert!(text.contains("\t\t\t\terr: \"containerName must be set for containers\"\n"));
        assert!(text.contains(
            "parameter: #PatchParams | close({\n\
             \t// +usage=Specify the settings for multiple containers\n\
             \tcontainers: [...#PatchParams]\n\
             })\n"
        ));
    }

    #[test]
    fn test_inferred_schema_types() {
        assert_eq!(ContainerField::new("args").schema_type(), "[...string]");
        assert_eq!(ContainerField::new("image").schema_type(), "string");
        assert_eq!(
            ContainerField::new("policy").target("imagePullPolicy").schema_type(),
            "\"IfNotPresent\" | \"Always\" | \"Never\""
        );
        assert_eq!(
            ContainerField::new("name").guard(FieldGuard::NotEmpty).effective_default(),
            Some(JsonValue::String(String::new()))
        );
    }
}
