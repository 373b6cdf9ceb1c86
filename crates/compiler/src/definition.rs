//! Component, trait and workflow step definitions.
//!
//! A [`Definition`] ties a [`Template`] to its metadata, parameter schema and
//! placement, and compiles to a complete CUE document:
//!
//! ```text
//! import (
//! 	"strings"
//! )
//!
//! webservice: {
//! 	type: "component"
//! 	...
//! }
//! template: {
//! 	output: { ... }
//! 	parameter: { ... }
//! }
//! ```
//!
//! [`Definition::to_manifest`] wraps that text in the platform's custom
//! resource document.

use crate::ast::{Param, ParamKind};
use crate::container::compile_container_patch;
use crate::error::CompileError;
use crate::health::{health_policy, HealthExpr, StatusFields};
use crate::helpers::{HelperSchema, HelperType};
use crate::placement::{PlacementCondition, PlacementSpec};
use crate::serializer::{compile_template_with, template_imports, EmitOptions};
use crate::step::{compile_step, StepTemplate};
use crate::template::Template;
use crate::translate::{cue_label, quote, Translator};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt::Write;

const MANIFEST_API_VERSION: &str = "core.oam.dev/v1beta1";
const DESCRIPTION_ANNOTATION: &str = "definition.oam.dev/description";
const AUTODETECT_WORKLOAD: &str = "autodetects.core.oam.dev";

/// What a definition produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Component,
    Trait,
    #[serde(rename = "workflow-step")]
    WorkflowStep,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Component => "component",
            DefinitionKind::Trait => "trait",
            DefinitionKind::WorkflowStep => "workflow-step",
        }
    }

    fn manifest_kind(&self) -> &'static str {
        match self {
            DefinitionKind::Component => "ComponentDefinition",
            DefinitionKind::Trait => "TraitDefinition",
            DefinitionKind::WorkflowStep => "WorkflowStepDefinition",
        }
    }
}

/// The workload a component renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Workload {
    Resource {
        api_version: String,
        kind: String,
        /// Overrides the inferred workload type.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    Autodetect,
}

impl Workload {
    /// The workload type string, e.g. `deployments.apps`.
    pub fn type_name(&self) -> String {
        match self {
            Workload::Autodetect => AUTODETECT_WORKLOAD.to_string(),
            Workload::Resource {
                type_name: Some(name),
                ..
            } => name.clone(),
            Workload::Resource {
                api_version, kind, ..
            } => infer_workload_type(api_version, kind),
        }
    }
}

/// `<plural>.<group>`, or just `<plural>` for the core group.
pub fn infer_workload_type(api_version: &str, kind: &str) -> String {
    let plural = format!("{}s", kind.to_lowercase());
    match api_version.split_once('/') {
        Some((group, _)) => format!("{}.{}", plural, group),
        None => plural,
    }
}

/// Attributes only traits carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitAttributes {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applies_to_workloads: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,
    #[serde(default)]
    pub pod_disruptive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Attributes only workflow steps carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAttributes {
    /// Written as the `category` annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Written as the `scope` label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Written whenever set, even when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// A component, trait or workflow step definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DefinitionKind,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    #[serde(default)]
    pub template: Template,
    /// Schema definitions written after the parameter block.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helper_types: Vec<HelperType>,
    #[serde(default, skip_serializing_if = "PlacementSpec::is_empty")]
    pub placement: PlacementSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<Workload>,
    #[serde(default, rename = "attributes")]
    pub trait_attributes: TraitAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepTemplate>,
    #[serde(default, rename = "stepAttributes")]
    pub step_attributes: StepAttributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_policy: Option<String>,
    /// Template body used verbatim instead of [`Definition::template`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_template: Option<String>,
}

impl Definition {
    fn new(name: impl Into<String>, kind: DefinitionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            labels: IndexMap::new(),
            params: Vec::new(),
            template: Template::default(),
            helper_types: Vec::new(),
            placement: PlacementSpec::default(),
            workload: None,
            trait_attributes: TraitAttributes::default(),
            step: None,
            step_attributes: StepAttributes::default(),
            custom_status: None,
            health_policy: None,
            raw_template: None,
        }
    }

    pub fn component(name: impl Into<String>) -> Self {
        Self::new(name, DefinitionKind::Component)
    }

    pub fn new_trait(name: impl Into<String>) -> Self {
        Self::new(name, DefinitionKind::Trait)
    }

    pub fn workflow_step(name: impl Into<String>) -> Self {
        Self::new(name, DefinitionKind::WorkflowStep)
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn params(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn template(mut self, template: Template) -> Self {
        self.template = template;
        self
    }

    /// Declare `#name: schema` next to the parameter block.
    pub fn helper_type(mut self, name: impl Into<String>, schema: HelperSchema) -> Self {
        self.helper_types.push(HelperType::new(name, schema));
        self
    }

    pub fn raw_template(mut self, text: impl Into<String>) -> Self {
        self.raw_template = Some(text.into());
        self
    }

    pub fn workload(mut self, api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        self.workload = Some(Workload::Resource {
            api_version: api_version.into(),
            kind: kind.into(),
            type_name: None,
        });
        self
    }

    pub fn autodetect_workload(mut self) -> Self {
        self.workload = Some(Workload::Autodetect);
        self
    }

    pub fn run_on(mut self, cond: PlacementCondition) -> Self {
        self.placement.run_on.push(cond);
        self
    }

    pub fn not_run_on(mut self, cond: PlacementCondition) -> Self {
        self.placement.not_run_on.push(cond);
        self
    }

    pub fn applies_to<I, S>(mut self, workloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trait_attributes
            .applies_to_workloads
            .extend(workloads.into_iter().map(Into::into));
        self
    }

    pub fn conflicts_with<I, S>(mut self, traits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trait_attributes
            .conflicts_with
            .extend(traits.into_iter().map(Into::into));
        self
    }

    pub fn pod_disruptive(mut self, disruptive: bool) -> Self {
        self.trait_attributes.pod_disruptive = disruptive;
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.trait_attributes.stage = Some(stage.into());
        self
    }

    /// The actions of a workflow step, used in place of [`Definition::template`].
    pub fn step(mut self, step: StepTemplate) -> Self {
        self.step = Some(step);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.step_attributes.category = Some(category.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.step_attributes.scope = Some(scope.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.step_attributes.alias = Some(alias.into());
        self
    }

    pub fn custom_status(mut self, expr: impl Into<String>) -> Self {
        self.custom_status = Some(expr.into());
        self
    }

    pub fn health_policy(mut self, expr: impl Into<String>) -> Self {
        self.health_policy = Some(expr.into());
        self
    }

    /// Health policy built from an expression.
    pub fn health(self, expr: &HealthExpr) -> Self {
        self.health_policy(health_policy(expr))
    }

    /// Custom status built from derived fields and a message.
    pub fn status(self, fields: &StatusFields) -> Self {
        self.custom_status(fields.build())
    }

    // ========================================================================
    // CUE
    // ========================================================================

    /// Compile with default emit options.
    pub fn to_cue(&self) -> Result<String, CompileError> {
        self.to_cue_with(&EmitOptions::default())
    }

    pub fn to_cue_with(&self, opts: &EmitOptions) -> Result<String, CompileError> {
        if self.kind == DefinitionKind::Component
            && self.raw_template.is_none()
            && self.template.output.is_none()
            && self.template.raw.is_empty()
        {
            return Err(CompileError::MissingOutput {
                definition: self.name.clone(),
            });
        }

        let raw_opts = EmitOptions {
            format: false,
            ..opts.clone()
        };
        let ind = opts.indent.as_str();
        let mut out = String::new();

        if self.raw_template.is_none() {
            let imports = match &self.step {
                Some(step) => step.imports(),
                None => template_imports(&self.template),
            };
            if !imports.is_empty() {
                out.push_str("import (\n");
                for package in imports.iter() {
                    let _ = writeln!(out, "{}{}", ind, quote(package));
                }
                out.push_str(")\n\n");
            }
        }

        self.write_header(&mut out, ind);

        out.push_str("template: {\n");
        match (&self.raw_template, &self.step) {
            (Some(raw), _) => push_indented(&mut out, raw.trim(), ind, 1),
            (None, Some(step)) => {
                push_indented(&mut out, &compile_step(step, &raw_opts), ind, 1);
                self.write_parameter(&mut out, ind);
                self.write_helper_types(&mut out, ind);
            }
            (None, None) => {
                let body = compile_template_with(&self.template, &raw_opts);
                push_indented(&mut out, &body, ind, 1);
                match &self.template.container_patch {
                    Some(cp) => {
                        push_indented(&mut out, &compile_container_patch(cp, &raw_opts), ind, 1)
                    }
                    None if self.template.raw.is_empty() => self.write_parameter(&mut out, ind),
                    None => {}
                }
                self.write_helper_types(&mut out, ind);
            }
        }
        out.push_str("}\n");

        tracing::debug!(definition = %self.name, kind = self.kind.as_str(), "compiled definition");
        if opts.format {
            Ok(crate::format::format_or_original(&out, ind))
        } else {
            Ok(out)
        }
    }

    fn write_header(&self, out: &mut String, ind: &str) {
        let _ = writeln!(out, "{}: {{", cue_label(&self.name));
        let _ = writeln!(out, "{}type: {}", ind, quote(self.kind.as_str()));
        if self.kind == DefinitionKind::WorkflowStep {
            self.write_step_header(out, ind);
            return;
        }
        let _ = writeln!(out, "{}annotations: {{}}", ind);
        if self.labels.is_empty() {
            if self.kind == DefinitionKind::Component {
                let _ = writeln!(out, "{}labels: {{}}", ind);
            }
        } else {
            let _ = writeln!(out, "{}labels: {{", ind);
            for (key, value) in &self.labels {
                let _ = writeln!(out, "{}{}{}: {}", ind, ind, quote(key), quote(value));
            }
            let _ = writeln!(out, "{}}}", ind);
        }
        let _ = writeln!(out, "{}description: {}", ind, quote(&self.description));

        let _ = writeln!(out, "{}attributes: {{", ind);
        let inner = ind.repeat(2);
        match self.kind {
            DefinitionKind::Component => {
                if let Some(workload) = &self.workload {
                    self.write_workload(out, workload, &inner, ind);
                }
            }
            DefinitionKind::WorkflowStep => {}
            DefinitionKind::Trait => {
                let attrs = &self.trait_attributes;
                let _ = writeln!(out, "{}podDisruptive: {}", inner, attrs.pod_disruptive);
                if let Some(stage) = &attrs.stage {
                    let _ = writeln!(out, "{}stage: {}", inner, quote(stage));
                }
                if !attrs.applies_to_workloads.is_empty() {
                    let _ = writeln!(
                        out,
                        "{}appliesToWorkloads: {}",
                        inner,
                        quoted_list(&attrs.applies_to_workloads)
                    );
                }
                if !attrs.conflicts_with.is_empty() {
                    let _ = writeln!(
                        out,
                        "{}conflictsWith: {}",
                        inner,
                        quoted_list(&attrs.conflicts_with)
                    );
                }
            }
        }
        self.write_status(out, &inner, ind);
        let _ = writeln!(out, "{}}}", ind);
        out.push_str("}\n");
    }

    /// Category annotation, scope label, alias and description. Steps carry
    /// an attributes block only for status expressions.
    fn write_step_header(&self, out: &mut String, ind: &str) {
        let attrs = &self.step_attributes;
        let _ = writeln!(out, "{}annotations: {{", ind);
        if let Some(category) = &attrs.category {
            let _ = writeln!(out, "{}{}\"category\": {}", ind, ind, quote(category));
        }
        let _ = writeln!(out, "{}}}", ind);
        let _ = writeln!(out, "{}labels: {{", ind);
        if let Some(scope) = &attrs.scope {
            let _ = writeln!(out, "{}{}\"scope\": {}", ind, ind, quote(scope));
        }
        for (key, value) in &self.labels {
            let _ = writeln!(out, "{}{}{}: {}", ind, ind, quote(key), quote(value));
        }
        let _ = writeln!(out, "{}}}", ind);
        if let Some(alias) = &attrs.alias {
            let _ = writeln!(out, "{}alias: {}", ind, quote(alias));
        }
        let _ = writeln!(out, "{}description: {}", ind, quote(&self.description));
        if self.custom_status.is_some() || self.health_policy.is_some() {
            let _ = writeln!(out, "{}attributes: {{", ind);
            self.write_status(out, &ind.repeat(2), ind);
            let _ = writeln!(out, "{}}}", ind);
        }
        out.push_str("}\n");
    }

    fn write_workload(&self, out: &mut String, workload: &Workload, at: &str, ind: &str) {
        match workload {
            Workload::Autodetect => {
                let _ = writeln!(out, "{}workload: type: {}", at, quote(AUTODETECT_WORKLOAD));
            }
            Workload::Resource {
                api_version, kind, ..
            } => {
                let _ = writeln!(out, "{}workload: {{", at);
                let _ = writeln!(out, "{}{}definition: {{", at, ind);
                let _ = writeln!(out, "{}{}{}apiVersion: {}", at, ind, ind, quote(api_version));
                let _ = writeln!(out, "{}{}{}kind: {}", at, ind, ind, quote(kind));
                let _ = writeln!(out, "{}{}}}", at, ind);
                let _ = writeln!(out, "{}{}type: {}", at, ind, quote(&workload.type_name()));
                let _ = writeln!(out, "{}}}", at);
            }
        }
    }

    fn write_status(&self, out: &mut String, at: &str, ind: &str) {
        if self.custom_status.is_none() && self.health_policy.is_none() {
            return;
        }
        let _ = writeln!(out, "{}status: {{", at);
        let fields = [
            ("customStatus", &self.custom_status),
            ("healthPolicy", &self.health_policy),
        ];
        for (label, text) in fields {
            let Some(text) = text else { continue };
            let _ = writeln!(out, "{}{}{}: #\"\"\"", at, ind, label);
            for line in text.lines() {
                let _ = writeln!(out, "{}{}{}{}", at, ind, ind, line);
            }
            let _ = writeln!(out, "{}{}{}\"\"\"#", at, ind, ind);
        }
        let _ = writeln!(out, "{}}}", at);
    }

    fn write_parameter(&self, out: &mut String, ind: &str) {
        if self.params.is_empty() {
            let _ = writeln!(out, "{}parameter: {{}}", ind);
            return;
        }
        let tr = Translator::new(ind);
        let _ = writeln!(out, "{}parameter: {{", ind);
        for param in &self.params {
            if let Some(usage) = &param.description {
                let _ = writeln!(out, "{}{}// +usage={}", ind, ind, usage);
            }
            let decl = param_declaration(param, &tr);
            push_indented(out, &decl, ind, 2);
        }
        let _ = writeln!(out, "{}}}", ind);
    }

    fn write_helper_types(&self, out: &mut String, ind: &str) {
        let tr = Translator::new(ind);
        for helper in &self.helper_types {
            let fields = |params: &[Param]| -> String {
                let mut body = String::from("{\n");
                for param in params {
                    if let Some(usage) = &param.description {
                        let _ = writeln!(body, "{}// +usage={}", ind, usage);
                    }
                    push_indented(&mut body, &param_declaration(param, &tr), ind, 1);
                }
                body.push('}');
                body
            };
            let schema = match &helper.schema {
                HelperSchema::Struct(params) => fields(params),
                HelperSchema::List(params) => format!("[...{}]", fields(params)),
                HelperSchema::Raw(text) => text.trim().to_string(),
            };
            let _ = write!(out, "{}{}: ", ind, helper.label());
            let mut lines = schema.lines();
            if let Some(first) = lines.next() {
                out.push_str(first);
            }
            out.push('\n');
            for line in lines {
                let _ = writeln!(out, "{}{}", ind, line);
            }
        }
    }

    // ========================================================================
    // Manifest
    // ========================================================================

    /// The custom resource wrapping the compiled text.
    pub fn to_manifest(&self) -> Result<JsonValue, CompileError> {
        let cue = self.to_cue()?;
        let mut metadata = json!({
            "name": self.name,
            "annotations": { DESCRIPTION_ANNOTATION: self.description },
        });
        if !self.labels.is_empty() {
            metadata["labels"] = json!(self.labels);
        }

        let mut spec = json!({ "schematic": { "cue": { "template": cue } } });
        match self.kind {
            DefinitionKind::Component => match &self.workload {
                Some(Workload::Autodetect) => {
                    spec["workload"] = json!({ "type": AUTODETECT_WORKLOAD });
                }
                Some(Workload::Resource {
                    api_version, kind, ..
                }) => {
                    spec["workload"] = json!({
                        "definition": { "apiVersion": api_version, "kind": kind },
                    });
                }
                None => {}
            },
            DefinitionKind::Trait => {
                let attrs = &self.trait_attributes;
                spec["appliesToWorkloads"] = json!(attrs.applies_to_workloads);
                spec["podDisruptive"] = json!(attrs.pod_disruptive);
                if !attrs.conflicts_with.is_empty() {
                    spec["conflictsWith"] = json!(attrs.conflicts_with);
                }
                if let Some(stage) = &attrs.stage {
                    spec["stage"] = json!(stage);
                }
            }
            DefinitionKind::WorkflowStep => {}
        }

        Ok(json!({
            "apiVersion": MANIFEST_API_VERSION,
            "kind": self.kind.manifest_kind(),
            "metadata": metadata,
            "spec": spec,
        }))
    }

    pub fn to_yaml(&self) -> Result<String, CompileError> {
        Ok(serde_yaml::to_string(&self.to_manifest()?)?)
    }
}

/// `name: *default | type`, `name: type` or `name?: type`.
fn param_declaration(param: &Param, tr: &Translator<'_>) -> String {
    let label = param
        .name
        .split('.')
        .map(cue_label)
        .collect::<Vec<_>>()
        .join(": ");
    let ty = param_type(&param.kind);
    match (&param.default, &param.kind) {
        (Some(default), ParamKind::Enum(values)) => {
            let mut parts = vec![format!("*{}", tr.literal(default))];
            parts.extend(
                values
                    .iter()
                    .filter(|v| Some(v.as_str()) != default.as_str())
                    .map(|v| quote(v)),
            );
            format!("{}: {}", label, parts.join(" | "))
        }
        (Some(default), _) => format!("{}: *{} | {}", label, tr.literal(default), ty),
        (None, _) if param.required => format!("{}: {}", label, ty),
        (None, _) => format!("{}?: {}", label, ty),
    }
}

pub fn param_type(kind: &ParamKind) -> String {
    match kind {
        ParamKind::String => "string".to_string(),
        ParamKind::Int => "int".to_string(),
        ParamKind::Bool => "bool".to_string(),
        ParamKind::Float => "number".to_string(),
        ParamKind::Enum(values) => values
            .iter()
            .map(|v| quote(v))
            .collect::<Vec<_>>()
            .join(" | "),
        ParamKind::Struct => "{...}".to_string(),
        ParamKind::Array => "[...]".to_string(),
        ParamKind::Map => "{[string]: string}".to_string(),
        ParamKind::Schema(ty) => ty.clone(),
    }
}

fn quoted_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| quote(i)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Append `text` with every non-empty line indented `depth` levels.
fn push_indented(out: &mut String, text: &str, ind: &str, depth: usize) {
    let prefix = ind.repeat(depth);
    for line in text.lines() {
        if !line.trim().is_empty() {
            out.push_str(&prefix);
            out.push_str(line);
        }
        out.push('\n');
    }
}
