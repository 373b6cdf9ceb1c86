//! The template block of a definition.

use crate::ast::{Condition, Value};
use crate::container::ContainerPatch;
use crate::helpers::TemplateHelper;
use crate::resource::{PatchResource, Resource};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An auxiliary output, optionally guarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxOutput {
    pub resource: Resource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<Condition>,
}

/// Several auxiliary outputs sharing one guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputGroup {
    pub cond: Condition,
    pub outputs: IndexMap<String, Resource>,
}

/// `let name = value` at the top of the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetBinding {
    pub name: String,
    pub value: Value,
}

/// Verbatim text blocks that replace the generated template body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlocks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl RawBlocks {
    pub fn is_empty(&self) -> bool {
        self.header.is_none()
            && self.patch.is_none()
            && self.outputs.is_none()
            && self.parameter.is_none()
    }

    /// Present blocks in emission order: header, patch, outputs, parameter.
    pub fn in_order(&self) -> impl Iterator<Item = &str> {
        [&self.header, &self.patch, &self.outputs, &self.parameter]
            .into_iter()
            .filter_map(|b| b.as_deref())
    }
}

/// Everything rendered inside `template: { ... }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Resource>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, AuxOutput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_groups: Vec<OutputGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lets: Vec<LetBinding>,
    /// Computed fields written after the lets, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helpers: Vec<TemplateHelper>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_strategy: Option<String>,
    /// Replaces the parameter block with the container patch layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_patch: Option<ContainerPatch>,
    #[serde(default, skip_serializing_if = "RawBlocks::is_empty")]
    pub raw: RawBlocks,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the primary output.
    pub fn output(mut self, resource: Resource) -> Self {
        self.output = Some(resource.finish());
        self
    }

    /// Add an unconditional auxiliary output.
    pub fn outputs(mut self, name: impl Into<String>, resource: Resource) -> Self {
        self.outputs.insert(
            name.into(),
            AuxOutput {
                resource: resource.finish(),
                cond: None,
            },
        );
        self
    }

    /// Add an auxiliary output rendered only when `cond` holds.
    pub fn outputs_if(
        mut self,
        cond: Condition,
        name: impl Into<String>,
        resource: Resource,
    ) -> Self {
        self.outputs.insert(
            name.into(),
            AuxOutput {
                resource: resource.finish(),
                cond: Some(cond),
            },
        );
        self
    }

    pub fn output_group<I, S>(mut self, cond: Condition, outputs: I) -> Self
    where
        I: IntoIterator<Item = (S, Resource)>,
        S: Into<String>,
    {
        self.output_groups.push(OutputGroup {
            cond,
            outputs: outputs
                .into_iter()
                .map(|(name, res)| (name.into(), res.finish()))
                .collect(),
        });
        self
    }

    pub fn let_binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.lets.push(LetBinding {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn helper(mut self, helper: TemplateHelper) -> Self {
        self.helpers.push(helper);
        self
    }

    pub fn patch(mut self, patch: PatchResource) -> Self {
        self.patch = Some(patch.finish());
        self
    }

    pub fn patch_container(mut self, patch: ContainerPatch) -> Self {
        self.container_patch = Some(patch);
        self
    }

    pub fn patch_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.patch_strategy = Some(strategy.into());
        self
    }

    pub fn raw_header(mut self, text: impl Into<String>) -> Self {
        self.raw.header = Some(text.into());
        self
    }

    pub fn raw_patch(mut self, text: impl Into<String>) -> Self {
        self.raw.patch = Some(text.into());
        self
    }

    pub fn raw_outputs(mut self, text: impl Into<String>) -> Self {
        self.raw.outputs = Some(text.into());
        self
    }

    pub fn raw_parameter(mut self, text: impl Into<String>) -> Self {
        self.raw.parameter = Some(text.into());
        self
    }

    /// True when there is at least one auxiliary output or group.
    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty() || !self.output_groups.is_empty()
    }

    /// Every resource in the template, primary first.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.output
            .iter()
            .chain(self.outputs.values().map(|aux| &aux.resource))
            .chain(self.output_groups.iter().flat_map(|g| g.outputs.values()))
    }
}
