//! A collection of definitions for batch export.
//!
//! The registry is an ordinary value: create one, register definitions into
//! it and export the whole set as JSON.

use crate::definition::{Definition, DefinitionKind};
use crate::error::RegistryError;
use crate::placement::{LabelCondition, PlacementCondition, PlacementSpec};
use serde::Serialize;

/// Registered definitions in registration order.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    definitions: Vec<Definition>,
}

#[derive(Serialize)]
struct Export<'a> {
    definitions: Vec<ExportedDefinition<'a>>,
}

#[derive(Serialize)]
struct ExportedDefinition<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    cue: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    placement: Option<ExportedPlacement>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedPlacement {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    run_on: Vec<ExportedCondition>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    not_run_on: Vec<ExportedCondition>,
}

#[derive(Debug, PartialEq, Serialize)]
struct ExportedCondition {
    key: String,
    operator: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    values: Vec<String>,
}

impl From<&LabelCondition> for ExportedCondition {
    fn from(label: &LabelCondition) -> Self {
        Self {
            key: label.key.clone(),
            operator: label.operator.name().to_string(),
            values: label.values.clone(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate placement and add the definition.
    ///
    /// A second definition with the same name and kind is rejected.
    pub fn register(&mut self, definition: Definition) -> Result<(), RegistryError> {
        definition
            .placement
            .validate()
            .map_err(|source| RegistryError::Placement {
                name: definition.name.clone(),
                source,
            })?;
        if self.get(&definition.name, definition.kind).is_some() {
            return Err(RegistryError::Duplicate {
                name: definition.name,
                kind: definition.kind.as_str().to_string(),
            });
        }
        tracing::debug!(name = %definition.name, kind = definition.kind.as_str(), "registered definition");
        self.definitions.push(definition);
        Ok(())
    }

    pub fn get(&self, name: &str, kind: DefinitionKind) -> Option<&Definition> {
        self.definitions
            .iter()
            .find(|d| d.name == name && d.kind == kind)
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn clear(&mut self) {
        self.definitions.clear();
    }

    /// Compile every definition and export `{"definitions": [...]}`.
    pub fn to_json(&self) -> Result<String, RegistryError> {
        let definitions = self
            .definitions
            .iter()
            .map(|def| {
                let cue = def.to_cue().map_err(|source| RegistryError::Compile {
                    name: def.name.clone(),
                    source,
                })?;
                Ok(ExportedDefinition {
                    name: &def.name,
                    kind: def.kind.as_str(),
                    cue,
                    placement: export_placement(&def.placement),
                })
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;
        Ok(serde_json::to_string_pretty(&Export { definitions })?)
    }
}

fn export_placement(spec: &PlacementSpec) -> Option<ExportedPlacement> {
    if spec.is_empty() {
        return None;
    }
    let flatten = |conds: &[PlacementCondition]| {
        let mut out = Vec::new();
        for cond in conds {
            export_condition(cond, &mut out);
        }
        out
    };
    Some(ExportedPlacement {
        run_on: flatten(&spec.run_on),
        not_run_on: flatten(&spec.not_run_on),
    })
}

/// `All` flattens into its labels; `Any` and `Not` collapse to one entry
/// carrying their children's keys.
fn export_condition(cond: &PlacementCondition, out: &mut Vec<ExportedCondition>) {
    match cond {
        PlacementCondition::Label(label) => out.push(label.into()),
        PlacementCondition::All(children) => {
            for child in children {
                export_condition(child, out);
            }
        }
        PlacementCondition::Any(children) => out.push(ExportedCondition {
            key: child_keys(children).join(","),
            operator: "Any".to_string(),
            values: Vec::new(),
        }),
        PlacementCondition::Not(inner) => out.push(ExportedCondition {
            key: child_keys(std::slice::from_ref(inner.as_ref())).join(","),
            operator: "Not".to_string(),
            values: Vec::new(),
        }),
    }
}

fn child_keys(conds: &[PlacementCondition]) -> Vec<String> {
    let mut keys = Vec::new();
    for cond in conds {
        for key in crate::placement::leaf_labels(cond)
            .into_iter()
            .map(|label| label.key.clone())
        {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}
