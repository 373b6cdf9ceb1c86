//! Named helpers declared next to a template.
//!
//! Two families:
//!
//! - [`TemplateHelper`]s are computed fields written before the outputs
//!   (`volumesArray`, `volumesList`, `deDupVolumesArray`, ...). Other values
//!   reference them with [`TemplateHelper::reference`].
//! - [`HelperType`]s are schema definitions (`#VolumeMount: {...}`) written
//!   after the parameter block, for parameters to refer to by name.
//!
//! ```rust
//! use cuekit_compiler::prelude::*;
//! use cuekit_compiler::helpers::TemplateHelper;
//!
//! let mounts = Param::structure("volumeMounts");
//! let volumes = TemplateHelper::struct_array(
//!     "volumesArray",
//!     &mounts,
//!     [
//!         ("pvc", field_map([("name", FieldValue::field("name"))])),
//!         ("emptyDir", field_map([("name", FieldValue::field("name"))])),
//!     ],
//! );
//! let list = TemplateHelper::concat("volumesList", "volumesArray", ["pvc", "emptyDir"]);
//! let unique = TemplateHelper::dedupe("deDupVolumesArray", "volumesList", "name");
//!
//! let template = Template::new()
//!     .helper(volumes)
//!     .helper(list)
//!     .helper(unique.clone())
//!     .output(Resource::new("v1", "Pod").set("spec.volumes", unique.reference()));
//! assert_eq!(template.helpers.len(), 3);
//! ```

use crate::ast::{Param, Value};
use crate::collections::FieldMap;
use serde::{Deserialize, Serialize};

/// One list of a struct-array helper, built from `source.<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructArrayField {
    pub name: String,
    pub mappings: FieldMap,
}

/// A computed field written at the top of the template body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateHelper {
    /// A struct of lists, one per field, each mapped from the same-named
    /// list of `source` or empty when that list is absent.
    StructArray {
        name: String,
        source: Value,
        fields: Vec<StructArrayField>,
    },
    /// The named lists of a struct-array helper, concatenated in order.
    Concat {
        name: String,
        source: String,
        fields: Vec<String>,
    },
    /// The list helper `source` with later entries sharing a `key` value
    /// dropped.
    Dedupe {
        name: String,
        source: String,
        key: String,
    },
}

impl TemplateHelper {
    pub fn struct_array<I, S>(name: impl Into<String>, source: impl Into<Value>, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldMap)>,
        S: Into<String>,
    {
        TemplateHelper::StructArray {
            name: name.into(),
            source: source.into(),
            fields: fields
                .into_iter()
                .map(|(name, mappings)| StructArrayField {
                    name: name.into(),
                    mappings,
                })
                .collect(),
        }
    }

    pub fn concat<I, S>(name: impl Into<String>, source: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TemplateHelper::Concat {
            name: name.into(),
            source: source.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dedupe(
        name: impl Into<String>,
        source: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        TemplateHelper::Dedupe {
            name: name.into(),
            source: source.into(),
            key: key.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TemplateHelper::StructArray { name, .. }
            | TemplateHelper::Concat { name, .. }
            | TemplateHelper::Dedupe { name, .. } => name,
        }
    }

    /// A value reading this helper.
    pub fn reference(&self) -> Value {
        Value::reference(self.name())
    }
}

/// The body of a schema definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HelperSchema {
    /// `{ field declarations }`
    Struct(Vec<Param>),
    /// `[...{ field declarations }]`
    List(Vec<Param>),
    /// Schema text used as is.
    Raw(String),
}

/// `#Name: schema`, written after the parameter block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperType {
    pub name: String,
    pub schema: HelperSchema,
}

impl HelperType {
    pub fn new(name: impl Into<String>, schema: HelperSchema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Reference to the definition, e.g. `#VolumeMount`.
    pub fn label(&self) -> String {
        format!("#{}", self.name)
    }
}
