//! # cuekit-compiler
//!
//! Compile resource definitions built with a fluent Rust DSL into CUE text.
//!
//! A definition is assembled from builders that record *operations*
//! ("set this path", "set this path if the parameter is present", "merge a
//! value when a condition holds", ...). The compiler turns the ordered
//! operation list into a field tree, hoists guards shared by every leaf of
//! a subtree up onto the subtree, partitions the tree into an unconditional
//! part plus one block per condition, and writes the result as nested CUE.
//!
//! ## Quick Start
//!
//! ```rust
//! use cuekit_compiler::prelude::*;
//!
//! let image = Param::string("image").required();
//! let replicas = Param::int("replicas").default_value(1);
//! let cpu = Param::string("cpu").description("CPU limit");
//!
//! let deployment = Resource::new("apps/v1", "Deployment")
//!     .set("metadata.name", context::name())
//!     .set("spec.replicas", &replicas)
//!     .set("spec.template.spec.containers[0].image", &image)
//!     .set_if(cpu.is_set(), "spec.template.spec.containers[0].resources.limits.cpu", &cpu);
//!
//! let def = Definition::component("webservice")
//!     .description("Long-running web service")
//!     .workload("apps/v1", "Deployment")
//!     .params([image, replicas, cpu])
//!     .template(Template::new().output(deployment));
//!
//! let cue = def.to_cue().unwrap();
//! assert!(cue.contains("type: \"deployments.apps\""));
//! assert!(cue.contains("replicas: *1 | int"));
//! ```
//!
//! ## Module Overview
//!
//! | Module | Role |
//! |--------|------|
//! | [`ast`] | Values, conditions, parameters, context fields |
//! | [`collections`] | Collection pipelines, multi-source merges, array builders |
//! | [`resource`] | Operation recorder for resources and patches |
//! | [`container`] | Patching a workload container by name |
//! | [`template`] | Outputs, auxiliary outputs, lets, patch, raw blocks |
//! | [`health`] | Status message and health policy builders |
//! | [`helpers`] | Computed template fields and `#Schema` definitions |
//! | [`tree`], [`hoist`], [`partition`] | Operation list to field tree |
//! | [`translate`] | Value/condition rendering |
//! | [`serializer`] | Field tree to text |
//! | [`format`] | Delimiter-depth re-indenter |
//! | [`step`] | Workflow step actions |
//! | [`definition`] | Component, trait and workflow step definitions, manifests |
//! | [`placement`] | Cluster placement constraints |
//! | [`registry`] | Definition collection and JSON export |

pub mod ast;
pub mod collections;
pub mod container;
pub mod definition;
pub mod error;
pub mod format;
pub mod health;
pub mod helpers;
pub mod hoist;
pub mod partition;
pub mod path;
pub mod placement;
pub mod registry;
pub mod resource;
pub mod serializer;
pub mod step;
pub mod template;
pub mod translate;
pub mod tree;

pub use definition::{Definition, DefinitionKind, Workload};
pub use error::{CompileError, FormatError, PlacementError, RegistryError};
pub use registry::Registry;
pub use serializer::EmitOptions;

/// Everything needed to build definitions.
pub mod prelude {
    pub use crate::ast::{stdlib, CompOp, Condition, ContextField, Param, ParamKind, Transform, Value};
    pub use crate::collections::{
        field_map, ArrayBuilder, ArrayElement, FieldMap, FieldValue, MultiSource, Pipeline,
    };
    pub use crate::container::{ContainerField, ContainerGroup, ContainerPatch, FieldGuard};
    pub use crate::context;
    pub use crate::definition::{Definition, DefinitionKind, Workload};
    pub use crate::helpers::{HelperSchema, HelperType, TemplateHelper};
    pub use crate::placement::{all, any, label, not, PlacementCondition, PlacementSpec};
    pub use crate::registry::Registry;
    pub use crate::resource::{OpRecorder, PatchResource, Resource};
    pub use crate::serializer::EmitOptions;
    pub use crate::step::StepTemplate;
    pub use crate::template::Template;
}

/// Runtime context references (`context.*`).
pub mod context {
    use crate::ast::{ContextField, Value};

    pub fn name() -> Value {
        Value::Context(ContextField::Name)
    }

    pub fn namespace() -> Value {
        Value::Context(ContextField::Namespace)
    }

    pub fn app_name() -> Value {
        Value::Context(ContextField::AppName)
    }

    pub fn app_revision() -> Value {
        Value::Context(ContextField::AppRevision)
    }

    pub fn app_revision_num() -> Value {
        Value::Context(ContextField::AppRevisionNum)
    }

    pub fn revision() -> Value {
        Value::Context(ContextField::Revision)
    }

    pub fn cluster_major() -> Value {
        Value::Context(ContextField::ClusterVersionMajor)
    }

    pub fn cluster_minor() -> Value {
        Value::Context(ContextField::ClusterVersionMinor)
    }

    pub fn cluster_git_version() -> Value {
        Value::Context(ContextField::ClusterVersionGitVersion)
    }

    pub fn cluster_platform() -> Value {
        Value::Context(ContextField::ClusterVersionPlatform)
    }

    /// `context.output.<path>`
    pub fn output(path: impl Into<String>) -> Value {
        Value::Context(ContextField::Output(path.into()))
    }

    /// `context.outputs.<name>.<path>`
    pub fn outputs(name: impl Into<String>, path: impl Into<String>) -> Value {
        Value::Context(ContextField::Outputs {
            name: name.into(),
            path: path.into(),
        })
    }
}
