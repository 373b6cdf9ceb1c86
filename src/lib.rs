//! # cuekit
//!
//! Build CUE component, trait and workflow step definitions from Rust, and test them by
//! rendering their templates against mock runtime contexts.
//!
//! ## Features
//!
//! | Feature | Crate | Description |
//! |---------|-------|-------------|
//! | (always) | [`cuekit-compiler`] | Builder DSL, op-tree compiler, CUE emitter, registry |
//! | `eval`   | [`cuekit-eval`]     | Test evaluator rendering templates to JSON |
//!
//! `default = ["eval"]`.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! cuekit = "0.1"
//! ```
//!
//! ```rust
//! use cuekit::prelude::*;
//! use cuekit::eval::{render_resource, TestContext};
//!
//! let replicas = Param::int("replicas").default_value(1);
//! let deployment = Resource::new("apps/v1", "Deployment")
//!     .set("metadata.name", context::name())
//!     .set("spec.replicas", &replicas);
//!
//! let def = Definition::component("worker")
//!     .workload("apps/v1", "Deployment")
//!     .param(replicas)
//!     .template(Template::new().output(deployment.clone()));
//! assert!(def.to_cue().unwrap().contains("replicas: parameter.replicas"));
//!
//! let ctx = TestContext::new().name("jobs").param("replicas", 4).build();
//! let rendered = render_resource(&deployment, &ctx).unwrap();
//! assert_eq!(rendered.get_i64("spec.replicas"), Some(4));
//! ```

pub use cuekit_compiler as compiler;
pub use cuekit_compiler::{
    prelude, CompileError, Definition, DefinitionKind, EmitOptions, Registry, RegistryError,
};

#[cfg(feature = "eval")]
pub use cuekit_eval as eval;
