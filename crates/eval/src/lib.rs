//! # cuekit-eval
//!
//! Renders the operation trees recorded by `cuekit-compiler` into concrete
//! JSON documents for a mock runtime context, so definitions can be tested
//! without a CUE toolchain.
//!
//! ```rust
//! use cuekit_compiler::prelude::*;
//! use cuekit_eval::{render_resource, TestContext};
//!
//! let image = Param::string("image").default_value("nginx");
//! let deployment = Resource::new("apps/v1", "Deployment")
//!     .set("metadata.name", context::name())
//!     .set("spec.template.spec.containers[0].image", &image);
//!
//! let ctx = TestContext::new().name("web").build();
//! let rendered = render_resource(&deployment, &ctx).unwrap();
//!
//! assert_eq!(rendered.kind(), Some("Deployment"));
//! assert_eq!(rendered.get_str("metadata.name"), Some("web"));
//! assert_eq!(
//!     rendered.get_str("spec.template.spec.containers[0].image"),
//!     Some("nginx")
//! );
//! ```

mod collections;
pub mod container;
pub mod context;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod health;
mod helpers;
pub mod render;
pub mod stdlib;
pub mod step;

pub use container::{render_container_patch, RenderedContainerPatch};
pub use context::{ClusterVersion, RuntimeContext, TestContext};
pub use error::EvalError;
pub use evaluator::Evaluator;
pub use health::{custom_status, is_healthy};
pub use render::{
    evaluate_ops, render_patch, render_resource, render_template, RenderedResource,
    RenderedTemplate,
};
pub use step::{render_step, BuiltinCall, RenderedStep};
