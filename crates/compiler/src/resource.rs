//! Operation recorder: resources and patches built from fluent calls.
//!
//! Both [`Resource`] and [`PatchResource`] record an ordered list of
//! [`ResourceOp`]s through the [`OpRecorder`] trait. Conditional blocks are
//! tracked with a stack of open scopes:
//!
//! - `begin_if` pushes a scope; ops recorded afterwards land in it.
//! - `end_if` pops the innermost scope. With no open scope it does nothing.
//! - A scope closed while another is still open is folded into its parent,
//!   with its condition pushed down onto each of its ops. Top-level `If`
//!   blocks therefore never contain other blocks.
//!
//! ```rust
//! use cuekit_compiler::prelude::*;
//!
//! let cpu = Param::string("cpu");
//! let deployment = Resource::new("apps/v1", "Deployment")
//!     .set("spec.replicas", 1)
//!     .begin_if(cpu.is_set())
//!     .set("spec.template.spec.containers[0].resources.limits.cpu", &cpu)
//!     .end_if()
//!     .finish();
//!
//! assert_eq!(deployment.ops().len(), 2);
//! ```

use crate::ast::{Condition, Value};
use crate::error::CompileError;
use serde::{Deserialize, Serialize};

/// An operation that writes at a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldOp {
    Set {
        path: String,
        value: Value,
    },
    SetIf {
        path: String,
        value: Value,
        cond: Condition,
    },
    /// Spread the fields of `value` into the block at `path`.
    SpreadIf {
        path: String,
        value: Value,
        cond: Condition,
    },
    /// `(k): v` for every entry of the `source` map.
    ForEach {
        path: String,
        source: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<Condition>,
    },
    /// Replace an array, merging elements by `key`.
    PatchKey {
        path: String,
        key: String,
        elements: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<Condition>,
    },
    /// Constrain every element of the array at `path`.
    SpreadAll {
        path: String,
        elements: Vec<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<Condition>,
    },
    /// Annotate the field at `path` with a merge strategy.
    PatchStrategy { path: String, strategy: String },
}

impl FieldOp {
    pub fn path(&self) -> &str {
        match self {
            FieldOp::Set { path, .. }
            | FieldOp::SetIf { path, .. }
            | FieldOp::SpreadIf { path, .. }
            | FieldOp::ForEach { path, .. }
            | FieldOp::PatchKey { path, .. }
            | FieldOp::SpreadAll { path, .. }
            | FieldOp::PatchStrategy { path, .. } => path,
        }
    }

    /// Push `outer` down onto this op, conjoined with any guard it already has.
    pub fn guarded(self, outer: &Condition) -> FieldOp {
        let conjoin = |inner: Option<Condition>| Condition::conjoin(Some(outer), inner.as_ref());
        match self {
            FieldOp::Set { path, value } => FieldOp::SetIf {
                path,
                value,
                cond: outer.clone(),
            },
            FieldOp::SetIf { path, value, cond } => FieldOp::SetIf {
                path,
                value,
                cond: Condition::And(vec![outer.clone(), cond]),
            },
            FieldOp::SpreadIf { path, value, cond } => FieldOp::SpreadIf {
                path,
                value,
                cond: Condition::And(vec![outer.clone(), cond]),
            },
            FieldOp::ForEach {
                path,
                source,
                guard,
            } => FieldOp::ForEach {
                path,
                source,
                guard: conjoin(guard),
            },
            FieldOp::PatchKey {
                path,
                key,
                elements,
                guard,
            } => FieldOp::PatchKey {
                path,
                key,
                elements,
                guard: conjoin(guard),
            },
            FieldOp::SpreadAll {
                path,
                elements,
                guard,
            } => FieldOp::SpreadAll {
                path,
                elements,
                guard: conjoin(guard),
            },
            annotation @ FieldOp::PatchStrategy { .. } => annotation,
        }
    }
}

/// A conditional block of field operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfBlock {
    pub cond: Condition,
    pub ops: Vec<FieldOp>,
}

/// A recorded operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceOp {
    If(IfBlock),
    /// The whole parameter set becomes the patch.
    Passthrough,
    #[serde(untagged)]
    Field(FieldOp),
}

/// Ordered op list plus the stack of open `If` scopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpList {
    #[serde(default)]
    ops: Vec<ResourceOp>,
    #[serde(skip)]
    scopes: Vec<IfBlock>,
}

impl OpList {
    pub fn ops(&self) -> &[ResourceOp] {
        &self.ops
    }

    pub fn open_scopes(&self) -> usize {
        self.scopes.len()
    }

    fn record(&mut self, op: FieldOp) {
        match self.scopes.last_mut() {
            Some(scope) => scope.ops.push(op),
            None => self.ops.push(ResourceOp::Field(op)),
        }
    }

    fn push_top(&mut self, op: ResourceOp) {
        self.ops.push(op);
    }

    fn begin(&mut self, cond: Condition) {
        self.scopes.push(IfBlock {
            cond,
            ops: Vec::new(),
        });
    }

    fn end(&mut self) {
        let Some(block) = self.scopes.pop() else {
            tracing::debug!("end_if with no open block ignored");
            return;
        };
        match self.scopes.last_mut() {
            Some(parent) => {
                let cond = block.cond;
                parent
                    .ops
                    .extend(block.ops.into_iter().map(|op| op.guarded(&cond)));
            }
            None => self.ops.push(ResourceOp::If(block)),
        }
    }

    fn close_all(&mut self) -> usize {
        let open = self.scopes.len();
        while !self.scopes.is_empty() {
            self.end();
        }
        open
    }
}

/// Fluent recording API shared by resources and patches.
pub trait OpRecorder: Sized {
    #[doc(hidden)]
    fn op_list(&mut self) -> &mut OpList;

    fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op_list().record(FieldOp::Set {
            path: path.into(),
            value: value.into(),
        });
        self
    }

    fn set_if(mut self, cond: Condition, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.op_list().record(FieldOp::SetIf {
            path: path.into(),
            value: value.into(),
            cond,
        });
        self
    }

    fn spread_if(
        mut self,
        cond: Condition,
        path: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.op_list().record(FieldOp::SpreadIf {
            path: path.into(),
            value: value.into(),
            cond,
        });
        self
    }

    fn for_each(mut self, path: impl Into<String>, source: impl Into<Value>) -> Self {
        self.op_list().record(FieldOp::ForEach {
            path: path.into(),
            source: source.into(),
            guard: None,
        });
        self
    }

    fn patch_key(
        mut self,
        path: impl Into<String>,
        key: impl Into<String>,
        elements: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.op_list().record(FieldOp::PatchKey {
            path: path.into(),
            key: key.into(),
            elements: elements.into_iter().collect(),
            guard: None,
        });
        self
    }

    fn spread_all(
        mut self,
        path: impl Into<String>,
        elements: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.op_list().record(FieldOp::SpreadAll {
            path: path.into(),
            elements: elements.into_iter().collect(),
            guard: None,
        });
        self
    }

    fn patch_strategy(mut self, path: impl Into<String>, strategy: impl Into<String>) -> Self {
        self.op_list().record(FieldOp::PatchStrategy {
            path: path.into(),
            strategy: strategy.into(),
        });
        self
    }

    /// Open a conditional block. Blocks may nest.
    fn begin_if(mut self, cond: Condition) -> Self {
        self.op_list().begin(cond);
        self
    }

    /// Close the innermost open block; a no-op when none is open.
    fn end_if(mut self) -> Self {
        self.op_list().end();
        self
    }
}

// ============================================================================
// Resource
// ============================================================================

/// A resource written into `output` or `outputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    #[serde(flatten)]
    ops: OpList,
}

impl Resource {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            ops: OpList::default(),
        }
    }

    pub fn ops(&self) -> &[ResourceOp] {
        self.ops.ops()
    }

    pub fn open_scopes(&self) -> usize {
        self.ops.open_scopes()
    }

    /// Close any blocks left open and return the finished resource.
    pub fn finish(mut self) -> Self {
        let open = self.ops.close_all();
        if open > 0 {
            tracing::warn!(kind = %self.kind, open, "closing unterminated if blocks");
        }
        self
    }

    /// Like [`finish`](Self::finish), but an unterminated block is an error.
    pub fn try_finish(self) -> Result<Self, CompileError> {
        match self.open_scopes() {
            0 => Ok(self),
            depth => Err(CompileError::UnclosedBlock { depth }),
        }
    }
}

impl OpRecorder for Resource {
    fn op_list(&mut self) -> &mut OpList {
        &mut self.ops
    }
}

/// A patch applied to an existing document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchResource {
    #[serde(flatten)]
    ops: OpList,
}

impl PatchResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the entire parameter set the patch.
    pub fn passthrough(mut self) -> Self {
        self.ops.push_top(ResourceOp::Passthrough);
        self
    }

    pub fn ops(&self) -> &[ResourceOp] {
        self.ops.ops()
    }

    pub fn is_passthrough(&self) -> bool {
        self.ops().iter().any(|op| matches!(op, ResourceOp::Passthrough))
    }

    pub fn open_scopes(&self) -> usize {
        self.ops.open_scopes()
    }

    pub fn finish(mut self) -> Self {
        let open = self.ops.close_all();
        if open > 0 {
            tracing::warn!(open, "closing unterminated if blocks in patch");
        }
        self
    }

    pub fn try_finish(self) -> Result<Self, CompileError> {
        match self.open_scopes() {
            0 => Ok(self),
            depth => Err(CompileError::UnclosedBlock { depth }),
        }
    }
}

impl OpRecorder for PatchResource {
    fn op_list(&mut self) -> &mut OpList {
        &mut self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Param;

    #[test]
    fn test_end_if_without_block_is_noop() {
        let res = Resource::new("v1", "ConfigMap").end_if().set("data.a", "b");
        assert_eq!(res.ops().len(), 1);
        assert_eq!(res.open_scopes(), 0);
    }

    #[test]
    fn test_block_collects_ops() {
        let enabled = Param::bool("enabled");
        let res = Resource::new("v1", "ConfigMap")
            .begin_if(enabled.truthy())
            .set("data.a", "1")
            .set("data.b", "2")
            .end_if();
        match &res.ops()[0] {
            ResourceOp::If(block) => assert_eq!(block.ops.len(), 2),
            other => panic!("expected if block, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_block_folds_into_parent() {
        let outer = Condition::is_set("a");
        let inner = Condition::is_set("b");
        let res = Resource::new("v1", "ConfigMap")
            .begin_if(outer.clone())
            .set("data.x", "1")
            .begin_if(inner.clone())
            .set("data.y", "2")
            .end_if()
            .end_if();

        assert_eq!(res.ops().len(), 1);
        let ResourceOp::If(block) = &res.ops()[0] else {
            panic!("expected if block");
        };
        assert_eq!(block.cond, outer);
        assert_eq!(
            block.ops[1],
            FieldOp::SetIf {
                path: "data.y".to_string(),
                value: Value::from("2"),
                cond: inner,
            }
        );
    }

    #[test]
    fn test_finish_closes_open_blocks() {
        let res = Resource::new("v1", "ConfigMap")
            .begin_if(Condition::is_set("a"))
            .set("data.x", "1");
        assert_eq!(res.open_scopes(), 1);
        assert!(res.clone().try_finish().is_err());
        let res = res.finish();
        assert_eq!(res.open_scopes(), 0);
        assert!(matches!(res.ops()[0], ResourceOp::If(_)));
    }

    #[test]
    fn test_guarded_conjoins_existing_guard() {
        let op = FieldOp::SetIf {
            path: "a".into(),
            value: Value::from(1),
            cond: Condition::is_set("y"),
        };
        let guarded = op.guarded(&Condition::is_set("x"));
        assert_eq!(
            guarded,
            FieldOp::SetIf {
                path: "a".into(),
                value: Value::from(1),
                cond: Condition::and([Condition::is_set("x"), Condition::is_set("y")]),
            }
        );
    }

    #[test]
    fn test_passthrough() {
        let patch = PatchResource::new().passthrough();
        assert!(patch.is_passthrough());
    }

    #[test]
    fn test_serde_shape() {
        let res = Resource::new("v1", "ConfigMap").set("data.a", "b");
        let json = serde_json::to_value(&res).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["ops"][0]["set"]["path"], "data.a");
        let back: Resource = serde_json::from_value(json).unwrap();
        assert_eq!(back, res);
    }
}
