//! Field tree builder.
//!
//! Converts an ordered op list into a path-keyed tree. Ops sharing a path
//! prefix share a subtree; children keep insertion order. Each node holds at
//! most one payload and is never both a leaf and a branch: a later write
//! through or onto an existing node replaces what was there (last writer
//! wins), matching the evaluator's assignment semantics.
//!
//! A guarded leaf written over an earlier leaf only wins when its guard
//! holds. The earlier payload is kept as a [`Fallback`] guarded by the
//! negation, so `replicas: 1` followed by `if c { replicas: n }` becomes
//! `if !(c) { replicas: 1 }` and `if c { replicas: n }`. Shape changes
//! (a leaf replaced by a branch or the reverse) stay last writer wins.

use crate::ast::{Condition, Value};
use crate::path::{parse_path, Segment};
use crate::resource::{FieldOp, ResourceOp};
use indexmap::IndexMap;

/// Terminal content of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Leaf(Value),
    ForEach(Value),
    PatchKey { key: String, elements: Vec<Value> },
    SpreadAll(Vec<Value>),
}

/// A value spread into the node's block under a guard.
#[derive(Debug, Clone, PartialEq)]
pub struct Spread {
    pub cond: Condition,
    pub value: Value,
}

/// An overridden payload, rendered when no later guarded write applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    pub payload: Payload,
    pub cond: Condition,
}

/// One path segment of the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldNode {
    pub children: IndexMap<Segment, FieldNode>,
    pub payload: Option<Payload>,
    pub cond: Option<Condition>,
    pub strategy: Option<String>,
    pub spreads: Vec<Spread>,
    pub fallbacks: Vec<Fallback>,
}

impl FieldNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// A node that contributes nothing to the output.
    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
            && self.spreads.is_empty()
            && self.children.values().all(FieldNode::is_empty)
    }

    /// Children that will actually be rendered.
    pub fn visible_children(&self) -> impl Iterator<Item = (&Segment, &FieldNode)> {
        self.children.iter().filter(|(_, child)| !child.is_empty())
    }

    /// True when every rendered child is addressed by index.
    pub fn is_list(&self) -> bool {
        let mut visible = self.visible_children().peekable();
        visible.peek().is_some() && visible.all(|(seg, _)| seg.is_index())
    }

    /// When the node renders anything at all: `None` means always.
    pub fn presence(&self) -> Option<Condition> {
        let own = match &self.cond {
            Some(cond) if !self.fallbacks.is_empty() => Some(Condition::Or(
                std::iter::once(cond.clone())
                    .chain(self.fallbacks.iter().map(|f| f.cond.clone()))
                    .collect(),
            )),
            other => other.clone(),
        };
        Condition::conjoin(own.as_ref(), self.content_guard().as_ref())
    }

    /// When a branch has any content, ignoring its own guard. A struct
    /// whose fields are all guarded is otherwise rendered even when empty.
    pub fn content_guard(&self) -> Option<Condition> {
        if self.payload.is_some() {
            return None;
        }
        let mut guards = Vec::new();
        for (_, child) in self.visible_children() {
            guards.push(child.presence()?);
        }
        guards.extend(self.spreads.iter().map(|spread| spread.cond.clone()));
        match guards.len() {
            0 => None,
            1 => guards.pop(),
            _ => Some(Condition::Or(guards)),
        }
    }

    /// A leaf node standing for one of this node's fallbacks.
    pub fn fallback_node(&self, fallback: &Fallback) -> FieldNode {
        FieldNode {
            payload: Some(fallback.payload.clone()),
            cond: Some(fallback.cond.clone()),
            strategy: self.strategy.clone(),
            ..FieldNode::default()
        }
    }

    /// Follow a segment path, if it exists.
    pub fn get(&self, segments: &[Segment]) -> Option<&FieldNode> {
        segments
            .iter()
            .try_fold(self, |node, seg| node.children.get(seg))
    }

    /// Descend along `segments`, creating branch nodes as needed.
    fn descend(&mut self, segments: &[Segment]) -> &mut FieldNode {
        let mut node = self;
        for seg in segments {
            if node.payload.take().is_some() {
                tracing::warn!(segment = %seg, "branch replaces an earlier leaf");
                node.cond = None;
                node.fallbacks.clear();
            }
            node = node.children.entry(seg.clone()).or_default();
        }
        node
    }

    fn set_payload(&mut self, payload: Payload, cond: Option<Condition>) {
        if !self.children.is_empty() {
            tracing::warn!("leaf replaces an earlier branch");
            self.children.clear();
        }
        if let Some(previous) = self.payload.take() {
            match &cond {
                None => {
                    tracing::debug!("last writer wins on repeated leaf");
                    self.fallbacks.clear();
                }
                Some(guard) if self.cond.as_ref() == Some(guard) => {
                    tracing::debug!("last writer wins under the same guard");
                }
                Some(guard) => {
                    tracing::debug!("guarded write keeps earlier leaf as fallback");
                    let unless = Condition::not(guard.clone());
                    for fallback in &mut self.fallbacks {
                        fallback.cond = Condition::And(vec![fallback.cond.clone(), unless.clone()]);
                    }
                    let fallback_cond = match self.cond.take() {
                        Some(earlier) => Condition::And(vec![earlier, unless]),
                        None => unless,
                    };
                    self.fallbacks.push(Fallback {
                        payload: previous,
                        cond: fallback_cond,
                    });
                }
            }
        }
        self.payload = Some(payload);
        self.cond = cond;
    }

    /// Insert one field op, conjoining `block` with the op's own guard.
    pub fn insert(&mut self, op: &FieldOp, block: Option<&Condition>) {
        let segments = parse_path(op.path());
        let node = self.descend(&segments);
        match op {
            FieldOp::Set { value, .. } => {
                node.set_payload(Payload::Leaf(value.clone()), block.cloned());
            }
            FieldOp::SetIf { value, cond, .. } => {
                node.set_payload(
                    Payload::Leaf(value.clone()),
                    Condition::conjoin(block, Some(cond)),
                );
            }
            FieldOp::SpreadIf { value, cond, .. } => {
                if let Some(cond) = Condition::conjoin(block, Some(cond)) {
                    node.spreads.push(Spread {
                        cond,
                        value: value.clone(),
                    });
                }
            }
            FieldOp::ForEach { source, guard, .. } => {
                node.set_payload(
                    Payload::ForEach(source.clone()),
                    Condition::conjoin(block, guard.as_ref()),
                );
            }
            FieldOp::PatchKey {
                key,
                elements,
                guard,
                ..
            } => {
                node.set_payload(
                    Payload::PatchKey {
                        key: key.clone(),
                        elements: elements.clone(),
                    },
                    Condition::conjoin(block, guard.as_ref()),
                );
            }
            FieldOp::SpreadAll {
                elements, guard, ..
            } => {
                node.set_payload(
                    Payload::SpreadAll(elements.clone()),
                    Condition::conjoin(block, guard.as_ref()),
                );
            }
            FieldOp::PatchStrategy { strategy, .. } => {
                node.strategy = Some(strategy.clone());
            }
        }
    }

    /// Move out the subtree at `prefix`, or an empty node if absent.
    pub fn take_subtree(mut self, prefix: &[Segment]) -> FieldNode {
        for seg in prefix {
            match self.children.shift_remove(seg) {
                Some(child) => self = child,
                None => return FieldNode::new(),
            }
        }
        self
    }

    /// Every payload-bearing path with its effective condition (the
    /// conjunction of guards from the root down), in tree order.
    pub fn effective_leaves(&self) -> Vec<(Vec<Segment>, Vec<Condition>)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves(
        &self,
        path: &mut Vec<Segment>,
        conds: &mut Vec<Condition>,
        out: &mut Vec<(Vec<Segment>, Vec<Condition>)>,
    ) {
        let pushed = match &self.cond {
            Some(cond) => {
                conds.push(cond.clone());
                true
            }
            None => false,
        };
        if self.payload.is_some() {
            out.push((path.clone(), flatten_conjuncts(conds)));
        }
        for fallback in &self.fallbacks {
            // A fallback replaces this node's own guard.
            let mut guards = conds.clone();
            if pushed {
                guards.pop();
            }
            guards.push(fallback.cond.clone());
            out.push((path.clone(), flatten_conjuncts(&guards)));
        }
        for (seg, child) in &self.children {
            path.push(seg.clone());
            child.collect_leaves(path, conds, out);
            path.pop();
        }
        if pushed {
            conds.pop();
        }
    }
}

/// Flatten nested binary `And`s into their conjunct list.
pub fn flatten_conjuncts(conds: &[Condition]) -> Vec<Condition> {
    let mut out = Vec::new();
    for cond in conds {
        match cond {
            Condition::And(parts) => out.extend(flatten_conjuncts(parts)),
            other => out.push(other.clone()),
        }
    }
    out
}

/// Build one merged tree from an op list. `If` block conditions are pushed
/// onto each of the block's ops.
pub fn build_tree(ops: &[ResourceOp]) -> FieldNode {
    let mut root = FieldNode::new();
    for op in ops {
        match op {
            ResourceOp::Field(field_op) => root.insert(field_op, None),
            ResourceOp::If(block) => {
                for inner in &block.ops {
                    root.insert(inner, Some(&block.cond));
                }
            }
            ResourceOp::Passthrough => {}
        }
    }
    tracing::debug!(children = root.children.len(), "built field tree");
    root
}

/// Build a tree from the ops of a single block, without its guard.
pub fn build_block_tree(ops: &[FieldOp]) -> FieldNode {
    let mut root = FieldNode::new();
    for op in ops {
        root.insert(op, None);
    }
    root
}
