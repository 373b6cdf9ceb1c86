//! Condition hoister.
//!
//! A bottom-up pass that moves a guard shared by every child of a node onto
//! the node itself. The shared part is each child's *base*: the first
//! operand of a top-level `And`, or the whole condition otherwise. Children
//! keep only their residual. The root is never given a condition.

use crate::ast::Condition;
use crate::tree::FieldNode;

/// Hoist conditions throughout the tree, deepest nodes first.
pub fn hoist(root: &mut FieldNode) {
    for child in root.children.values_mut() {
        hoist_node(child);
    }
}

fn hoist_node(node: &mut FieldNode) {
    for child in node.children.values_mut() {
        hoist_node(child);
    }
    if let Some(common) = common_base(node) {
        tracing::debug!(?common, "hoisting shared condition");
        for child in node.children.values_mut() {
            if let Some(cond) = child.cond.take() {
                child.cond = residual(&cond, &common);
            }
        }
        node.cond = Some(common);
    }
}

/// The base shared by all visible children, when hoisting is allowed.
fn common_base(node: &FieldNode) -> Option<Condition> {
    if node.payload.is_some() || node.cond.is_some() || !node.spreads.is_empty() {
        return None;
    }
    if node.children.is_empty() || node.children.values().any(FieldNode::is_empty) {
        return None;
    }
    // A fallback's guard is written beside its node, not under it.
    if node.children.values().any(|child| !child.fallbacks.is_empty()) {
        return None;
    }

    let mut bases = node.children.values().map(|child| child.cond.as_ref().map(base));
    let first = bases.next()??;
    for candidate in bases {
        if candidate? != first {
            return None;
        }
    }
    Some(first.clone())
}

/// The left-hand factor of a conjunction, or the condition itself.
pub fn base(cond: &Condition) -> &Condition {
    match cond {
        Condition::And(parts) if parts.len() >= 2 => &parts[0],
        other => other,
    }
}

/// What remains of `cond` once `base` is guaranteed by an ancestor.
pub fn residual(cond: &Condition, base: &Condition) -> Option<Condition> {
    if cond == base {
        return None;
    }
    match cond {
        Condition::And(parts) if parts.len() == 2 && &parts[0] == base => Some(parts[1].clone()),
        Condition::And(parts) if parts.len() > 2 && &parts[0] == base => {
            Some(Condition::And(parts[1..].to_vec()))
        }
        other => Some(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Segment;
    use crate::resource::{OpRecorder, Resource};
    use crate::tree::build_tree;

    fn seg(s: &str) -> Segment {
        Segment::Field(s.to_string())
    }

    #[test]
    fn test_hoists_shared_base() {
        let x = Condition::is_set("x");
        let y = Condition::is_set("y");
        let z = Condition::is_set("z");
        let res = Resource::new("v1", "Pod")
            .set_if(Condition::and([x.clone(), y.clone()]), "parent.a", 1)
            .set_if(Condition::and([x.clone(), z.clone()]), "parent.b", 2);
        let mut tree = build_tree(res.ops());
        hoist(&mut tree);

        let parent = &tree.children[&seg("parent")];
        assert_eq!(parent.cond, Some(x));
        assert_eq!(parent.children[&seg("a")].cond, Some(y));
        assert_eq!(parent.children[&seg("b")].cond, Some(z));
    }

    #[test]
    fn test_unconditional_sibling_blocks_hoist() {
        let x = Condition::is_set("x");
        let res = Resource::new("v1", "Pod")
            .set_if(x.clone(), "parent.a", 1)
            .set("parent.b", 2);
        let mut tree = build_tree(res.ops());
        hoist(&mut tree);
        let parent = &tree.children[&seg("parent")];
        assert!(parent.cond.is_none());
        assert_eq!(parent.children[&seg("a")].cond, Some(x));
    }

    #[test]
    fn test_mismatched_bases_unchanged() {
        let res = Resource::new("v1", "Pod")
            .set_if(Condition::is_set("x"), "parent.a", 1)
            .set_if(Condition::is_set("y"), "parent.b", 2);
        let mut tree = build_tree(res.ops());
        let before = tree.clone();
        hoist(&mut tree);
        assert_eq!(tree, before);
    }

    #[test]
    fn test_hoist_chains_upward_but_not_to_root() {
        let x = Condition::is_set("x");
        let res = Resource::new("v1", "Pod")
            .begin_if(x.clone())
            .set("spec.resources.cpu", "1")
            .set("spec.resources.memory", "1Gi")
            .end_if();
        let mut tree = build_tree(res.ops());
        hoist(&mut tree);

        assert!(tree.cond.is_none());
        let spec = &tree.children[&seg("spec")];
        assert_eq!(spec.cond, Some(x));
        let resources = &spec.children[&seg("resources")];
        assert!(resources.cond.is_none());
        assert!(resources.children.values().all(|c| c.cond.is_none()));
    }

    #[test]
    fn test_fallback_blocks_hoist() {
        let x = Condition::is_set("x");
        let res = Resource::new("v1", "Pod")
            .set("parent.a", 0)
            .set_if(x.clone(), "parent.a", 1)
            .set_if(x.clone(), "parent.b", 2);
        let mut tree = build_tree(res.ops());
        hoist(&mut tree);
        let parent = &tree.children[&seg("parent")];
        assert!(parent.cond.is_none());
        assert_eq!(parent.children[&seg("a")].cond, Some(x));
    }

    #[test]
    fn test_residual_of_long_conjunction() {
        let parts = [
            Condition::is_set("a"),
            Condition::is_set("b"),
            Condition::is_set("c"),
        ];
        let cond = Condition::and(parts.clone());
        assert_eq!(base(&cond), &parts[0]);
        assert_eq!(
            residual(&cond, &parts[0]),
            Some(Condition::and([parts[1].clone(), parts[2].clone()]))
        );
    }
}
