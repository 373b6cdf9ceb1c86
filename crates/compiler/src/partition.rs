//! Branch partitioner.
//!
//! With two or more top-level `If` blocks, merging every op into one tree
//! could unify fields that different blocks write under different guards.
//! Instead each block gets its own tree, rendered under the longest field
//! prefix common to every op path.

use crate::ast::Condition;
use crate::hoist::hoist;
use crate::path::{parse_path, Segment};
use crate::resource::{FieldOp, IfBlock, ResourceOp};
use crate::tree::{build_block_tree, build_tree, FieldNode};

/// How an op list is laid out for emission.
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// No ops at all.
    Empty,
    /// The parameter set is the whole patch.
    Passthrough,
    /// One merged, hoisted tree.
    Merged(FieldNode),
    Partitioned(Partition),
}

/// Independent subtrees under a shared prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Field names rendered inline once, e.g. `spec: template: `.
    pub prefix: Vec<String>,
    /// Unconditional ops, navigated past the prefix.
    pub bare: FieldNode,
    /// Each block's guard and its own subtree.
    pub blocks: Vec<(Condition, FieldNode)>,
}

/// Lay out `ops` for emission.
pub fn plan(ops: &[ResourceOp]) -> Plan {
    if ops.is_empty() {
        return Plan::Empty;
    }
    if ops.iter().any(|op| matches!(op, ResourceOp::Passthrough)) {
        return Plan::Passthrough;
    }

    let blocks: Vec<&IfBlock> = ops
        .iter()
        .filter_map(|op| match op {
            ResourceOp::If(block) => Some(block),
            _ => None,
        })
        .collect();

    if blocks.len() <= 1 {
        let mut tree = build_tree(ops);
        hoist(&mut tree);
        return Plan::Merged(tree);
    }

    let bare_ops: Vec<FieldOp> = ops
        .iter()
        .filter_map(|op| match op {
            ResourceOp::Field(field_op) => Some(field_op.clone()),
            _ => None,
        })
        .collect();

    let paths = bare_ops
        .iter()
        .chain(blocks.iter().flat_map(|b| b.ops.iter()))
        .map(|op| parse_path(op.path()));
    let prefix = common_prefix(paths);
    let prefix_segments: Vec<Segment> = prefix.iter().cloned().map(Segment::Field).collect();
    tracing::debug!(blocks = blocks.len(), prefix = %prefix.join("."), "partitioning if blocks");

    let mut bare = build_block_tree(&bare_ops).take_subtree(&prefix_segments);
    hoist(&mut bare);

    let blocks = blocks
        .into_iter()
        .map(|block| {
            let mut tree = build_block_tree(&block.ops).take_subtree(&prefix_segments);
            hoist(&mut tree);
            (block.cond.clone(), tree)
        })
        .collect();

    Plan::Partitioned(Partition {
        prefix,
        bare,
        blocks,
    })
}

/// Longest run of leading field names shared by every path, always leaving
/// at least one segment below it.
pub fn common_prefix<I>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<Segment>>,
{
    let mut prefix: Option<Vec<String>> = None;
    for path in paths {
        let limit = path.len().saturating_sub(1);
        let fields: Vec<String> = path
            .iter()
            .take(limit)
            .map_while(|seg| seg.as_field().map(str::to_string))
            .collect();
        prefix = Some(match prefix {
            None => fields,
            Some(current) => current
                .into_iter()
                .zip(fields)
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    prefix.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parse_path;
    use crate::resource::{OpRecorder, PatchResource};

    #[test]
    fn test_prefix_leaves_one_level() {
        let prefix = common_prefix([
            parse_path("spec.template.spec.a"),
            parse_path("spec.template.spec.b.c"),
        ]);
        assert_eq!(prefix, vec!["spec", "template", "spec"]);

        let prefix = common_prefix([parse_path("spec.replicas"), parse_path("spec.replicas")]);
        assert_eq!(prefix, vec!["spec"]);
    }

    #[test]
    fn test_prefix_stops_at_index() {
        let prefix = common_prefix([
            parse_path("spec.containers[0].image"),
            parse_path("spec.containers[0].name"),
        ]);
        assert_eq!(prefix, vec!["spec", "containers"]);
    }

    #[test]
    fn test_single_block_merges() {
        let patch = PatchResource::new()
            .begin_if(Condition::is_set("a"))
            .set("spec.a", 1)
            .end_if();
        assert!(matches!(plan(patch.ops()), Plan::Merged(_)));
    }

    #[test]
    fn test_two_blocks_partition() {
        let a = Condition::is_set("a");
        let b = Condition::is_set("b");
        let patch = PatchResource::new()
            .begin_if(a.clone())
            .set("spec.template.spec.x", 1)
            .end_if()
            .begin_if(b.clone())
            .set("spec.template.spec.x", 2)
            .end_if();

        let Plan::Partitioned(partition) = plan(patch.ops()) else {
            panic!("expected a partitioned plan");
        };
        assert_eq!(partition.prefix, vec!["spec", "template", "spec"]);
        assert!(partition.bare.is_empty());
        assert_eq!(partition.blocks.len(), 2);
        assert_eq!(partition.blocks[0].0, a);
        assert_eq!(partition.blocks[1].0, b);
    }

    #[test]
    fn test_passthrough_and_empty() {
        assert_eq!(plan(&[]), Plan::Empty);
        let patch = PatchResource::new().passthrough();
        assert_eq!(plan(patch.ops()), Plan::Passthrough);
    }
}
