//! The emitter's field tree and the evaluator must agree on which paths
//! exist for a given context.

use cuekit::compiler::partition::{plan, Plan};
use cuekit::compiler::path::{join_path, Segment};
use cuekit::compiler::resource::ResourceOp;
use cuekit::eval::document::leaf_paths;
use cuekit::eval::{evaluate_ops, Evaluator, RuntimeContext, TestContext};
use cuekit::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

/// Paths the emitted text would materialise for `ctx`.
fn emitted_paths(ops: &[ResourceOp], ctx: &RuntimeContext) -> BTreeSet<String> {
    let mut leaves: Vec<(Vec<Segment>, Vec<Condition>)> = Vec::new();
    match plan(ops) {
        Plan::Empty | Plan::Passthrough => {}
        Plan::Merged(tree) => leaves = tree.effective_leaves(),
        Plan::Partitioned(partition) => {
            let prefix: Vec<Segment> = partition
                .prefix
                .iter()
                .cloned()
                .map(Segment::Field)
                .collect();
            let rooted = |path: Vec<Segment>| {
                let mut full = prefix.clone();
                full.extend(path);
                full
            };
            for (path, conds) in partition.bare.effective_leaves() {
                leaves.push((rooted(path), conds));
            }
            for (cond, tree) in partition.blocks {
                for (path, mut conds) in tree.effective_leaves() {
                    conds.insert(0, cond.clone());
                    leaves.push((rooted(path), conds));
                }
            }
        }
    }

    let mut ev = Evaluator::new(ctx);
    let present = leaves
        .into_iter()
        .filter(|(_, conds)| {
            conds
                .iter()
                .all(|cond| ev.condition(cond).expect("condition evaluates"))
        })
        .map(|(path, _)| path)
        .collect();
    compact_indices(present)
        .iter()
        .map(|path| join_path(path))
        .collect()
}

/// Renumber list indices the way a list literal does: the elements that
/// are present, in index order, from zero.
fn compact_indices(mut paths: Vec<Vec<Segment>>) -> Vec<Vec<Segment>> {
    let depth = paths.iter().map(Vec::len).max().unwrap_or(0);
    for k in 0..depth {
        let mut used: HashMap<Vec<Segment>, BTreeSet<usize>> = HashMap::new();
        for path in &paths {
            if let Some(Segment::Index(i)) = path.get(k) {
                used.entry(path[..k].to_vec()).or_default().insert(*i);
            }
        }
        for path in &mut paths {
            if let Some(Segment::Index(i)) = path.get(k).cloned() {
                let rank = used[&path[..k]]
                    .iter()
                    .position(|candidate| *candidate == i)
                    .expect("index was collected");
                path[k] = Segment::Index(rank);
            }
        }
    }
    paths
}

fn evaluated_paths(ops: &[ResourceOp], ctx: &RuntimeContext) -> BTreeSet<String> {
    let doc = evaluate_ops(ops, ctx).expect("ops evaluate");
    leaf_paths(&doc).into_iter().collect()
}

fn assert_agree(ops: &[ResourceOp], ctx: &RuntimeContext) {
    assert_eq!(emitted_paths(ops, ctx), evaluated_paths(ops, ctx));
}

/// Every combination of the given optional parameters being supplied.
fn contexts(optional: &[(&str, serde_json::Value)]) -> Vec<RuntimeContext> {
    (0..1u32 << optional.len())
        .map(|mask| {
            let mut ctx = TestContext::new().name("agree");
            for (i, (name, value)) in optional.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    ctx = ctx.param(*name, value.clone());
                }
            }
            ctx.build()
        })
        .collect()
}

#[test]
fn test_conditional_sets_agree() {
    let cpu = Param::string("cpu");
    let memory = Param::string("memory");
    let limits = Param::bool("limits");
    let res = Resource::new("apps/v1", "Deployment")
        .set("metadata.name", context::name())
        .set("spec.replicas", 2)
        .set_if(
            Condition::and([limits.truthy(), cpu.is_set()]),
            "spec.template.spec.containers[0].resources.limits.cpu",
            &cpu,
        )
        .set_if(
            Condition::and([limits.truthy(), memory.is_set()]),
            "spec.template.spec.containers[0].resources.limits.memory",
            &memory,
        )
        .set("spec.template.spec.containers[0].name", "main");

    for ctx in contexts(&[
        ("cpu", json!("1")),
        ("memory", json!("1Gi")),
        ("limits", json!(true)),
    ]) {
        assert_agree(res.ops(), &ctx);
    }
}

#[test]
fn test_single_block_agrees() {
    let host = Param::string("host");
    let res = Resource::new("networking.k8s.io/v1", "Ingress")
        .set("metadata.name", context::name())
        .begin_if(host.is_set())
        .set("spec.rules[0].host", &host)
        .set("spec.rules[0].http.paths[0].path", "/")
        .end_if();

    for ctx in contexts(&[("host", json!("example.com"))]) {
        assert_agree(res.ops(), &ctx);
    }
}

#[test]
fn test_multi_branch_agrees() {
    let cpu = Param::string("cpu");
    let gpu = Param::bool("gpu");
    let patch = PatchResource::new()
        .set("spec.template.spec.priorityClassName", "normal")
        .begin_if(cpu.is_set())
        .set("spec.template.spec.resources.limits.cpu", &cpu)
        .end_if()
        .begin_if(cpu.not_set())
        .set("spec.template.spec.resources.limits.cpu", "100m")
        .end_if()
        .begin_if(gpu.eq(true))
        .set("spec.template.spec.nodeSelector.accelerator", "gpu")
        .set("spec.template.spec.tolerations[0].key", "gpu")
        .end_if();

    for ctx in contexts(&[("cpu", json!("2")), ("gpu", json!(true))]) {
        assert_agree(patch.ops(), &ctx);
    }
}

#[test]
fn test_nested_blocks_agree() {
    let expose = Param::bool("expose");
    let tls = Param::bool("tls");
    let res = Resource::new("v1", "Service")
        .set("spec.type", "ClusterIP")
        .begin_if(expose.eq(true))
        .set("spec.ports[0].port", 80)
        .begin_if(tls.eq(true))
        .set("spec.ports[0].name", "https")
        .end_if()
        .end_if()
        .finish();

    for ctx in contexts(&[("expose", json!(true)), ("tls", json!(true))]) {
        assert_agree(res.ops(), &ctx);
    }
}

#[test]
fn test_multi_branch_gates_own_fields() {
    let cpu = Param::string("cpu");
    let patch = PatchResource::new()
        .begin_if(cpu.is_set())
        .set("spec.cpu", &cpu)
        .end_if()
        .begin_if(cpu.not_set())
        .set("spec.cpu", "100m")
        .end_if();

    let with_cpu = TestContext::new().param("cpu", "2").build();
    let without = TestContext::new().build();
    assert_eq!(
        evaluate_ops(patch.ops(), &with_cpu).unwrap(),
        json!({"spec": {"cpu": "2"}})
    );
    assert_eq!(
        evaluate_ops(patch.ops(), &without).unwrap(),
        json!({"spec": {"cpu": "100m"}})
    );
    assert_agree(patch.ops(), &with_cpu);
    assert_agree(patch.ops(), &without);
}

#[test]
fn test_all_of_with_disjunction_agrees() {
    let cpu = Param::string("cpu");
    let memory = Param::string("memory");
    let limits = Param::bool("limits");
    let res = Resource::new("v1", "Pod")
        .set("spec.name", "main")
        .set_if(
            Condition::and([
                limits.eq(true),
                Condition::all_of([
                    Condition::or([cpu.is_set(), memory.is_set()]),
                    Condition::not(Condition::is_set("unlimited")),
                ]),
            ]),
            "spec.resources.limited",
            true,
        )
        .set_if(
            Condition::all_of([Condition::or([cpu.is_set(), memory.is_set()]), limits.eq(true)]),
            "spec.resources.policy",
            "strict",
        );

    for ctx in contexts(&[
        ("cpu", json!("1")),
        ("memory", json!("1Gi")),
        ("limits", json!(true)),
        ("unlimited", json!(true)),
    ]) {
        assert_agree(res.ops(), &ctx);
    }
}

#[test]
fn test_not_and_path_exists_agree() {
    let patch = PatchResource::new()
        .set_if(
            Condition::output_has("spec.template"),
            "spec.template.metadata.labels.patched",
            "true",
        )
        .set_if(
            Condition::not(Condition::output_has("spec.template")),
            "metadata.labels.patched",
            "true",
        )
        .set_if(
            Condition::path_not_exists("context.output.spec.replicas"),
            "spec.replicas",
            1,
        );

    let outputs = [
        None,
        Some(json!({"spec": {"template": {"spec": {}}}})),
        Some(json!({"spec": {"replicas": 3}})),
    ];
    for output in outputs {
        let mut ctx = TestContext::new().name("agree");
        if let Some(output) = output {
            ctx = ctx.output(output);
        }
        assert_agree(patch.ops(), &ctx.build());
    }
}

#[test]
fn test_guarded_array_index_agrees() {
    let sidecar = Param::bool("sidecar");
    let init = Param::string("init");
    let res = Resource::new("v1", "Pod")
        .set("spec.containers[0].name", "main")
        .set_if(sidecar.eq(true), "spec.containers[1].name", "proxy")
        .set_if(sidecar.eq(true), "spec.containers[1].image", "envoy")
        .set("spec.containers[2].name", "logger")
        .set_if(init.is_set(), "spec.initContainers[1].image", &init)
        .set_if(init.is_set(), "spec.initContainers[1].name", "init")
        .set_if(Condition::is_set("a"), "spec.volumes[0].a", 1)
        .set_if(Condition::is_set("b"), "spec.volumes[0].b", 2)
        .set("spec.volumes[1].name", "data");

    for ctx in contexts(&[
        ("sidecar", json!(true)),
        ("init", json!("busybox")),
        ("a", json!(1)),
        ("b", json!(2)),
    ]) {
        assert_agree(res.ops(), &ctx);
    }
}

#[test]
fn test_guarded_override_agrees() {
    let replicas = Param::int("replicas");
    let scale = Param::int("scale");
    let res = Resource::new("apps/v1", "Deployment")
        .set("spec.replicas", 1)
        .set_if(replicas.is_set(), "spec.replicas", &replicas)
        .set_if(scale.is_set(), "spec.replicas", &scale)
        .set("spec.strategy.type", "RollingUpdate")
        .begin_if(Condition::is_set("recreate"))
        .set("spec.strategy.type", "Recreate")
        .end_if();

    for ctx in contexts(&[
        ("replicas", json!(3)),
        ("scale", json!(5)),
        ("recreate", json!(true)),
    ]) {
        assert_agree(res.ops(), &ctx);
        let doc = evaluate_ops(res.ops(), &ctx).unwrap();
        assert!(doc["spec"]["replicas"].is_number());
    }
}
