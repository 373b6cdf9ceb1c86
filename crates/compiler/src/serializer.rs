//! Text emitter - render resources, patches and templates as CUE.
//!
//! The emitter walks the field tree produced by [`crate::partition::plan`]
//! and writes nested blocks, inlining single-child chains where no
//! annotation forces a block:
//!
//! ```text
//! output: {
//! 	apiVersion: "apps/v1"
//! 	kind: "Deployment"
//! 	spec: replicas: parameter.replicas
//! }
//! ```
//!
//! # Example
//!
//! ```rust
//! use cuekit_compiler::prelude::*;
//! use cuekit_compiler::serializer::compile_resource;
//!
//! let replicas = Param::int("replicas").default_value(1);
//! let deployment = Resource::new("apps/v1", "Deployment")
//!     .set("spec.replicas", &replicas);
//!
//! let text = compile_resource(&deployment);
//! assert!(text.contains("spec: replicas: parameter.replicas"));
//! ```

use crate::ast::{Condition, ParamKind, Value};
use crate::format::format_or_original;
use crate::partition::{plan, Partition, Plan};
use crate::path::Segment;
use crate::resource::{FieldOp, PatchResource, Resource, ResourceOp};
use crate::template::Template;
use crate::translate::{cue_label, quote, Imports, Translator};
use crate::tree::{FieldNode, Payload};
use std::fmt::Write;

/// Emitter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    /// One level of indentation.
    pub indent: String,
    /// Render `a: b: c: v` for single-child chains. When false every
    /// branch is an explicit block.
    pub inline_single_child: bool,
    /// Run the formatter over the finished text.
    pub format: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            indent: "\t".to_string(),
            inline_single_child: true,
            format: true,
        }
    }
}

/// Render a resource as a `{ apiVersion, kind, ... }` block.
pub fn compile_resource(resource: &Resource) -> String {
    compile_resource_with(resource, &EmitOptions::default())
}

pub fn compile_resource_with(resource: &Resource, opts: &EmitOptions) -> String {
    let mut w = Writer::new(opts);
    w.write_resource(resource);
    w.finish()
}

/// Render a patch: `{}`, `parameter` or a block.
pub fn compile_patch(patch: &PatchResource) -> String {
    compile_patch_with(patch, &EmitOptions::default())
}

pub fn compile_patch_with(patch: &PatchResource, opts: &EmitOptions) -> String {
    let mut w = Writer::new(opts);
    w.write_plan(&plan(patch.ops()));
    w.finish()
}

/// Render the body of `template: { ... }`, without the parameter block.
pub fn compile_template(template: &Template) -> String {
    compile_template_with(template, &EmitOptions::default())
}

pub fn compile_template_with(template: &Template, opts: &EmitOptions) -> String {
    let mut w = Writer::new(opts);
    w.write_template(template);
    let text = w.finish();
    if opts.format {
        format_or_original(&text, &opts.indent)
    } else {
        text
    }
}

/// Packages imported by anything the template renders.
pub fn template_imports(template: &Template) -> Imports {
    let mut imports = Imports::new();
    for binding in &template.lets {
        imports.visit_value(&binding.value);
    }
    for helper in &template.helpers {
        imports.visit_helper(helper);
    }
    for resource in template.resources() {
        visit_ops(&mut imports, resource.ops());
    }
    for aux in template.outputs.values() {
        if let Some(cond) = &aux.cond {
            imports.visit_condition(cond);
        }
    }
    for group in &template.output_groups {
        imports.visit_condition(&group.cond);
    }
    if let Some(patch) = &template.patch {
        visit_ops(&mut imports, patch.ops());
    }
    imports
}

fn visit_ops(imports: &mut Imports, ops: &[ResourceOp]) {
    for op in ops {
        match op {
            ResourceOp::Field(field_op) => visit_field_op(imports, field_op),
            ResourceOp::If(block) => {
                imports.visit_condition(&block.cond);
                block.ops.iter().for_each(|op| visit_field_op(imports, op));
            }
            ResourceOp::Passthrough => {}
        }
    }
}

fn visit_field_op(imports: &mut Imports, op: &FieldOp) {
    match op {
        FieldOp::Set { value, .. } => imports.visit_value(value),
        FieldOp::SetIf { value, cond, .. } | FieldOp::SpreadIf { value, cond, .. } => {
            imports.visit_value(value);
            imports.visit_condition(cond);
        }
        FieldOp::ForEach { source, guard, .. } => {
            imports.visit_value(source);
            if let Some(guard) = guard {
                imports.visit_condition(guard);
            }
        }
        FieldOp::PatchKey {
            elements, guard, ..
        }
        | FieldOp::SpreadAll {
            elements, guard, ..
        } => {
            elements.iter().for_each(|e| imports.visit_value(e));
            if let Some(guard) = guard {
                imports.visit_condition(guard);
            }
        }
        FieldOp::PatchStrategy { .. } => {}
    }
}

/// Label text for a path segment.
fn segment_label(segment: &Segment) -> String {
    match segment {
        Segment::Field(name) => cue_label(name),
        Segment::Key(key) => quote(key),
        Segment::Index(i) => quote(&i.to_string()),
    }
}

/// Internal writer for building output.
struct Writer<'a> {
    output: String,
    indent: usize,
    opts: &'a EmitOptions,
    tr: Translator<'a>,
}

impl<'a> Writer<'a> {
    fn new(opts: &'a EmitOptions) -> Self {
        Self {
            output: String::new(),
            indent: 0,
            opts,
            tr: Translator::new(&opts.indent),
        }
    }

    fn finish(self) -> String {
        self.output
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            let _ = write!(self.output, "{}", self.opts.indent);
        }
    }

    fn indent(&mut self) {
        self.indent += 1;
    }

    fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    fn writeln(&mut self, text: &str) {
        self.write_indent();
        let _ = writeln!(self.output, "{}", text);
    }

    fn write(&mut self, text: &str) {
        let _ = write!(self.output, "{}", text);
    }

    fn newline(&mut self) {
        let _ = writeln!(self.output);
    }

    /// Write text whose continuation lines are relative to the current
    /// indentation.
    fn write_multiline(&mut self, text: &str) {
        let mut lines = text.split('\n');
        if let Some(first) = lines.next() {
            self.write(first);
        }
        for line in lines {
            self.newline();
            self.write_indent();
            self.write(line);
        }
    }

    // ========================================================================
    // Template
    // ========================================================================

    fn write_template(&mut self, template: &Template) {
        if !template.raw.is_empty() {
            self.write_raw_blocks(template);
            return;
        }

        for binding in &template.lets {
            self.write_indent();
            self.write(&format!("let {} = ", binding.name));
            self.write_multiline(&self.tr.value(&binding.value));
            self.newline();
        }

        for helper in &template.helpers {
            self.write_indent();
            self.write_multiline(&self.tr.helper(helper));
            self.newline();
        }

        if let Some(output) = &template.output {
            self.write_indent();
            self.write("output: ");
            self.write_resource(output);
            self.newline();
        }

        if template.has_outputs() {
            self.writeln("outputs: {");
            self.indent();
            for (name, aux) in &template.outputs {
                match &aux.cond {
                    Some(cond) => {
                        self.writeln(&format!("if {} {{", self.tr.condition(cond)));
                        self.indent();
                        self.write_named_resource(name, &aux.resource);
                        self.dedent();
                        self.writeln("}");
                    }
                    None => self.write_named_resource(name, &aux.resource),
                }
            }
            for group in &template.output_groups {
                self.writeln(&format!("if {} {{", self.tr.condition(&group.cond)));
                self.indent();
                for (name, resource) in &group.outputs {
                    self.write_named_resource(name, resource);
                }
                self.dedent();
                self.writeln("}");
            }
            self.dedent();
            self.writeln("}");
        }

        if let Some(strategy) = &template.patch_strategy {
            self.writeln(&format!("// +patchStrategy={}", strategy));
        }
        if let Some(patch) = &template.patch {
            self.write_indent();
            self.write("patch: ");
            self.write_plan(&plan(patch.ops()));
            self.newline();
        }
    }

    fn write_raw_blocks(&mut self, template: &Template) {
        for (i, block) in template.raw.in_order().enumerate() {
            if i > 0 {
                self.newline();
            }
            self.write_raw(block);
        }
    }

    /// Re-indent a verbatim block to the current level.
    fn write_raw(&mut self, text: &str) {
        let lines: Vec<&str> = text.trim().lines().collect();
        let common = lines
            .iter()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.len() - l.trim_start().len())
            .min()
            .unwrap_or(0);
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                self.newline();
                continue;
            }
            let body = if i == 0 { line.trim_start() } else { &line[common.min(line.len())..] };
            self.writeln(body.trim_end());
        }
    }

    fn write_named_resource(&mut self, name: &str, resource: &Resource) {
        self.write_indent();
        self.write(&format!("{}: ", cue_label(name)));
        self.write_resource(resource);
        self.newline();
    }

    // ========================================================================
    // Resources and plans
    // ========================================================================

    fn write_resource(&mut self, resource: &Resource) {
        self.write("{");
        self.newline();
        self.indent();
        self.writeln(&format!("apiVersion: {}", quote(&resource.api_version)));
        self.writeln(&format!("kind: {}", quote(&resource.kind)));
        self.write_plan_body(&plan(resource.ops()));
        self.dedent();
        self.write_indent();
        self.write("}");
    }

    /// Write a plan as a value: `{}`, `parameter` or a block.
    fn write_plan(&mut self, plan: &Plan) {
        match plan {
            Plan::Empty => self.write("{}"),
            Plan::Passthrough => self.write("parameter"),
            Plan::Merged(tree) if tree.is_empty() => self.write("{}"),
            _ => {
                self.write("{");
                self.newline();
                self.indent();
                self.write_plan_body(plan);
                self.dedent();
                self.write_indent();
                self.write("}");
            }
        }
    }

    fn write_plan_body(&mut self, plan: &Plan) {
        match plan {
            Plan::Empty | Plan::Passthrough => {}
            Plan::Merged(tree) => self.write_body(tree),
            Plan::Partitioned(partition) if partition.prefix.is_empty() => {
                self.write_partition_body(partition)
            }
            Plan::Partitioned(partition) => {
                let labels: Vec<String> = partition.prefix.iter().map(|p| cue_label(p)).collect();
                self.writeln(&format!("{}: {{", labels.join(": ")));
                self.indent();
                self.write_partition_body(partition);
                self.dedent();
                self.writeln("}");
            }
        }
    }

    fn write_partition_body(&mut self, partition: &Partition) {
        self.write_body(&partition.bare);
        for (cond, tree) in &partition.blocks {
            if tree.is_empty() {
                continue;
            }
            self.writeln(&format!("if {} {{", self.tr.condition(cond)));
            self.indent();
            self.write_body(tree);
            self.dedent();
            self.writeln("}");
        }
    }

    // ========================================================================
    // Field tree
    // ========================================================================

    /// Spreads, then one statement per visible child.
    fn write_body(&mut self, node: &FieldNode) {
        for spread in &node.spreads {
            self.writeln(&format!("if {} {{", self.tr.condition(&spread.cond)));
            self.indent();
            self.write_indent();
            self.write_multiline(&self.tr.value(&spread.value));
            self.newline();
            self.dedent();
            self.writeln("}");
        }
        for (segment, child) in node.visible_children() {
            self.write_statement(segment, child);
        }
    }

    /// One field, wrapped in `if cond { }` when the node is guarded. Any
    /// fallbacks are written first, each under its own guard.
    fn write_statement(&mut self, segment: &Segment, node: &FieldNode) {
        for fallback in &node.fallbacks {
            self.write_statement(segment, &node.fallback_node(fallback));
        }
        match &node.cond {
            Some(cond) => {
                self.writeln(&format!("if {} {{", self.tr.condition(cond)));
                self.indent();
                self.write_annotated_field(segment, node);
                self.dedent();
                self.writeln("}");
            }
            None => self.write_annotated_field(segment, node),
        }
    }

    fn write_annotated_field(&mut self, segment: &Segment, node: &FieldNode) {
        if let Some(strategy) = &node.strategy {
            self.writeln(&format!("// +patchStrategy={}", strategy));
        }
        if let Some(Payload::PatchKey { key, .. }) = &node.payload {
            self.writeln(&format!("// +patchKey={}", key));
        }
        self.write_indent();
        self.write(&segment_label(segment));
        self.write(": ");
        self.write_node_value(node);
        self.newline();
    }

    /// The value after `label: `, without a trailing newline.
    fn write_node_value(&mut self, node: &FieldNode) {
        match &node.payload {
            Some(Payload::Leaf(value)) => self.write_multiline(&self.tr.value(value)),
            Some(Payload::ForEach(source)) => {
                self.write("{");
                self.newline();
                self.indent();
                self.writeln(&format!("for k, v in {} {{", self.tr.value(source)));
                self.indent();
                self.writeln("(k): v");
                self.dedent();
                self.writeln("}");
                self.dedent();
                self.write_indent();
                self.write("}");
            }
            Some(Payload::PatchKey { elements, .. }) => {
                let text = match elements.as_slice() {
                    [Value::Param(param)] if param.kind == ParamKind::Array => param.path(),
                    _ => self.joined(elements, ", ", "[", "]"),
                };
                self.write_multiline(&text);
            }
            Some(Payload::SpreadAll(elements)) => {
                let text = self.joined(elements, " & ", "[...", "]");
                self.write_multiline(&text);
            }
            None if node.is_list() => self.write_list(node),
            None => match self.inline_child(node) {
                Some((segment, child)) => {
                    self.write(&segment_label(segment));
                    self.write(": ");
                    self.write_node_value(child);
                }
                None => self.write_block(node),
            },
        }
    }

    fn write_block(&mut self, node: &FieldNode) {
        if node.is_empty() {
            self.write("{}");
            return;
        }
        self.write("{");
        self.newline();
        self.indent();
        self.write_body(node);
        self.dedent();
        self.write_indent();
        self.write("}");
    }

    fn joined(&self, values: &[Value], sep: &str, open: &str, close: &str) -> String {
        let parts: Vec<String> = values.iter().map(|v| self.tr.value(v)).collect();
        format!("{}{}{}", open, parts.join(sep), close)
    }

    /// The single child to inline, if the node qualifies.
    fn inline_child<'n>(&self, node: &'n FieldNode) -> Option<(&'n Segment, &'n FieldNode)> {
        if !self.opts.inline_single_child || !node.spreads.is_empty() {
            return None;
        }
        let mut visible = node.visible_children();
        let (segment, child) = visible.next()?;
        if visible.next().is_some() {
            return None;
        }
        let annotated = child.cond.is_some()
            || !child.fallbacks.is_empty()
            || child.strategy.is_some()
            || matches!(child.payload, Some(Payload::PatchKey { .. }));
        if annotated || segment.is_index() {
            return None;
        }
        Some((segment, child))
    }

    /// A list literal of the index-addressed children, in index order.
    /// Unwritten indices leave no entry behind.
    fn write_list(&mut self, node: &FieldNode) {
        let mut entries: Vec<(usize, &FieldNode)> = node
            .visible_children()
            .filter_map(|(seg, child)| match seg {
                Segment::Index(i) => Some((*i, child)),
                _ => None,
            })
            .collect();
        entries.sort_by_key(|(i, _)| *i);
        self.write("[");
        self.newline();
        self.indent();
        for (_, child) in entries {
            for fallback in &child.fallbacks {
                let entry = child.fallback_node(fallback);
                self.write_list_entry(&entry, entry.cond.clone());
            }
            let guard = Condition::conjoin(child.cond.as_ref(), child.content_guard().as_ref());
            self.write_list_entry(child, guard);
        }
        self.dedent();
        self.write_indent();
        self.write("]");
    }

    /// One element. A guarded element is a comprehension, so a false guard
    /// leaves no entry at all.
    fn write_list_entry(&mut self, child: &FieldNode, guard: Option<Condition>) {
        self.write_indent();
        match guard {
            Some(cond) => {
                let _ = write!(self.output, "if {} {{", self.tr.condition(&cond));
                self.newline();
                self.indent();
                self.write_indent();
                self.write_element(child);
                self.newline();
                self.dedent();
                self.write_indent();
                self.write("}");
            }
            None => self.write_element(child),
        }
        self.write(",");
        self.newline();
    }

    /// An element is an expression: a struct is always braced.
    fn write_element(&mut self, node: &FieldNode) {
        if node.payload.is_some() || node.is_list() {
            self.write_node_value(node);
        } else {
            self.write_block(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Param;
    use crate::resource::OpRecorder;
    use pretty_assertions::assert_eq;

    fn raw() -> EmitOptions {
        EmitOptions {
            format: false,
            ..EmitOptions::default()
        }
    }

    #[test]
    fn test_inline_chain() {
        let res = Resource::new("v1", "ConfigMap").set("data.key", "value");
        assert_eq!(
            compile_resource_with(&res, &raw()),
            "{\n\tapiVersion: \"v1\"\n\tkind: \"ConfigMap\"\n\tdata: key: \"value\"\n}"
        );
    }

    #[test]
    fn test_block_when_inlining_disabled() {
        let res = Resource::new("v1", "ConfigMap").set("data.key", "value");
        let opts = EmitOptions {
            inline_single_child: false,
            ..raw()
        };
        assert_eq!(
            compile_resource_with(&res, &opts),
            "{\n\tapiVersion: \"v1\"\n\tkind: \"ConfigMap\"\n\tdata: {\n\t\tkey: \"value\"\n\t}\n}"
        );
    }

    #[test]
    fn test_conditional_field() {
        let cpu = Param::string("cpu");
        let patch = PatchResource::new().set_if(cpu.is_set(), "spec.cpu", &cpu);
        assert_eq!(
            compile_patch_with(&patch, &raw()),
            "{\n\tif parameter.cpu != _|_ {\n\t\tspec: cpu: parameter.cpu\n\t}\n}"
        );
    }

    #[test]
    fn test_patch_key_comment() {
        let containers = Param::array("containers");
        let patch = PatchResource::new().patch_key(
            "spec.template.spec.containers",
            "name",
            [containers.value()],
        );
        let text = compile_patch_with(&patch, &raw());
        assert!(text.contains("spec: template: spec: {\n"));
        assert!(text.contains("\t\t// +patchKey=name\n\t\tcontainers: parameter.containers\n"));
    }

    #[test]
    fn test_patch_strategy_before_conditional_field() {
        let patch = PatchResource::new()
            .patch_strategy("spec.strategy", "retainKeys")
            .set_if(Condition::is_set("strategy"), "spec.strategy.type", "Recreate")
            .set("spec.replicas", 2);
        let text = compile_patch_with(&patch, &raw());
        assert!(text.contains(
            "\t\tif parameter.strategy != _|_ {\n\t\t\t// +patchStrategy=retainKeys\n\t\t\tstrategy: type: \"Recreate\"\n\t\t}\n"
        ));
    }

    #[test]
    fn test_for_each_and_spread_all() {
        let labels = Param::map("labels");
        let patch = PatchResource::new()
            .for_each("metadata.labels", &labels)
            .spread_all(
                "spec.containers",
                [crate::collections::ArrayElement::new()
                    .set("imagePullPolicy", "Always")
                    .into()],
            );
        let text = compile_patch_with(&patch, &raw());
        assert!(text.contains("metadata: labels: {\n\t\tfor k, v in parameter.labels {\n\t\t\t(k): v\n\t\t}\n\t}"));
        assert!(text.contains("spec: containers: [...{\n\t\timagePullPolicy: \"Always\"\n\t}]"));
    }

    #[test]
    fn test_passthrough_and_empty_patch() {
        assert_eq!(compile_patch(&PatchResource::new()), "{}");
        assert_eq!(compile_patch(&PatchResource::new().passthrough()), "parameter");
    }

    #[test]
    fn test_index_list() {
        let res = Resource::new("v1", "Pod")
            .set("spec.containers[0].name", "main")
            .set("spec.containers[0].image", "nginx");
        let text = compile_resource_with(&res, &raw());
        assert!(text.contains(
            "spec: containers: [\n\t\t{\n\t\t\tname: \"main\"\n\t\t\timage: \"nginx\"\n\t\t},\n\t]"
        ));
    }

    #[test]
    fn test_guarded_index_list_has_no_gaps() {
        let sidecar = Param::bool("sidecar");
        let res = Resource::new("v1", "Pod")
            .set("spec.containers[2].name", "logger")
            .set("spec.containers[0].name", "main")
            .set_if(sidecar.eq(true), "spec.containers[1].name", "proxy");
        let text = compile_resource_with(&res, &raw());
        assert!(text.contains(
            "spec: containers: [\n\t\t{\n\t\t\tname: \"main\"\n\t\t},\n\t\tif parameter.sidecar == true {\n\t\t\t{\n\t\t\t\tname: \"proxy\"\n\t\t\t}\n\t\t},\n\t\t{\n\t\t\tname: \"logger\"\n\t\t},\n\t]"
        ));
        assert!(!text.contains("_,"));
    }

    #[test]
    fn test_element_with_only_guarded_fields_is_guarded() {
        let res = Resource::new("v1", "Pod")
            .set("spec.containers[0].name", "main")
            .set_if(Condition::is_set("a"), "spec.containers[1].a", 1)
            .set_if(Condition::is_set("b"), "spec.containers[1].b", 2);
        let text = compile_resource_with(&res, &raw());
        assert!(text.contains(
            "\t\tif (parameter.a != _|_) || (parameter.b != _|_) {\n\t\t\t{\n\t\t\t\tif parameter.a != _|_ {"
        ));
    }

    #[test]
    fn test_sparse_index_list() {
        let res = Resource::new("v1", "Pod").set("spec.args[4000]", "x");
        let text = compile_resource_with(&res, &raw());
        assert!(text.contains("spec: args: [\n\t\t\"x\",\n\t]"));
    }

    #[test]
    fn test_guarded_override_keeps_fallback() {
        let replicas = Param::int("replicas");
        let res = Resource::new("apps/v1", "Deployment")
            .set("spec.replicas", 1)
            .set_if(replicas.is_set(), "spec.replicas", &replicas);
        let text = compile_resource_with(&res, &raw());
        assert!(text.contains(
            "\tspec: {\n\t\tif !(parameter.replicas != _|_) {\n\t\t\treplicas: 1\n\t\t}\n\t\tif parameter.replicas != _|_ {\n\t\t\treplicas: parameter.replicas\n\t\t}\n\t}"
        ));
    }

    #[test]
    fn test_all_of_with_disjunction_in_block() {
        let cond = Condition::all_of([
            Condition::or([Condition::is_set("cpu"), Condition::is_set("mem")]),
            Condition::is_set("limits"),
        ]);
        let patch = PatchResource::new().set_if(cond, "spec.limited", true);
        let text = compile_patch_with(&patch, &raw());
        assert!(text.contains(
            "if ((parameter.cpu != _|_) || (parameter.mem != _|_)) && parameter.limits != _|_ {"
        ));
    }

    #[test]
    fn test_quoted_key_segment() {
        let res = Resource::new("v1", "Pod").set("metadata.labels[app.oam.dev/name]", "web");
        let text = compile_resource_with(&res, &raw());
        assert!(text.contains("metadata: labels: \"app.oam.dev/name\": \"web\""));
    }

    #[test]
    fn test_template_order() {
        let template = Template::new()
            .let_binding("svcName", Value::interpolate([crate::context::name(), "-svc".into()]))
            .output(Resource::new("v1", "ConfigMap"))
            .outputs_if(Condition::is_set("expose"), "service", Resource::new("v1", "Service"))
            .patch(PatchResource::new().set("spec.replicas", 1));
        let text = compile_template_with(&template, &raw());
        let let_at = text.find("let svcName").unwrap();
        let output_at = text.find("output: {").unwrap();
        let outputs_at = text.find("outputs: {").unwrap();
        let patch_at = text.find("patch: {").unwrap();
        assert!(let_at < output_at && output_at < outputs_at && outputs_at < patch_at);
        assert!(text.contains("\tif parameter.expose != _|_ {\n\t\tservice: {"));
    }

    #[test]
    fn test_helpers_follow_lets() {
        use crate::helpers::TemplateHelper;
        let volumes = TemplateHelper::concat("volumesList", "volumesArray", ["pvc"]);
        let template = Template::new()
            .let_binding("prefix", "app")
            .helper(volumes.clone())
            .output(Resource::new("v1", "Pod").set("spec.volumes", volumes.reference()));
        let text = compile_template_with(&template, &raw());
        let let_at = text.find("let prefix").unwrap();
        let helper_at = text.find("volumesList: list.Concat([volumesArray.pvc])").unwrap();
        let output_at = text.find("output: {").unwrap();
        assert!(let_at < helper_at && helper_at < output_at);
        assert!(text.contains("volumes: volumesList"));
        assert_eq!(template_imports(&template).iter().collect::<Vec<_>>(), vec!["list"]);
    }

    #[test]
    fn test_raw_blocks_replace_body() {
        let template = Template::new()
            .output(Resource::new("v1", "ConfigMap"))
            .raw_patch("patch: {\n    spec: replicas: 1\n}")
            .raw_header("let x = 1");
        let text = compile_template_with(&template, &raw());
        assert_eq!(text, "let x = 1\n\npatch: {\n    spec: replicas: 1\n}\n");
    }
}
