//! Apply recorded operations to concrete documents.
//!
//! The ops are walked in order without building a field tree. Each op's
//! effect mirrors what the emitted text means for the same context:
//!
//! - `Set`/`SetIf` assign at the path (last write wins).
//! - `SpreadIf` deep-merges the value's fields into the struct at the path.
//! - `ForEach` replaces the target with the source's key/value struct.
//! - `PatchKey` writes the element list, or the single array parameter.
//! - `SpreadAll` merges the elements into every entry of the existing list,
//!   taken from the document or else from `context.output`.
//! - `PatchStrategy` only annotates text and does nothing here.
//!
//! List indices that end up unwritten are dropped, as they are from an
//! emitted list literal.

use crate::container::{render_container_patch, RenderedContainerPatch};
use crate::context::RuntimeContext;
use crate::document;
use crate::error::EvalError;
use crate::evaluator::Evaluator;
use cuekit_compiler::ast::{ParamKind, Value};
use cuekit_compiler::resource::{FieldOp, PatchResource, Resource, ResourceOp};
use cuekit_compiler::template::Template;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// A rendered document with path accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderedResource {
    data: JsonValue,
}

impl RenderedResource {
    pub fn new(data: JsonValue) -> Self {
        Self { data }
    }

    pub fn api_version(&self) -> Option<&str> {
        self.get_str("apiVersion")
    }

    pub fn kind(&self) -> Option<&str> {
        self.get_str("kind")
    }

    /// Value at a dotted/bracketed path, e.g. `spec.containers[0].image`.
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        document::get(&self.data, path)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(JsonValue::as_str)
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(JsonValue::as_i64)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(JsonValue::as_bool)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    pub fn into_data(self) -> JsonValue {
        self.data
    }

    /// Every leaf path of the document.
    pub fn paths(&self) -> Vec<String> {
        document::leaf_paths(&self.data)
    }
}

/// Everything a template renders to for one context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderedTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<RenderedResource>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, RenderedResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<RenderedResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_patch: Option<RenderedContainerPatch>,
}

/// Apply `ops` to an empty document.
pub fn evaluate_ops(ops: &[ResourceOp], ctx: &RuntimeContext) -> Result<JsonValue, EvalError> {
    let mut doc = JsonValue::Object(Map::new());
    apply_ops(&mut Evaluator::new(ctx), &mut doc, ops)?;
    document::compact(&mut doc);
    Ok(doc)
}

pub fn render_resource(
    resource: &Resource,
    ctx: &RuntimeContext,
) -> Result<RenderedResource, EvalError> {
    render_with(&mut Evaluator::new(ctx), resource)
}

pub fn render_patch(
    patch: &PatchResource,
    ctx: &RuntimeContext,
) -> Result<RenderedResource, EvalError> {
    let mut doc = JsonValue::Object(Map::new());
    apply_ops(&mut Evaluator::new(ctx), &mut doc, patch.ops())?;
    document::compact(&mut doc);
    Ok(RenderedResource::new(doc))
}

/// Render the primary output, the auxiliary outputs whose guards hold and
/// the patch. Lets are bound first, in order.
///
/// Unless the context already carries one, the rendered primary output is
/// what auxiliary outputs and the patch see as `context.output`.
pub fn render_template(
    template: &Template,
    ctx: &RuntimeContext,
) -> Result<RenderedTemplate, EvalError> {
    let mut rendered = RenderedTemplate::default();
    let derived;
    let mut scope = ctx;
    if let Some(output) = &template.output {
        let primary = render_with(&mut bind_lets(template, ctx)?, output)?;
        derived = ctx.with_rendered_output(primary.data());
        scope = &derived;
        rendered.output = Some(primary);
    }

    let mut ev = bind_lets(template, scope)?;
    for (name, aux) in &template.outputs {
        if !ev.guard(aux.cond.as_ref())? {
            tracing::debug!(output = %name, "auxiliary output skipped");
            continue;
        }
        rendered
            .outputs
            .insert(name.clone(), render_with(&mut ev, &aux.resource)?);
    }
    for group in &template.output_groups {
        if !ev.condition(&group.cond)? {
            continue;
        }
        for (name, resource) in &group.outputs {
            rendered
                .outputs
                .insert(name.clone(), render_with(&mut ev, resource)?);
        }
    }

    if let Some(patch) = &template.patch {
        let mut doc = JsonValue::Object(Map::new());
        apply_ops(&mut ev, &mut doc, patch.ops())?;
        document::compact(&mut doc);
        rendered.patch = Some(RenderedResource::new(doc));
    }
    if let Some(cp) = &template.container_patch {
        rendered.container_patch = Some(render_container_patch(cp, scope));
    }
    Ok(rendered)
}

fn bind_lets<'a>(template: &Template, ctx: &'a RuntimeContext) -> Result<Evaluator<'a>, EvalError> {
    let mut ev = Evaluator::new(ctx);
    for binding in &template.lets {
        ev.bind_let(&binding.name, &binding.value)?;
    }
    for helper in &template.helpers {
        ev.bind_helper(helper)?;
    }
    Ok(ev)
}

fn render_with(ev: &mut Evaluator<'_>, resource: &Resource) -> Result<RenderedResource, EvalError> {
    let mut doc = JsonValue::Object(Map::new());
    document::set(&mut doc, "apiVersion", JsonValue::from(resource.api_version.clone()));
    document::set(&mut doc, "kind", JsonValue::from(resource.kind.clone()));
    apply_ops(ev, &mut doc, resource.ops())?;
    document::compact(&mut doc);
    Ok(RenderedResource::new(doc))
}

fn apply_ops(
    ev: &mut Evaluator<'_>,
    doc: &mut JsonValue,
    ops: &[ResourceOp],
) -> Result<(), EvalError> {
    for op in ops {
        match op {
            ResourceOp::Field(field_op) => apply_field_op(ev, doc, field_op)?,
            ResourceOp::If(block) => {
                if ev.condition(&block.cond)? {
                    for inner in &block.ops {
                        apply_field_op(ev, doc, inner)?;
                    }
                }
            }
            ResourceOp::Passthrough => {
                document::merge(doc, ev.context().parameters());
            }
        }
    }
    Ok(())
}

fn apply_field_op(
    ev: &mut Evaluator<'_>,
    doc: &mut JsonValue,
    op: &FieldOp,
) -> Result<(), EvalError> {
    tracing::debug!(path = op.path(), "applying op");
    match op {
        FieldOp::Set { path, value } => {
            let value = ev.value(value)?;
            document::set(doc, path, value);
        }
        FieldOp::SetIf { path, value, cond } => {
            if ev.condition(cond)? {
                let value = ev.value(value)?;
                document::set(doc, path, value);
            }
        }
        FieldOp::SpreadIf { path, value, cond } => {
            if ev.condition(cond)? {
                let value = ev.value(value)?;
                match value {
                    JsonValue::Object(_) => document::merge_at(doc, path, &value),
                    JsonValue::Null => {}
                    other => {
                        let context = format!("spread into {}", path);
                        return Err(EvalError::mismatch(context, "struct", &other));
                    }
                }
            }
        }
        FieldOp::ForEach {
            path,
            source,
            guard,
        } => {
            if ev.guard(guard.as_ref())? {
                let entries = match ev.value(source)? {
                    JsonValue::Null => JsonValue::Object(Map::new()),
                    map @ JsonValue::Object(_) => map,
                    other => {
                        let context = format!("for each at {}", path);
                        return Err(EvalError::mismatch(context, "struct", &other));
                    }
                };
                document::set(doc, path, entries);
            }
        }
        FieldOp::PatchKey {
            path,
            elements,
            guard,
            ..
        } => {
            if ev.guard(guard.as_ref())? {
                let value = match elements.as_slice() {
                    [Value::Param(param)] if matches!(param.kind, ParamKind::Array) => {
                        ev.value(&elements[0])?
                    }
                    _ => JsonValue::Array(
                        elements
                            .iter()
                            .map(|e| ev.value(e))
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                };
                document::set(doc, path, value);
            }
        }
        FieldOp::SpreadAll {
            path,
            elements,
            guard,
        } => {
            if ev.guard(guard.as_ref())? {
                let constraints = elements
                    .iter()
                    .map(|e| ev.value(e))
                    .collect::<Result<Vec<_>, _>>()?;
                let existing = document::get(doc, path)
                    .or_else(|| document::get(&ev.context().context()["output"], path))
                    .and_then(JsonValue::as_array)
                    .cloned()
                    .unwrap_or_default();
                let merged = existing
                    .into_iter()
                    .filter(|entry| !document::is_hole(entry))
                    .map(|mut entry| {
                        for constraint in &constraints {
                            document::merge(&mut entry, constraint);
                        }
                        entry
                    })
                    .collect();
                document::set(doc, path, JsonValue::Array(merged));
            }
        }
        FieldOp::PatchStrategy { .. } => {}
    }
    Ok(())
}
