//! Evaluation of collection values: pipelines, multi-source merges, array
//! builders and struct elements.

use crate::error::EvalError;
use crate::evaluator::{display, json_eq, Evaluator};
use crate::stdlib;
use cuekit_compiler::collections::{
    ArrayBuilder, ArrayElement, ArrayEntry, FieldMap, FieldValue, ItemOp, MultiSource, Pipeline,
    Predicate, Stage,
};
use serde_json::{Map, Value as JsonValue};

impl Evaluator<'_> {
    pub(crate) fn pipeline(&mut self, pipeline: &Pipeline) -> Result<JsonValue, EvalError> {
        if !self.guard(pipeline.guard.as_ref())? {
            return Ok(JsonValue::Array(Vec::new()));
        }
        let source = self.value(&pipeline.source)?;
        let mut items = iterate(&source, "collection source")?;
        for stage in &pipeline.stages {
            items = apply_stage(stage, items);
        }
        Ok(JsonValue::Array(items))
    }

    pub(crate) fn multi_source(&mut self, multi: &MultiSource) -> Result<JsonValue, EvalError> {
        let source = self.value(&multi.source)?;
        let JsonValue::Object(fields) = source else {
            return Ok(JsonValue::Array(Vec::new()));
        };

        let mut combined = Vec::new();
        for field in &multi.fields {
            let Some(list) = fields.get(field) else {
                continue;
            };
            let mapping = multi.mapping_for(field);
            for item in iterate(list, field)? {
                match &mapping {
                    Some(mapping) => combined.push(JsonValue::Object(apply_field_map(&item, mapping))),
                    None => combined.push(item),
                }
            }
        }

        let Some(key) = &multi.dedupe else {
            return Ok(JsonValue::Array(combined));
        };
        let mut seen: Vec<JsonValue> = Vec::new();
        let mut unique = Vec::new();
        for item in combined {
            match item.get(key) {
                Some(k) if seen.iter().any(|s| json_eq(s, k)) => continue,
                Some(k) => seen.push(k.clone()),
                None => {}
            }
            unique.push(item);
        }
        Ok(JsonValue::Array(unique))
    }

    pub(crate) fn array(&mut self, builder: &ArrayBuilder) -> Result<JsonValue, EvalError> {
        let mut out = Vec::new();
        for entry in &builder.entries {
            match entry {
                ArrayEntry::Item(value) => out.push(self.value(value)?),
                ArrayEntry::Static(element) => out.push(self.element(element)?),
                ArrayEntry::Conditional { cond, element } => {
                    if self.condition(cond)? {
                        out.push(self.element(element)?);
                    }
                }
                ArrayEntry::ForEach {
                    source,
                    var,
                    guard,
                    element,
                } => {
                    if !self.guard(guard.as_ref())? {
                        continue;
                    }
                    let source = self.value(source)?;
                    for item in iterate(&source, var)? {
                        self.push_local(var, item);
                        let built = self.element(element);
                        self.pop_local();
                        out.push(built?);
                    }
                }
                ArrayEntry::ComplexForEach {
                    source,
                    var,
                    guard,
                    ops,
                } => {
                    if !self.guard(guard.as_ref())? {
                        continue;
                    }
                    let source = self.value(source)?;
                    for item in iterate(&source, var)? {
                        self.push_local(var, item);
                        let built = self.item_ops(ops);
                        self.pop_local();
                        out.push(built?);
                    }
                }
            }
        }
        Ok(JsonValue::Array(out))
    }

    /// Build one item from its ops; `Let` names stay bound until the item
    /// is finished.
    fn item_ops(&mut self, ops: &[ItemOp]) -> Result<JsonValue, EvalError> {
        let mut item = Map::new();
        let mut bound = 0;
        let mut result = Ok(());
        for op in ops {
            let step = match op {
                ItemOp::Set { field, value } => self.value(value).map(|v| {
                    item.insert(field.clone(), v);
                }),
                ItemOp::SetIf { cond, field, value } => match self.condition(cond) {
                    Ok(true) => self.value(value).map(|v| {
                        item.insert(field.clone(), v);
                    }),
                    Ok(false) => Ok(()),
                    Err(err) => Err(err),
                },
                ItemOp::Let { name, value } => self.value(value).map(|v| {
                    self.push_local(name, v);
                    bound += 1;
                }),
            };
            if let Err(err) = step {
                result = Err(err);
                break;
            }
        }
        for _ in 0..bound {
            self.pop_local();
        }
        result.map(|()| JsonValue::Object(item))
    }

    pub(crate) fn element(&mut self, element: &ArrayElement) -> Result<JsonValue, EvalError> {
        let mut out = Map::new();
        for (field, value) in &element.fields {
            out.insert(field.clone(), self.value(value)?);
        }
        for cf in &element.conditional {
            if self.condition(&cf.cond)? {
                out.insert(cf.field.clone(), self.value(&cf.value)?);
            }
        }
        Ok(JsonValue::Object(out))
    }
}

/// The items a comprehension iterates: a list, a struct's values, or
/// nothing for null.
pub(crate) fn iterate(source: &JsonValue, context: &str) -> Result<Vec<JsonValue>, EvalError> {
    match source {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::Array(items) => Ok(items.clone()),
        JsonValue::Object(map) => Ok(map.values().cloned().collect()),
        other => Err(EvalError::mismatch(context, "list", other)),
    }
}

fn apply_stage(stage: &Stage, items: Vec<JsonValue>) -> Vec<JsonValue> {
    match stage {
        Stage::Filter(predicate) => items
            .into_iter()
            .filter(|item| matches_predicate(predicate, item))
            .collect(),
        Stage::Map(mapping) => items
            .iter()
            .map(|item| JsonValue::Object(apply_field_map(item, mapping)))
            .collect(),
        Stage::Pick(fields) => items
            .iter()
            .map(|item| {
                let picked = fields
                    .iter()
                    .filter_map(|f| item.get(f).map(|v| (f.clone(), v.clone())))
                    .collect();
                JsonValue::Object(picked)
            })
            .collect(),
        Stage::Rename { from, to } => items
            .into_iter()
            .map(|item| match item {
                JsonValue::Object(mut map) => {
                    if let Some(value) = map.shift_remove(from) {
                        map.insert(to.clone(), value);
                    }
                    JsonValue::Object(map)
                }
                other => other,
            })
            .collect(),
        Stage::Wrap(key) => items
            .into_iter()
            .map(|item| {
                let mut map = Map::new();
                map.insert(key.clone(), item);
                JsonValue::Object(map)
            })
            .collect(),
        Stage::DefaultField { field, value } => items
            .into_iter()
            .map(|item| match item {
                JsonValue::Object(mut map) => {
                    let missing = matches!(
                        map.get(field),
                        None | Some(JsonValue::Null)
                    ) || map.get(field).and_then(JsonValue::as_str) == Some("");
                    if missing {
                        let fallback = field_value(&JsonValue::Object(map.clone()), value);
                        map.insert(field.clone(), fallback);
                    }
                    JsonValue::Object(map)
                }
                other => other,
            })
            .collect(),
        Stage::Flatten => stdlib::flatten(&items, 1),
    }
}

fn matches_predicate(predicate: &Predicate, item: &JsonValue) -> bool {
    match predicate {
        Predicate::FieldEquals { field, value } => {
            item.get(field).is_some_and(|v| json_eq(v, value))
        }
        Predicate::FieldExists(field) => item.get(field).is_some_and(|v| !v.is_null()),
    }
}

/// Build an output struct from `mapping`; null results are left out.
pub(crate) fn apply_field_map(item: &JsonValue, mapping: &FieldMap) -> Map<String, JsonValue> {
    mapping
        .iter()
        .filter_map(|(name, value)| {
            let resolved = field_value(item, value);
            (!resolved.is_null()).then(|| (name.clone(), resolved))
        })
        .collect()
}

fn field_value(item: &JsonValue, value: &FieldValue) -> JsonValue {
    let lookup = |field: &str| item.get(field).cloned().unwrap_or(JsonValue::Null);
    match value {
        FieldValue::Field(field) | FieldValue::Optional(field) => lookup(field),
        FieldValue::Or { field, fallback } => match lookup(field) {
            JsonValue::Null => field_value(item, fallback),
            found => found,
        },
        FieldValue::Lit(json) => json.clone(),
        FieldValue::Nested(nested) => JsonValue::Object(apply_field_map(item, nested)),
        FieldValue::Format { template, args } => {
            let mut out = String::new();
            let mut args = args.iter();
            let mut pieces = template.split("{}").peekable();
            while let Some(piece) = pieces.next() {
                out.push_str(piece);
                if pieces.peek().is_some() {
                    match args.next() {
                        Some(arg) => out.push_str(&display(&field_value(item, arg))),
                        None => out.push_str("{}"),
                    }
                }
            }
            JsonValue::String(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;
    use cuekit_compiler::ast::{Condition, Param, Value};
    use cuekit_compiler::collections::field_map;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn eval(value: impl Into<Value>, ctx: TestContext) -> JsonValue {
        let ctx = ctx.build();
        Evaluator::new(&ctx).value(&value.into()).unwrap()
    }

    fn ports() -> TestContext {
        TestContext::new().param(
            "ports",
            json!([
                {"port": 80, "expose": true, "protocol": "TCP"},
                {"port": 9090},
                {"port": 443, "expose": true, "name": null}
            ]),
        )
    }

    #[test]
    fn test_filter_then_map() {
        let pipeline = Pipeline::over(Param::array("ports"))
            .filter_exists("expose")
            .map(field_map([
                ("port", FieldValue::field("port")),
                ("protocol", FieldValue::optional("protocol")),
                ("name", FieldValue::or("name", FieldValue::format("port-{}", [FieldValue::field("port")]))),
            ]));
        assert_eq!(
            eval(pipeline, ports()),
            json!([
                {"port": 80, "protocol": "TCP", "name": "port-80"},
                {"port": 443, "name": "port-443"}
            ])
        );
    }

    #[test]
    fn test_guard_false_is_empty() {
        let pipeline = Pipeline::over(Param::array("ports")).guard(Condition::is_set("missing"));
        assert_eq!(eval(pipeline, ports()), json!([]));
    }

    #[test]
    fn test_pick_rename_wrap() {
        let pipeline = Pipeline::over(Param::array("ports"))
            .filter_eq("port", 80)
            .pick(["port", "protocol"])
            .rename("port", "containerPort")
            .wrap("entry");
        assert_eq!(
            eval(pipeline, ports()),
            json!([{"entry": {"protocol": "TCP", "containerPort": 80}}])
        );
    }

    #[test]
    fn test_default_field() {
        let ctx = TestContext::new().param(
            "volumes",
            json!([{"name": "a", "mode": ""}, {"name": "b", "mode": "ro"}, {"name": "c"}]),
        );
        let pipeline =
            Pipeline::over(Param::array("volumes")).default_field("mode", FieldValue::lit("rw"));
        assert_eq!(
            eval(pipeline, ctx),
            json!([
                {"name": "a", "mode": "rw"},
                {"name": "b", "mode": "ro"},
                {"name": "c", "mode": "rw"}
            ])
        );
    }

    #[test]
    fn test_flatten() {
        let ctx = TestContext::new().param("groups", json!([[1, 2], [3], 4]));
        assert_eq!(
            eval(Pipeline::over(Param::array("groups")).flatten(), ctx),
            json!([1, 2, 3, 4])
        );
    }

    #[test]
    fn test_multi_source_with_dedupe() {
        let ctx = TestContext::new().param(
            "volumeMounts",
            json!({
                "pvc": [{"name": "data", "mountPath": "/data", "claimName": "c1"}],
                "configMap": [{"name": "cfg", "mountPath": "/etc/cfg"}, {"name": "data", "mountPath": "/dup"}]
            }),
        );
        let multi = MultiSource::new(Param::structure("volumeMounts"), ["pvc", "configMap", "secret"])
            .pick(["name", "mountPath"])
            .dedupe("name");
        assert_eq!(
            eval(multi, ctx),
            json!([
                {"name": "data", "mountPath": "/data"},
                {"name": "cfg", "mountPath": "/etc/cfg"}
            ])
        );
    }

    #[test]
    fn test_array_builder_entries() {
        let ctx = TestContext::new()
            .name("web")
            .param("sidecars", json!([{"name": "log", "image": "busybox"}]))
            .param("debug", true);
        let builder = ArrayBuilder::new()
            .element(ArrayElement::new().set("name", cuekit_compiler::context::name()))
            .element_if(
                Param::bool("debug").truthy(),
                ArrayElement::new().set("name", "debug"),
            )
            .element_if(Condition::is_set("missing"), ArrayElement::new().set("name", "never"))
            .for_each(
                Param::array("sidecars"),
                "m",
                ArrayElement::new()
                    .set("name", Value::reference("m.name"))
                    .set_if(Condition::path_exists("m.image"), "image", Value::reference("m.image")),
            )
            .for_each_with(
                Param::array("sidecars"),
                "s",
                vec![
                    ItemOp::Let {
                        name: "n".into(),
                        value: Value::reference("s.name"),
                    },
                    ItemOp::Set {
                        field: "label".into(),
                        value: Value::interpolate([Value::reference("n"), "-x".into()]),
                    },
                ],
            );
        assert_eq!(
            eval(builder, ctx),
            json!([
                {"name": "web"},
                {"name": "debug"},
                {"name": "log", "image": "busybox"},
                {"label": "log-x"}
            ])
        );
    }
}
