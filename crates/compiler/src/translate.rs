//! Value/Condition translator.
//!
//! Stateless rendering of AST nodes to CUE expression text. Multi-line
//! results are indented relative to column zero; the emitter re-indents
//! them to wherever they land.

use crate::ast::{Condition, StdlibCall, Transform, Value};
use crate::collections::{
    ArrayBuilder, ArrayElement, ArrayEntry, FieldMap, FieldValue, ItemOp, MultiSource, Pipeline,
    Predicate, Stage,
};
use crate::helpers::TemplateHelper;
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;

/// Iteration variable used by rendered comprehensions.
const ITEM: &str = "v";

/// Renders values and conditions to CUE text.
#[derive(Debug, Clone, Copy)]
pub struct Translator<'a> {
    indent: &'a str,
}

impl<'a> Translator<'a> {
    pub fn new(indent: &'a str) -> Self {
        Self { indent }
    }

    // ========================================================================
    // Values
    // ========================================================================

    pub fn value(&self, value: &Value) -> String {
        match value {
            Value::Literal(json) => self.literal(json),
            Value::Param(param) => param.path(),
            Value::Context(field) => field.path(),
            Value::Ref(path) => path.clone(),
            Value::LetRef(name) => name.clone(),
            Value::Interpolation(parts) => self.interpolation(parts),
            Value::Transformed { source, transform } => self.transformed(source, transform),
            Value::Collection(pipeline) => self.pipeline(pipeline),
            Value::MultiSource(multi) => self.multi_source(multi),
            Value::Array(builder) => self.array(builder),
            Value::Element(element) => self.element(element),
            Value::Call(call) => self.call(call),
        }
    }

    pub fn literal(&self, json: &JsonValue) -> String {
        match json {
            JsonValue::Null => "null".to_string(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::String(s) => quote(s),
            JsonValue::Array(items) => {
                let items: Vec<String> = items.iter().map(|i| self.literal(i)).collect();
                format!("[{}]", items.join(", "))
            }
            JsonValue::Object(map) if map.is_empty() => "{}".to_string(),
            JsonValue::Object(map) => {
                let lines: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", cue_label(k), self.literal(v)))
                    .collect();
                self.block(&lines)
            }
        }
    }

    fn interpolation(&self, parts: &[Value]) -> String {
        let mut out = String::from("\"");
        for part in parts {
            match part {
                Value::Literal(JsonValue::String(s)) => out.push_str(&escape(s)),
                Value::Literal(JsonValue::Number(n)) => out.push_str(&n.to_string()),
                Value::Literal(JsonValue::Bool(b)) => out.push_str(&b.to_string()),
                Value::Literal(JsonValue::Null) => {}
                other => {
                    out.push_str("\\(");
                    out.push_str(&self.value(other));
                    out.push(')');
                }
            }
        }
        out.push('"');
        out
    }

    fn transformed(&self, source: &Value, transform: &Transform) -> String {
        let src = self.value(source);
        match transform {
            Transform::Add(n) => format!("({} + {})", src, self.literal(n)),
            Transform::Sub(n) => format!("({} - {})", src, self.literal(n)),
            Transform::Mul(n) => format!("({} * {})", src, self.literal(n)),
            Transform::Div(n) => format!("({} / {})", src, self.literal(n)),
            Transform::Prefix(p) => format!("{} + {}", quote(p), src),
            Transform::Suffix(s) => format!("{} + {}", src, quote(s)),
            Transform::ToString => format!("strconv.FormatInt({}, 10)", src),
        }
    }

    fn call(&self, call: &StdlibCall) -> String {
        let args: Vec<String> = call.args.iter().map(|a| self.value(a)).collect();
        format!("{}.{}({})", call.package, call.function, args.join(", "))
    }

    // ========================================================================
    // Collections
    // ========================================================================

    fn pipeline(&self, pipeline: &Pipeline) -> String {
        let mut expr = self.value(&pipeline.source);
        let mut guard = pipeline.guard.as_ref();

        if pipeline.stages.is_empty() {
            return self.comprehension(guard, &expr, None, &[ITEM.to_string()]);
        }

        let mut stages = pipeline.stages.iter().peekable();
        while let Some(stage) = stages.next() {
            expr = match stage {
                Stage::Filter(predicate) => {
                    let pred = self.predicate(predicate);
                    let fused = matches!(
                        stages.peek(),
                        Some(Stage::Map(_) | Stage::Pick(_) | Stage::Wrap(_))
                    );
                    let body = match stages.next_if(|_| fused) {
                        Some(next) => self.stage_body(next),
                        None => vec![ITEM.to_string()],
                    };
                    self.comprehension(guard, &expr, Some(&pred), &body)
                }
                Stage::Flatten => {
                    let inner = match guard {
                        Some(_) => self.comprehension(guard, &expr, None, &[ITEM.to_string()]),
                        None => expr,
                    };
                    format!("list.FlattenN({}, 1)", inner)
                }
                other => self.comprehension(guard, &expr, None, &self.stage_body(other)),
            };
            guard = None;
        }
        expr
    }

    fn stage_body(&self, stage: &Stage) -> Vec<String> {
        match stage {
            Stage::Map(fields) => self.field_map_lines(fields),
            Stage::Pick(fields) => fields
                .iter()
                .map(|f| {
                    let access = field_access(ITEM, f);
                    format!("if {} != _|_ {{{}: {}}}", access, cue_label(f), access)
                })
                .collect(),
            Stage::Rename { from, to } => {
                let access = field_access(ITEM, from);
                vec![
                    format!("for k, x in {} if k != {} {{(k): x}}", ITEM, quote(from)),
                    format!("if {} != _|_ {{{}: {}}}", access, cue_label(to), access),
                ]
            }
            Stage::Wrap(key) => vec![format!("{}: {}", cue_label(key), ITEM)],
            Stage::DefaultField { field, value } => {
                let access = field_access(ITEM, field);
                let label = cue_label(field);
                let fallback = self.field_value_expr(value);
                vec![
                    format!("for k, x in {} if k != {} {{(k): x}}", ITEM, quote(field)),
                    format!("if {} == _|_ {{{}: {}}}", access, label, fallback),
                    format!(
                        "if {a} != _|_ {{\n{i}if {a} == \"\" || {a} == null {{{l}: {f}}}\n{i}if {a} != \"\" && {a} != null {{{l}: {a}}}\n}}",
                        a = access,
                        l = label,
                        f = fallback,
                        i = self.indent
                    ),
                ]
            }
            Stage::Filter(_) | Stage::Flatten => vec![ITEM.to_string()],
        }
    }

    fn predicate(&self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::FieldEquals { field, value } => {
                format!("{} == {}", field_access(ITEM, field), self.literal(value))
            }
            Predicate::FieldExists(field) => format!("{} != _|_", field_access(ITEM, field)),
        }
    }

    /// `[if guard for v in src if pred {body}]`
    fn comprehension(
        &self,
        guard: Option<&Condition>,
        source: &str,
        predicate: Option<&str>,
        body: &[String],
    ) -> String {
        let mut out = String::from("[");
        if let Some(guard) = guard {
            out.push_str(&format!("if {} ", self.condition(guard)));
        }
        out.push_str(&format!("for {} in {} ", ITEM, source));
        if let Some(pred) = predicate {
            out.push_str(&format!("if {} ", pred));
        }
        out.push_str(&self.body(body));
        out.push(']');
        out
    }

    /// Comprehension body: `{x}` for one short line, a block otherwise.
    fn body(&self, lines: &[String]) -> String {
        match lines {
            [single] if !single.contains('\n') => format!("{{{}}}", single),
            _ => self.block(lines),
        }
    }

    fn field_map_lines(&self, fields: &FieldMap) -> Vec<String> {
        fields
            .iter()
            .map(|(name, value)| {
                let label = cue_label(name);
                match value {
                    FieldValue::Optional(field) => {
                        let access = field_access(ITEM, field);
                        format!("if {} != _|_ {{{}: {}}}", access, label, access)
                    }
                    FieldValue::Nested(nested) => {
                        format!("{}: {}", label, self.block(&self.field_map_lines(nested)))
                    }
                    other => format!("{}: {}", label, self.field_value_expr(other)),
                }
            })
            .collect()
    }

    fn field_value_expr(&self, value: &FieldValue) -> String {
        match value {
            FieldValue::Field(field) | FieldValue::Optional(field) => field_access(ITEM, field),
            FieldValue::Or { field, fallback } => format!(
                "*{} | {}",
                field_access(ITEM, field),
                self.field_value_expr(fallback)
            ),
            FieldValue::Lit(json) => self.literal(json),
            FieldValue::Nested(nested) => self.block(&self.field_map_lines(nested)),
            FieldValue::Format { template, args } => {
                let mut out = String::from("\"");
                let mut args = args.iter();
                let mut pieces = template.split("{}").peekable();
                while let Some(piece) = pieces.next() {
                    out.push_str(&escape(piece));
                    if pieces.peek().is_some() {
                        match args.next() {
                            Some(arg) => {
                                out.push_str("\\(");
                                out.push_str(&self.field_value_expr(arg));
                                out.push(')');
                            }
                            None => out.push_str("{}"),
                        }
                    }
                }
                out.push('"');
                out
            }
        }
    }

    fn multi_source(&self, multi: &MultiSource) -> String {
        let source = self.value(&multi.source);
        let entries: Vec<String> = multi
            .fields
            .iter()
            .map(|field| {
                let src = field_access(&source, field);
                let body = match multi.mapping_for(field) {
                    Some(mapping) => self.field_map_lines(&mapping),
                    None => vec![ITEM.to_string()],
                };
                format!(
                    "if {} != _|_ for {} in {} {}",
                    src,
                    ITEM,
                    src,
                    self.body(&body)
                )
            })
            .collect();
        let combined = self.list(&entries);

        match &multi.dedupe {
            Some(key) => format!(
                "[for i, {item} in {list} if !list.Contains([for j, u in {list} if j < i {{{u}}}], {k}) {{{item}}}]",
                item = ITEM,
                list = combined,
                u = field_access("u", key),
                k = field_access(ITEM, key),
            ),
            None => combined,
        }
    }

    fn array(&self, builder: &ArrayBuilder) -> String {
        let entries: Vec<String> = builder
            .entries
            .iter()
            .map(|entry| match entry {
                ArrayEntry::Item(value) => self.value(value),
                ArrayEntry::Static(element) => self.element(element),
                ArrayEntry::Conditional { cond, element } => {
                    format!("if {} {}", self.condition(cond), self.element(element))
                }
                ArrayEntry::ForEach {
                    source,
                    var,
                    guard,
                    element,
                } => format!(
                    "{}for {} in {} {}",
                    self.guard_clause(guard.as_ref()),
                    var,
                    self.value(source),
                    self.element(element)
                ),
                ArrayEntry::ComplexForEach {
                    source,
                    var,
                    guard,
                    ops,
                } => {
                    let lines: Vec<String> = ops.iter().map(|op| self.item_op(op)).collect();
                    format!(
                        "{}for {} in {} {}",
                        self.guard_clause(guard.as_ref()),
                        var,
                        self.value(source),
                        self.block(&lines)
                    )
                }
            })
            .collect();
        if entries.is_empty() {
            return "[]".to_string();
        }
        if builder
            .entries
            .iter()
            .all(|e| matches!(e, ArrayEntry::Item(v) if v.is_literal()))
        {
            return format!("[{}]", entries.join(", "));
        }
        self.list(&entries)
    }

    fn guard_clause(&self, guard: Option<&Condition>) -> String {
        match guard {
            Some(cond) => format!("if {} ", self.condition(cond)),
            None => String::new(),
        }
    }

    fn item_op(&self, op: &ItemOp) -> String {
        match op {
            ItemOp::Set { field, value } => format!("{}: {}", cue_label(field), self.value(value)),
            ItemOp::SetIf { cond, field, value } => format!(
                "if {} {{{}: {}}}",
                self.condition(cond),
                cue_label(field),
                self.value(value)
            ),
            ItemOp::Let { name, value } => format!("let {} = {}", name, self.value(value)),
        }
    }

    pub fn element(&self, element: &ArrayElement) -> String {
        let mut lines: Vec<String> = element
            .fields
            .iter()
            .map(|(field, value)| format!("{}: {}", cue_label(field), self.value(value)))
            .collect();
        for cf in &element.conditional {
            lines.push(format!(
                "if {} {{{}: {}}}",
                self.condition(&cf.cond),
                cue_label(&cf.field),
                self.value(&cf.value)
            ));
        }
        self.block(&lines)
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    pub fn condition(&self, cond: &Condition) -> String {
        match cond {
            Condition::Compare { left, op, right } => {
                format!("{} {} {}", self.value(left), op.as_str(), self.value(right))
            }
            Condition::And(parts) => self.logical(parts, "&&", "true"),
            Condition::Or(parts) => self.logical(parts, "||", "false"),
            Condition::Not(inner) => format!("!({})", self.condition(inner)),
            Condition::IsSet(name) => format!("parameter.{} != _|_", name),
            Condition::NotSet(name) => format!("parameter.{} == _|_", name),
            Condition::PathExists(path) => format!("{} != _|_", path),
            Condition::PathNotExists(path) => format!("{} == _|_", path),
            Condition::AllOf(parts) if parts.is_empty() => "true".to_string(),
            Condition::AllOf(parts) => parts
                .iter()
                .map(|p| self.conjunct(p))
                .collect::<Vec<_>>()
                .join(" && "),
            Condition::Truthy(value @ Value::Literal(_)) => self.value(value),
            Condition::Truthy(value) => {
                let rendered = self.value(value);
                format!("{} != _|_ && {}", rendered, rendered)
            }
            Condition::Len { value, op, length } => {
                format!("len({}) {} {}", self.value(value), op.as_str(), length)
            }
        }
    }

    /// An operand of a bare `&&` chain. Only a disjunction binds looser.
    fn conjunct(&self, cond: &Condition) -> String {
        match cond {
            Condition::Or(parts) if parts.len() > 1 => format!("({})", self.condition(cond)),
            _ => self.condition(cond),
        }
    }

    fn logical(&self, parts: &[Condition], op: &str, empty: &str) -> String {
        match parts {
            [] => empty.to_string(),
            [single] => self.condition(single),
            _ => parts
                .iter()
                .map(|p| format!("({})", self.condition(p)))
                .collect::<Vec<_>>()
                .join(&format!(" {} ", op)),
        }
    }

    // ========================================================================
    // Template helpers
    // ========================================================================

    /// The full `name: value` statement for a template helper.
    pub fn helper(&self, helper: &TemplateHelper) -> String {
        match helper {
            TemplateHelper::StructArray {
                name,
                source,
                fields,
            } => {
                let source = self.value(source);
                let lines: Vec<String> = fields
                    .iter()
                    .map(|field| {
                        let list = self.comprehension(
                            None,
                            &field_access(&source, &field.name),
                            None,
                            &self.field_map_lines(&field.mappings),
                        );
                        format!("{}: *{} | []", cue_label(&field.name), list)
                    })
                    .collect();
                format!("{}: {}", cue_label(name), self.block(&lines))
            }
            TemplateHelper::Concat {
                name,
                source,
                fields,
            } => {
                let refs: Vec<String> = fields.iter().map(|f| field_access(source, f)).collect();
                format!("{}: list.Concat([{}])", cue_label(name), refs.join(", "))
            }
            TemplateHelper::Dedupe { name, source, key } => {
                let ind = self.indent;
                let mut out = format!("{}: [\n", cue_label(name));
                out.push_str(&format!("{ind}for val in [\n"));
                out.push_str(&format!("{ind}{ind}for i, vi in {source} {{\n"));
                out.push_str(&format!(
                    "{ind}{ind}{ind}for j, vj in {source} if j < i && {} == {} {{\n",
                    field_access("vi", key),
                    field_access("vj", key),
                ));
                out.push_str(&format!("{ind}{ind}{ind}{ind}_ignore: true\n"));
                out.push_str(&format!("{ind}{ind}{ind}}}\n"));
                out.push_str(&format!("{ind}{ind}{ind}vi\n"));
                out.push_str(&format!("{ind}{ind}}},\n"));
                out.push_str(&format!("{ind}] if val._ignore == _|_ {{\n"));
                out.push_str(&format!("{ind}{ind}val\n"));
                out.push_str(&format!("{ind}}},\n"));
                out.push(']');
                out
            }
        }
    }

    // ========================================================================
    // Layout helpers
    // ========================================================================

    /// `{` + one indented line per entry + `}`.
    pub fn block(&self, lines: &[String]) -> String {
        if lines.is_empty() {
            return "{}".to_string();
        }
        let mut out = String::from("{\n");
        for line in lines {
            for physical in line.lines() {
                out.push_str(self.indent);
                out.push_str(physical);
                out.push('\n');
            }
        }
        out.push('}');
        out
    }

    /// `[` + one indented, comma-terminated entry per line + `]`.
    fn list(&self, entries: &[String]) -> String {
        if entries.is_empty() {
            return "[]".to_string();
        }
        let mut out = String::from("[\n");
        for entry in entries {
            for physical in entry.lines() {
                out.push_str(self.indent);
                out.push_str(physical);
                out.push('\n');
            }
            out.pop();
            out.push_str(",\n");
        }
        out.push(']');
        out
    }
}

/// Quote a string as a CUE string literal.
pub fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

/// Escape string content without the surrounding quotes.
fn escape(s: &str) -> String {
    let quoted = quote(s);
    quoted[1..quoted.len() - 1].to_string()
}

/// True for labels usable without quotes.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let first_ok = first.is_ascii_alphabetic() || first == '_' || first == '$' || first == '#';
    first_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// A field label, quoted when it is not a plain identifier.
pub fn cue_label(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

/// `var.field`, or `var["field"]` when the field needs quoting.
fn field_access(var: &str, field: &str) -> String {
    if is_identifier(field) {
        format!("{}.{}", var, field)
    } else {
        format!("{}[{}]", var, quote(field))
    }
}

// ============================================================================
// Import detection
// ============================================================================

/// Standard-library packages referenced by values and conditions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Imports(BTreeSet<String>);

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn add(&mut self, package: &str) {
        self.0.insert(package.to_string());
    }

    pub fn visit_value(&mut self, value: &Value) {
        match value {
            Value::Literal(_)
            | Value::Param(_)
            | Value::Context(_)
            | Value::Ref(_)
            | Value::LetRef(_) => {}
            Value::Interpolation(parts) => parts.iter().for_each(|p| self.visit_value(p)),
            Value::Transformed { source, transform } => {
                if matches!(transform, Transform::ToString) {
                    self.add("strconv");
                }
                self.visit_value(source);
            }
            Value::Collection(pipeline) => {
                self.visit_value(&pipeline.source);
                if let Some(guard) = &pipeline.guard {
                    self.visit_condition(guard);
                }
                if pipeline.stages.iter().any(|s| matches!(s, Stage::Flatten)) {
                    self.add("list");
                }
            }
            Value::MultiSource(multi) => {
                self.visit_value(&multi.source);
                if multi.dedupe.is_some() {
                    self.add("list");
                }
            }
            Value::Array(builder) => {
                for entry in &builder.entries {
                    match entry {
                        ArrayEntry::Item(value) => self.visit_value(value),
                        ArrayEntry::Static(element) => self.visit_element(element),
                        ArrayEntry::Conditional { cond, element } => {
                            self.visit_condition(cond);
                            self.visit_element(element);
                        }
                        ArrayEntry::ForEach {
                            source,
                            guard,
                            element,
                            ..
                        } => {
                            self.visit_value(source);
                            if let Some(guard) = guard {
                                self.visit_condition(guard);
                            }
                            self.visit_element(element);
                        }
                        ArrayEntry::ComplexForEach {
                            source, guard, ops, ..
                        } => {
                            self.visit_value(source);
                            if let Some(guard) = guard {
                                self.visit_condition(guard);
                            }
                            for op in ops {
                                match op {
                                    ItemOp::Set { value, .. } | ItemOp::Let { value, .. } => {
                                        self.visit_value(value)
                                    }
                                    ItemOp::SetIf { cond, value, .. } => {
                                        self.visit_condition(cond);
                                        self.visit_value(value);
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Value::Element(element) => self.visit_element(element),
            Value::Call(call) => {
                self.add(&call.package);
                call.args.iter().for_each(|a| self.visit_value(a));
            }
        }
    }

    pub fn visit_helper(&mut self, helper: &TemplateHelper) {
        match helper {
            TemplateHelper::StructArray { source, .. } => self.visit_value(source),
            TemplateHelper::Concat { .. } => self.add("list"),
            TemplateHelper::Dedupe { .. } => {}
        }
    }

    fn visit_element(&mut self, element: &ArrayElement) {
        element.fields.values().for_each(|v| self.visit_value(v));
        for cf in &element.conditional {
            self.visit_condition(&cf.cond);
            self.visit_value(&cf.value);
        }
    }

    pub fn visit_condition(&mut self, cond: &Condition) {
        match cond {
            Condition::Compare { left, right, .. } => {
                self.visit_value(left);
                self.visit_value(right);
            }
            Condition::And(parts) | Condition::Or(parts) | Condition::AllOf(parts) => {
                parts.iter().for_each(|p| self.visit_condition(p))
            }
            Condition::Not(inner) => self.visit_condition(inner),
            Condition::Truthy(value) | Condition::Len { value, .. } => self.visit_value(value),
            Condition::IsSet(_)
            | Condition::NotSet(_)
            | Condition::PathExists(_)
            | Condition::PathNotExists(_) => {}
        }
    }
}
