//! Expression AST for resource definitions.
//!
//! Every value written into a resource and every guard attached to an
//! operation is one of the closed enums in this module. Both the text
//! emitter and the test evaluator match on them exhaustively, so a new
//! variant cannot be added without both renderers learning about it.
//!
//! # Example
//!
//! ```rust
//! use cuekit_compiler::ast::{Condition, Param, Value};
//! use cuekit_compiler::context;
//!
//! let replicas = Param::int("replicas").default_value(1);
//! let guard = Condition::and([replicas.is_set(), replicas.gt(1)]);
//! let name: Value = context::name();
//!
//! assert!(matches!(guard, Condition::And(ref parts) if parts.len() == 2));
//! assert!(matches!(name, Value::Context(_)));
//! ```
//!
//! All types derive `Serialize`/`Deserialize`, so a definition can be kept
//! in a JSON file and loaded back without going through the builders.

use crate::collections::{ArrayBuilder, ArrayElement, MultiSource, Pipeline};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ============================================================================
// Values
// ============================================================================

/// A value that can be assigned to a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    /// A literal scalar or collection.
    Literal(JsonValue),
    /// A reference to a user-facing parameter (`parameter.<name>`).
    Param(Param),
    /// A reference to a runtime context field (`context.name`, ...).
    Context(ContextField),
    /// A raw reference path such as an iteration variable (`v.name`).
    Ref(String),
    /// A reference to a template-level let binding.
    LetRef(String),
    /// String interpolation of several parts.
    Interpolation(Vec<Value>),
    /// A value derived from another value.
    Transformed {
        source: Box<Value>,
        transform: Transform,
    },
    /// A list comprehension over a source collection.
    Collection(Box<Pipeline>),
    /// A list built from several named fields of one struct.
    MultiSource(Box<MultiSource>),
    /// A list literal built from static, conditional and iterated entries.
    Array(ArrayBuilder),
    /// A struct literal.
    Element(ArrayElement),
    /// A call into the target language's standard library.
    Call(StdlibCall),
}

impl Value {
    /// Wrap any JSON-convertible literal.
    pub fn lit(value: impl Into<JsonValue>) -> Self {
        Value::Literal(value.into())
    }

    /// The `null` literal.
    pub fn null() -> Self {
        Value::Literal(JsonValue::Null)
    }

    /// A raw reference path, rendered verbatim.
    pub fn reference(path: impl Into<String>) -> Self {
        Value::Ref(path.into())
    }

    /// A reference to a let binding declared on the template.
    pub fn let_ref(name: impl Into<String>) -> Self {
        Value::LetRef(name.into())
    }

    /// Interpolate the given parts into one string.
    pub fn interpolate(parts: impl IntoIterator<Item = Value>) -> Self {
        Value::Interpolation(parts.into_iter().collect())
    }

    /// A standard library call, e.g. `strings.ToLower(x)`.
    pub fn call(
        package: impl Into<String>,
        function: impl Into<String>,
        args: impl IntoIterator<Item = Value>,
    ) -> Self {
        Value::Call(StdlibCall {
            package: package.into(),
            function: function.into(),
            args: args.into_iter().collect(),
        })
    }

    /// Apply a transform to this value.
    pub fn transform(self, transform: Transform) -> Self {
        Value::Transformed {
            source: Box::new(self),
            transform,
        }
    }

    pub fn plus(self, n: impl Into<JsonValue>) -> Self {
        self.transform(Transform::Add(n.into()))
    }

    pub fn minus(self, n: impl Into<JsonValue>) -> Self {
        self.transform(Transform::Sub(n.into()))
    }

    pub fn times(self, n: impl Into<JsonValue>) -> Self {
        self.transform(Transform::Mul(n.into()))
    }

    /// Compare this value with another.
    pub fn compare(self, op: CompOp, other: impl Into<Value>) -> Condition {
        Condition::Compare {
            left: self,
            op,
            right: other.into(),
        }
    }

    /// Returns true for values that are plain literals.
    pub fn is_literal(&self) -> bool {
        matches!(self, Value::Literal(_))
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        Value::Literal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Literal(JsonValue::String(value.to_string()))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Literal(JsonValue::String(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Literal(JsonValue::Bool(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Literal(value.into())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Literal(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Literal(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Literal(value.into())
    }
}

impl From<Param> for Value {
    fn from(param: Param) -> Self {
        Value::Param(param)
    }
}

impl From<&Param> for Value {
    fn from(param: &Param) -> Self {
        Value::Param(param.clone())
    }
}

impl From<ContextField> for Value {
    fn from(field: ContextField) -> Self {
        Value::Context(field)
    }
}

impl From<Pipeline> for Value {
    fn from(pipeline: Pipeline) -> Self {
        Value::Collection(Box::new(pipeline))
    }
}

impl From<MultiSource> for Value {
    fn from(source: MultiSource) -> Self {
        Value::MultiSource(Box::new(source))
    }
}

impl From<ArrayBuilder> for Value {
    fn from(builder: ArrayBuilder) -> Self {
        Value::Array(builder)
    }
}

impl From<ArrayElement> for Value {
    fn from(element: ArrayElement) -> Self {
        Value::Element(element)
    }
}

impl From<StdlibCall> for Value {
    fn from(call: StdlibCall) -> Self {
        Value::Call(call)
    }
}

/// A closed set of value transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transform {
    Add(JsonValue),
    Sub(JsonValue),
    Mul(JsonValue),
    Div(JsonValue),
    /// Prepend a literal string.
    Prefix(String),
    /// Append a literal string.
    Suffix(String),
    /// Format an integer as a decimal string.
    ToString,
}

/// A call into a target-language standard library package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdlibCall {
    pub package: String,
    pub function: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

// ============================================================================
// Parameters
// ============================================================================

/// The declared type of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamKind {
    String,
    Int,
    Bool,
    Float,
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    Struct,
    Array,
    /// A string-to-string map, e.g. labels.
    Map,
    /// A type written verbatim, e.g. `[...#VolumeMount]`.
    Schema(String),
}

/// A user-facing parameter.
///
/// `name` may be a dotted path (`resources.cpu`) to address a nested field
/// of a struct parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Int)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Bool)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float)
    }

    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, ParamKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn structure(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Struct)
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Array)
    }

    pub fn map(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Map)
    }

    /// A parameter typed by a schema definition or any other type text.
    pub fn schema(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Schema(ty.into()))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<JsonValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Canonical reference path, e.g. `parameter.replicas`.
    pub fn path(&self) -> String {
        format!("parameter.{}", self.name)
    }

    pub fn value(&self) -> Value {
        Value::Param(self.clone())
    }

    pub fn is_set(&self) -> Condition {
        Condition::IsSet(self.name.clone())
    }

    pub fn not_set(&self) -> Condition {
        Condition::NotSet(self.name.clone())
    }

    pub fn truthy(&self) -> Condition {
        Condition::Truthy(self.value())
    }

    pub fn eq(&self, other: impl Into<Value>) -> Condition {
        self.value().compare(CompOp::Eq, other)
    }

    pub fn ne(&self, other: impl Into<Value>) -> Condition {
        self.value().compare(CompOp::Ne, other)
    }

    pub fn lt(&self, other: impl Into<Value>) -> Condition {
        self.value().compare(CompOp::Lt, other)
    }

    pub fn le(&self, other: impl Into<Value>) -> Condition {
        self.value().compare(CompOp::Le, other)
    }

    pub fn gt(&self, other: impl Into<Value>) -> Condition {
        self.value().compare(CompOp::Gt, other)
    }

    pub fn ge(&self, other: impl Into<Value>) -> Condition {
        self.value().compare(CompOp::Ge, other)
    }
}

// ============================================================================
// Runtime context
// ============================================================================

/// A named field of the runtime context the platform injects at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextField {
    Name,
    Namespace,
    AppName,
    AppRevision,
    AppRevisionNum,
    Revision,
    ClusterVersionMajor,
    ClusterVersionMinor,
    ClusterVersionGitVersion,
    ClusterVersionPlatform,
    /// A path inside the rendered primary output (`context.output.<path>`).
    Output(String),
    /// A path inside a named auxiliary output.
    Outputs { name: String, path: String },
}

impl ContextField {
    /// Canonical reference path, e.g. `context.appName`.
    pub fn path(&self) -> String {
        match self {
            ContextField::Name => "context.name".to_string(),
            ContextField::Namespace => "context.namespace".to_string(),
            ContextField::AppName => "context.appName".to_string(),
            ContextField::AppRevision => "context.appRevision".to_string(),
            ContextField::AppRevisionNum => "context.appRevisionNum".to_string(),
            ContextField::Revision => "context.revision".to_string(),
            ContextField::ClusterVersionMajor => "context.clusterVersion.major".to_string(),
            ContextField::ClusterVersionMinor => "context.clusterVersion.minor".to_string(),
            ContextField::ClusterVersionGitVersion => {
                "context.clusterVersion.gitVersion".to_string()
            }
            ContextField::ClusterVersionPlatform => "context.clusterVersion.platform".to_string(),
            ContextField::Output(path) if path.is_empty() => "context.output".to_string(),
            ContextField::Output(path) => format!("context.output.{}", path),
            ContextField::Outputs { name, path } if path.is_empty() => {
                format!("context.outputs.{}", name)
            }
            ContextField::Outputs { name, path } => format!("context.outputs.{}.{}", name, path),
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompOp::Eq => "==",
            CompOp::Ne => "!=",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
        }
    }
}

/// A boolean guard.
///
/// Equality is structural: two conditions are "the same" when their trees
/// are equal, regardless of how they would be rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    Compare {
        left: Value,
        op: CompOp,
        right: Value,
    },
    /// Conjunction; each operand is parenthesized when rendered.
    And(Vec<Condition>),
    /// Disjunction; each operand is parenthesized when rendered.
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// The named parameter has a value.
    IsSet(String),
    /// The named parameter has no value.
    NotSet(String),
    /// A reference path resolves (e.g. `context.output.spec.template`).
    PathExists(String),
    PathNotExists(String),
    /// Conjunction rendered without parentheses, except around a
    /// disjunction operand.
    AllOf(Vec<Condition>),
    /// A boolean value used as the guard. A missing value is false.
    Truthy(Value),
    /// `len(value) op length`.
    Len {
        value: Value,
        op: CompOp,
        length: i64,
    },
}

impl Condition {
    pub fn compare(left: impl Into<Value>, op: CompOp, right: impl Into<Value>) -> Self {
        Condition::Compare {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    pub fn eq(left: impl Into<Value>, right: impl Into<Value>) -> Self {
        Self::compare(left, CompOp::Eq, right)
    }

    pub fn ne(left: impl Into<Value>, right: impl Into<Value>) -> Self {
        Self::compare(left, CompOp::Ne, right)
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::And(conditions.into_iter().collect())
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Or(conditions.into_iter().collect())
    }

    pub fn all_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::AllOf(conditions.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(condition))
    }

    pub fn is_set(param: impl Into<String>) -> Self {
        Condition::IsSet(param.into())
    }

    pub fn not_set(param: impl Into<String>) -> Self {
        Condition::NotSet(param.into())
    }

    pub fn path_exists(path: impl Into<String>) -> Self {
        Condition::PathExists(path.into())
    }

    pub fn path_not_exists(path: impl Into<String>) -> Self {
        Condition::PathNotExists(path.into())
    }

    /// `context.output.<path>` resolves.
    pub fn output_has(path: &str) -> Self {
        Condition::PathExists(ContextField::Output(path.to_string()).path())
    }

    pub fn truthy(value: impl Into<Value>) -> Self {
        Condition::Truthy(value.into())
    }

    pub fn len(value: impl Into<Value>, op: CompOp, length: i64) -> Self {
        Condition::Len {
            value: value.into(),
            op,
            length,
        }
    }

    /// Conjoin an optional outer guard with an optional inner one.
    pub fn conjoin(outer: Option<&Condition>, inner: Option<&Condition>) -> Option<Condition> {
        match (outer, inner) {
            (None, None) => None,
            (Some(c), None) | (None, Some(c)) => Some(c.clone()),
            (Some(outer), Some(inner)) => Some(Condition::And(vec![outer.clone(), inner.clone()])),
        }
    }
}

/// Standard-library call helpers.
pub mod stdlib {
    use super::Value;

    pub fn format_int(value: impl Into<Value>, base: i64) -> Value {
        Value::call("strconv", "FormatInt", [value.into(), Value::lit(base)])
    }

    pub fn to_lower(value: impl Into<Value>) -> Value {
        Value::call("strings", "ToLower", [value.into()])
    }

    pub fn to_upper(value: impl Into<Value>) -> Value {
        Value::call("strings", "ToUpper", [value.into()])
    }

    pub fn has_prefix(value: impl Into<Value>, prefix: impl Into<Value>) -> Value {
        Value::call("strings", "HasPrefix", [value.into(), prefix.into()])
    }

    pub fn has_suffix(value: impl Into<Value>, suffix: impl Into<Value>) -> Value {
        Value::call("strings", "HasSuffix", [value.into(), suffix.into()])
    }

    pub fn contains(value: impl Into<Value>, needle: impl Into<Value>) -> Value {
        Value::call("strings", "Contains", [value.into(), needle.into()])
    }

    pub fn join(list: impl Into<Value>, separator: impl Into<Value>) -> Value {
        Value::call("strings", "Join", [list.into(), separator.into()])
    }

    pub fn list_concat(lists: impl IntoIterator<Item = Value>) -> Value {
        let lists: Vec<Value> = lists.into_iter().collect();
        Value::call("list", "Concat", [Value::Array(crate::collections::ArrayBuilder::of(lists))])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_conditions() {
        let cpu = Param::string("cpu");
        assert_eq!(cpu.is_set(), Condition::IsSet("cpu".to_string()));
        assert!(matches!(cpu.eq("1"), Condition::Compare { op: CompOp::Eq, .. }));
        assert_eq!(cpu.path(), "parameter.cpu");
    }

    #[test]
    fn test_structural_equality() {
        let a = Condition::and([Condition::is_set("x"), Condition::is_set("y")]);
        let b = Condition::and([Condition::is_set("x"), Condition::is_set("y")]);
        let c = Condition::and([Condition::is_set("y"), Condition::is_set("x")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_context_paths() {
        assert_eq!(ContextField::AppRevision.path(), "context.appRevision");
        assert_eq!(ContextField::Output(String::new()).path(), "context.output");
        assert_eq!(
            ContextField::Output("spec.replicas".into()).path(),
            "context.output.spec.replicas"
        );
    }

    #[test]
    fn test_value_json_roundtrip_shape() {
        let value = Value::from(Param::int("replicas").default_value(1));
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["param"]["name"], "replicas");
        assert_eq!(json["param"]["kind"], "int");
    }
}
