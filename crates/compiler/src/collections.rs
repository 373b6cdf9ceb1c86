//! Collection values: pipelines, multi-source combinators and array builders.
//!
//! A [`Pipeline`] is a source list plus an ordered list of [`Stage`]s. Each
//! stage is applied to the output of the previous one, both when rendering
//! list comprehensions and when evaluating in tests.

use crate::ast::{Condition, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Ordered output-field to source-field mapping used by `Map` stages.
pub type FieldMap = IndexMap<String, FieldValue>;

/// Build a [`FieldMap`] from `(name, value)` pairs.
pub fn field_map<I, K>(entries: I) -> FieldMap
where
    I: IntoIterator<Item = (K, FieldValue)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// How one output field is derived from the current item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    /// Required field, accessed directly.
    Field(String),
    /// Optional field, only written when present on the item.
    Optional(String),
    /// The field if present, otherwise the fallback.
    Or {
        field: String,
        fallback: Box<FieldValue>,
    },
    Lit(JsonValue),
    Nested(FieldMap),
    /// `{}` placeholders in `template` are replaced by `args` in order.
    Format {
        template: String,
        args: Vec<FieldValue>,
    },
}

impl FieldValue {
    pub fn field(name: impl Into<String>) -> Self {
        FieldValue::Field(name.into())
    }

    pub fn optional(name: impl Into<String>) -> Self {
        FieldValue::Optional(name.into())
    }

    pub fn or(name: impl Into<String>, fallback: FieldValue) -> Self {
        FieldValue::Or {
            field: name.into(),
            fallback: Box::new(fallback),
        }
    }

    pub fn lit(value: impl Into<JsonValue>) -> Self {
        FieldValue::Lit(value.into())
    }

    pub fn format(template: impl Into<String>, args: impl IntoIterator<Item = FieldValue>) -> Self {
        FieldValue::Format {
            template: template.into(),
            args: args.into_iter().collect(),
        }
    }
}

/// Item predicate for `Filter` stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Predicate {
    FieldEquals { field: String, value: JsonValue },
    /// Present and not null.
    FieldExists(String),
}

/// One step of a collection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Filter(Predicate),
    Map(FieldMap),
    /// Keep only the listed fields that exist on the item.
    Pick(Vec<String>),
    Rename { from: String, to: String },
    /// Replace each item with `{key: item}`.
    Wrap(String),
    /// Fill a field that is absent, null or empty.
    DefaultField { field: String, value: FieldValue },
    /// Spread nested lists one level.
    Flatten,
}

/// A list comprehension over `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub source: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Condition>,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn over(source: impl Into<Value>) -> Self {
        Self {
            source: source.into(),
            guard: None,
            stages: Vec::new(),
        }
    }

    /// Only iterate when `cond` holds; otherwise the result is empty.
    pub fn guard(mut self, cond: Condition) -> Self {
        self.guard = Some(cond);
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.stages.push(Stage::Filter(predicate));
        self
    }

    pub fn filter_eq(self, field: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filter(Predicate::FieldEquals {
            field: field.into(),
            value: value.into(),
        })
    }

    pub fn filter_exists(self, field: impl Into<String>) -> Self {
        self.filter(Predicate::FieldExists(field.into()))
    }

    pub fn map(mut self, fields: FieldMap) -> Self {
        self.stages.push(Stage::Map(fields));
        self
    }

    pub fn pick<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stages
            .push(Stage::Pick(fields.into_iter().map(Into::into).collect()));
        self
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.stages.push(Stage::Rename {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn wrap(mut self, key: impl Into<String>) -> Self {
        self.stages.push(Stage::Wrap(key.into()));
        self
    }

    pub fn default_field(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.stages.push(Stage::DefaultField {
            field: field.into(),
            value,
        });
        self
    }

    pub fn flatten(mut self) -> Self {
        self.stages.push(Stage::Flatten);
        self
    }
}

/// Concatenates several list fields of one struct value.
///
/// Items from each source field go through that field's mapping (if any),
/// or the shared `pick` list, before an optional dedupe by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSource {
    pub source: Value,
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub map_by_source: IndexMap<String, FieldMap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pick: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe: Option<String>,
}

impl MultiSource {
    pub fn new<I, S>(source: impl Into<Value>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: source.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            map_by_source: IndexMap::new(),
            pick: Vec::new(),
            dedupe: None,
        }
    }

    pub fn map_source(mut self, field: impl Into<String>, mapping: FieldMap) -> Self {
        self.map_by_source.insert(field.into(), mapping);
        self
    }

    pub fn pick<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pick = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn dedupe(mut self, key: impl Into<String>) -> Self {
        self.dedupe = Some(key.into());
        self
    }

    /// The mapping applied to items of `field`, if one is configured.
    pub fn mapping_for(&self, field: &str) -> Option<FieldMap> {
        if let Some(mapping) = self.map_by_source.get(field) {
            return Some(mapping.clone());
        }
        if self.pick.is_empty() {
            return None;
        }
        Some(
            self.pick
                .iter()
                .map(|f| (f.clone(), FieldValue::Optional(f.clone())))
                .collect(),
        )
    }
}

// ============================================================================
// Array builder
// ============================================================================

/// A field written under a guard inside an [`ArrayElement`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalField {
    pub cond: Condition,
    pub field: String,
    pub value: Value,
}

/// A struct literal: plain fields followed by conditional fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayElement {
    #[serde(default)]
    pub fields: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional: Vec<ConditionalField>,
}

impl ArrayElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn set_if(
        mut self,
        cond: Condition,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.conditional.push(ConditionalField {
            cond,
            field: field.into(),
            value: value.into(),
        });
        self
    }
}

/// One step of a complex iterated array entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemOp {
    Set {
        field: String,
        value: Value,
    },
    SetIf {
        cond: Condition,
        field: String,
        value: Value,
    },
    /// Bind a local name visible to later ops of the same item.
    Let {
        name: String,
        value: Value,
    },
}

/// An entry of an [`ArrayBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayEntry {
    Static(ArrayElement),
    Conditional {
        cond: Condition,
        element: ArrayElement,
    },
    /// Plain values (not struct literals).
    Item(Value),
    ForEach {
        source: Value,
        var: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<Condition>,
        element: ArrayElement,
    },
    ComplexForEach {
        source: Value,
        var: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guard: Option<Condition>,
        ops: Vec<ItemOp>,
    },
}

/// A list literal assembled from entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayBuilder {
    pub entries: Vec<ArrayEntry>,
}

impl ArrayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list of plain values.
    pub fn of(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            entries: items.into_iter().map(ArrayEntry::Item).collect(),
        }
    }

    pub fn item(mut self, value: impl Into<Value>) -> Self {
        self.entries.push(ArrayEntry::Item(value.into()));
        self
    }

    pub fn element(mut self, element: ArrayElement) -> Self {
        self.entries.push(ArrayEntry::Static(element));
        self
    }

    pub fn element_if(mut self, cond: Condition, element: ArrayElement) -> Self {
        self.entries.push(ArrayEntry::Conditional { cond, element });
        self
    }

    pub fn for_each(
        mut self,
        source: impl Into<Value>,
        var: impl Into<String>,
        element: ArrayElement,
    ) -> Self {
        self.entries.push(ArrayEntry::ForEach {
            source: source.into(),
            var: var.into(),
            guard: None,
            element,
        });
        self
    }

    pub fn for_each_if(
        mut self,
        guard: Condition,
        source: impl Into<Value>,
        var: impl Into<String>,
        element: ArrayElement,
    ) -> Self {
        self.entries.push(ArrayEntry::ForEach {
            source: source.into(),
            var: var.into(),
            guard: Some(guard),
            element,
        });
        self
    }

    pub fn for_each_with(
        mut self,
        source: impl Into<Value>,
        var: impl Into<String>,
        ops: Vec<ItemOp>,
    ) -> Self {
        self.entries.push(ArrayEntry::ComplexForEach {
            source: source.into(),
            var: var.into(),
            guard: None,
            ops,
        });
        self
    }
}
