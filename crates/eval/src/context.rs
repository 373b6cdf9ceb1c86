//! Test contexts: the mock runtime values a render resolves against.
//!
//! [`TestContext`] is a builder; [`TestContext::build`] freezes it into the
//! [`RuntimeContext`] every evaluation call takes by reference.
//!
//! ```rust
//! use cuekit_eval::TestContext;
//! use serde_json::json;
//!
//! let ctx = TestContext::new()
//!     .name("web")
//!     .param("replicas", 3)
//!     .cluster_version(1, 30)
//!     .build();
//!
//! assert_eq!(ctx.name(), "web");
//! assert_eq!(ctx.param("replicas"), Some(&json!(3)));
//! ```

use crate::document;
use cuekit_compiler::ast::ContextField;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

/// Cluster version components exposed as `context.clusterVersion`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterVersion {
    pub major: i64,
    pub minor: i64,
    pub git_version: String,
    pub platform: String,
}

impl Default for ClusterVersion {
    fn default() -> Self {
        Self::new(1, 28)
    }
}

impl ClusterVersion {
    pub fn new(major: i64, minor: i64) -> Self {
        Self {
            major,
            minor,
            git_version: format!("v{}.{}.0", major, minor),
            platform: "linux/amd64".to_string(),
        }
    }
}

/// Builder for a [`RuntimeContext`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestContext {
    name: String,
    namespace: String,
    app_name: String,
    app_revision: String,
    app_revision_num: i64,
    revision: String,
    #[serde(alias = "parameters")]
    params: Map<String, JsonValue>,
    cluster_version: ClusterVersion,
    output: Option<JsonValue>,
    outputs: Map<String, JsonValue>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self {
            name: "test-component".to_string(),
            namespace: "default".to_string(),
            app_name: "test-app".to_string(),
            app_revision: "test-app-v1".to_string(),
            app_revision_num: 1,
            revision: String::new(),
            params: Map::new(),
            cluster_version: ClusterVersion::default(),
            output: None,
            outputs: Map::new(),
        }
    }
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    pub fn app_revision(mut self, revision: impl Into<String>) -> Self {
        self.app_revision = revision.into();
        self
    }

    pub fn app_revision_num(mut self, num: i64) -> Self {
        self.app_revision_num = num;
        self
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<JsonValue>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn cluster_version(mut self, major: i64, minor: i64) -> Self {
        self.cluster_version = ClusterVersion::new(major, minor);
        self
    }

    /// The already-rendered primary output, seen as `context.output`.
    pub fn output(mut self, output: JsonValue) -> Self {
        self.output = Some(output);
        self
    }

    /// A rendered auxiliary output, seen as `context.outputs.<name>`.
    pub fn aux_output(mut self, name: impl Into<String>, output: JsonValue) -> Self {
        self.outputs.insert(name.into(), output);
        self
    }

    pub fn build(self) -> RuntimeContext {
        let context = json!({
            "name": self.name,
            "namespace": self.namespace,
            "appName": self.app_name,
            "appRevision": self.app_revision,
            "appRevisionNum": self.app_revision_num,
            "revision": self.revision,
            "clusterVersion": {
                "major": self.cluster_version.major,
                "minor": self.cluster_version.minor,
                "gitVersion": self.cluster_version.git_version,
                "platform": self.cluster_version.platform,
            },
            "output": self.output.clone().unwrap_or_else(|| json!({})),
            "outputs": self.outputs,
        });
        RuntimeContext {
            parameter: JsonValue::Object(self.params),
            context,
            has_output: self.output.is_some(),
        }
    }
}

/// Immutable values for one render.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeContext {
    parameter: JsonValue,
    context: JsonValue,
    has_output: bool,
}

impl Default for RuntimeContext {
    fn default() -> Self {
        TestContext::default().build()
    }
}

impl RuntimeContext {
    pub fn name(&self) -> &str {
        self.context["name"].as_str().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.context["namespace"].as_str().unwrap_or_default()
    }

    pub fn app_name(&self) -> &str {
        self.context["appName"].as_str().unwrap_or_default()
    }

    /// `(major, minor)`
    pub fn cluster_version(&self) -> (i64, i64) {
        let version = &self.context["clusterVersion"];
        (
            version["major"].as_i64().unwrap_or_default(),
            version["minor"].as_i64().unwrap_or_default(),
        )
    }

    /// All supplied parameter values as one struct.
    pub fn parameters(&self) -> &JsonValue {
        &self.parameter
    }

    /// The supplied value of a parameter. Dotted names address nested
    /// fields; a literal dotted key is tried first.
    pub fn param(&self, name: &str) -> Option<&JsonValue> {
        self.parameter
            .get(name)
            .or_else(|| document::get(&self.parameter, name))
            .filter(|v| !v.is_null())
    }

    /// True when the parameter was supplied with a non-null value.
    pub fn is_param_set(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    /// The whole `context` struct.
    pub fn context(&self) -> &JsonValue {
        &self.context
    }

    pub fn field(&self, field: &ContextField) -> JsonValue {
        let path = field.path();
        let relative = path.strip_prefix("context.").unwrap_or(&path);
        document::get(&self.context, relative)
            .cloned()
            .unwrap_or(JsonValue::Null)
    }

    /// A copy whose `context.output` is `output`, unless one was supplied.
    pub fn with_rendered_output(&self, output: &JsonValue) -> RuntimeContext {
        let mut derived = self.clone();
        if !self.has_output {
            derived.context["output"] = output.clone();
        }
        derived
    }
}
