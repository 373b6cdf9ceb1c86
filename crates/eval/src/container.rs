//! Container patch rendering.
//!
//! Each requested container becomes one entry of
//! `spec.template.spec.containers`: the patched fields when the container
//! exists in `context.output`, or an `err` message when it does not.
//! Every `err` is also collected into `errs`.

use crate::context::RuntimeContext;
use crate::document;
use crate::render::RenderedResource;
use cuekit_compiler::container::{
    ContainerField, ContainerGroup, ContainerPatch, FieldGuard, CONTAINER_NAME,
};
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};

const BASE_CONTAINERS: &str = "output.spec.template.spec.containers";

/// The patch document and the errors its entries report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedContainerPatch {
    pub patch: RenderedResource,
    pub errs: Vec<String>,
}

impl RenderedContainerPatch {
    /// Entry for the container called `name`.
    pub fn container(&self, name: &str) -> Option<&JsonValue> {
        self.patch
            .get("spec.template.spec.containers")?
            .as_array()?
            .iter()
            .find(|c| c.get("name").and_then(JsonValue::as_str) == Some(name))
    }
}

pub fn render_container_patch(cp: &ContainerPatch, ctx: &RuntimeContext) -> RenderedContainerPatch {
    let params = ctx.parameters();
    let multi = cp
        .multi_param
        .as_deref()
        .and_then(|name| params.get(name))
        .filter(|v| !v.is_null());

    let entries: Vec<JsonValue> = match (multi, &cp.multi_param) {
        (Some(list), Some(multi_name)) => list
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|item| {
                let name = item.get(CONTAINER_NAME).and_then(JsonValue::as_str).unwrap_or("");
                if name.is_empty() {
                    json!({ "err": format!("{} must be set for {}", CONTAINER_NAME, multi_name) })
                } else {
                    patch_entry(cp, ctx, name, item)
                }
            })
            .collect(),
        _ => {
            let given = params.get(CONTAINER_NAME).and_then(JsonValue::as_str).unwrap_or("");
            let name = if given.is_empty() && cp.default_to_context {
                ctx.name()
            } else {
                given
            };
            vec![patch_entry(cp, ctx, name, params)]
        }
    };

    let errs: Vec<String> = entries
        .iter()
        .filter_map(|e| e.get("err").and_then(JsonValue::as_str).map(str::to_string))
        .collect();
    if !errs.is_empty() {
        tracing::debug!(errors = errs.len(), "container patch reported errors");
    }

    let mut doc = JsonValue::Object(Map::new());
    document::set(&mut doc, "spec.template.spec.containers", JsonValue::Array(entries));
    RenderedContainerPatch {
        patch: RenderedResource::new(doc),
        errs,
    }
}

/// The entry for one container, with settings read from `source`.
fn patch_entry(
    cp: &ContainerPatch,
    ctx: &RuntimeContext,
    name: &str,
    source: &JsonValue,
) -> JsonValue {
    let found = document::get(ctx.context(), BASE_CONTAINERS)
        .and_then(JsonValue::as_array)
        .is_some_and(|containers| {
            containers
                .iter()
                .any(|c| c.get("name").and_then(JsonValue::as_str) == Some(name))
        });

    let mut entry = Map::new();
    entry.insert("name".to_string(), JsonValue::from(name));
    if !found {
        entry.insert(
            "err".to_string(),
            JsonValue::from(format!("container {} not found", name)),
        );
        return JsonValue::Object(entry);
    }
    for field in &cp.fields {
        apply_field(&mut entry, field, source);
    }
    for group in &cp.groups {
        apply_group(&mut entry, group, source);
    }
    JsonValue::Object(entry)
}

fn apply_group(target: &mut Map<String, JsonValue>, group: &ContainerGroup, source: &JsonValue) {
    let mut inner = Map::new();
    for field in &group.fields {
        apply_field(&mut inner, field, source);
    }
    for sub in &group.groups {
        apply_group(&mut inner, sub, source);
    }
    target.insert(group.target.clone(), JsonValue::Object(inner));
}

fn apply_field(target: &mut Map<String, JsonValue>, field: &ContainerField, source: &JsonValue) {
    let value = source
        .get(&field.param)
        .cloned()
        .or_else(|| field.effective_default());
    let Some(value) = value else {
        return;
    };
    let holds = match field.guard {
        None | Some(FieldGuard::IsSet) => true,
        Some(FieldGuard::NotNull) => !value.is_null(),
        Some(FieldGuard::NotEmpty) => value.as_str() != Some(""),
    };
    if holds {
        target.insert(field.target.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TestContext;
    use pretty_assertions::assert_eq;

    fn workload() -> JsonValue {
        json!({
            "spec": {"template": {"spec": {"containers": [
                {"name": "web", "image": "nginx"},
                {"name": "sidecar", "image": "envoy"},
            ]}}}
        })
    }

    fn command_patch() -> ContainerPatch {
        ContainerPatch::new()
            .default_to_context()
            .field(ContainerField::new("command").guard(FieldGuard::NotNull))
            .field(ContainerField::new("args").guard(FieldGuard::NotNull))
    }

    #[test]
    fn test_defaults_to_component_container() {
        let ctx = TestContext::new()
            .name("web")
            .output(workload())
            .param("command", json!(["sleep", "10"]))
            .build();
        let rendered = render_container_patch(&command_patch(), &ctx);
        assert_eq!(rendered.errs, Vec::<String>::new());
        assert_eq!(
            rendered.container("web"),
            Some(&json!({"name": "web", "command": ["sleep", "10"]}))
        );
    }

    #[test]
    fn test_missing_container_reports_error() {
        let ctx = TestContext::new()
            .name("web")
            .output(workload())
            .param("containerName", "db")
            .build();
        let rendered = render_container_patch(&command_patch(), &ctx);
        assert_eq!(rendered.errs, vec!["container db not found".to_string()]);
        assert_eq!(rendered.container("db").and_then(|c| c.get("command")), None);
    }

    #[test]
    fn test_groups_keep_unguarded_defaults() {
        let cp = ContainerPatch::new().default_to_context().group(
            ContainerGroup::new("securityContext")
                .field(ContainerField::new("privileged").cue_type("bool").default_value(false))
                .group(
                    ContainerGroup::new("capabilities").field(
                        ContainerField::new("addCapabilities")
                            .target("add")
                            .guard(FieldGuard::IsSet),
                    ),
                ),
        );
        let ctx = TestContext::new().name("web").output(workload()).build();
        let rendered = render_container_patch(&cp, &ctx);
        assert_eq!(
            rendered.container("web"),
            Some(&json!({
                "name": "web",
                "securityContext": {"privileged": false, "capabilities": {}},
            }))
        );
    }

    #[test]
    fn test_multi_mode_requires_names() {
        let cp = command_patch().multiple("containers", None);
        let ctx = TestContext::new()
            .name("web")
            .output(workload())
            .param(
                "containers",
                json!([
                    {"containerName": "sidecar", "args": ["--verbose"]},
                    {"args": ["-x"]},
                ]),
            )
            .build();
        let rendered = render_container_patch(&cp, &ctx);
        assert_eq!(
            rendered.container("sidecar"),
            Some(&json!({"name": "sidecar", "args": ["--verbose"]}))
        );
        assert_eq!(
            rendered.errs,
            vec!["containerName must be set for containers".to_string()]
        );
    }
}
