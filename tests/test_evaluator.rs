//! Rendering definitions against test contexts.

use cuekit::eval::{evaluate_ops, render_resource, render_template, EvalError, TestContext};
use cuekit::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn webservice() -> Definition {
    let image = Param::string("image").required();
    let replicas = Param::int("replicas").default_value(1);
    let port = Param::int("port");
    let cpu = Param::string("cpu");
    let env = Param::array("env");
    let labels = Param::map("labels");

    let containers = ArrayBuilder::new().element(
        ArrayElement::new()
            .set("name", context::name())
            .set("image", &image)
            .set_if(
                port.is_set(),
                "ports",
                ArrayBuilder::new().element(ArrayElement::new().set("containerPort", &port)),
            )
            .set_if(
                env.is_set(),
                "env",
                Pipeline::over(&env)
                    .filter_exists("value")
                    .pick(["name", "value"]),
            ),
    );

    let deployment = Resource::new("apps/v1", "Deployment")
        .set("metadata.name", context::name())
        .set("metadata.namespace", context::namespace())
        .set("spec.replicas", &replicas)
        .set("spec.selector.matchLabels[app.oam.dev/component]", context::name())
        .set(
            "spec.template.metadata.labels[app.oam.dev/component]",
            context::name(),
        )
        .for_each("spec.template.metadata.annotations", &labels)
        .set("spec.template.spec.containers", containers)
        .begin_if(cpu.is_set())
        .set("spec.template.spec.resources.limits.cpu", &cpu)
        .set("spec.template.spec.resources.requests.cpu", &cpu)
        .end_if();

    let service = Resource::new("v1", "Service")
        .set("metadata.name", Value::let_ref("serviceName"))
        .set("spec.selector[app.oam.dev/component]", context::name())
        .set(
            "spec.ports[0].port",
            Value::from(&port),
        )
        .set(
            "spec.ports[0].name",
            Value::interpolate(["port-".into(), stdlib::format_int(&port, 10)]),
        );

    Definition::component("webservice")
        .description("Long-running web service")
        .workload("apps/v1", "Deployment")
        .params([image, replicas, port.clone(), cpu, env, labels])
        .template(
            Template::new()
                .let_binding(
                    "serviceName",
                    Value::interpolate([context::name(), "-svc".into()]),
                )
                .output(deployment)
                .outputs_if(port.is_set(), "service", service),
        )
}

#[test]
fn test_round_trip_scenario() {
    let res = Resource::new("v1", "ConfigMap").set("metadata.name", context::name());
    let ctx = TestContext::new().name("my-comp").build();
    assert_eq!(
        evaluate_ops(res.ops(), &ctx).unwrap(),
        json!({"metadata": {"name": "my-comp"}})
    );
}

#[test]
fn test_conditional_scenario() {
    let enabled = Param::bool("enabled");
    let res = Resource::new("v1", "ConfigMap").set_if(enabled.eq(true), "data.flag", "on");

    let off = TestContext::new().param("enabled", false).build();
    let rendered = render_resource(&res, &off).unwrap();
    assert!(!rendered.has("data.flag"));

    let on = TestContext::new().param("enabled", true).build();
    let rendered = render_resource(&res, &on).unwrap();
    assert_eq!(rendered.get_str("data.flag"), Some("on"));
}

#[test]
fn test_webservice_minimal_context() {
    let def = webservice();
    let ctx = TestContext::new()
        .name("web")
        .param("image", "nginx:1.25")
        .build();
    let rendered = render_template(&def.template, &ctx).unwrap();

    let deployment = rendered.output.unwrap();
    assert_eq!(deployment.api_version(), Some("apps/v1"));
    assert_eq!(deployment.kind(), Some("Deployment"));
    assert_eq!(deployment.get_str("metadata.name"), Some("web"));
    assert_eq!(deployment.get_str("metadata.namespace"), Some("default"));
    assert_eq!(deployment.get_i64("spec.replicas"), Some(1));
    assert_eq!(
        deployment.get_str("spec.selector.matchLabels[app.oam.dev/component]"),
        Some("web")
    );
    assert_eq!(
        deployment.get("spec.template.spec.containers"),
        Some(&json!([{"name": "web", "image": "nginx:1.25"}]))
    );
    assert_eq!(
        deployment.get("spec.template.metadata.annotations"),
        Some(&json!({}))
    );
    assert!(!deployment.has("spec.template.spec.resources"));
    assert!(rendered.outputs.is_empty());
}

#[test]
fn test_webservice_full_context() {
    let def = webservice();
    let ctx = TestContext::new()
        .name("web")
        .namespace("shop")
        .param("image", "nginx:1.25")
        .param("replicas", 3)
        .param("port", 8080)
        .param("cpu", "500m")
        .param(
            "env",
            json!([
                {"name": "MODE", "value": "prod"},
                {"name": "SECRET", "valueFrom": {"secretKeyRef": {"name": "s"}}}
            ]),
        )
        .param("labels", json!({"team": "payments"}))
        .build();
    let rendered = render_template(&def.template, &ctx).unwrap();

    let deployment = rendered.output.as_ref().unwrap();
    assert_eq!(deployment.get_i64("spec.replicas"), Some(3));
    assert_eq!(deployment.get_str("metadata.namespace"), Some("shop"));
    assert_eq!(
        deployment.get("spec.template.spec.containers[0]"),
        Some(&json!({
            "name": "web",
            "image": "nginx:1.25",
            "ports": [{"containerPort": 8080}],
            "env": [{"name": "MODE", "value": "prod"}]
        }))
    );
    assert_eq!(
        deployment.get_str("spec.template.metadata.annotations.team"),
        Some("payments")
    );
    assert_eq!(
        deployment.get_str("spec.template.spec.resources.limits.cpu"),
        Some("500m")
    );
    assert_eq!(
        deployment.get_str("spec.template.spec.resources.requests.cpu"),
        Some("500m")
    );

    let service = &rendered.outputs["service"];
    assert_eq!(service.kind(), Some("Service"));
    assert_eq!(service.get_str("metadata.name"), Some("web-svc"));
    assert_eq!(service.get_i64("spec.ports[0].port"), Some(8080));
    assert_eq!(service.get_str("spec.ports[0].name"), Some("port-8080"));
}

#[test]
fn test_trait_patch_reads_rendered_output() {
    let sidecar = Param::string("sidecarImage").default_value("busybox");
    let patch = PatchResource::new()
        .patch_key(
            "spec.template.spec.containers",
            "name",
            [ArrayElement::new()
                .set("name", "sidecar")
                .set("image", &sidecar)
                .into()],
        )
        .set_if(
            Condition::output_has("spec.replicas"),
            "metadata.annotations.scaled",
            Value::interpolate([context::output("spec.replicas")]),
        );
    let template = Template::new().patch(patch);

    let ctx = TestContext::new()
        .output(json!({"spec": {"replicas": 2}}))
        .build();
    let rendered = render_template(&template, &ctx).unwrap();
    let patch = rendered.patch.unwrap();
    assert_eq!(
        patch.get("spec.template.spec.containers"),
        Some(&json!([{"name": "sidecar", "image": "busybox"}]))
    );
    assert_eq!(patch.get_str("metadata.annotations.scaled"), Some("2"));
}

#[test]
fn test_output_groups_and_cluster_version() {
    let legacy = Condition::compare(context::cluster_minor(), CompOp::Lt, 25);
    let template = Template::new()
        .output(Resource::new("apps/v1", "Deployment").set("spec.replicas", 1))
        .output_group(
            legacy,
            [
                ("psp", Resource::new("policy/v1beta1", "PodSecurityPolicy")),
                ("pspBinding", Resource::new("rbac.authorization.k8s.io/v1", "RoleBinding")),
            ],
        );

    let old = TestContext::new().cluster_version(1, 24).build();
    let rendered = render_template(&template, &old).unwrap();
    assert_eq!(
        rendered.outputs.keys().collect::<Vec<_>>(),
        vec!["psp", "pspBinding"]
    );

    let current = TestContext::new().build();
    let rendered = render_template(&template, &current).unwrap();
    assert!(rendered.outputs.is_empty());
}

#[test]
fn test_contexts_are_independent() {
    let res = Resource::new("v1", "ConfigMap").set("data.owner", context::app_name());
    let a = TestContext::new().app_name("shop").build();
    let b = TestContext::new().app_name("blog").build();

    let first = render_resource(&res, &a).unwrap();
    let second = render_resource(&res, &b).unwrap();
    let again = render_resource(&res, &a).unwrap();
    assert_eq!(first.get_str("data.owner"), Some("shop"));
    assert_eq!(second.get_str("data.owner"), Some("blog"));
    assert_eq!(first, again);
}

#[test]
fn test_unsupported_call_is_an_error() {
    let res = Resource::new("v1", "ConfigMap").set(
        "data.parts",
        Value::call("strings", "Split", [Value::lit("a,b"), Value::lit(",")]),
    );
    let err = render_resource(&res, &TestContext::new().build()).unwrap_err();
    assert_eq!(
        err,
        EvalError::UnsupportedCall {
            package: "strings".into(),
            function: "Split".into()
        }
    );
}
