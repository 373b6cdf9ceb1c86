//! Whole definitions: CUE layout, manifests and registry export.

use cuekit::prelude::*;
use cuekit::{CompileError, RegistryError};
use pretty_assertions::assert_eq;

fn worker() -> Definition {
    let image = Param::string("image").required().description("Container image");
    let cmd = Param::array("cmd");
    let name = stdlib::to_lower(context::name());
    Definition::component("worker")
        .description("Background worker")
        .label("ui-hidden", "false")
        .workload("apps/v1", "Deployment")
        .params([image.clone(), cmd.clone()])
        .template(
            Template::new().output(
                Resource::new("apps/v1", "Deployment")
                    .set("metadata.name", name)
                    .set("spec.template.spec.containers[0].image", &image)
                    .set_if(cmd.is_set(), "spec.template.spec.containers[0].command", &cmd),
            ),
        )
}

fn labels_trait() -> Definition {
    Definition::new_trait("labels")
        .description("Add labels to the workload")
        .applies_to(["*"])
        .pod_disruptive(true)
        .param(Param::map("labels").required())
        .template(
            Template::new().patch(
                PatchResource::new()
                    .patch_strategy("metadata.labels", "jsonMergePatch")
                    .for_each("metadata.labels", Param::map("labels")),
            ),
        )
}

#[test]
fn test_component_layout() {
    let cue = worker().to_cue().unwrap();

    assert!(cue.starts_with("import (\n\t\"strings\"\n)\n\nworker: {\n"));
    assert!(cue.contains("\ttype: \"component\"\n"));
    assert!(cue.contains("\tlabels: {\n\t\t\"ui-hidden\": \"false\"\n\t}\n"));
    assert!(cue.contains("\t\tworkload: {\n\t\t\tdefinition: {\n\t\t\t\tapiVersion: \"apps/v1\"\n"));
    assert!(cue.contains("\t\t\ttype: \"deployments.apps\"\n"));
    assert!(cue.contains("name: strings.ToLower(context.name)"));
    assert!(cue.contains("if parameter.cmd != _|_ {"));
    assert!(cue.contains("\tparameter: {\n\t\t// +usage=Container image\n\t\timage: string\n\t\tcmd?: [...]\n\t}\n"));

    let header = cue.find("worker: {").unwrap();
    let template = cue.find("template: {").unwrap();
    let output = cue.find("output: {").unwrap();
    let parameter = cue.find("parameter: {").unwrap();
    assert!(header < template && template < output && output < parameter);
    assert!(cue.ends_with("}\n"));
}

#[test]
fn test_trait_layout_and_manifest() {
    let def = labels_trait();
    let cue = def.to_cue().unwrap();
    assert!(!cue.contains("import"));
    assert!(!cue.contains("labels: {}"));
    assert!(cue.contains("\t\tpodDisruptive: true\n\t\tappliesToWorkloads: [\"*\"]\n"));
    assert!(cue.contains("// +patchStrategy=jsonMergePatch"));
    assert!(cue.contains("for k, v in parameter.labels {"));

    let manifest = def.to_manifest().unwrap();
    assert_eq!(manifest["apiVersion"], "core.oam.dev/v1beta1");
    assert_eq!(manifest["kind"], "TraitDefinition");
    assert_eq!(manifest["metadata"]["name"], "labels");
    assert_eq!(manifest["spec"]["podDisruptive"], true);
    assert_eq!(manifest["spec"]["appliesToWorkloads"][0], "*");
    assert_eq!(manifest["spec"]["schematic"]["cue"]["template"], cue.as_str());

    let yaml = def.to_yaml().unwrap();
    assert!(yaml.contains("kind: TraitDefinition"));
    assert!(yaml.contains("definition.oam.dev/description: Add labels to the workload"));
}

#[test]
fn test_raw_template_is_verbatim() {
    let def = Definition::component("legacy")
        .autodetect_workload()
        .raw_template("output: {\n\tapiVersion: \"v1\"\n\tkind: \"ConfigMap\"\n}\nparameter: {}");
    let opts = EmitOptions {
        format: false,
        ..EmitOptions::default()
    };
    let cue = def.to_cue_with(&opts).unwrap();
    assert!(cue.contains("\t\tworkload: type: \"autodetects.core.oam.dev\"\n"));
    assert!(cue.ends_with(
        "template: {\n\toutput: {\n\t\tapiVersion: \"v1\"\n\t\tkind: \"ConfigMap\"\n\t}\n\tparameter: {}\n}\n"
    ));
}

#[test]
fn test_missing_output_is_an_error() {
    let err = Definition::component("nothing").to_cue().unwrap_err();
    assert!(matches!(err, CompileError::MissingOutput { .. }));
    assert_eq!(err.to_string(), "component 'nothing' has no primary output");
}

#[test]
fn test_definition_json_round_trip_compiles_identically() {
    let def = worker();
    let json = serde_json::to_string(&def).unwrap();
    let loaded: Definition = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded.to_cue().unwrap(), def.to_cue().unwrap());
}

#[test]
fn test_registry_export() {
    let mut registry = Registry::new();
    registry
        .register(worker().run_on(label("provider").is_in(["aws", "gcp"])))
        .unwrap();
    registry
        .register(labels_trait().not_run_on(label("cluster-type").eq("vcluster")))
        .unwrap();

    let exported: serde_json::Value = serde_json::from_str(&registry.to_json().unwrap()).unwrap();
    let definitions = exported["definitions"].as_array().unwrap();
    assert_eq!(definitions.len(), 2);
    assert_eq!(definitions[0]["name"], "worker");
    assert_eq!(definitions[0]["type"], "component");
    assert_eq!(
        definitions[0]["placement"],
        serde_json::json!({
            "runOn": [{"key": "provider", "operator": "In", "values": ["aws", "gcp"]}]
        })
    );
    assert_eq!(definitions[1]["type"], "trait");
    assert_eq!(
        definitions[1]["placement"]["notRunOn"][0]["operator"],
        "Eq"
    );
    assert_eq!(
        definitions[1]["cue"].as_str(),
        Some(labels_trait().to_cue().unwrap().as_str())
    );
}

#[test]
fn test_registry_rejects_conflicts_at_registration() {
    let mut registry = Registry::new();
    let conflicting = worker()
        .run_on(label("gpu").exists())
        .not_run_on(label("gpu").exists());
    let err = registry.register(conflicting).unwrap_err();
    assert!(matches!(err, RegistryError::Placement { .. }));
    assert!(registry.is_empty());

    registry.register(worker()).unwrap();
    assert!(matches!(
        registry.register(worker()),
        Err(RegistryError::Duplicate { .. })
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_workflow_step_and_container_trait_round_trip() {
    let auto = Param::bool("auto").default_value(true);
    let step = Definition::workflow_step("deploy")
        .category("Application Delivery")
        .param(auto.clone())
        .step(
            StepTemplate::new()
                .suspend_if(auto.eq(false), "Waiting approval")
                .builtin("deploy", "multicluster.#Deploy", [("parallelism", Value::lit(5))]),
        );
    let command = Definition::new_trait("command").template(
        Template::new().patch_container(
            ContainerPatch::new()
                .default_to_context()
                .field(ContainerField::new("command").strategy("replace").guard(FieldGuard::NotNull)),
        ),
    );

    for def in [step, command] {
        let json = serde_json::to_string(&def).unwrap();
        let loaded: Definition = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.to_cue().unwrap(), def.to_cue().unwrap());
    }

    let mut registry = Registry::new();
    registry.register(Definition::workflow_step("deploy")).unwrap();
    assert!(registry.get("deploy", DefinitionKind::WorkflowStep).is_some());
    let exported: serde_json::Value = serde_json::from_str(&registry.to_json().unwrap()).unwrap();
    assert_eq!(exported["definitions"][0]["type"], "workflow-step");
}
