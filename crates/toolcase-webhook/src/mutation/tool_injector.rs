use std::collections::BTreeSet;

use itertools::Itertools;
use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Pod, Volume, VolumeMount};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::errors::{MutationError, Result};
use super::{decode_object, DecisionContext, Mutator};
use crate::admission::{AdmissionRequest, GroupVersionResource};
use crate::config::{Tool, TOOLS_MOUNT_PATH};
use crate::patch::{self, APPEND};

/// Stages the tool binaries requested through the Pod annotations into a
/// volume shared with the first application container.
///
/// Annotations of the form `<prefix>/<tool>: "true"` request `<tool>`. An
/// init container running the registry image copies every requested tool
/// into an `emptyDir` volume, which is then mounted into the application
/// container.
pub struct ToolInjector;

impl Mutator for ToolInjector {
    fn name(&self) -> &'static str {
        "pod-tools"
    }

    fn resource(&self) -> GroupVersionResource {
        GroupVersionResource::new("", "v1", "pods")
    }

    fn mutate(
        &self,
        request: &AdmissionRequest,
        context: &DecisionContext,
    ) -> Result<Vec<PatchOperation>> {
        if request.resource != self.resource() {
            debug!(
                resource = %request.resource,
                expected = %self.resource(),
                "unexpected resource, skipping tool injection"
            );
            return Ok(Vec::new());
        }

        let pod: Pod = decode_object(request, "pod")?;

        let requested = requested_tools(&pod, &context.tool_annotation_prefix);
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let tools: Vec<&Tool> = requested
            .into_iter()
            .filter_map(|name| {
                let tool = context.tool_registry.get(name);
                if tool.is_none() {
                    debug!(tool = name, "tool not found inside of the registry, skipping");
                }
                tool
            })
            .collect();
        if tools.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            tools = tools.iter().map(|t| t.name.as_str()).join(",").as_str(),
            "injecting tools"
        );
        injection_patch(&pod, &tools, context)
    }
}

/// Names of the tools requested by the Pod, sorted and without duplicates.
fn requested_tools<'a>(pod: &'a Pod, prefix: &str) -> BTreeSet<&'a str> {
    pod.metadata
        .annotations
        .iter()
        .flatten()
        .filter(|(_, value)| value.as_str() == "true")
        .filter_map(|(key, _)| match key.split_once('/') {
            Some((key_prefix, tool)) if key_prefix == prefix && !tool.is_empty() => Some(tool),
            _ => None,
        })
        .collect()
}

/// Shell snippet copying every tool into the shared volume.
fn copy_command(tools: &[&Tool], destination: &str) -> String {
    tools
        .iter()
        .map(|tool| format!("cp -r {} {}", tool.path, destination))
        .join(" && ")
}

fn injection_patch(
    pod: &Pod,
    tools: &[&Tool],
    context: &DecisionContext,
) -> Result<Vec<PatchOperation>> {
    let spec = pod
        .spec
        .as_ref()
        .ok_or(MutationError::InvalidPod("the pod has no spec"))?;
    let app_container = spec
        .containers
        .first()
        .ok_or(MutationError::InvalidPod("the pod has no containers"))?;

    let template = &context.init_container;

    let mut command = template.container.shell();
    command.push(copy_command(tools, TOOLS_MOUNT_PATH));

    let image = if context.tool_registry.image().is_empty() {
        template.container.image.clone()
    } else {
        Some(context.tool_registry.image().to_owned())
    };

    let init_container = Container {
        name: template.container.name.clone(),
        image,
        command: Some(command),
        image_pull_policy: Some(template.container.image_pull_policy.clone()),
        volume_mounts: Some(vec![VolumeMount {
            name: template.volume.name.clone(),
            mount_path: TOOLS_MOUNT_PATH.to_owned(),
            ..Default::default()
        }]),
        ..Default::default()
    };
    let app_mount = VolumeMount {
        name: template.volume.name.clone(),
        mount_path: TOOLS_MOUNT_PATH.to_owned(),
        read_only: Some(template.volume_mount.read_only),
        ..Default::default()
    };
    let volume = Volume {
        name: template.volume.name.clone(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };

    let init_container = to_value("init container", &init_container)?;
    let app_mount = to_value("volume mount", &app_mount)?;
    let volume = to_value("volume", &volume)?;

    // The existence of the list decides between appending and creating it,
    // an empty list is appended to.
    let operations = vec![
        append_or_create(
            &["spec", "initContainers"],
            spec.init_containers.is_some(),
            init_container,
        ),
        append_or_create(
            &["spec", "containers", "0", "volumeMounts"],
            app_container.volume_mounts.is_some(),
            app_mount,
        ),
        append_or_create(&["spec", "volumes"], spec.volumes.is_some(), volume),
    ];

    Ok(operations)
}

fn append_or_create(list: &[&str], exists: bool, item: Value) -> PatchOperation {
    if exists {
        patch::add(list.iter().copied().chain([APPEND]), item)
    } else {
        patch::add(list.iter().copied(), Value::Array(vec![item]))
    }
}

fn to_value<T: Serialize>(what: &'static str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| MutationError::Serialization(what, e))
}
