use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::Node;
use serde_json::Value;
use tracing::debug;

use super::errors::Result;
use super::{decode_object, DecisionContext, Mutator};
use crate::admission::{AdmissionRequest, GroupVersionResource};
use crate::patch;

/// Overwrites the allocatable CPU reported by a Node.
///
/// The Node must decode, but its current state is not looked at: every Node
/// gets the configured quantity.
pub struct NodeCpuOverride;

impl Mutator for NodeCpuOverride {
    fn name(&self) -> &'static str {
        "node-cpu"
    }

    fn resource(&self) -> GroupVersionResource {
        GroupVersionResource::new("", "v1", "nodes")
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
                "unexpected resource, skipping allocatable cpu override"
            );
            return Ok(Vec::new());
        }

        let _node: Node = decode_object(request, "node")?;

        Ok(vec![patch::replace(
            ["status", "allocatable", "cpu"],
            Value::String(context.node_allocatable_cpu.clone()),
        )])
    }
}
