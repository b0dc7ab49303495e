//! Mutating policies plugged into the admission adapter.
//!
//! A [`Mutator`] receives a read-only [`AdmissionRequest`] together with the
//! process-wide [`DecisionContext`] and answers with the JSON Patch operations
//! to apply. Returning an empty list admits the object unchanged; returning an
//! error denies the admission, reporting the error message back to the API
//! server.

pub mod errors;
mod node_cpu;
mod tool_injector;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use json_patch::PatchOperation;

use crate::admission::{AdmissionRequest, GroupVersionResource};
use crate::config::{InitContainerTemplate, ToolRegistry};
use errors::{MutationError, Result};

pub use node_cpu::NodeCpuOverride;
pub use tool_injector::ToolInjector;

pub const DEFAULT_TOOL_ANNOTATION_PREFIX: &str = "webhook.citiccard.com";
pub const DEFAULT_NODE_ALLOCATABLE_CPU: &str = "12";

pub trait Mutator: Send + Sync {
    /// Name used in logs and on the command line.
    fn name(&self) -> &'static str;

    /// The resource this mutator knows how to handle.
    fn resource(&self) -> GroupVersionResource;

    /// Compute the patch for the object carried by `request`.
    ///
    /// Requests targeting a resource other than [`Mutator::resource`] must
    /// produce no operations.
    fn mutate(
        &self,
        request: &AdmissionRequest,
        context: &DecisionContext,
    ) -> Result<Vec<PatchOperation>>;
}

/// Immutable data shared by all the mutators. Built once at startup.
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub tool_registry: ToolRegistry,
    pub init_container: InitContainerTemplate,
    pub tool_annotation_prefix: String,
    pub node_allocatable_cpu: String,
}

impl Default for DecisionContext {
    fn default() -> Self {
        DecisionContext {
            tool_registry: ToolRegistry::default(),
            init_container: InitContainerTemplate::default(),
            tool_annotation_prefix: DEFAULT_TOOL_ANNOTATION_PREFIX.to_owned(),
            node_allocatable_cpu: DEFAULT_NODE_ALLOCATABLE_CPU.to_owned(),
        }
    }
}

/// The mutators that can be enabled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutatorKind {
    PodTools,
    NodeCpu,
}

impl MutatorKind {
    pub const ALL: [MutatorKind; 2] = [MutatorKind::PodTools, MutatorKind::NodeCpu];

    pub fn as_str(&self) -> &'static str {
        match self {
            MutatorKind::PodTools => "pod-tools",
            MutatorKind::NodeCpu => "node-cpu",
        }
    }

    fn build(&self) -> Box<dyn Mutator> {
        match self {
            MutatorKind::PodTools => Box::new(ToolInjector),
            MutatorKind::NodeCpu => Box::new(NodeCpuOverride),
        }
    }
}

impl fmt::Display for MutatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutatorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MutatorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown mutator: {s}"))
    }
}

/// Maps every handled resource to the mutator in charge of it.
#[derive(Default)]
pub struct MutatorRegistry {
    mutators: BTreeMap<GroupVersionResource, Box<dyn Mutator>>,
}

impl MutatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_kinds<'a>(kinds: impl IntoIterator<Item = &'a MutatorKind>) -> Self {
        let mut registry = MutatorRegistry::new();
        for kind in kinds {
            registry.register(kind.build());
        }
        registry
    }

    /// Register a mutator, replacing the one previously registered for the
    /// same resource.
    pub fn register(&mut self, mutator: Box<dyn Mutator>) {
        self.mutators.insert(mutator.resource(), mutator);
    }

    pub fn get(&self, resource: &GroupVersionResource) -> Option<&dyn Mutator> {
        self.mutators.get(resource).map(|m| m.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.mutators.values().map(|m| m.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}

/// Deserialize the object carried by the request into its typed shape.
fn decode_object<T>(request: &AdmissionRequest, kind: &'static str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let raw = request.object.as_ref().ok_or(MutationError::MissingObject)?;
    T::deserialize(&raw.0).map_err(|source| MutationError::Deserialization { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mutator_kinds() {
        assert_eq!("pod-tools".parse::<MutatorKind>().unwrap(), MutatorKind::PodTools);
        assert_eq!("node-cpu".parse::<MutatorKind>().unwrap(), MutatorKind::NodeCpu);
        assert!("pods".parse::<MutatorKind>().is_err());
    }

    #[test]
    fn registry_dispatches_by_resource() {
        let registry = MutatorRegistry::from_kinds(&MutatorKind::ALL);

        let pods = GroupVersionResource::new("", "v1", "pods");
        let nodes = GroupVersionResource::new("", "v1", "nodes");
        let deployments = GroupVersionResource::new("apps", "v1", "deployments");

        assert_eq!(registry.get(&pods).unwrap().name(), "pod-tools");
        assert_eq!(registry.get(&nodes).unwrap().name(), "node-cpu");
        assert!(registry.get(&deployments).is_none());
    }

    #[test]
    fn empty_registry() {
        let registry = MutatorRegistry::from_kinds(&[]);
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }
}
