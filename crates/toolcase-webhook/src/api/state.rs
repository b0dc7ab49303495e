use crate::mutation::{DecisionContext, MutatorRegistry};

/// Shared by all the requests, never changed once the server is started.
pub(crate) struct ApiServerState {
    pub(crate) mutators: MutatorRegistry,
    pub(crate) context: DecisionContext,
}
