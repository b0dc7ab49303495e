use tracing::{debug, error, info};

use crate::{
    admission::{AdmissionRequest, AdmissionResponse},
    api::state::ApiServerState,
};

/// Decide on a single admission request.
///
/// Every outcome is an `AdmissionResponse` carrying the request uid: faults
/// raised by the mutator turn into a rejection, never into an HTTP error.
pub(crate) fn evaluate(state: &ApiServerState, request: &AdmissionRequest) -> AdmissionResponse {
    let Some(mutator) = state.mutators.get(&request.resource) else {
        debug!(resource = %request.resource, "no mutator registered for resource");
        return AdmissionResponse::allow(request.uid.clone());
    };

    let operations = match mutator.mutate(request, &state.context) {
        Ok(operations) => operations,
        Err(e) => {
            info!(mutator = mutator.name(), error = %e, "cannot mutate object");
            return AdmissionResponse::reject(request.uid.clone(), e.to_string(), None);
        }
    };

    match AdmissionResponse::with_patch(request.uid.clone(), &operations) {
        Ok(response) => response,
        Err(e) => {
            error!(mutator = mutator.name(), error = %e, "cannot serialize patch");
            AdmissionResponse::reject(
                request.uid.clone(),
                format!("cannot serialize patch: {e}"),
                Some(500),
            )
        }
    }
}
