//! Models of the `admission.k8s.io` objects exchanged with the Kubernetes API
//! server.

mod request;
mod response;

pub use request::{AdmissionRequest, GroupVersionKind, GroupVersionResource};
pub use response::{AdmissionResponse, AdmissionResponseStatus, PatchType};
