use crate::admission::{AdmissionRequest, AdmissionResponse};

pub const ADMISSION_REVIEW_API_VERSION: &str = "admission.k8s.io/v1beta1";
pub const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReviewResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    pub response: AdmissionResponse,
}

impl AdmissionReviewResponse {
    /// Wrap the response using the type metadata of the incoming review.
    pub fn new(
        api_version: Option<String>,
        kind: Option<String>,
        response: AdmissionResponse,
    ) -> Self {
        AdmissionReviewResponse {
            api_version: api_version.or_else(|| Some(String::from(ADMISSION_REVIEW_API_VERSION))),
            kind: kind.or_else(|| Some(String::from(ADMISSION_REVIEW_KIND))),
            response,
        }
    }
}
