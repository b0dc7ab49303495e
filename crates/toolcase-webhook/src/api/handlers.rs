use std::sync::Arc;

use axum::{
    body::Bytes,
    extract,
    http::{header, HeaderMap},
    Json,
};
use tracing::{debug, Span};

use crate::{
    admission::{AdmissionRequest, AdmissionResponse},
    api::{
        admission_review::{AdmissionReviewRequest, AdmissionReviewResponse},
        service::evaluate,
        state::ApiServerState,
        ApiError,
    },
};

#[tracing::instrument(
    name = "mutation",
    fields(
        request_uid=tracing::field::Empty,
        host=crate::config::HOSTNAME.as_str(),
        kind=tracing::field::Empty,
        resource=tracing::field::Empty,
        name=tracing::field::Empty,
        namespace=tracing::field::Empty,
        operation=tracing::field::Empty,
        allowed=tracing::field::Empty,
        mutated=tracing::field::Empty,
        response_message=tracing::field::Empty,
    ),
    skip_all)]
pub(crate) async fn mutate_handler(
    extract::State(state): extract::State<Arc<ApiServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AdmissionReviewResponse>, ApiError> {
    check_content_type(&headers)?;

    let AdmissionReviewRequest {
        kind,
        api_version,
        request,
    } = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "cannot decode admission review");
        ApiError::internal_server_error(format!("could not deserialize request: {e}"))
    })?;
    let request = request.ok_or_else(|| {
        ApiError::internal_server_error(
            "malformed admission review: request is nil".to_owned(),
        )
    })?;

    populate_span_with_admission_request_data(&request);
    let response = evaluate(&state, &request);
    populate_span_with_mutation_results(&response);

    Ok(Json(AdmissionReviewResponse::new(
        api_version,
        kind,
        response,
    )))
}

/// Only `application/json` bodies are accepted, media type parameters
/// like `charset` are ignored.
fn check_content_type(headers: &HeaderMap) -> Result<(), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    match content_type.parse::<mime::Mime>() {
        Ok(mime) if mime.essence_str() == mime::APPLICATION_JSON.essence_str() => Ok(()),
        _ => Err(ApiError::bad_request(format!(
            "unsupported content type {content_type:?}, only application/json is supported"
        ))),
    }
}

fn populate_span_with_admission_request_data(adm_req: &AdmissionRequest) {
    Span::current().record("kind", adm_req.kind.kind.as_str());
    Span::current().record("name", adm_req.name.clone().unwrap_or_default().as_str());
    Span::current().record(
        "namespace",
        adm_req.namespace.clone().unwrap_or_default().as_str(),
    );
    Span::current().record("operation", adm_req.operation.as_str());
    Span::current().record("request_uid", adm_req.uid.as_str());
    Span::current().record("resource", adm_req.resource.to_string().as_str());
}

fn populate_span_with_mutation_results(response: &AdmissionResponse) {
    Span::current().record("allowed", response.allowed);
    Span::current().record("mutated", response.patch.is_some());
    if let Some(message) = response
        .status
        .as_ref()
        .and_then(|status| status.message.as_deref())
    {
        Span::current().record("response_message", message);
    }
}
