pub mod lead_webhook;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crm_service::CrmError;
use shared_lib::lead_structs::ValidationError;

/// Everything that turns a webhook call into a non-200 answer.
#[derive(Debug)]
pub enum WebhookError {
    MissingToken,
    InvalidSignature,
    Invalid(ValidationError),
    Crm(CrmError),
}

impl From<ValidationError> for WebhookError {
    fn from(err: ValidationError) -> Self {
        WebhookError::Invalid(err)
    }
}

impl From<CrmError> for WebhookError {
    fn from(err: CrmError) -> Self {
        WebhookError::Crm(err)
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::MissingToken => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "CLIENTIFY_TOKEN is not set" })),
            )
                .into_response(),
            WebhookError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid signature" })),
            )
                .into_response(),
            WebhookError::Invalid(err) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response(),
            WebhookError::Crm(err) => {
                tracing::error!("CRM integration failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "CRM integration failed",
                        "status": err.status(),
                        "url": err.url(),
                        "details": err.details(),
                    })),
                )
                    .into_response()
            }
        }
    }
}
