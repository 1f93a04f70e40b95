use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_lib::{
    env_utils::parse_flag,
    lead_structs::{wrap_if_flat, Envelope, LeadPayload, ValidationError, CREATE_LEAD},
    utils::secrets_match,
};

use super::WebhookError;
use crate::SharedAppState;

pub const SECRET_HEADER: &str = "x-elevenlabs-secret";
pub const DRY_RUN_HEADER: &str = "x-dry-run";

#[derive(Deserialize, Debug, Default)]
pub struct WebhookQuery {
    #[serde(rename = "dryRun")]
    dry_run: Option<String>,
}

pub async fn handler(
    State(state): State<SharedAppState>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    if state.config.token.is_none() {
        return Err(WebhookError::MissingToken);
    }

    if let Some(secret) = &state.config.webhook_secret {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !secrets_match(provided, secret) {
            tracing::warn!("Rejected lead webhook with a bad signature");
            return Err(WebhookError::InvalidSignature);
        }
    }

    let raw: Value = serde_json::from_slice(&body).map_err(|_| ValidationError::NotAnObject)?;
    tracing::debug!("Lead webhook body: {}", raw);
    let envelope = wrap_if_flat(raw);

    if is_dry_run(state.config.dry_run, &query, &headers) {
        tracing::info!("Dry run, not calling the CRM");
        return Ok(Json(json!({
            "ok": true,
            "mode": "dry-run",
            "received": envelope,
        }))
        .into_response());
    }

    let envelope = Envelope::from_value(&envelope)?;
    if envelope.intent != CREATE_LEAD {
        tracing::info!("Ignoring intent '{}'", envelope.intent);
        return Ok(Json(json!({
            "ok": true,
            "message": format!("Intent '{}' is not implemented", envelope.intent),
        }))
        .into_response());
    }

    let lead = LeadPayload::from_map(&envelope.payload)?;
    lead.validate()?;

    let outcome = crm_service::relay_lead(state.crm.as_ref(), &state.config, &lead).await?;

    Ok(Json(outcome).into_response())
}

fn is_dry_run(configured: bool, query: &WebhookQuery, headers: &HeaderMap) -> bool {
    configured
        || query.dry_run.as_deref() == Some("1")
        || headers
            .get(DRY_RUN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_flag)
            .unwrap_or(false)
}
