use serde::Serialize;
use serde_json::{json, Value};

use shared_lib::{
    config::{Agent, CrmConfig},
    lead_structs::LeadPayload,
    utils::{format_number, split_name},
};

use crate::{
    client::{entity_id, resource_url, CrmApi, EntityKind, EntityRef},
    error::CrmError,
    owner::{AssignmentResult, OwnerResolver},
};

const DEFAULT_CONTACT_SOURCE: &str = "AI Agent";
const NOTE_TITLE: &str = "Datos del Agente";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadOutcome {
    pub ok: bool,
    pub base: String,
    pub contact_id: String,
    pub deal_id: Option<String>,
    pub intended_owner_id: Option<String>,
    pub assigned_owner_id: Option<String>,
    pub assigned_owner_url: Option<String>,
    pub assigned_owner_name: Option<String>,
    pub assigned_owner_email: Option<String>,
    pub owner_assignment: AssignmentResult,
    pub warnings: Vec<String>,
    pub processed_at: String,
}

/// Creates the contact (and deal when a stage is configured) for a lead and
/// assigns an owner. Only contact and deal creation failures are returned as
/// errors; everything else ends up in `warnings`.
///
/// Resource URLs are built from the base the contact was created on, which is
/// fixed for the rest of the relay.
pub async fn relay_lead(
    crm: &dyn CrmApi,
    config: &CrmConfig,
    lead: &LeadPayload,
) -> Result<LeadOutcome, CrmError> {
    let mut warnings = vec![];

    let (contact_id, base) = create_contact(crm, lead).await?;
    tracing::info!("Created contact {} on {}", contact_id, base);

    if let Some(note) = build_note(lead) {
        let body = json!({ "name": NOTE_TITLE, "comment": note });
        match crm.add_note(&contact_id, &body).await {
            Ok(response) if response.is_success() => {}
            Ok(response) => {
                warnings.push(soft_failure("note", response.status, &response.body))
            }
            Err(e) => warnings.push(format!("note: {e}")),
        }
    }

    if let Some(body) = custom_fields_body(config, lead) {
        match crm.update(&EntityRef::contact(&contact_id), &body).await {
            Ok(response) if response.is_success() => {}
            Ok(response) => {
                warnings.push(soft_failure("custom fields", response.status, &response.body))
            }
            Err(e) => warnings.push(format!("custom fields: {e}")),
        }
    }

    let deal_id = match &config.deal_stage_id {
        Some(stage_id) => {
            let contact_url = resource_url(&base, "contacts", &contact_id);
            Some(create_deal(crm, config, lead, &contact_url, stage_id).await?)
        }
        None => {
            tracing::warn!("CLIENTIFY_DEAL_STAGE_ID is not set, no deal will be created");
            None
        }
    };

    let target = match &deal_id {
        Some(deal_id) => EntityRef::deal(deal_id),
        None => EntityRef::contact(&contact_id),
    };
    let assignment = OwnerResolver::new(crm, config)
        .with_base(&base)
        .assign(&target, &contact_id)
        .await;
    if !assignment.success && assignment.intended_owner.is_some() {
        warnings.push(format!("owner: could not assign an owner to {}", target.path()));
    }

    tracing::info!(
        "Lead relayed: contact {} deal {} owner {}",
        contact_id,
        deal_id.as_deref().unwrap_or("(none)"),
        assignment.chosen_owner.as_deref().unwrap_or("(none)")
    );

    let owner = assignment.owner.clone().unwrap_or_default();
    let assigned_owner_id = match config
        .agent_pool
        .iter()
        .find(|a| Some(a.to_string()) == assignment.chosen_owner)
    {
        Some(Agent::UserId(id)) => Some(id.clone()),
        _ => owner.id.clone(),
    };
    let assigned_owner_url = assigned_owner_id
        .as_ref()
        .map(|id| resource_url(&base, "users", id));

    Ok(LeadOutcome {
        ok: true,
        base,
        contact_id,
        deal_id,
        intended_owner_id: assignment.intended_owner.clone(),
        assigned_owner_id,
        assigned_owner_url,
        assigned_owner_name: owner.name,
        assigned_owner_email: owner.email,
        owner_assignment: assignment,
        warnings,
        processed_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Id of the new contact and the base URL that created it.
async fn create_contact(
    crm: &dyn CrmApi,
    lead: &LeadPayload,
) -> Result<(String, String), CrmError> {
    let (first_name, last_name) = split_name(lead.full_name(), lead.last_name.as_deref());
    let tags = lead.tags.as_ref().map(|t| t.to_vec()).unwrap_or_default();

    let body = json!({
        "first_name": first_name,
        "last_name": last_name,
        "email": lead.email,
        "phone": lead.phone,
        "contact_source": lead.source.as_deref().unwrap_or(DEFAULT_CONTACT_SOURCE),
        "tags": tags,
        "summary": lead.summary.as_deref().unwrap_or_default(),
    });

    let response = crm.create(EntityKind::Contact, &body).await?;
    let url = response.url.clone();
    let base = response.base.clone();
    let created = response.into_result("createContact")?;
    let contact_id = entity_id(&created).ok_or(CrmError::MissingId {
        operation: "createContact",
        url,
        body: created,
    })?;
    Ok((contact_id, base))
}

async fn create_deal(
    crm: &dyn CrmApi,
    config: &CrmConfig,
    lead: &LeadPayload,
    contact_url: &str,
    stage_id: &str,
) -> Result<String, CrmError> {
    let name = format!(
        "Crucero: {} · {}",
        lead.destination.as_deref().unwrap_or("Destino"),
        lead.travel_date.as_deref().unwrap_or("Fecha")
    );

    let body = json!({
        "name": name,
        "contact": contact_url,
        "stage": stage_id,
        "amount": config.default_deal_amount,
        "expected_close_date": lead.travel_date,
    });

    let response = crm.create(EntityKind::Deal, &body).await?;
    let url = response.url.clone();
    let created = response.into_result("createDeal")?;
    let deal_id = entity_id(&created).ok_or(CrmError::MissingId {
        operation: "createDeal",
        url,
        body: created,
    })?;

    tracing::info!("Created deal {} for contact {}", deal_id, contact_url);
    Ok(deal_id)
}

/// Free-text note with whatever trip details the agent collected, `None` when
/// there is nothing to say.
pub fn build_note(lead: &LeadPayload) -> Option<String> {
    let mut lines = vec![];
    if let Some(destination) = &lead.destination {
        lines.push(format!("- Destino crucero: {destination}"));
    }
    if let Some(date) = &lead.travel_date {
        lines.push(format!("- Fecha crucero: {date}"));
    }
    if let Some(adults) = lead.adults().filter(|n| *n != 0.0) {
        lines.push(format!("- Adultos: {}", format_number(adults)));
    }
    if let Some(children) = lead.children().filter(|n| *n != 0.0) {
        lines.push(format!("- Niños: {}", format_number(children)));
    }
    if let Some(urgency) = &lead.urgency {
        lines.push(format!("- Urgencia de compra: {urgency}"));
    }
    if let Some(summary) = &lead.summary {
        lines.push(format!("- Resumen: {summary}"));
    }

    if lines.is_empty() {
        return None;
    }
    Some(format!("Datos del lead:\n{}\n", lines.join("\n")))
}

/// `{ custom_fields_values: [{ id, value }] }` for every configured field that
/// has a value.
pub fn custom_fields_body(config: &CrmConfig, lead: &LeadPayload) -> Option<Value> {
    let fields = &config.custom_fields;
    let entries = [
        (&fields.destination, lead.destination.clone()),
        (&fields.travel_date, lead.travel_date.clone()),
        (&fields.adults, lead.adults().map(format_number)),
        (&fields.children, lead.children().map(format_number)),
        (&fields.urgency, lead.urgency.clone()),
    ];

    let values: Vec<Value> = entries
        .into_iter()
        .filter_map(|(id, value)| match (id, value) {
            (Some(id), Some(value)) if !value.is_empty() => {
                Some(json!({ "id": id, "value": value }))
            }
            _ => None,
        })
        .collect();

    if values.is_empty() {
        return None;
    }
    Some(json!({ "custom_fields_values": values }))
}

fn soft_failure(step: &str, status: u16, body: &Value) -> String {
    tracing::warn!("Soft failure on {} with {}: {}", step, status, body);
    format!("{step}: CRM answered {status}")
}
