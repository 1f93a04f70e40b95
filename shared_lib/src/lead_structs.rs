use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const INTENT_DETECTED: &str = "intent_detected";
pub const CREATE_LEAD: &str = "create_lead";

/// Keys of a flat record that belong in the envelope payload.
const LEAD_FIELDS: [&str; 12] = [
    "name",
    "last_name",
    "email",
    "phone",
    "summary",
    "source",
    "tags",
    "destino_crucero",
    "fecha_crucero",
    "adultos",
    "ninos",
    "urgencia_compra",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Body is empty or not JSON")]
    NotAnObject,
    #[error("type must be 'intent_detected'")]
    WrongType,
    #[error("Missing 'intent'")]
    MissingIntent,
    #[error("Missing 'payload'")]
    MissingPayload,
    #[error("Missing 'name' or 'first_name'")]
    MissingName,
    #[error("Either 'email' or 'phone' is required")]
    MissingContactChannel,
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// The `{ type, intent, payload }` envelope posted by the voice agent.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub type_field: String,
    pub intent: String,
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn from_value(value: &Value) -> Result<Envelope, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        match object.get("type").and_then(Value::as_str) {
            Some(INTENT_DETECTED) => {}
            _ => return Err(ValidationError::WrongType),
        }

        let intent = object
            .get("intent")
            .and_then(Value::as_str)
            .filter(|i| !i.is_empty())
            .ok_or(ValidationError::MissingIntent)?;

        let payload = object
            .get("payload")
            .and_then(Value::as_object)
            .ok_or(ValidationError::MissingPayload)?;

        Ok(Envelope {
            type_field: INTENT_DETECTED.to_string(),
            intent: intent.to_string(),
            payload: payload.clone(),
        })
    }
}

/// Flat records (`{ name, email, ... }`) are wrapped into an envelope; anything
/// that already is an envelope, or does not look like a lead, is returned as is.
pub fn wrap_if_flat(raw: Value) -> Value {
    let Value::Object(mut object) = raw else {
        return raw;
    };

    let is_envelope = ["payload", "type", "intent"]
        .iter()
        .all(|key| object.get(*key).is_some_and(is_truthy));
    if is_envelope {
        return Value::Object(object);
    }

    let looks_like_lead = ["name", "email", "phone", "last_name"]
        .iter()
        .any(|key| object.get(*key).is_some_and(is_truthy));
    if !looks_like_lead {
        return Value::Object(object);
    }

    let mut payload = Map::new();
    for key in LEAD_FIELDS {
        if let Some(value) = object.remove(key) {
            payload.insert(key.to_string(), value);
        }
    }

    let type_field = object
        .remove("type")
        .filter(is_truthy)
        .unwrap_or_else(|| Value::String(INTENT_DETECTED.to_string()));
    let intent = object
        .remove("intent")
        .filter(is_truthy)
        .unwrap_or_else(|| Value::String(CREATE_LEAD.to_string()));

    let mut envelope = Map::new();
    envelope.insert("type".to_string(), type_field);
    envelope.insert("intent".to_string(), intent);
    envelope.insert("payload".to_string(), Value::Object(payload));
    for (key, value) in object {
        envelope.entry(key).or_insert(value);
    }

    Value::Object(envelope)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Tags arrive either as a list or as a comma separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    List(Vec<String>),
    Csv(String),
    Other(Value),
}

impl Tags {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Tags::List(tags) => tags.clone(),
            Tags::Csv(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
            Tags::Other(_) => vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default, rename = "destino_crucero", deserialize_with = "lenient_string")]
    pub destination: Option<String>,
    #[serde(default, rename = "fecha_crucero", deserialize_with = "lenient_string")]
    pub travel_date: Option<String>,
    #[serde(default, rename = "adultos")]
    pub adults: Value,
    #[serde(default, rename = "ninos")]
    pub children: Value,
    #[serde(default, rename = "urgencia_compra", deserialize_with = "lenient_string")]
    pub urgency: Option<String>,
}

impl LeadPayload {
    pub fn from_map(payload: &Map<String, Value>) -> Result<LeadPayload, ValidationError> {
        serde_json::from_value(Value::Object(payload.clone()))
            .map_err(|e| ValidationError::InvalidPayload(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_none() && self.first_name.is_none() {
            return Err(ValidationError::MissingName);
        }
        if self.email.is_none() && self.phone.is_none() {
            return Err(ValidationError::MissingContactChannel);
        }
        Ok(())
    }

    pub fn full_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.first_name.as_deref())
            .unwrap_or_default()
    }

    pub fn adults(&self) -> Option<f64> {
        crate::utils::normalize_number(&self.adults)
    }

    pub fn children(&self) -> Option<f64> {
        crate::utils::normalize_number(&self.children)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(crate::utils::clean_string(&value))
}
