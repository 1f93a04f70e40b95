//! Reading the owner back out of a contact/deal. Depending on the account the
//! CRM renders the owner as a number, a user URL, a bare numeric string, an
//! email, or a nested user object, and under more than one key.

use serde::Serialize;
use serde_json::{Map, Value};

/// Keys checked for an owner, highest priority first.
const OWNER_KEYS: [&str; 5] = ["owner_id", "owner", "user", "assigned_to", "assigned_user"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerRef {
    ById(String),
    /// A `.../users/{id}/` reference, holding the id.
    ByUrl(String),
    ByEmail(String),
    ByObject {
        id: Option<String>,
        email: Option<String>,
        name: Option<String>,
    },
}

impl OwnerRef {
    pub fn parse(value: &Value) -> Option<OwnerRef> {
        match value {
            Value::Number(n) => n.as_u64().map(|id| OwnerRef::ById(id.to_string())),
            Value::String(s) => Self::parse_str(s),
            Value::Object(map) => Self::parse_object(map),
            _ => None,
        }
    }

    fn parse_str(raw: &str) -> Option<OwnerRef> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(id) = user_id_from_url(raw) {
            return Some(OwnerRef::ByUrl(id));
        }
        if raw.chars().all(|c| c.is_ascii_digit()) {
            return Some(OwnerRef::ById(raw.to_string()));
        }
        if raw.contains('@') {
            return Some(OwnerRef::ByEmail(raw.to_lowercase()));
        }
        None
    }

    fn parse_object(map: &Map<String, Value>) -> Option<OwnerRef> {
        let id = match map.get("id") {
            Some(Value::Number(n)) => n.as_u64().map(|id| id.to_string()),
            Some(Value::String(s)) if is_numeric(s.trim()) => Some(s.trim().to_string()),
            _ => None,
        }
        .or_else(|| {
            map.get("url")
                .and_then(Value::as_str)
                .and_then(user_id_from_url)
        });

        let email = map
            .get("email")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|e| e.contains('@'))
            .map(str::to_lowercase);

        let name = non_empty_str(map.get("name")).or_else(|| {
            let full = [map.get("first_name"), map.get("last_name")]
                .into_iter()
                .filter_map(non_empty_str)
                .collect::<Vec<_>>()
                .join(" ");
            (!full.is_empty()).then_some(full)
        });

        if id.is_none() && email.is_none() && name.is_none() {
            return None;
        }
        Some(OwnerRef::ByObject { id, email, name })
    }
}

/// Pulls `{id}` out of `.../users/{id}/`.
pub fn user_id_from_url(raw: &str) -> Option<String> {
    let (_, rest) = raw.split_once("/users/")?;
    let id = rest.split('/').next()?;
    is_numeric(id).then(|| id.to_string())
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Normalised owner, fields the response did not carry stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OwnerRecord {
    pub id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl OwnerRecord {
    /// Walks the owner keys in priority order; earlier keys win.
    pub fn from_entity(entity: &Value) -> OwnerRecord {
        let mut record = OwnerRecord::default();

        for key in OWNER_KEYS {
            if let Some(owner) = entity.get(key).and_then(OwnerRef::parse) {
                record.absorb(owner);
            }
        }

        if record.name.is_none() {
            record.name = non_empty_str(entity.get("owner_name"));
        }
        if record.email.is_none() {
            record.email = non_empty_str(entity.get("owner_email")).map(|e| e.to_lowercase());
        }

        record
    }

    /// A `GET /users/{id}/` body.
    pub fn from_user(user: &Value) -> OwnerRecord {
        let mut record = OwnerRecord::default();
        if let Some(owner) = OwnerRef::parse(user) {
            record.absorb(owner);
        }
        record
    }

    pub fn absorb(&mut self, owner: OwnerRef) {
        match owner {
            OwnerRef::ById(id) | OwnerRef::ByUrl(id) => {
                self.id.get_or_insert(id);
            }
            OwnerRef::ByEmail(email) => {
                self.email.get_or_insert(email);
            }
            OwnerRef::ByObject { id, email, name } => {
                self.fill(OwnerRecord { id, email, name });
            }
        }
    }

    /// Fills the gaps in `self` from `other`.
    pub fn fill(&mut self, other: OwnerRecord) {
        if self.id.is_none() {
            self.id = other.id;
        }
        if self.email.is_none() {
            self.email = other.email;
        }
        if self.name.is_none() {
            self.name = other.name;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.email.is_none() && self.name.is_none()
    }

    /// True when the record carries the expected id or the expected email.
    pub fn matches(&self, expected_id: Option<&str>, expected_email: Option<&str>) -> bool {
        let id_matches = match (self.id.as_deref(), expected_id) {
            (Some(actual), Some(expected)) => actual == expected,
            _ => false,
        };
        let email_matches = match (self.email.as_deref(), expected_email) {
            (Some(actual), Some(expected)) => actual.eq_ignore_ascii_case(expected),
            _ => false,
        };
        id_matches || email_matches
    }
}
