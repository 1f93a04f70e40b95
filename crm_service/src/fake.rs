//! In-memory CRM used by the unit tests.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::{
    client::{ApiResponse, CrmApi, EntityKind, EntityRef},
    error::CrmError,
};

pub const FAKE_BASE: &str = "https://crm.test/v1";

const OWNER_KEYS: [&str; 3] = ["owner", "owner_id", "assigned_to"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerPolicy {
    /// Stores whatever owner value is written.
    AcceptAll,
    /// Rejects every owner write that is not an email with a 400.
    EmailOnly,
    /// Answers 200 to owner writes without changing anything.
    IgnoreWrites,
}

/// How a read fails when an outage is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outage {
    /// The request never gets an HTTP answer.
    Transport,
    /// The CRM answers with this status.
    Status(u16),
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    entities: HashMap<String, Value>,
    requests: Vec<String>,
}

pub struct FakeCrm {
    policy: OwnerPolicy,
    answer_base: String,
    users: HashMap<String, Value>,
    user_outages: HashMap<String, Outage>,
    fetch_outage: Option<Outage>,
    fail_create: Option<(EntityKind, u16)>,
    fail_notes: bool,
    state: Mutex<FakeState>,
}

impl FakeCrm {
    pub fn new(policy: OwnerPolicy) -> Self {
        Self {
            policy,
            answer_base: FAKE_BASE.to_string(),
            users: HashMap::new(),
            user_outages: HashMap::new(),
            fetch_outage: None,
            fail_create: None,
            fail_notes: false,
            state: Mutex::new(FakeState {
                next_id: 12345,
                ..Default::default()
            }),
        }
    }

    pub fn with_user(mut self, id: &str, email: &str) -> Self {
        self.users.insert(
            id.to_string(),
            json!({
                "id": id.parse::<u64>().unwrap_or_default(),
                "email": email,
                "first_name": "Agent",
                "last_name": id,
            }),
        );
        self
    }

    /// Responses report `base` as the host that answered while `base_url`
    /// keeps returning the preferred one.
    pub fn answering_from(mut self, base: &str) -> Self {
        self.answer_base = base.to_string();
        self
    }

    /// `GET /users/{id}/` for this id fails.
    pub fn with_user_outage(mut self, id: &str, outage: Outage) -> Self {
        self.user_outages.insert(id.to_string(), outage);
        self
    }

    /// Every entity read-back fails.
    pub fn with_fetch_outage(mut self, outage: Outage) -> Self {
        self.fetch_outage = Some(outage);
        self
    }

    pub fn failing_create(mut self, kind: EntityKind, status: u16) -> Self {
        self.fail_create = Some((kind, status));
        self
    }

    pub fn failing_notes(mut self) -> Self {
        self.fail_notes = true;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn entity(&self, entity: &EntityRef) -> Option<Value> {
        self.state.lock().unwrap().entities.get(&entity.path()).cloned()
    }

    fn respond(&self, status: u16, path: &str, body: Value) -> Result<ApiResponse, CrmError> {
        Ok(ApiResponse {
            status,
            base: self.answer_base.clone(),
            url: format!("{}{}", self.answer_base, path),
            body,
        })
    }

    fn outage(&self, outage: Outage, path: &str) -> Result<ApiResponse, CrmError> {
        match outage {
            Outage::Transport => Err(CrmError::Transport {
                url: format!("{}{}", self.answer_base, path),
                message: "connection reset".to_string(),
            }),
            Outage::Status(status) => self.respond(status, path, json!("Server Error")),
        }
    }

    fn user_id_for_email(&self, email: &str) -> Option<u64> {
        self.users
            .values()
            .find(|user| user["email"].as_str() == Some(email))
            .and_then(|user| user["id"].as_u64())
    }
}

#[async_trait]
impl CrmApi for FakeCrm {
    fn base_url(&self) -> String {
        FAKE_BASE.to_string()
    }

    async fn create(&self, kind: EntityKind, body: &Value) -> Result<ApiResponse, CrmError> {
        let path = format!("/{}/", kind.collection());
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("POST {path}"));

        if let Some((failing, status)) = self.fail_create {
            if failing == kind {
                return self.respond(status, &path, json!({ "detail": "rejected" }));
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        let mut entity = body.clone();
        entity["id"] = json!(id);
        let entity_ref = EntityRef {
            kind,
            id: id.to_string(),
        };
        state.entities.insert(entity_ref.path(), entity.clone());

        self.respond(201, &path, entity)
    }

    async fn update(&self, entity: &EntityRef, body: &Value) -> Result<ApiResponse, CrmError> {
        let path = entity.path();
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("PATCH {path} {body}"));

        let Some(stored) = state.entities.get(&path).cloned() else {
            return self.respond(404, &path, json!({ "detail": "Not found." }));
        };
        let mut stored = stored.as_object().cloned().unwrap_or_default();
        let changes = body.as_object().cloned().unwrap_or_default();

        let owner_write = changes
            .iter()
            .find(|(key, _)| OWNER_KEYS.contains(&key.as_str()));
        if let Some((key, value)) = owner_write {
            match self.policy {
                OwnerPolicy::AcceptAll => {
                    stored.insert(key.clone(), value.clone());
                }
                OwnerPolicy::EmailOnly => {
                    let Some(email) = value.as_str().filter(|v| v.contains('@')) else {
                        let mut detail = Map::new();
                        detail.insert(key.clone(), json!(["Invalid owner."]));
                        return self.respond(400, &path, Value::Object(detail));
                    };
                    let mut owner = Map::new();
                    owner.insert("email".to_string(), json!(email));
                    if let Some(id) = self.user_id_for_email(email) {
                        owner.insert("id".to_string(), json!(id));
                    }
                    stored.insert("owner".to_string(), Value::Object(owner));
                }
                OwnerPolicy::IgnoreWrites => {}
            }
        } else {
            for (key, value) in changes {
                stored.insert(key, value);
            }
        }

        let stored = Value::Object(stored);
        state.entities.insert(path.clone(), stored.clone());
        self.respond(200, &path, stored)
    }

    async fn fetch(&self, entity: &EntityRef) -> Result<ApiResponse, CrmError> {
        let path = entity.path();
        let mut state = self.state.lock().unwrap();
        state.requests.push(format!("GET {path}"));

        if let Some(outage) = self.fetch_outage {
            return self.outage(outage, &path);
        }
        match state.entities.get(&path).cloned() {
            Some(stored) => self.respond(200, &path, stored),
            None => self.respond(404, &path, json!({ "detail": "Not found." })),
        }
    }

    async fn add_note(&self, contact_id: &str, body: &Value) -> Result<ApiResponse, CrmError> {
        let path = format!("/contacts/{contact_id}/note/");
        self.state
            .lock()
            .unwrap()
            .requests
            .push(format!("POST {path}"));

        if self.fail_notes {
            return self.respond(500, &path, json!("Server Error"));
        }
        self.respond(201, &path, body.clone())
    }

    async fn fetch_user(&self, user_id: &str) -> Result<ApiResponse, CrmError> {
        let path = format!("/users/{user_id}/");
        self.state
            .lock()
            .unwrap()
            .requests
            .push(format!("GET {path}"));

        if let Some(outage) = self.user_outages.get(user_id) {
            return self.outage(*outage, &path);
        }
        match self.users.get(user_id) {
            Some(user) => self.respond(200, &path, user.clone()),
            None => self.respond(404, &path, json!({ "detail": "Not found." })),
        }
    }
}
