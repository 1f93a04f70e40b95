//! A small stand-in for the CRM REST API, served over real HTTP.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn setup() {
    dotenv::dotenv().ok();
    let _ = tracing_subscriber::registry()
        .with(LevelFilter::INFO)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerPolicy {
    AcceptAll,
    EmailOnly,
}

pub struct MockCrm {
    policy: OwnerPolicy,
    reject_contacts: bool,
    contact_delay: Option<Duration>,
    users: HashMap<String, Value>,
    next_id: Mutex<u64>,
    entities: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<String>>,
    authorizations: Mutex<Vec<String>>,
}

type SharedMock = Arc<MockCrm>;

impl MockCrm {
    pub fn new(policy: OwnerPolicy) -> Self {
        Self {
            policy,
            reject_contacts: false,
            contact_delay: None,
            users: HashMap::new(),
            next_id: Mutex::new(9000),
            entities: Mutex::new(HashMap::new()),
            requests: Mutex::new(vec![]),
            authorizations: Mutex::new(vec![]),
        }
    }

    pub fn with_user(mut self, id: u64, email: &str) -> Self {
        self.users.insert(
            id.to_string(),
            json!({ "id": id, "email": email, "first_name": "Agent", "last_name": id.to_string() }),
        );
        self
    }

    pub fn rejecting_contacts(mut self) -> Self {
        self.reject_contacts = true;
        self
    }

    /// Accepts `POST /contacts/` and answers only after `delay`.
    pub fn slow_contacts(mut self, delay: Duration) -> Self {
        self.contact_delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn authorizations(&self) -> Vec<String> {
        self.authorizations.lock().unwrap().clone()
    }

    pub fn entity(&self, collection: &str, id: &str) -> Option<Value> {
        self.entities
            .lock()
            .unwrap()
            .get(&format!("{collection}/{id}"))
            .cloned()
    }

    /// Serves the mock on an ephemeral port and returns its `/v1` base url.
    pub async fn serve(self) -> (Arc<MockCrm>, String) {
        let mock = Arc::new(self);
        let app = Router::new()
            .nest(
                "/v1",
                Router::new()
                    .route("/contacts/", post(create_contact))
                    .route("/deals/", post(create_deal))
                    .route("/contacts/:id/", get(fetch_contact).patch(update_contact))
                    .route("/deals/:id/", get(fetch_deal).patch(update_deal))
                    .route("/contacts/:id/note/", post(add_note))
                    .route("/users/:id/", get(fetch_user)),
            )
            .with_state(mock.clone());

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = axum::Server::bind(&addr).serve(app.into_make_service());
        let base = format!("http://{}/v1", server.local_addr());
        tokio::spawn(server);

        (mock, base)
    }

    fn record(&self, line: String, headers: &HeaderMap) {
        self.requests.lock().unwrap().push(line);
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            self.authorizations.lock().unwrap().push(auth.to_string());
        }
    }

    fn create(&self, collection: &str, body: Value) -> (StatusCode, Json<Value>) {
        let id = {
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            *next_id
        };
        let mut entity = body;
        entity["id"] = json!(id);
        self.entities
            .lock()
            .unwrap()
            .insert(format!("{collection}/{id}"), entity.clone());
        (StatusCode::CREATED, Json(entity))
    }

    fn fetch(&self, collection: &str, id: &str) -> (StatusCode, Json<Value>) {
        match self.entity(collection, id) {
            Some(entity) => (StatusCode::OK, Json(entity)),
            None => not_found(),
        }
    }

    fn update(&self, collection: &str, id: &str, body: Value) -> (StatusCode, Json<Value>) {
        let key = format!("{collection}/{id}");
        let mut entities = self.entities.lock().unwrap();
        let Some(stored) = entities.get(&key).cloned() else {
            return not_found();
        };
        let mut stored = stored.as_object().cloned().unwrap_or_default();

        for (field, value) in body.as_object().cloned().unwrap_or_default() {
            let is_owner = matches!(field.as_str(), "owner" | "owner_id" | "assigned_to");
            if !is_owner || self.policy == OwnerPolicy::AcceptAll {
                stored.insert(field, value);
                continue;
            }

            let Some(email) = value.as_str().filter(|v| v.contains('@')) else {
                let mut detail = Map::new();
                detail.insert(field, json!(["Invalid owner."]));
                return (StatusCode::BAD_REQUEST, Json(Value::Object(detail)));
            };
            let id = self
                .users
                .values()
                .find(|u| u["email"].as_str() == Some(email))
                .map(|u| u["id"].clone())
                .unwrap_or(Value::Null);
            stored.insert("owner".to_string(), json!({ "id": id, "email": email }));
        }

        let stored = Value::Object(stored);
        entities.insert(key, stored.clone());
        (StatusCode::OK, Json(stored))
    }
}

fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." })))
}

async fn create_contact(
    State(mock): State<SharedMock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record("POST /contacts/".to_string(), &headers);
    if let Some(delay) = mock.contact_delay {
        tokio::time::sleep(delay).await;
    }
    if mock.reject_contacts {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "email": ["Enter a valid email address."] })),
        );
    }
    mock.create("contacts", body)
}

async fn create_deal(
    State(mock): State<SharedMock>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record("POST /deals/".to_string(), &headers);
    mock.create("deals", body)
}

async fn fetch_contact(
    State(mock): State<SharedMock>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    mock.record(format!("GET /contacts/{id}/"), &headers);
    mock.fetch("contacts", &id)
}

async fn fetch_deal(
    State(mock): State<SharedMock>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    mock.record(format!("GET /deals/{id}/"), &headers);
    mock.fetch("deals", &id)
}

async fn update_contact(
    State(mock): State<SharedMock>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record(format!("PATCH /contacts/{id}/"), &headers);
    mock.update("contacts", &id, body)
}

async fn update_deal(
    State(mock): State<SharedMock>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record(format!("PATCH /deals/{id}/"), &headers);
    mock.update("deals", &id, body)
}

async fn add_note(
    State(mock): State<SharedMock>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.record(format!("POST /contacts/{id}/note/"), &headers);
    (StatusCode::CREATED, Json(body))
}

async fn fetch_user(
    State(mock): State<SharedMock>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    mock.record(format!("GET /users/{id}/"), &headers);
    match mock.users.get(&id) {
        Some(user) => (StatusCode::OK, Json(user.clone())),
        None => not_found(),
    }
}
