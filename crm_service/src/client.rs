use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{header, Method};
use serde_json::Value;

use shared_lib::config::CrmConfig;

use crate::error::CrmError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Contact,
    Deal,
}

impl EntityKind {
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contacts",
            EntityKind::Deal => "deals",
        }
    }
}

/// A contact or deal living in the CRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn contact(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Contact,
            id: id.into(),
        }
    }

    pub fn deal(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Deal,
            id: id.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("/{}/{}/", self.kind.collection(), self.id)
    }
}

/// `{base}/{collection}/{id}/`, the form the CRM uses for resource references.
pub fn resource_url(base: &str, collection: &str, id: &str) -> String {
    format!("{}/{}/{}/", base.trim_end_matches('/'), collection, id)
}

/// Whatever the CRM answered. Non-2xx statuses are not errors at this level,
/// callers decide which ones are fatal. `base` is the base URL that answered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub base: String,
    pub url: String,
    pub body: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_result(self, operation: &'static str) -> Result<Value, CrmError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(CrmError::Status {
                operation,
                url: self.url,
                status: self.status,
                body: self.body,
            })
        }
    }
}

/// The handful of CRM endpoints the relay needs. `Err` is reserved for
/// requests that never produced an HTTP response.
#[async_trait]
pub trait CrmApi: Send + Sync {
    /// Preferred base URL, without a trailing slash. The base a request actually
    /// reached is reported in `ApiResponse::base`.
    fn base_url(&self) -> String;

    async fn create(&self, kind: EntityKind, body: &Value) -> Result<ApiResponse, CrmError>;

    async fn update(&self, entity: &EntityRef, body: &Value) -> Result<ApiResponse, CrmError>;

    async fn fetch(&self, entity: &EntityRef) -> Result<ApiResponse, CrmError>;

    async fn add_note(&self, contact_id: &str, body: &Value) -> Result<ApiResponse, CrmError>;

    async fn fetch_user(&self, user_id: &str) -> Result<ApiResponse, CrmError>;
}

/// Stateless across calls: every request walks the base list from the top, so
/// concurrent relays never see each other's fallbacks.
pub struct HttpCrmClient {
    client: reqwest::Client,
    base_urls: Vec<String>,
    authorization: Option<String>,
}

fn build_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build CRM http client")
}

impl HttpCrmClient {
    pub fn new(config: &CrmConfig) -> anyhow::Result<Self> {
        let authorization = config
            .token
            .as_ref()
            .map(|token| format!("{} {}", config.auth_scheme, token));

        Ok(Self {
            client: build_http_client(REQUEST_TIMEOUT)?,
            base_urls: config.base_urls(),
            authorization,
        })
    }

    /// Replaces the base URL list, first entry is tried first.
    pub fn with_base_urls(mut self, base_urls: Vec<String>) -> Self {
        let base_urls: Vec<String> = base_urls
            .into_iter()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if !base_urls.is_empty() {
            self.base_urls = base_urls;
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        self.client = build_http_client(timeout)?;
        Ok(self)
    }

    /// Sends to the first base that accepts a connection. Only connect errors
    /// move on to the next base: once a request may have reached a host it is
    /// never resent, so a slow `POST` cannot create the same record twice.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, CrmError> {
        let mut last_error = None;

        for (index, base) in self.base_urls.iter().enumerate() {
            let url = format!("{base}{path}");

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(header::ACCEPT, "application/json");
            if let Some(authorization) = &self.authorization {
                request = request.header(header::AUTHORIZATION, authorization);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    if index > 0 {
                        tracing::warn!("CRM answered from fallback base url {}", base);
                    }

                    let status = response.status().as_u16();
                    let text = response.text().await.map_err(|e| {
                        tracing::warn!("Failed to read CRM response from {}: {}", url, e);
                        CrmError::Transport {
                            url: url.clone(),
                            message: format!("status {status}, unreadable body: {e}"),
                        }
                    })?;
                    let body = parse_body(&text);
                    tracing::debug!("{} {} → {}", method, url, status);

                    return Ok(ApiResponse {
                        status,
                        base: base.clone(),
                        url,
                        body,
                    });
                }
                Err(e) if e.is_connect() => {
                    tracing::warn!("CRM host unreachable at {}: {}", url, e);
                    last_error = Some(CrmError::Transport {
                        url,
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(CrmError::Transport {
                        url,
                        message: e.to_string(),
                    })
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CrmError::Transport {
            url: path.to_string(),
            message: "No CRM base url configured".to_string(),
        }))
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl CrmApi for HttpCrmClient {
    fn base_url(&self) -> String {
        self.base_urls.first().cloned().unwrap_or_default()
    }

    async fn create(&self, kind: EntityKind, body: &Value) -> Result<ApiResponse, CrmError> {
        self.send(Method::POST, &format!("/{}/", kind.collection()), Some(body))
            .await
    }

    async fn update(&self, entity: &EntityRef, body: &Value) -> Result<ApiResponse, CrmError> {
        self.send(Method::PATCH, &entity.path(), Some(body)).await
    }

    async fn fetch(&self, entity: &EntityRef) -> Result<ApiResponse, CrmError> {
        self.send(Method::GET, &entity.path(), None).await
    }

    async fn add_note(&self, contact_id: &str, body: &Value) -> Result<ApiResponse, CrmError> {
        self.send(Method::POST, &format!("/contacts/{contact_id}/note/"), Some(body))
            .await
    }

    async fn fetch_user(&self, user_id: &str) -> Result<ApiResponse, CrmError> {
        self.send(Method::GET, &format!("/users/{user_id}/"), None)
            .await
    }
}

/// The `id` of a created entity, which the CRM returns as a number.
pub fn entity_id(body: &Value) -> Option<String> {
    match body.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
