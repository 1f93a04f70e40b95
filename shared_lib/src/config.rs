use std::{fmt, time::Duration};

use anyhow::Context;

use crate::{env_utils::parse_flag, utils::clean_token};

pub const DEFAULT_BASE_URL: &str = "https://api.clientify.net/v1";
pub const FALLBACK_BASE_URLS: [&str; 2] =
    ["https://api.clientify.net/v1", "https://api.clientify.com/v1"];
pub const DEFAULT_AUTH_SCHEME: &str = "Token";
pub const DEFAULT_VERIFY_DELAY: Duration = Duration::from_millis(250);

/// One entry of the agent pool. The CRM accepts either form as an owner
/// reference depending on the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Agent {
    UserId(String),
    Email(String),
}

impl Agent {
    pub fn parse(raw: &str) -> Option<Agent> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.contains('@') {
            Some(Agent::Email(raw.to_lowercase()))
        } else {
            Some(Agent::UserId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Agent::UserId(id) => id,
            Agent::Email(email) => email,
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomFieldIds {
    pub destination: Option<String>,
    pub travel_date: Option<String>,
    pub adults: Option<String>,
    pub children: Option<String>,
    pub urgency: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentStrategy {
    Hash,
}

#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub auth_scheme: String,
    pub custom_fields: CustomFieldIds,
    pub agent_pool: Vec<Agent>,
    pub deal_stage_id: Option<String>,
    pub default_deal_amount: f64,
    pub webhook_secret: Option<String>,
    pub dry_run: bool,
    pub validate_agents: bool,
    pub verify_delay: Duration,
    pub strategy: AssignmentStrategy,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            custom_fields: CustomFieldIds::default(),
            agent_pool: vec![],
            deal_stage_id: None,
            default_deal_amount: 0.0,
            webhook_secret: None,
            dry_run: false,
            validate_agents: true,
            verify_delay: DEFAULT_VERIFY_DELAY,
            strategy: AssignmentStrategy::Hash,
        }
    }
}

impl CrmConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = match get("CLIENTIFY_BASE_URL") {
            Some(raw) => {
                url::Url::parse(&raw)
                    .with_context(|| format!("CLIENTIFY_BASE_URL is not a valid URL: {raw}"))?;
                raw.trim_end_matches('/').to_string()
            }
            None => DEFAULT_BASE_URL.to_string(),
        };

        let token = get("CLIENTIFY_TOKEN")
            .map(|t| clean_token(&t))
            .filter(|t| !t.is_empty());

        let agent_pool = get("CLIENTIFY_AGENT_USER_IDS")
            .map(|raw| raw.split(',').filter_map(Agent::parse).collect())
            .unwrap_or_default();

        let default_deal_amount = match get("DEFAULT_DEAL_AMOUNT") {
            Some(raw) => match raw.parse::<f64>() {
                Ok(amount) if amount.is_finite() => amount,
                _ => {
                    tracing::warn!("Failed to parse DEFAULT_DEAL_AMOUNT '{}', using 0", raw);
                    0.0
                }
            },
            None => 0.0,
        };

        let verify_delay = match get("OWNER_VERIFY_DELAY_MS") {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => {
                    tracing::warn!("Failed to parse OWNER_VERIFY_DELAY_MS, using default");
                    DEFAULT_VERIFY_DELAY
                }
            },
            None => DEFAULT_VERIFY_DELAY,
        };

        let strategy = match get("ASSIGNMENT_STRATEGY").map(|s| s.to_lowercase()) {
            None => AssignmentStrategy::Hash,
            Some(s) if s == "hash" => AssignmentStrategy::Hash,
            Some(other) => {
                tracing::warn!(
                    "Unknown ASSIGNMENT_STRATEGY '{}', falling back to hash",
                    other
                );
                AssignmentStrategy::Hash
            }
        };

        Ok(Self {
            base_url,
            token,
            auth_scheme: get("CLIENTIFY_AUTH_SCHEME")
                .unwrap_or_else(|| DEFAULT_AUTH_SCHEME.to_string()),
            custom_fields: CustomFieldIds {
                destination: get("CLIENTIFY_CF_DESTINO_ID"),
                travel_date: get("CLIENTIFY_CF_FECHA_ID"),
                adults: get("CLIENTIFY_CF_ADULTOS_ID"),
                children: get("CLIENTIFY_CF_NINOS_ID"),
                urgency: get("CLIENTIFY_CF_URGENCIA_ID"),
            },
            agent_pool,
            deal_stage_id: get("CLIENTIFY_DEAL_STAGE_ID"),
            default_deal_amount,
            webhook_secret: get("ELEVENLABS_SECRET"),
            dry_run: get("DRY_RUN").map(|v| parse_flag(&v)).unwrap_or(false),
            validate_agents: get("CLIENTIFY_VALIDATE_AGENTS")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            verify_delay,
            strategy,
        })
    }

    /// The configured base followed by the built-in fallback hosts, without
    /// duplicates.
    pub fn base_urls(&self) -> Vec<String> {
        let mut urls = vec![self.base_url.clone()];
        for fallback in FALLBACK_BASE_URLS {
            if !urls.iter().any(|u| u == fallback) {
                urls.push(fallback.to_string());
            }
        }
        urls
    }
}
