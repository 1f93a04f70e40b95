//! Owner assignment: pick an agent from the pool deterministically, write it to
//! the contact/deal, and read the entity back until an owner sticks.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use shared_lib::{
    config::{Agent, CrmConfig},
    utils::digits_mod,
};

use crate::{
    client::{resource_url, CrmApi, EntityRef},
    owner_record::OwnerRecord,
};

const MAX_DETAIL_CHARS: usize = 300;

/// Index of the intended owner: numeric portion of `identifier` modulo the pool size.
pub fn select_index(identifier: &str, pool_len: usize) -> Option<usize> {
    if pool_len == 0 {
        return None;
    }
    Some(digits_mod(identifier, pool_len))
}

pub fn intended_owner<'a>(identifier: &str, pool: &'a [Agent]) -> Option<&'a Agent> {
    select_index(identifier, pool.len()).and_then(|index| pool.get(index))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerCandidate {
    pub agent: Agent,
    pub rank: usize,
}

/// The pool rotated to start at the intended owner: `pool[i..] ++ pool[..i]`.
pub fn rotate(identifier: &str, pool: &[Agent]) -> Vec<OwnerCandidate> {
    let Some(start) = select_index(identifier, pool.len()) else {
        return vec![];
    };

    pool[start..]
        .iter()
        .chain(pool[..start].iter())
        .enumerate()
        .map(|(rank, agent)| OwnerCandidate {
            agent: agent.clone(),
            rank,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerField {
    Owner,
    OwnerId,
    AssignedTo,
}

impl OwnerField {
    pub fn key(&self) -> &'static str {
        match self {
            OwnerField::Owner => "owner",
            OwnerField::OwnerId => "owner_id",
            OwnerField::AssignedTo => "assigned_to",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Id,
    Url,
    Email,
}

pub type PlanStep = (OwnerField, Encoding);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    Pending,
    Attempted(usize),
    Verified(usize),
    Exhausted,
}

/// The (field, encoding) pairs to try for one candidate, walked strictly in
/// order until one verifies or none are left.
#[derive(Debug, Clone)]
pub struct AssignmentPlan {
    steps: Vec<PlanStep>,
    state: PlanState,
}

impl AssignmentPlan {
    pub fn for_agent(agent: &Agent, known_email: Option<&str>) -> Self {
        let mut steps = vec![];
        if let Agent::UserId(_) = agent {
            steps.extend([
                (OwnerField::Owner, Encoding::Url),
                (OwnerField::Owner, Encoding::Id),
                (OwnerField::OwnerId, Encoding::Id),
                (OwnerField::AssignedTo, Encoding::Url),
            ]);
        }
        let has_email = matches!(agent, Agent::Email(_)) || known_email.is_some();
        if has_email {
            steps.extend([
                (OwnerField::Owner, Encoding::Email),
                (OwnerField::AssignedTo, Encoding::Email),
            ]);
        }

        Self {
            steps,
            state: PlanState::Pending,
        }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    /// Moves to the next step; `None` once the plan is verified or exhausted.
    pub fn next_step(&mut self) -> Option<PlanStep> {
        let next = match self.state {
            PlanState::Pending => 0,
            PlanState::Attempted(index) => index + 1,
            PlanState::Verified(_) | PlanState::Exhausted => return None,
        };

        match self.steps.get(next) {
            Some(step) => {
                self.state = PlanState::Attempted(next);
                Some(*step)
            }
            None => {
                self.state = PlanState::Exhausted;
                None
            }
        }
    }

    pub fn mark_verified(&mut self) {
        if let PlanState::Attempted(index) = self.state {
            self.state = PlanState::Verified(index);
        }
    }

    pub fn winning_step(&self) -> Option<PlanStep> {
        match self.state {
            PlanState::Verified(index) => self.steps.get(index).copied(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentAttempt {
    pub candidate: String,
    pub field: OwnerField,
    pub encoding: Encoding,
    pub status: Option<u16>,
    pub detail: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WinningField {
    pub field: OwnerField,
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResult {
    pub success: bool,
    pub intended_owner: Option<String>,
    pub chosen_owner: Option<String>,
    pub owner: Option<OwnerRecord>,
    pub winning_field: Option<WinningField>,
    pub rejected_candidates: Vec<String>,
    pub attempts: Vec<AssignmentAttempt>,
}

pub struct OwnerResolver<'a> {
    crm: &'a dyn CrmApi,
    pool: &'a [Agent],
    validate_agents: bool,
    settle_delay: Duration,
    base: String,
}

impl<'a> OwnerResolver<'a> {
    pub fn new(crm: &'a dyn CrmApi, config: &'a CrmConfig) -> Self {
        Self {
            crm,
            pool: &config.agent_pool,
            validate_agents: config.validate_agents,
            settle_delay: config.verify_delay,
            base: crm.base_url(),
        }
    }

    /// Base used for user URLs, normally the one the record was created on.
    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.to_string();
        self
    }

    /// Assigns an owner to `target`, trying candidates in rotation order. Never
    /// fails: an unassigned owner is reported through `success = false`.
    pub async fn assign(&self, target: &EntityRef, identifier: &str) -> AssignmentResult {
        let mut result = AssignmentResult::default();

        let candidates = rotate(identifier, self.pool);
        let Some(intended) = candidates.first() else {
            tracing::info!("No agent pool configured, skipping owner assignment");
            return result;
        };
        result.intended_owner = Some(intended.agent.to_string());
        tracing::debug!(
            "Intended owner for {} is {} (pool of {})",
            identifier,
            intended.agent,
            self.pool.len()
        );

        for candidate in candidates {
            let known = match self.validate(&candidate.agent).await {
                Some(known) => known,
                None => {
                    tracing::warn!("Skipping invalid agent {}", candidate.agent);
                    result.rejected_candidates.push(candidate.agent.to_string());
                    continue;
                }
            };

            let mut plan = AssignmentPlan::for_agent(&candidate.agent, known.email.as_deref());
            let mut verified_owner = None;

            while let Some((field, encoding)) = plan.next_step() {
                let (attempt, read_back) = self
                    .attempt(target, &candidate.agent, &known, field, encoding)
                    .await;
                if attempt.verified {
                    plan.mark_verified();
                    verified_owner = read_back;
                }
                result.attempts.push(attempt);
            }

            if let Some((field, encoding)) = plan.winning_step() {
                let mut owner = verified_owner.unwrap_or_default();
                owner.fill(known);

                tracing::info!(
                    "Assigned owner {} to {} via {}={:?}",
                    candidate.agent,
                    target.path(),
                    field.key(),
                    encoding
                );

                result.success = true;
                result.chosen_owner = Some(candidate.agent.to_string());
                result.owner = Some(owner);
                result.winning_field = Some(WinningField { field, encoding });
                return result;
            }

            tracing::warn!(
                "No owner field verified for agent {} on {}",
                candidate.agent,
                target.path()
            );
        }

        tracing::warn!("Owner assignment failed for {}", target.path());
        result
    }

    /// What we know about an agent before writing it, or `None` when the CRM
    /// says the user does not exist.
    async fn validate(&self, agent: &Agent) -> Option<OwnerRecord> {
        let user_id = match agent {
            Agent::Email(email) => {
                return Some(OwnerRecord {
                    email: Some(email.clone()),
                    ..Default::default()
                })
            }
            Agent::UserId(id) => id,
        };

        let mut known = OwnerRecord {
            id: Some(user_id.clone()),
            ..Default::default()
        };
        if !self.validate_agents {
            return Some(known);
        }

        match self.crm.fetch_user(user_id).await {
            Ok(response) if response.is_success() => {
                known.fill(OwnerRecord::from_user(&response.body));
                Some(known)
            }
            Ok(response) => {
                tracing::debug!("User {} lookup returned {}", user_id, response.status);
                None
            }
            Err(e) => {
                tracing::warn!("User {} lookup failed: {}", user_id, e);
                None
            }
        }
    }

    async fn attempt(
        &self,
        target: &EntityRef,
        agent: &Agent,
        known: &OwnerRecord,
        field: OwnerField,
        encoding: Encoding,
    ) -> (AssignmentAttempt, Option<OwnerRecord>) {
        let mut attempt = AssignmentAttempt {
            candidate: agent.to_string(),
            field,
            encoding,
            status: None,
            detail: String::new(),
            verified: false,
        };

        let Some(value) = self.encode(agent, known, encoding) else {
            attempt.detail = "no value for this encoding".to_string();
            return (attempt, None);
        };

        let mut body = serde_json::Map::new();
        body.insert(field.key().to_string(), value);
        let response = match self.crm.update(target, &Value::Object(body)).await {
            Ok(response) => response,
            Err(e) => {
                attempt.detail = e.to_string();
                return (attempt, None);
            }
        };
        attempt.status = Some(response.status);
        if !response.is_success() {
            attempt.detail = truncate(&response.body.to_string());
            return (attempt, None);
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let read_back = match self.crm.fetch(target).await {
            Ok(response) if response.is_success() => OwnerRecord::from_entity(&response.body),
            Ok(response) => {
                attempt.detail = format!("verification read returned {}", response.status);
                return (attempt, None);
            }
            Err(e) => {
                attempt.detail = format!("verification read failed: {e}");
                return (attempt, None);
            }
        };

        let expected_id = match agent {
            Agent::UserId(id) => Some(id.as_str()),
            Agent::Email(_) => None,
        };
        if read_back.matches(expected_id, known.email.as_deref()) {
            attempt.verified = true;
            attempt.detail = "verified".to_string();
            (attempt, Some(read_back))
        } else {
            attempt.detail = truncate(&format!(
                "owner not updated, read back {}",
                json!(read_back)
            ));
            (attempt, None)
        }
    }

    fn encode(&self, agent: &Agent, known: &OwnerRecord, encoding: Encoding) -> Option<Value> {
        match (agent, encoding) {
            (Agent::UserId(id), Encoding::Id) => Some(match id.parse::<u64>() {
                Ok(n) => json!(n),
                Err(_) => json!(id),
            }),
            (Agent::UserId(id), Encoding::Url) => {
                Some(json!(resource_url(&self.base, "users", id)))
            }
            (_, Encoding::Email) => known.email.as_ref().map(|email| json!(email)),
            (Agent::Email(_), _) => None,
        }
    }
}

fn truncate(detail: &str) -> String {
    detail.chars().take(MAX_DETAIL_CHARS).collect()
}
