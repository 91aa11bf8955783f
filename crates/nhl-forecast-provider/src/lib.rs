#![forbid(unsafe_code)]
//! Agent Invocation Service boundary.
//!
//! An invocation sends a free-text instruction to one of the three
//! forecasting agents and yields `{success, response: {result}, error}`.
//! `Err` from [`AgentInvoker::invoke`] means the call never produced a
//! response (transport failure); agent-side failures are `success: false`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use nhl_forecast_core::{lenient, sample};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use ulid::Ulid;

pub const DEFAULT_PROJECTION_AGENT_ID: &str = "69a32c744b95c3d826d18d64";
pub const DEFAULT_RESULTS_AGENT_ID: &str = "69a32c74931679f19b7d6d3d";
pub const DEFAULT_PATTERN_AGENT_ID: &str = "69a32c757452fc0731a6395a";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub trait AgentInvoker {
    fn invoker_name(&self) -> &'static str;

    #[allow(clippy::missing_errors_doc)]
    fn invoke(&self, instruction: &str, agent_id: &str) -> Result<AgentInvocation>;
}

/// The three fixed agent identifiers, one per pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AgentRoster {
    pub projection: String,
    pub results: String,
    pub patterns: String,
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self {
            projection: DEFAULT_PROJECTION_AGENT_ID.to_string(),
            results: DEFAULT_RESULTS_AGENT_ID.to_string(),
            patterns: DEFAULT_PATTERN_AGENT_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentPayload {
    #[serde(default)]
    pub result: Value,
}

/// Transport-level response envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient::opt_record", skip_serializing_if = "Option::is_none")]
    pub response: Option<AgentPayload>,
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    #[must_use]
    pub fn succeeded(result: Value) -> Self {
        Self {
            success: true,
            response: Some(AgentPayload { result }),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }

    /// Decodes a response body. A body that is not an envelope at all is a
    /// failed response without a reason.
    #[must_use]
    pub fn from_body(body: &Value) -> Self {
        match body {
            Value::Object(_) => lenient::decode(body),
            Value::String(_) => lenient::decode(&lenient::decode_payload(body)),
            _ => Self::default(),
        }
    }

    /// `response.result`, or `Null` when absent.
    #[must_use]
    pub fn result(&self) -> Value {
        self.response
            .as_ref()
            .map_or(Value::Null, |payload| payload.result.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationRecord {
    pub call_id: Ulid,
    pub invoker_name: String,
    pub agent_id: String,
    pub request_hash: String,
    pub response_hash: String,
    pub latency_ms: Option<u64>,
    pub status: String,
    pub error_text: Option<String>,
    pub started_at: OffsetDateTime,
    pub ended_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentInvocation {
    pub record: InvocationRecord,
    pub response: AgentResponse,
}

/// SHA-256 hex digest of the compact JSON encoding.
///
/// # Errors
/// Returns an error when `value` cannot be serialized.
pub fn hash_json(value: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[must_use]
pub fn request_json(instruction: &str, agent_id: &str) -> Value {
    json!({
        "message": instruction,
        "agent_id": agent_id,
    })
}

fn build_invocation(
    invoker_name: &str,
    request: &Value,
    response: AgentResponse,
    started_at: OffsetDateTime,
    latency_ms: Option<u64>,
) -> Result<AgentInvocation> {
    let agent_id = request
        .get("agent_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let response_json = serde_json::to_value(&response)?;
    let record = InvocationRecord {
        call_id: Ulid::new(),
        invoker_name: invoker_name.to_string(),
        agent_id,
        request_hash: hash_json(request)?,
        response_hash: hash_json(&response_json)?,
        latency_ms,
        status: if response.success { "succeeded" } else { "failed" }.to_string(),
        error_text: response.error.clone(),
        started_at,
        ended_at: OffsetDateTime::now_utc(),
    };
    tracing::info!(
        call_id = %record.call_id,
        agent_id = %record.agent_id,
        request_hash = %record.request_hash,
        latency_ms = ?record.latency_ms,
        status = %record.status,
        "agent call completed"
    );
    Ok(AgentInvocation { record, response })
}

fn elapsed_ms(started_at: OffsetDateTime) -> Option<u64> {
    let millis = (OffsetDateTime::now_utc() - started_at).whole_milliseconds();
    if millis <= 0 {
        Some(0)
    } else {
        u64::try_from(millis).ok()
    }
}

/// Endpoint settings for [`HttpAgentInvoker`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HttpAgentConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub headers: BTreeMap<String, String>,
    /// Name of the environment variable holding a bearer token.
    pub auth_bearer_env: Option<String>,
}

impl Default for HttpAgentConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            headers: BTreeMap::new(),
            auth_bearer_env: None,
        }
    }
}

/// POSTs `{"message", "agent_id"}` as JSON to the configured endpoint.
#[derive(Debug, Clone)]
pub struct HttpAgentInvoker {
    config: HttpAgentConfig,
    auth_bearer_token: Option<String>,
    agent: ureq::Agent,
}

impl HttpAgentInvoker {
    /// # Errors
    /// Returns an error when the URL is empty or the bearer token env var is
    /// missing.
    pub fn new(config: HttpAgentConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("http agent invoker requires endpoint.url"));
        }

        let auth_bearer_token = match &config.auth_bearer_env {
            Some(env_name) => Some(std::env::var(env_name).map_err(|_| {
                anyhow!("missing env var '{env_name}' required by endpoint.auth_bearer_env")
            })?),
            None => None,
        };

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();

        Ok(Self {
            config,
            auth_bearer_token,
            agent,
        })
    }
}

impl AgentInvoker for HttpAgentInvoker {
    fn invoker_name(&self) -> &'static str {
        "http_json"
    }

    fn invoke(&self, instruction: &str, agent_id: &str) -> Result<AgentInvocation> {
        let started_at = OffsetDateTime::now_utc();
        let request = request_json(instruction, agent_id);
        tracing::debug!(agent_id, url = %self.config.url, "dispatching agent call");

        let mut req = self
            .agent
            .request("POST", &self.config.url)
            .set("content-type", "application/json");
        for (header, value) in &self.config.headers {
            req = req.set(header, value);
        }
        if let Some(token) = &self.auth_bearer_token {
            req = req.set("authorization", &format!("Bearer {token}"));
        }

        let response = match req.send_json(&request) {
            Ok(response) => {
                let body: Value = response.into_json()?;
                AgentResponse::from_body(&body)
            }
            Err(ureq::Error::Status(code, _)) => AgentResponse::failed(format!("http status {code}")),
            Err(ureq::Error::Transport(err)) => {
                tracing::warn!(agent_id, error = %err, "agent transport failure");
                return Err(anyhow!("http transport failure: {err}"));
            }
        };

        build_invocation(
            self.invoker_name(),
            &request,
            response,
            started_at,
            elapsed_ms(started_at),
        )
    }
}

/// Deterministic invoker answering each rostered agent with the demo
/// dataset. Payloads are returned as JSON strings.
#[derive(Debug, Clone, Default)]
pub struct MockAgentInvoker {
    roster: AgentRoster,
}

impl MockAgentInvoker {
    #[must_use]
    pub fn new(roster: AgentRoster) -> Self {
        Self { roster }
    }
}

impl AgentInvoker for MockAgentInvoker {
    fn invoker_name(&self) -> &'static str {
        "mock"
    }

    fn invoke(&self, instruction: &str, agent_id: &str) -> Result<AgentInvocation> {
        let started_at = OffsetDateTime::now_utc();
        let request = request_json(instruction, agent_id);

        let payload = if agent_id == self.roster.projection {
            Some(sample::projections_payload())
        } else if agent_id == self.roster.results {
            Some(sample::results_payload())
        } else if agent_id == self.roster.patterns {
            Some(sample::patterns_payload())
        } else {
            None
        };
        let response = match payload {
            Some(payload) => AgentResponse::succeeded(Value::String(payload.to_string())),
            None => AgentResponse::failed(format!("unknown agent {agent_id}")),
        };

        let instruction_len = u64::try_from(instruction.len()).unwrap_or(u64::MAX);
        build_invocation(
            self.invoker_name(),
            &request,
            response,
            started_at,
            Some(5 + (instruction_len % 17)),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    Respond(AgentResponse),
    /// Simulates a transport failure.
    Fail(String),
}

/// Replays queued outcomes in order and records every call. An exhausted
/// queue answers with a transport failure.
#[derive(Debug, Default)]
pub struct ScriptedAgentInvoker {
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedAgentInvoker {
    #[must_use]
    pub fn new(outcomes: impl IntoIterator<Item = ScriptedOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: ScriptedOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// `(agent_id, instruction)` pairs in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AgentInvoker for ScriptedAgentInvoker {
    fn invoker_name(&self) -> &'static str {
        "scripted"
    }

    fn invoke(&self, instruction: &str, agent_id: &str) -> Result<AgentInvocation> {
        let started_at = OffsetDateTime::now_utc();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((agent_id.to_string(), instruction.to_string()));

        let next = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(ScriptedOutcome::Respond(response)) => build_invocation(
                self.invoker_name(),
                &request_json(instruction, agent_id),
                response,
                started_at,
                Some(0),
            ),
            Some(ScriptedOutcome::Fail(reason)) => Err(anyhow!(reason)),
            None => Err(anyhow!("scripted invoker has no queued outcome")),
        }
    }
}
