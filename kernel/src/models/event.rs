//! Audit event model — hash-chained per agent.
//!
//! A tagged payload enum plus helper accessors, wrapped by an immutable
//! chained envelope rather than a flat event log.

use super::ids::{AgentId, ChallengeId, EventId, ExecId, QuoteId, StepUpTokenId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The machine-grade payload carried by an [`Event`]. Each variant is a
/// stable, tagged shape, so dynamic JSON payloads never flow through
/// events untyped: each payload kind is a tagged variant with an explicit
/// canonicalization function for hashing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    PolicyDecision {
        allowed: bool,
        reason: Option<String>,
        requires_step_up: bool,
        intent: Value,
        effective_spend_power_cents: i64,
    },
    #[serde(rename = "kernel.daily_reset")]
    DailyReset {
        previous_used_cents: i64,
    },
    FreshnessOverride {
        status: String,
        updated_ago_seconds: u64,
    },
    PolicyRecheck {
        effective_spend_power_cents: i64,
    },
    StepUpRequested {
        challenge_id: ChallengeId,
        quote_id: QuoteId,
    },
    StepUpUsed {
        token_id: StepUpTokenId,
        quote_id: QuoteId,
    },
    ExecutionApplied {
        exec_id: ExecId,
        external_ref: Option<String>,
    },
    ExecutionFailed {
        exec_id: ExecId,
        reason: String,
    },
    ExecutionRejected {
        quote_id: QuoteId,
        reason: String,
    },
    QuoteExpired {
        quote_id: QuoteId,
    },
    BudgetAdjustment {
        delta_cents: i64,
        reason: String,
    },
    Transfer {
        to_agent_id: AgentId,
        amount_cents: i64,
    },
    #[serde(rename = "kernel.agent_created")]
    AgentCreated,
    AgentFrozen {
        reason: String,
    },
    AgentDead,
}

impl EventPayload {
    /// The stable `type` discriminant, matching the `#[serde(tag = "type")]`
    /// value this payload serializes to.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::PolicyDecision { .. } => "policy_decision",
            EventPayload::DailyReset { .. } => "kernel.daily_reset",
            EventPayload::FreshnessOverride { .. } => "freshness_override",
            EventPayload::PolicyRecheck { .. } => "policy_recheck",
            EventPayload::StepUpRequested { .. } => "step_up_requested",
            EventPayload::StepUpUsed { .. } => "step_up_used",
            EventPayload::ExecutionApplied { .. } => "execution_applied",
            EventPayload::ExecutionFailed { .. } => "execution_failed",
            EventPayload::ExecutionRejected { .. } => "execution_rejected",
            EventPayload::QuoteExpired { .. } => "quote_expired",
            EventPayload::BudgetAdjustment { .. } => "budget_adjustment",
            EventPayload::Transfer { .. } => "transfer",
            EventPayload::AgentCreated => "kernel.agent_created",
            EventPayload::AgentFrozen { .. } => "agent_frozen",
            EventPayload::AgentDead => "agent_dead",
        }
    }
}

/// A single hash-chained audit event.
///
/// `{event_id, agent_id, user_id, type, payload, occurred_at, created_at,
/// prev_hash, hash}`. Invariant: for successive events of an agent in
/// append order, `event.prev_hash = previous.hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub payload: EventPayload,
    pub occurred_at: u64,
    pub created_at: u64,
    pub prev_hash: Option<String>,
    pub hash: String,
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

/// Recursively sorts object keys so hashing is independent of field
/// insertion order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Deterministic canonical JSON string for a payload: sorted object keys at
/// every depth, stable across `HashMap`/iteration-order differences.
pub fn canonical_payload_json(payload: &EventPayload) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(payload)?;
    let canonical = canonicalize(value);
    serde_json::to_string(&canonical)
}

/// Computes `H(prev_hash || agent_id || user_id || type || occurred_at ||
/// canonical(payload))`.
pub fn compute_event_hash(
    prev_hash: Option<&str>,
    agent_id: &AgentId,
    user_id: &UserId,
    payload: &EventPayload,
    occurred_at: u64,
) -> Result<String, serde_json::Error> {
    let canonical_payload = canonical_payload_json(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(agent_id.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(user_id.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(payload.event_type().as_bytes());
    hasher.update(b"|");
    hasher.update(occurred_at.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(canonical_payload.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_is_stable_regardless_of_field_order() {
        let a = EventPayload::PolicyDecision {
            allowed: true,
            reason: None,
            requires_step_up: false,
            intent: serde_json::json!({"b": 1, "a": 2}),
            effective_spend_power_cents: 100,
        };
        let json = canonical_payload_json(&a).unwrap();
        // "a" must sort before "b" inside the nested intent object.
        assert!(json.find("\"a\":2").unwrap() < json.find("\"b\":1").unwrap());
    }

    #[test]
    fn same_inputs_produce_same_hash() {
        let agent_id = AgentId::new("agent_1");
        let user_id = UserId::new("user_1");
        let payload = EventPayload::AgentCreated;
        let h1 = compute_event_hash(None, &agent_id, &user_id, &payload, 100).unwrap();
        let h2 = compute_event_hash(None, &agent_id, &user_id, &payload, 100).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_prev_hash_changes_the_chain() {
        let agent_id = AgentId::new("agent_1");
        let user_id = UserId::new("user_1");
        let payload = EventPayload::AgentCreated;
        let h1 = compute_event_hash(None, &agent_id, &user_id, &payload, 100).unwrap();
        let h2 = compute_event_hash(Some("abc"), &agent_id, &user_id, &payload, 100).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let cases: Vec<EventPayload> = vec![
            EventPayload::AgentFrozen {
                reason: "manual".to_string(),
            },
            EventPayload::AgentCreated,
            EventPayload::DailyReset {
                previous_used_cents: 50,
            },
        ];
        for payload in cases {
            let value = serde_json::to_value(&payload).unwrap();
            assert_eq!(value["type"], payload.event_type());
        }
    }
}
