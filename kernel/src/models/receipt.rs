//! Receipt model — the human-grade audit artifact grounded in a causal
//! event or external reference.

use super::ids::{AgentId, EventId, ReceiptId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptSource {
    Policy,
    Execution,
    Env,
    Repair,
}

/// `{receipt_id, agent_id, user_id, source, event_id?, external_ref?,
/// what_happened, why_changed, what_happens_next, occurred_at, created_at}`.
/// Append-only; corrections appear as additional receipts, never rewrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: ReceiptId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub source: ReceiptSource,
    pub event_id: Option<EventId>,
    pub external_ref: Option<String>,
    pub what_happened: String,
    pub why_changed: String,
    pub what_happens_next: String,
    pub occurred_at: u64,
    pub created_at: u64,
}

impl Receipt {
    /// Every receipt must ground in either a causal event or an external
    /// reference.
    pub fn is_grounded(&self) -> bool {
        self.event_id.is_some() || self.external_ref.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(event_id: Option<EventId>, external_ref: Option<&str>) -> Receipt {
        Receipt {
            receipt_id: ReceiptId::new("receipt_1"),
            agent_id: AgentId::new("agent_1"),
            user_id: UserId::new("user_1"),
            source: ReceiptSource::Policy,
            event_id,
            external_ref: external_ref.map(str::to_string),
            what_happened: "quoted".to_string(),
            why_changed: "policy allowed".to_string(),
            what_happens_next: "caller may execute".to_string(),
            occurred_at: 0,
            created_at: 0,
        }
    }

    #[test]
    fn ungrounded_receipt_fails_the_invariant_check() {
        assert!(!base(None, None).is_grounded());
    }

    #[test]
    fn event_or_external_ref_alone_is_sufficient() {
        assert!(base(Some(EventId::new("event_1")), None).is_grounded());
        assert!(base(None, Some("quote_1")).is_grounded());
    }
}
