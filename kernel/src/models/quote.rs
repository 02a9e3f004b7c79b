//! Quote model — an idempotent, expiring decision record.

use super::ids::{AgentId, QuoteId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Quote time-to-live in seconds.
pub const QUOTE_TTL_SECONDS: u64 = 300;

/// `{quote_id, user_id, agent_id, intent_json, allowed, requires_step_up,
/// reason, expires_at, idempotency_key, created_at}`. Unique on `(agent_id,
/// idempotency_key)`; immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: QuoteId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub intent_json: Value,
    pub allowed: bool,
    pub requires_step_up: bool,
    pub reason: Option<String>,
    pub expires_at: u64,
    pub idempotency_key: String,
    pub created_at: u64,
    /// Base cost estimated for this intent at quote time, reused verbatim
    /// at execute so the charged amount matches what was quoted.
    pub base_cost_cents: i64,
    pub transfer_amount_cents: i64,
}

impl Quote {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(expires_at: u64) -> Quote {
        Quote {
            quote_id: QuoteId::new("quote_1"),
            user_id: UserId::new("user_1"),
            agent_id: AgentId::new("agent_1"),
            intent_json: serde_json::json!({"type": "request_job"}),
            allowed: true,
            requires_step_up: false,
            reason: None,
            expires_at,
            idempotency_key: "idem-1".to_string(),
            created_at: 0,
            base_cost_cents: 50,
            transfer_amount_cents: 0,
        }
    }

    #[test]
    fn expiry_is_strictly_after_expires_at() {
        let q = quote(300);
        assert!(!q.is_expired(300));
        assert!(q.is_expired(301));
    }
}
