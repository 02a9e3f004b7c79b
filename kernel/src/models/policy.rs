//! Policy model — per-agent caps, allow/blocklists, and the step-up
//! threshold consulted by the Policy Evaluator.

use super::ids::{AgentId, PolicyId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `{policy_id, agent_id, user_id, per_intent_daily_caps, daily_spend_limit_cents,
/// allowlist, blocklist, step_up_threshold_cents}`.
///
/// Latest by `created_at` wins; prior policies remain readable for audit
/// (the store never deletes a `Policy` row, it only inserts a newer one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: PolicyId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub per_intent_daily_caps: BTreeMap<String, u32>,
    pub daily_spend_limit_cents: i64,
    pub allowlist: BTreeSet<String>,
    pub blocklist: BTreeSet<String>,
    pub step_up_threshold_cents: i64,
    pub created_at: u64,
}

impl Policy {
    pub fn default_for(agent_id: AgentId, user_id: UserId, policy_id: PolicyId, now: u64) -> Self {
        Self {
            policy_id,
            agent_id,
            user_id,
            per_intent_daily_caps: BTreeMap::new(),
            daily_spend_limit_cents: 0,
            allowlist: BTreeSet::new(),
            blocklist: BTreeSet::new(),
            step_up_threshold_cents: i64::MAX,
            created_at: now,
        }
    }

    /// Blocklist wins outright; a non-empty allowlist becomes a closed
    /// set.
    pub fn intent_permitted(&self, intent_type: &str) -> Result<(), &'static str> {
        if self.blocklist.contains(intent_type) {
            return Err("blocked_intent");
        }
        if !self.allowlist.is_empty() && !self.allowlist.contains(intent_type) {
            return Err("intent_not_allowlisted");
        }
        Ok(())
    }

    pub fn max_per_day(&self, intent_type: &str) -> Option<u32> {
        self.per_intent_daily_caps.get(intent_type).copied()
    }

    pub fn requires_step_up_for_cost(&self, base_cost_cents: i64) -> bool {
        base_cost_cents >= self.step_up_threshold_cents
    }
}
