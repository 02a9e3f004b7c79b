//! Agent Spend Snapshot — the sole source of truth for "what the agent may
//! spend right now". Always rederivable, never itself the source of truth.

use super::ids::AgentId;
use serde::{Deserialize, Serialize};

/// `{agent_id, confirmed_balance_cents, reserved_outgoing_cents,
/// reserved_holds_cents, policy_spendable_cents, effective_spend_power_cents,
/// updated_at}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSpendSnapshot {
    pub agent_id: AgentId,
    pub confirmed_balance_cents: i64,
    pub reserved_outgoing_cents: i64,
    pub reserved_holds_cents: i64,
    pub policy_spendable_cents: i64,
    pub effective_spend_power_cents: i64,
    pub updated_at: u64,
}

/// Raw inputs to [`AgentSpendSnapshot::compute`]. Kept separate from the
/// persisted snapshot row so the refresh is a pure computation over
/// explicit inputs rather than reaching into hidden global state.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotInputs {
    pub confirmed_balance_cents: i64,
    pub reserved_outgoing_cents: i64,
    pub reserved_holds_cents: i64,
    pub policy_spendable_cents: i64,
    pub buffer_cents: i64,
}

impl AgentSpendSnapshot {
    /// `effective_spend_power = min(policy_spendable, confirmed -
    /// reserved_outgoing - reserved_holds - buffer)`, clamped at zero.
    pub fn compute(agent_id: AgentId, inputs: SnapshotInputs, now: u64) -> Self {
        let headroom = inputs.confirmed_balance_cents
            - inputs.reserved_outgoing_cents
            - inputs.reserved_holds_cents
            - inputs.buffer_cents;
        let effective = inputs.policy_spendable_cents.min(headroom).max(0);
        Self {
            agent_id,
            confirmed_balance_cents: inputs.confirmed_balance_cents,
            reserved_outgoing_cents: inputs.reserved_outgoing_cents,
            reserved_holds_cents: inputs.reserved_holds_cents,
            policy_spendable_cents: inputs.policy_spendable_cents,
            effective_spend_power_cents: effective,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_spend_power_is_clamped_at_zero() {
        let snapshot = AgentSpendSnapshot::compute(
            AgentId::new("agent_1"),
            SnapshotInputs {
                confirmed_balance_cents: 100,
                reserved_outgoing_cents: 50,
                reserved_holds_cents: 60,
                policy_spendable_cents: 1_000,
                buffer_cents: 0,
            },
            100,
        );
        assert_eq!(snapshot.effective_spend_power_cents, 0);
    }

    #[test]
    fn effective_spend_power_is_min_of_policy_and_headroom() {
        let snapshot = AgentSpendSnapshot::compute(
            AgentId::new("agent_1"),
            SnapshotInputs {
                confirmed_balance_cents: 2_000_000,
                reserved_outgoing_cents: 0,
                reserved_holds_cents: 0,
                policy_spendable_cents: 200,
                buffer_cents: 0,
            },
            100,
        );
        assert_eq!(snapshot.effective_spend_power_cents, 200);
    }

    #[test]
    fn buffer_reduces_headroom() {
        let snapshot = AgentSpendSnapshot::compute(
            AgentId::new("agent_1"),
            SnapshotInputs {
                confirmed_balance_cents: 1_000,
                reserved_outgoing_cents: 0,
                reserved_holds_cents: 0,
                policy_spendable_cents: 1_000,
                buffer_cents: 100,
            },
            100,
        );
        assert_eq!(snapshot.effective_spend_power_cents, 900);
    }
}
