//! Agent model.
//!
//! An agent is a bounded actor whose every externally-visible action passes
//! through the kernel. Agents are sovereign: no entity may read or mutate
//! another user's agent state.

use super::ids::{AgentId, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Frozen,
    Dead,
}

impl AgentStatus {
    /// The stable reason string used when a non-active agent is rejected
    /// at the policy boundary, e.g. `agent_frozen`.
    pub fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            AgentStatus::Active => None,
            AgentStatus::Frozen => Some("agent_frozen"),
            AgentStatus::Dead => Some("agent_dead"),
        }
    }
}

/// Represents a single agent in the kernel.
///
/// # Example
/// ```
/// use agent_kernel_core::models::agent::{Agent, AgentStatus};
/// use agent_kernel_core::models::ids::{AgentId, UserId};
///
/// let agent = Agent::new(AgentId::new("agent_1"), UserId::new("user_1"), 1_700_000_000);
/// assert_eq!(agent.status, AgentStatus::Active);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub status: AgentStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Agent {
    pub fn new(agent_id: AgentId, user_id: UserId, now: u64) -> Self {
        Self {
            agent_id,
            user_id,
            status: AgentStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }

    pub fn freeze(&mut self, now: u64) {
        self.status = AgentStatus::Frozen;
        self.updated_at = now;
    }

    pub fn mark_dead(&mut self, now: u64) {
        self.status = AgentStatus::Dead;
        self.updated_at = now;
    }
}
