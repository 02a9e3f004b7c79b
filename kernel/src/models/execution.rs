//! Execution model — at most one row per quote.

use super::ids::{AgentId, ExecId, QuoteId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Applied,
    Failed,
}

/// `{exec_id, quote_id, user_id, agent_id, status, external_ref, created_at,
/// updated_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub exec_id: ExecId,
    pub quote_id: QuoteId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub status: ExecutionStatus,
    pub external_ref: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Execution {
    pub fn queued(
        exec_id: ExecId,
        quote_id: QuoteId,
        user_id: UserId,
        agent_id: AgentId,
        now: u64,
    ) -> Self {
        Self {
            exec_id,
            quote_id,
            user_id,
            agent_id,
            status: ExecutionStatus::Queued,
            external_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn finish(&mut self, status: ExecutionStatus, external_ref: Option<String>, now: u64) {
        self.status = status;
        self.external_ref = external_ref;
        self.updated_at = now;
    }
}

/// Outcome returned to the caller from [`crate::execute_engine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteOutcome {
    Applied {
        exec_id: ExecId,
        external_ref: Option<String>,
    },
    Failed {
        exec_id: ExecId,
        reason: String,
    },
    Rejected {
        reason: String,
    },
    Idempotent {
        exec_id: ExecId,
        external_ref: Option<String>,
    },
}
