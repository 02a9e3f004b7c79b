//! Step-up challenge and token models.

use super::ids::{AgentId, ChallengeId, QuoteId, StepUpTokenId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// `{id, user_id, agent_id, quote_id, status, code_hash, created_at,
/// expires_at, approved_at?}`. The raw code is never stored; only
/// `code_hash` persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepUpChallenge {
    pub id: ChallengeId,
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub quote_id: QuoteId,
    pub status: ChallengeStatus,
    pub code_hash: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub approved_at: Option<u64>,
}

impl StepUpChallenge {
    /// A challenge is usable (returnable verbatim from a fresh `request`)
    /// only while `pending` and unexpired.
    pub fn is_live(&self, now: u64) -> bool {
        self.status == ChallengeStatus::Pending && now <= self.expires_at
    }
}

/// `{id, challenge_id, token_hash, created_at, expires_at}`. Binds back to
/// exactly one approved challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepUpToken {
    pub id: StepUpTokenId,
    pub challenge_id: ChallengeId,
    pub token_hash: String,
    pub created_at: u64,
    pub expires_at: u64,
    pub revoked: bool,
}

impl StepUpToken {
    pub fn is_live(&self, now: u64) -> bool {
        !self.revoked && now <= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(status: ChallengeStatus, expires_at: u64) -> StepUpChallenge {
        StepUpChallenge {
            id: ChallengeId::new("challenge_1"),
            user_id: UserId::new("user_1"),
            agent_id: AgentId::new("agent_1"),
            quote_id: QuoteId::new("quote_1"),
            status,
            code_hash: "deadbeef".to_string(),
            created_at: 0,
            expires_at,
            approved_at: None,
        }
    }

    #[test]
    fn pending_and_unexpired_is_live() {
        assert!(challenge(ChallengeStatus::Pending, 300).is_live(100));
    }

    #[test]
    fn expired_pending_is_not_live() {
        assert!(!challenge(ChallengeStatus::Pending, 300).is_live(301));
    }

    #[test]
    fn approved_challenge_is_not_live_for_request() {
        assert!(!challenge(ChallengeStatus::Approved, 300).is_live(100));
    }

    #[test]
    fn token_revocation_overrides_ttl() {
        let mut token = StepUpToken {
            id: StepUpTokenId::new("tok_1"),
            challenge_id: ChallengeId::new("challenge_1"),
            token_hash: "abc".to_string(),
            created_at: 0,
            expires_at: 300,
            revoked: false,
        };
        assert!(token.is_live(100));
        token.revoked = true;
        assert!(!token.is_live(100));
    }
}
