//! User model — the principal owning one or more agents.

use super::ids::UserId;
use serde::{Deserialize, Serialize};

/// Created lazily on first key or agent mint; carries no state beyond
/// identity and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub created_at: u64,
}

impl User {
    pub fn new(user_id: UserId, now: u64) -> Self {
        Self {
            user_id,
            created_at: now,
        }
    }
}
