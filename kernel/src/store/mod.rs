//! Storage contract — Audit Log, Receipt Store, and every other
//! append/read surface the kernel core touches, plus per-agent
//! serialization.
//!
//! `Store` is a trait (not a concrete SQLite type baked into every call
//! site) so [`memory::MemoryStore`] can stand in for fast unit tests while
//! [`sqlite::SqliteStore`] carries the real append-only guarantees.

pub mod memory;
pub mod sqlite;

use crate::error::StoreError;
use crate::models::{
    Agent, AgentSpendSnapshot, Budget, Event, EventPayload, Execution, ChallengeId, Policy,
    Quote, Receipt, ReceiptId, Reservation, StepUpChallenge, StepUpToken, User,
};
use crate::models::ids::{AgentId, EventId, QuoteId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Storage contract consumed by every kernel component. Every mutating
/// method is atomic with respect to the rows it touches; callers are
/// responsible for holding the per-agent lock ([`AgentLocks`]) across a
/// sequence of calls that must observe each other atomically.
pub trait Store: Send + Sync {
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>, StoreError>;
    fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, StoreError>;
    fn save_agent(&self, agent: &Agent) -> Result<(), StoreError>;

    fn get_latest_policy(&self, agent_id: &AgentId) -> Result<Option<Policy>, StoreError>;
    fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError>;

    fn get_budget(&self, agent_id: &AgentId) -> Result<Option<Budget>, StoreError>;
    fn save_budget(&self, budget: &Budget) -> Result<(), StoreError>;

    fn get_quote_by_idempotency(
        &self,
        agent_id: &AgentId,
        idempotency_key: &str,
    ) -> Result<Option<Quote>, StoreError>;
    fn get_quote(&self, quote_id: &QuoteId) -> Result<Option<Quote>, StoreError>;
    fn insert_quote(&self, quote: &Quote) -> Result<(), StoreError>;

    fn get_execution_by_quote(&self, quote_id: &QuoteId) -> Result<Option<Execution>, StoreError>;
    fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError>;
    fn update_execution(&self, execution: &Execution) -> Result<(), StoreError>;

    /// Looks up the most recent event for `agent_id`, computes the next
    /// hash, and appends. Rejects silently-impossible mutation by
    /// construction: there is no `update_event`/`delete_event` method on
    /// this trait.
    fn append_event(
        &self,
        agent_id: &AgentId,
        user_id: &UserId,
        event_id: EventId,
        payload: EventPayload,
        occurred_at: u64,
        created_at: u64,
    ) -> Result<Event, StoreError>;
    fn events_for_agent(&self, agent_id: &AgentId, since: Option<u64>) -> Result<Vec<Event>, StoreError>;
    fn latest_event(&self, agent_id: &AgentId) -> Result<Option<Event>, StoreError>;

    fn append_receipt(&self, receipt: Receipt) -> Result<Receipt, StoreError>;
    fn receipts_for_agent(&self, agent_id: &AgentId, since: Option<u64>) -> Result<Vec<Receipt>, StoreError>;
    fn get_receipt(&self, agent_id: &AgentId, receipt_id: &ReceiptId) -> Result<Option<Receipt>, StoreError>;

    fn insert_challenge(&self, challenge: &StepUpChallenge) -> Result<(), StoreError>;
    fn get_pending_challenge(
        &self,
        agent_id: &AgentId,
        quote_id: &QuoteId,
    ) -> Result<Option<StepUpChallenge>, StoreError>;
    fn get_challenge(&self, id: &ChallengeId) -> Result<Option<StepUpChallenge>, StoreError>;
    fn update_challenge(&self, challenge: &StepUpChallenge) -> Result<(), StoreError>;

    fn insert_token(&self, token: &StepUpToken) -> Result<(), StoreError>;
    fn get_token_by_hash(&self, token_hash: &str) -> Result<Option<StepUpToken>, StoreError>;
    fn update_token(&self, token: &StepUpToken) -> Result<(), StoreError>;

    fn insert_reservation(&self, reservation: &Reservation) -> Result<(), StoreError>;
    fn update_reservation(&self, reservation: &Reservation) -> Result<(), StoreError>;
    fn reservations_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Reservation>, StoreError>;

    fn get_snapshot(&self, agent_id: &AgentId) -> Result<Option<AgentSpendSnapshot>, StoreError>;
    fn save_snapshot(&self, snapshot: &AgentSpendSnapshot) -> Result<(), StoreError>;

    /// Number of `applied` executions today whose quote's normalized
    /// intent type matches `intent_type`.
    fn applied_count_today(
        &self,
        agent_id: &AgentId,
        intent_type: &str,
        day_start: u64,
    ) -> Result<u32, StoreError>;
}

/// Process-wide `agent_id → mutex` table serializing every write path for
/// an agent, keyed on `AgentId` instead of a database path.
#[derive(Debug, Default)]
pub struct AgentLocks {
    locks: Mutex<HashMap<AgentId, Arc<Mutex<()>>>>,
}

impl AgentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the mutex guarding `agent_id`'s write path, creating one on
    /// first use. Callers lock the returned `Arc<Mutex<()>>` for the
    /// duration of a quote/execute critical section.
    pub fn lock_for(&self, agent_id: &AgentId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("agent lock table poisoned");
        locks
            .entry(agent_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
