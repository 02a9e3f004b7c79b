//! In-memory `Store` fake.
//!
//! Grounded in the retrieval pack's `InMemoryQuoteRepository` family
//! (`quotey/crates/db/src/repositories/memory.rs`): every table is a
//! `RwLock`-guarded `HashMap`/`Vec`, cloned out on read. Used for unit and
//! scenario tests where re-verifying SQLite's trigger-level append-only
//! guarantee on every run would be wasted I/O; the guarantee itself is
//! exercised once, directly, against [`super::sqlite::SqliteStore`].

use super::Store;
use crate::error::StoreError;
use crate::models::event::compute_event_hash;
use crate::models::ids::{AgentId, ChallengeId, EventId, QuoteId, UserId};
use crate::models::{
    Agent, AgentSpendSnapshot, Budget, Event, EventPayload, Execution, Policy, Quote, Receipt,
    ReceiptId, Reservation, StepUpChallenge, StepUpToken, User,
};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    agents: RwLock<HashMap<AgentId, Agent>>,
    policies: RwLock<HashMap<AgentId, Vec<Policy>>>,
    budgets: RwLock<HashMap<AgentId, Budget>>,
    quotes: RwLock<HashMap<QuoteId, Quote>>,
    executions: RwLock<HashMap<QuoteId, Execution>>,
    events: RwLock<HashMap<AgentId, Vec<Event>>>,
    receipts: RwLock<HashMap<AgentId, Vec<Receipt>>>,
    challenges: RwLock<HashMap<ChallengeId, StepUpChallenge>>,
    tokens: RwLock<HashMap<String, StepUpToken>>,
    reservations: RwLock<HashMap<AgentId, Vec<Reservation>>>,
    snapshots: RwLock<HashMap<AgentId, AgentSpendSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().unwrap().get(user_id).cloned())
    }

    fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.users
            .write()
            .unwrap()
            .insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.read().unwrap().get(agent_id).cloned())
    }

    fn save_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        self.agents
            .write()
            .unwrap()
            .insert(agent.agent_id.clone(), agent.clone());
        Ok(())
    }

    fn get_latest_policy(&self, agent_id: &AgentId) -> Result<Option<Policy>, StoreError> {
        Ok(self
            .policies
            .read()
            .unwrap()
            .get(agent_id)
            .and_then(|ps| ps.iter().max_by_key(|p| p.created_at).cloned()))
    }

    fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.policies
            .write()
            .unwrap()
            .entry(policy.agent_id.clone())
            .or_default()
            .push(policy.clone());
        Ok(())
    }

    fn get_budget(&self, agent_id: &AgentId) -> Result<Option<Budget>, StoreError> {
        Ok(self.budgets.read().unwrap().get(agent_id).cloned())
    }

    fn save_budget(&self, budget: &Budget) -> Result<(), StoreError> {
        self.budgets
            .write()
            .unwrap()
            .insert(budget.agent_id.clone(), budget.clone());
        Ok(())
    }

    fn get_quote_by_idempotency(
        &self,
        agent_id: &AgentId,
        idempotency_key: &str,
    ) -> Result<Option<Quote>, StoreError> {
        Ok(self
            .quotes
            .read()
            .unwrap()
            .values()
            .find(|q| &q.agent_id == agent_id && q.idempotency_key == idempotency_key)
            .cloned())
    }

    fn get_quote(&self, quote_id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        Ok(self.quotes.read().unwrap().get(quote_id).cloned())
    }

    fn insert_quote(&self, quote: &Quote) -> Result<(), StoreError> {
        self.quotes
            .write()
            .unwrap()
            .insert(quote.quote_id.clone(), quote.clone());
        Ok(())
    }

    fn get_execution_by_quote(&self, quote_id: &QuoteId) -> Result<Option<Execution>, StoreError> {
        Ok(self.executions.read().unwrap().get(quote_id).cloned())
    }

    fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        self.executions
            .write()
            .unwrap()
            .insert(execution.quote_id.clone(), execution.clone());
        Ok(())
    }

    fn update_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        self.executions
            .write()
            .unwrap()
            .insert(execution.quote_id.clone(), execution.clone());
        Ok(())
    }

    fn append_event(
        &self,
        agent_id: &AgentId,
        user_id: &UserId,
        event_id: EventId,
        payload: EventPayload,
        occurred_at: u64,
        created_at: u64,
    ) -> Result<Event, StoreError> {
        let mut events = self.events.write().unwrap();
        let chain = events.entry(agent_id.clone()).or_default();
        let prev_hash = chain.last().map(|e| e.hash.clone());
        let hash = compute_event_hash(prev_hash.as_deref(), agent_id, user_id, &payload, occurred_at)?;
        let event = Event {
            event_id,
            agent_id: agent_id.clone(),
            user_id: user_id.clone(),
            payload,
            occurred_at,
            created_at,
            prev_hash,
            hash,
        };
        chain.push(event.clone());
        Ok(event)
    }

    fn events_for_agent(&self, agent_id: &AgentId, since: Option<u64>) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read().unwrap();
        Ok(events
            .get(agent_id)
            .map(|chain| {
                chain
                    .iter()
                    .filter(|e| since.map(|s| e.occurred_at >= s).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn latest_event(&self, agent_id: &AgentId) -> Result<Option<Event>, StoreError> {
        Ok(self
            .events
            .read()
            .unwrap()
            .get(agent_id)
            .and_then(|chain| chain.last().cloned()))
    }

    fn append_receipt(&self, receipt: Receipt) -> Result<Receipt, StoreError> {
        self.receipts
            .write()
            .unwrap()
            .entry(receipt.agent_id.clone())
            .or_default()
            .push(receipt.clone());
        Ok(receipt)
    }

    fn receipts_for_agent(&self, agent_id: &AgentId, since: Option<u64>) -> Result<Vec<Receipt>, StoreError> {
        let receipts = self.receipts.read().unwrap();
        Ok(receipts
            .get(agent_id)
            .map(|rs| {
                rs.iter()
                    .filter(|r| since.map(|s| r.occurred_at >= s).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_receipt(&self, agent_id: &AgentId, receipt_id: &ReceiptId) -> Result<Option<Receipt>, StoreError> {
        Ok(self
            .receipts
            .read()
            .unwrap()
            .get(agent_id)
            .and_then(|rs| rs.iter().find(|r| &r.receipt_id == receipt_id).cloned()))
    }

    fn insert_challenge(&self, challenge: &StepUpChallenge) -> Result<(), StoreError> {
        self.challenges
            .write()
            .unwrap()
            .insert(challenge.id.clone(), challenge.clone());
        Ok(())
    }

    fn get_pending_challenge(
        &self,
        agent_id: &AgentId,
        quote_id: &QuoteId,
    ) -> Result<Option<StepUpChallenge>, StoreError> {
        Ok(self
            .challenges
            .read()
            .unwrap()
            .values()
            .find(|c| &c.agent_id == agent_id && &c.quote_id == quote_id)
            .cloned())
    }

    fn get_challenge(&self, id: &ChallengeId) -> Result<Option<StepUpChallenge>, StoreError> {
        Ok(self.challenges.read().unwrap().get(id).cloned())
    }

    fn update_challenge(&self, challenge: &StepUpChallenge) -> Result<(), StoreError> {
        self.challenges
            .write()
            .unwrap()
            .insert(challenge.id.clone(), challenge.clone());
        Ok(())
    }

    fn insert_token(&self, token: &StepUpToken) -> Result<(), StoreError> {
        self.tokens
            .write()
            .unwrap()
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    fn get_token_by_hash(&self, token_hash: &str) -> Result<Option<StepUpToken>, StoreError> {
        Ok(self.tokens.read().unwrap().get(token_hash).cloned())
    }

    fn update_token(&self, token: &StepUpToken) -> Result<(), StoreError> {
        self.tokens
            .write()
            .unwrap()
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    fn insert_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        self.reservations
            .write()
            .unwrap()
            .entry(reservation.agent_id.clone())
            .or_default()
            .push(reservation.clone());
        Ok(())
    }

    fn update_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut reservations = self.reservations.write().unwrap();
        if let Some(list) = reservations.get_mut(&reservation.agent_id) {
            if let Some(existing) = list
                .iter_mut()
                .find(|r| r.reservation_id == reservation.reservation_id)
            {
                *existing = reservation.clone();
            }
        }
        Ok(())
    }

    fn reservations_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self
            .reservations
            .read()
            .unwrap()
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_snapshot(&self, agent_id: &AgentId) -> Result<Option<AgentSpendSnapshot>, StoreError> {
        Ok(self.snapshots.read().unwrap().get(agent_id).cloned())
    }

    fn save_snapshot(&self, snapshot: &AgentSpendSnapshot) -> Result<(), StoreError> {
        self.snapshots
            .write()
            .unwrap()
            .insert(snapshot.agent_id.clone(), snapshot.clone());
        Ok(())
    }

    fn applied_count_today(
        &self,
        agent_id: &AgentId,
        intent_type: &str,
        day_start: u64,
    ) -> Result<u32, StoreError> {
        let executions = self.executions.read().unwrap();
        let quotes = self.quotes.read().unwrap();
        let count = executions
            .values()
            .filter(|exec| {
                &exec.agent_id == agent_id
                    && exec.status == crate::models::ExecutionStatus::Applied
                    && exec.updated_at >= day_start
            })
            .filter(|exec| {
                quotes
                    .get(&exec.quote_id)
                    .and_then(|q| q.intent_json.get("type"))
                    .and_then(|t| t.as_str())
                    .map(|t| t == intent_type)
                    .unwrap_or(false)
            })
            .count();
        Ok(count as u32)
    }
}
