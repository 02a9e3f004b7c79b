//! Kernel facade — the single entry point every caller (CLI, future RPC
//! surface) drives. Owns the capabilities every other module is handed
//! explicitly (`Store`, `Clock`, `DriverRegistry`, `KernelConfig`,
//! `AgentLocks`) and forwards each public operation to the module that
//! implements it: a thin struct that owns shared state and dispatches to
//! focused engines rather than implementing policy itself.

use crate::clock::Clock;
use crate::config::KernelConfig;
use crate::driver::DriverRegistry;
use crate::error::KernelError;
use crate::execute_engine::{self, ExecuteRequest};
use crate::lifecycle;
use crate::models::ids::{AgentId, ChallengeId, QuoteId, ReceiptId, UserId};
use crate::models::{Agent, ExecuteOutcome, Quote, Receipt};
use crate::quote_engine::{self, QuoteRequest};
use crate::replay::{self, ReplayError};
use crate::step_up_machine::{self, StepUpRequested};
use crate::store::{AgentLocks, Store};
use crate::timeline::{self, AgentState, TimelineEntry};

/// Owns every capability the kernel's operations need and exposes them as
/// one cohesive API.
pub struct Kernel {
    store: Box<dyn Store>,
    clock: Box<dyn Clock>,
    drivers: DriverRegistry,
    config: KernelConfig,
    locks: AgentLocks,
}

impl Kernel {
    pub fn new(store: Box<dyn Store>, clock: Box<dyn Clock>, drivers: DriverRegistry, config: KernelConfig) -> Self {
        Self {
            store,
            clock,
            drivers,
            config,
            locks: AgentLocks::new(),
        }
    }

    pub fn create_agent(&self, user_id: UserId, agent_id: AgentId) -> Result<Agent, KernelError> {
        lifecycle::create_agent(self.store.as_ref(), self.clock.as_ref(), &self.config, user_id, agent_id)
    }

    pub fn freeze(&self, agent_id: &AgentId, reason: &str) -> Result<(), KernelError> {
        lifecycle::freeze(self.store.as_ref(), self.clock.as_ref(), agent_id, reason)
    }

    pub fn revoke_token(&self, token_hash_lookup: &str) -> Result<(), KernelError> {
        lifecycle::revoke_token(self.store.as_ref(), token_hash_lookup)
    }

    /// `can_do`: quotes an intent without committing it.
    pub fn can_do(&self, request: QuoteRequest) -> Result<Quote, KernelError> {
        quote_engine::quote(self.store.as_ref(), self.clock.as_ref(), &self.drivers, &self.config, &self.locks, request)
    }

    pub fn request_step_up(&self, user_id: &UserId, agent_id: &AgentId, quote_id: &QuoteId) -> Result<StepUpRequested, KernelError> {
        step_up_machine::request(self.store.as_ref(), self.clock.as_ref(), &self.config, user_id, agent_id, quote_id)
    }

    pub fn confirm_step_up(&self, challenge_id: &ChallengeId, code: &str, approve: bool) -> Result<Option<String>, KernelError> {
        step_up_machine::confirm(self.store.as_ref(), self.clock.as_ref(), &self.config, challenge_id, code, approve)
    }

    /// `execute`: re-checks and commits a live quote.
    pub fn execute(&self, request: ExecuteRequest) -> Result<ExecuteOutcome, KernelError> {
        execute_engine::execute(self.store.as_ref(), self.clock.as_ref(), &self.drivers, &self.config, &self.locks, request)
    }

    pub fn get_state(&self, agent_id: &AgentId) -> Result<AgentState, KernelError> {
        timeline::get_state(self.store.as_ref(), agent_id)
    }

    pub fn get_receipts(&self, agent_id: &AgentId, since: Option<u64>) -> Result<Vec<Receipt>, KernelError> {
        timeline::get_receipts(self.store.as_ref(), agent_id, since)
    }

    pub fn get_timeline(&self, agent_id: &AgentId, since: Option<u64>, limit: Option<usize>) -> Result<Vec<TimelineEntry>, KernelError> {
        timeline::get_timeline(self.store.as_ref(), agent_id, since, limit)
    }

    pub fn get_receipt_with_facts(&self, agent_id: &AgentId, receipt_id: &ReceiptId) -> Result<Option<Receipt>, KernelError> {
        timeline::get_receipt_with_facts(self.store.as_ref(), agent_id, receipt_id)
    }

    /// Verifies `agent_id`'s hash chain end to end.
    pub fn verify_replay(&self, agent_id: &AgentId) -> Result<Result<(), ReplayError>, KernelError> {
        replay::verify_replay(self.store.as_ref(), agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::driver::job_economy::JobEconomyDriver;
    use crate::store::memory::MemoryStore;

    fn kernel() -> Kernel {
        let mut drivers = DriverRegistry::new();
        drivers.register(Box::new(JobEconomyDriver::new(50)));
        Kernel::new(
            Box::new(MemoryStore::default()),
            Box::new(FixedClock::new(1_000)),
            drivers,
            KernelConfig::builder().default_credits_cents(500).default_daily_spend_cents(200).build().unwrap(),
        )
    }

    #[test]
    fn full_quote_then_execute_round_trip_through_the_facade() {
        let kernel = kernel();
        let agent_id = AgentId::new("agent_1");
        let user_id = UserId::new("user_1");
        kernel.create_agent(user_id.clone(), agent_id.clone()).unwrap();

        let quote = kernel
            .can_do(QuoteRequest {
                user_id: user_id.clone(),
                agent_id: agent_id.clone(),
                idempotency_key: "idem-1".to_string(),
                intent: serde_json::json!({"type": "request_job", "job": "render"}),
            })
            .unwrap();
        assert!(quote.allowed);

        let outcome = kernel
            .execute(ExecuteRequest {
                user_id,
                agent_id: agent_id.clone(),
                quote_id: quote.quote_id,
                idempotency_key: "idem-1".to_string(),
                step_up_token: None,
                override_freshness: false,
            })
            .unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Applied { .. }));

        assert_eq!(kernel.verify_replay(&agent_id).unwrap(), Ok(()));
    }
}
