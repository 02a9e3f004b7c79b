//! Lifecycle — agent admission, freezing, and token revocation.

use crate::clock::{new_id, Clock};
use crate::config::KernelConfig;
use crate::error::{AuthzError, KernelError};
use crate::models::ids::{AgentId, EventId, PolicyId, ReceiptId, UserId};
use crate::models::{Agent, Budget, EventPayload, Policy, Receipt, ReceiptSource, User};
use crate::store::Store;

/// Admits a new agent for `user_id`, idempotent on `agent_id`: a second
/// call with the same id returns the existing agent rather than
/// re-installing its policy and budget.
pub fn create_agent(
    store: &dyn Store,
    clock: &dyn Clock,
    config: &KernelConfig,
    user_id: UserId,
    agent_id: AgentId,
) -> Result<Agent, KernelError> {
    if let Some(existing) = store.get_agent(&agent_id)? {
        return Ok(existing);
    }
    let now = clock.now_seconds();
    store.upsert_user(&User::new(user_id.clone(), now))?;

    let agent = Agent::new(agent_id.clone(), user_id.clone(), now);
    store.save_agent(&agent)?;
    store.insert_policy(&Policy::default_for(
        agent_id.clone(),
        user_id.clone(),
        PolicyId::new(new_id("policy")),
        now,
    ))?;
    store.save_budget(&Budget::new(
        agent_id.clone(),
        config.default_credits_cents,
        config.default_daily_spend_cents,
        now,
    ))?;

    let event = store.append_event(&agent_id, &user_id, EventId::new(new_id("event")), EventPayload::AgentCreated, now, now)?;
    store.append_receipt(Receipt {
        receipt_id: ReceiptId::new(new_id("receipt")),
        agent_id: agent_id.clone(),
        user_id,
        source: ReceiptSource::Policy,
        event_id: Some(event.event_id),
        external_ref: None,
        what_happened: "Agent admitted".to_string(),
        why_changed: "caller requested a new agent".to_string(),
        what_happens_next: "agent may now be quoted and executed against".to_string(),
        occurred_at: now,
        created_at: now,
    })?;

    Ok(agent)
}

/// Freezes an agent: no further quotes will be allowed until unfrozen by a
/// future policy change. Idempotent against an already-frozen agent.
pub fn freeze(store: &dyn Store, clock: &dyn Clock, agent_id: &AgentId, reason: &str) -> Result<(), KernelError> {
    let mut agent = store.get_agent(agent_id)?.ok_or(AuthzError::AgentNotFound)?;
    if !agent.is_active() {
        return Ok(());
    }
    let now = clock.now_seconds();
    agent.freeze(now);
    store.save_agent(&agent)?;

    let event = store.append_event(
        agent_id,
        &agent.user_id,
        EventId::new(new_id("event")),
        EventPayload::AgentFrozen {
            reason: reason.to_string(),
        },
        now,
        now,
    )?;
    store.append_receipt(Receipt {
        receipt_id: ReceiptId::new(new_id("receipt")),
        agent_id: agent_id.clone(),
        user_id: agent.user_id,
        source: ReceiptSource::Policy,
        event_id: Some(event.event_id),
        external_ref: None,
        what_happened: "Agent frozen".to_string(),
        why_changed: reason.to_string(),
        what_happens_next: "no further intents will be quoted until unfrozen".to_string(),
        occurred_at: now,
        created_at: now,
    })?;
    Ok(())
}

/// Revokes a step-up token ahead of its natural expiry, e.g. on user
/// request after a suspected leak.
pub fn revoke_token(store: &dyn Store, token_hash_lookup: &str) -> Result<(), KernelError> {
    let mut token = store
        .get_token_by_hash(token_hash_lookup)?
        .ok_or(AuthzError::StepUpTokenInvalid)?;
    token.revoked = true;
    store.update_token(&token)?;
    Ok(())
}
