//! Quote Engine — `can_do`.
//!
//! Normalizes an intent through its driver, runs the Policy Evaluator over
//! freshly-gathered facts, and persists an immutable, idempotent `Quote`
//! alongside its grounding `policy_decision` event and receipt. One function
//! gathers inputs, delegates judgment to a pure evaluator, and commits the
//! result as data rather than raising through it.

use crate::clock::{day_start, new_id, Clock};
use crate::config::KernelConfig;
use crate::driver::{DriverContext, DriverRegistry};
use crate::error::{AuthzError, InputError, KernelError};
use crate::freshness;
use crate::models::ids::{AgentId, EventId, QuoteId, ReceiptId, UserId};
use crate::models::{EventPayload, Quote, Receipt, ReceiptSource};
use crate::policy_eval::{evaluate, PolicyEvalContext};
use crate::store::{AgentLocks, Store};
use serde_json::Value;

pub struct QuoteRequest {
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub idempotency_key: String,
    pub intent: Value,
}

/// Runs `can_do` for a single intent: idempotency, reset, normalize, gather
/// facts, evaluate, commit.
pub fn quote(
    store: &dyn Store,
    clock: &dyn Clock,
    drivers: &DriverRegistry,
    config: &KernelConfig,
    locks: &AgentLocks,
    request: QuoteRequest,
) -> Result<Quote, KernelError> {
    let lock = locks.lock_for(&request.agent_id);
    let _guard = lock.lock().expect("agent lock poisoned");

    // Step 1: idempotency. A replayed key with an identical intent returns
    // the original quote verbatim; a replayed key with a different intent
    // is a caller bug, not a policy rejection.
    if let Some(existing) = store.get_quote_by_idempotency(&request.agent_id, &request.idempotency_key)? {
        if existing.intent_json == request.intent {
            return Ok(existing);
        }
        return Err(InputError::IdempotencyMismatch.into());
    }

    let agent = store
        .get_agent(&request.agent_id)?
        .ok_or(AuthzError::AgentNotFound)?;
    let policy = store
        .get_latest_policy(&request.agent_id)?
        .ok_or(AuthzError::AgentNotFound)?;
    let mut budget = store.get_budget(&request.agent_id)?.ok_or(AuthzError::AgentNotFound)?;

    let now = clock.now_seconds();

    // Step 2: lazy daily reset, visible in the audit trail.
    let previous_used = budget.daily_spend_used_cents;
    if budget.apply_daily_reset(now) {
        store.save_budget(&budget)?;
        emit(
            store,
            &request.agent_id,
            &request.user_id,
            EventPayload::DailyReset {
                previous_used_cents: previous_used,
            },
            now,
            ReceiptSource::Policy,
            "Daily spend counter reset",
            "a new UTC day began",
            "today's spend limit is available again",
        )?;
    }

    let intent_type = request
        .intent
        .get("type")
        .and_then(Value::as_str)
        .ok_or(InputError::UnsupportedIntent)?
        .to_string();
    let driver = drivers.for_intent(&intent_type)?;
    let normalized_intent = match driver.normalize(&request.intent) {
        Ok(normalized) => normalized,
        Err(err) => {
            return reject_before_policy(
                store,
                &request.agent_id,
                &request.user_id,
                request.idempotency_key.clone(),
                request.intent.clone(),
                now,
                err.to_string(),
            );
        }
    };
    let cost_estimate = match driver.estimate_cost(&normalized_intent) {
        Ok(estimate) => estimate,
        Err(err) => {
            return reject_before_policy(
                store,
                &request.agent_id,
                &request.user_id,
                request.idempotency_key.clone(),
                normalized_intent,
                now,
                err.to_string(),
            );
        }
    };
    let is_balance_backed = driver.is_balance_backed();
    let is_outgoing_transfer = is_balance_backed && cost_estimate.transfer_amount_cents > 0;

    let applied_count_today = store.applied_count_today(&request.agent_id, &intent_type, day_start(now))?;

    let freshness_check: Result<(), &'static str> = if is_balance_backed {
        match driver.freshness() {
            Some(report) => freshness::gate_for_quote(&report, config).map_err(freshness_reason),
            None => Ok(()),
        }
    } else {
        Ok(())
    };

    let confirmed_balance_cents = driver
        .confirmed_balance_cents(&request.agent_id)
        .unwrap_or(budget.credits_cents);
    let reservations = store.reservations_for_agent(&request.agent_id)?;
    let reserved_outgoing = crate::models::reservation::sum_pending(
        &reservations,
        crate::models::ReservationKind::Outgoing,
    );
    let reserved_holds =
        crate::models::reservation::sum_pending(&reservations, crate::models::ReservationKind::Hold);
    let policy_spendable = budget.policy_spendable_cents(cost_estimate.transfer_amount_cents);
    let snapshot = crate::models::AgentSpendSnapshot::compute(
        request.agent_id.clone(),
        crate::models::SnapshotInputs {
            confirmed_balance_cents,
            reserved_outgoing_cents: reserved_outgoing,
            reserved_holds_cents: reserved_holds,
            policy_spendable_cents: policy_spendable,
            buffer_cents: config.buffer_cents,
        },
        now,
    );
    store.save_snapshot(&snapshot)?;

    let driver_pre_check = if is_balance_backed && is_outgoing_transfer {
        let driver_ctx = DriverContext {
            agent_id: request.agent_id.clone(),
            normalized_intent: normalized_intent.clone(),
            base_cost_cents: cost_estimate.base_cost_cents,
            transfer_amount_cents: cost_estimate.transfer_amount_cents,
            effective_spend_power_cents: snapshot.effective_spend_power_cents,
            override_freshness: false,
            now,
        };
        driver.pre_check(&driver_ctx)
    } else {
        Ok(())
    };

    let ctx = PolicyEvalContext {
        agent: &agent,
        policy: &policy,
        budget: &budget,
        intent_type: &intent_type,
        applied_count_today,
        cost_estimate,
        is_balance_backed,
        is_outgoing_transfer,
        freshness_check,
        effective_spend_power_cents: snapshot.effective_spend_power_cents,
        driver_pre_check,
    };
    let decision = evaluate(&ctx);

    let requires_step_up = decision.allowed
        && decision.requires_step_up
        && !config.is_auto_approved(
            &request.agent_id,
            normalized_intent.get("to").and_then(Value::as_str).unwrap_or(""),
            decision.transfer_amount_cents,
        );

    let quote = Quote {
        quote_id: QuoteId::new(new_id("quote")),
        user_id: request.user_id.clone(),
        agent_id: request.agent_id.clone(),
        intent_json: normalized_intent.clone(),
        allowed: decision.allowed,
        requires_step_up,
        reason: decision.reason.clone(),
        expires_at: now + crate::models::quote::QUOTE_TTL_SECONDS,
        idempotency_key: request.idempotency_key,
        created_at: now,
        base_cost_cents: decision.base_cost_cents,
        transfer_amount_cents: decision.transfer_amount_cents,
    };
    store.insert_quote(&quote)?;

    let what_happened = if decision.allowed {
        "Intent quoted and allowed".to_string()
    } else {
        format!("Intent quoted and rejected: {}", decision.reason.clone().unwrap_or_default())
    };
    let what_happens_next = if !decision.allowed {
        "no further action possible for this intent".to_string()
    } else if requires_step_up {
        "caller must request and confirm step-up before executing".to_string()
    } else {
        "caller may execute this quote before it expires".to_string()
    };

    emit(
        store,
        &request.agent_id,
        &request.user_id,
        EventPayload::PolicyDecision {
            allowed: decision.allowed,
            reason: decision.reason.clone(),
            requires_step_up,
            intent: normalized_intent,
            effective_spend_power_cents: snapshot.effective_spend_power_cents,
        },
        now,
        ReceiptSource::Policy,
        &what_happened,
        "policy evaluation ran against current budget and freshness facts",
        &what_happens_next,
    )?;

    Ok(quote)
}

/// Records a quote rejected before policy ever saw it — the driver couldn't
/// normalize the intent or cost it. Still persists a quote and a grounding
/// `policy_decision` event/receipt, the same as any other rejection, so the
/// caller gets a stable reason instead of a raised error.
#[allow(clippy::too_many_arguments)]
fn reject_before_policy(
    store: &dyn Store,
    agent_id: &AgentId,
    user_id: &UserId,
    idempotency_key: String,
    intent_json: Value,
    now: u64,
    reason: String,
) -> Result<Quote, KernelError> {
    let quote = Quote {
        quote_id: QuoteId::new(new_id("quote")),
        user_id: user_id.clone(),
        agent_id: agent_id.clone(),
        intent_json: intent_json.clone(),
        allowed: false,
        requires_step_up: false,
        reason: Some(reason.clone()),
        expires_at: now + crate::models::quote::QUOTE_TTL_SECONDS,
        idempotency_key,
        created_at: now,
        base_cost_cents: 0,
        transfer_amount_cents: 0,
    };
    store.insert_quote(&quote)?;
    emit(
        store,
        agent_id,
        user_id,
        EventPayload::PolicyDecision {
            allowed: false,
            reason: Some(reason.clone()),
            requires_step_up: false,
            intent: intent_json,
            effective_spend_power_cents: 0,
        },
        now,
        ReceiptSource::Policy,
        &format!("Intent quoted and rejected: {reason}"),
        "driver could not normalize or cost the intent",
        "no further action possible for this intent",
    )?;
    Ok(quote)
}

/// Appends an event and its grounding receipt as one logical unit — every
/// receipt must name the event that caused it.
#[allow(clippy::too_many_arguments)]
fn emit(
    store: &dyn Store,
    agent_id: &AgentId,
    user_id: &UserId,
    payload: EventPayload,
    now: u64,
    source: ReceiptSource,
    what_happened: &str,
    why_changed: &str,
    what_happens_next: &str,
) -> Result<(), KernelError> {
    let event = store.append_event(agent_id, user_id, EventId::new(new_id("event")), payload, now, now)?;
    store.append_receipt(Receipt {
        receipt_id: ReceiptId::new(new_id("receipt")),
        agent_id: agent_id.clone(),
        user_id: user_id.clone(),
        source,
        event_id: Some(event.event_id),
        external_ref: None,
        what_happened: what_happened.to_string(),
        why_changed: why_changed.to_string(),
        what_happens_next: what_happens_next.to_string(),
        occurred_at: now,
        created_at: now,
    })?;
    Ok(())
}

fn freshness_reason(err: crate::error::FreshnessError) -> &'static str {
    match err {
        crate::error::FreshnessError::EnvStale => "env_stale",
        crate::error::FreshnessError::EnvUnknown => "env_unknown",
        crate::error::FreshnessError::EnvObservationFailed => "env_observation_failed",
    }
}
