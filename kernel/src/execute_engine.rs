//! Execute Engine — `execute`.
//!
//! Re-validates a quote against current facts (it may be minutes stale),
//! confirms step-up if required, then commits the driver's side effects
//! under the per-agent lock: gather, re-check, commit, and on any driver
//! failure land on `execution_failed` as data rather than unwind through
//! the caller.

use crate::clock::{day_start, new_id, Clock};
use crate::config::KernelConfig;
use crate::driver::{DriverContext, DriverRegistry, DriverStatus};
use crate::error::{AuthzError, InputError, KernelError, QuoteError};
use crate::freshness;
use crate::models::ids::{AgentId, EventId, ExecId, QuoteId, ReceiptId, UserId};
use crate::models::{Event, EventPayload, ExecuteOutcome, Execution, ExecutionStatus, Receipt, ReceiptSource};
use crate::policy_eval::{evaluate, PolicyEvalContext};
use crate::step_up_machine;
use crate::store::{AgentLocks, Store};
use serde_json::Value;

pub struct ExecuteRequest {
    pub user_id: UserId,
    pub agent_id: AgentId,
    pub quote_id: QuoteId,
    pub idempotency_key: String,
    pub step_up_token: Option<String>,
    pub override_freshness: bool,
}

pub fn execute(
    store: &dyn Store,
    clock: &dyn Clock,
    drivers: &DriverRegistry,
    config: &KernelConfig,
    locks: &AgentLocks,
    request: ExecuteRequest,
) -> Result<ExecuteOutcome, KernelError> {
    let lock = locks.lock_for(&request.agent_id);
    let _guard = lock.lock().expect("agent lock poisoned");
    let now = clock.now_seconds();

    let quote = store.get_quote(&request.quote_id)?.ok_or(QuoteError::QuoteNotFound)?;
    if quote.agent_id != request.agent_id || quote.user_id != request.user_id {
        return Err(AuthzError::Forbidden.into());
    }
    if quote.idempotency_key != request.idempotency_key {
        return Err(InputError::IdempotencyMismatch.into());
    }

    // An execute against an already-executed quote is idempotent, whatever
    // the prior outcome — applied, failed, or still queued.
    if let Some(existing) = store.get_execution_by_quote(&request.quote_id)? {
        return Ok(ExecuteOutcome::Idempotent {
            exec_id: existing.exec_id,
            external_ref: existing.external_ref,
        });
    }

    if quote.is_expired(now) {
        emit(
            store,
            &request.agent_id,
            &request.user_id,
            EventPayload::QuoteExpired {
                quote_id: request.quote_id.clone(),
            },
            now,
            ReceiptSource::Execution,
            "Quote expired before execution",
            "more than the quote TTL elapsed since it was issued",
            "caller must request a fresh quote",
        )?;
        return Ok(ExecuteOutcome::Rejected {
            reason: "quote_expired".to_string(),
        });
    }

    if !quote.allowed {
        return Ok(ExecuteOutcome::Rejected {
            reason: quote.reason.clone().unwrap_or_else(|| "blocked_intent".to_string()),
        });
    }

    let intent_type = quote
        .intent_json
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let driver = drivers.for_intent(&intent_type)?;
    let is_balance_backed = driver.is_balance_backed();
    let is_outgoing_transfer = is_balance_backed && quote.transfer_amount_cents > 0;

    // Step 2: freshness, with an explicit override path unavailable at quote time.
    if is_balance_backed {
        if let Some(report) = driver.freshness() {
            match freshness::gate_for_execute(&report, config, request.override_freshness) {
                Ok(true) => {
                    emit(
                        store,
                        &request.agent_id,
                        &request.user_id,
                        EventPayload::FreshnessOverride {
                            status: report.status.as_str().to_string(),
                            updated_ago_seconds: report.updated_ago_seconds,
                        },
                        now,
                        ReceiptSource::Env,
                        "Executed against non-fresh environment data",
                        "caller explicitly overrode the freshness gate",
                        "downstream facts reflect an overridden observation",
                    )?;
                }
                Ok(false) => {}
                Err(err) => {
                    return Ok(ExecuteOutcome::Rejected { reason: err.to_string() });
                }
            }
        }
    }

    // Step 3: re-run the Policy Evaluator against current budget/reservations.
    let agent = store.get_agent(&request.agent_id)?.ok_or(AuthzError::AgentNotFound)?;
    let policy = store.get_latest_policy(&request.agent_id)?.ok_or(AuthzError::AgentNotFound)?;
    let mut budget = store.get_budget(&request.agent_id)?.ok_or(AuthzError::AgentNotFound)?;
    budget.apply_daily_reset(now);

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
    let policy_spendable = budget.policy_spendable_cents(quote.transfer_amount_cents);
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

    let applied_count_today = store.applied_count_today(&request.agent_id, &intent_type, day_start(now))?;
    let driver_pre_check = if is_balance_backed && is_outgoing_transfer {
        driver.pre_check(&DriverContext {
            agent_id: request.agent_id.clone(),
            normalized_intent: quote.intent_json.clone(),
            base_cost_cents: quote.base_cost_cents,
            transfer_amount_cents: quote.transfer_amount_cents,
            effective_spend_power_cents: snapshot.effective_spend_power_cents,
            override_freshness: request.override_freshness,
            now,
        })
    } else {
        Ok(())
    };
    let decision = evaluate(&PolicyEvalContext {
        agent: &agent,
        policy: &policy,
        budget: &budget,
        intent_type: &intent_type,
        applied_count_today,
        cost_estimate: crate::driver::CostEstimate {
            base_cost_cents: quote.base_cost_cents,
            transfer_amount_cents: quote.transfer_amount_cents,
        },
        is_balance_backed,
        is_outgoing_transfer,
        freshness_check: Ok(()), // already gated above; the evaluator never re-checks freshness.
        effective_spend_power_cents: snapshot.effective_spend_power_cents,
        driver_pre_check,
    });

    emit(
        store,
        &request.agent_id,
        &request.user_id,
        EventPayload::PolicyRecheck {
            effective_spend_power_cents: snapshot.effective_spend_power_cents,
        },
        now,
        ReceiptSource::Policy,
        "Re-checked policy immediately before executing",
        "quotes may be up to the quote TTL old",
        "execution proceeds only if this re-check still allows it",
    )?;

    if !decision.allowed {
        return Ok(ExecuteOutcome::Rejected {
            reason: decision.reason.unwrap_or_default(),
        });
    }

    // Step 4: step-up.
    if quote.requires_step_up {
        match &request.step_up_token {
            None => return Err(AuthzError::StepUpRequired.into()),
            Some(raw_token) => {
                step_up_machine::validate_token(
                    store,
                    clock,
                    raw_token,
                    &request.user_id,
                    &request.agent_id,
                    &request.quote_id,
                )?;
            }
        }
    }

    // Step 5: commit. The per-agent lock held since entry makes this section
    // atomic with respect to every other call touching this agent.
    let exec_id = ExecId::new(new_id("exec"));
    let mut execution = Execution::queued(
        exec_id.clone(),
        request.quote_id.clone(),
        request.user_id.clone(),
        request.agent_id.clone(),
        now,
    );
    store.insert_execution(&execution)?;
    budget.debit(quote.base_cost_cents);
    store.save_budget(&budget)?;

    let driver_ctx = DriverContext {
        agent_id: request.agent_id.clone(),
        normalized_intent: quote.intent_json.clone(),
        base_cost_cents: quote.base_cost_cents,
        transfer_amount_cents: quote.transfer_amount_cents,
        effective_spend_power_cents: snapshot.effective_spend_power_cents,
        override_freshness: request.override_freshness,
        now,
    };

    let outcome = match driver.execute(&driver_ctx) {
        Ok(result) => apply_driver_result(store, &request.agent_id, &request.user_id, &mut execution, &mut budget, result, now)?,
        Err(err) => {
            execution.finish(ExecutionStatus::Failed, None, now);
            store.update_execution(&execution)?;
            emit(
                store,
                &request.agent_id,
                &request.user_id,
                EventPayload::ExecutionFailed {
                    exec_id: exec_id.clone(),
                    reason: err.to_string(),
                },
                now,
                ReceiptSource::Execution,
                "Execution failed",
                &err.to_string(),
                "credits already debited are not refunded automatically",
            )?;
            ExecuteOutcome::Failed {
                exec_id: exec_id.clone(),
                reason: err.to_string(),
            }
        }
    };

    store.save_budget(&budget)?;
    if budget.is_exhausted() && agent.is_active() {
        let mut agent = agent;
        agent.mark_dead(now);
        store.save_agent(&agent)?;
        emit(
            store,
            &request.agent_id,
            &request.user_id,
            EventPayload::AgentDead,
            now,
            ReceiptSource::Execution,
            "Agent marked dead",
            "credits reached zero",
            "no further intents will be quoted or executed",
        )?;
    }

    let reservations = store.reservations_for_agent(&request.agent_id)?;
    let reserved_outgoing =
        crate::models::reservation::sum_pending(&reservations, crate::models::ReservationKind::Outgoing);
    let reserved_holds =
        crate::models::reservation::sum_pending(&reservations, crate::models::ReservationKind::Hold);
    let confirmed_balance_cents = driver
        .confirmed_balance_cents(&request.agent_id)
        .unwrap_or(budget.credits_cents);
    let refreshed = crate::models::AgentSpendSnapshot::compute(
        request.agent_id.clone(),
        crate::models::SnapshotInputs {
            confirmed_balance_cents,
            reserved_outgoing_cents: reserved_outgoing,
            reserved_holds_cents: reserved_holds,
            policy_spendable_cents: budget.policy_spendable_cents(0),
            buffer_cents: config.buffer_cents,
        },
        now,
    );
    store.save_snapshot(&refreshed)?;

    Ok(outcome)
}

/// Applies the driver's result inside the commit section: records the
/// env-reported side effects, finishes the execution row, and emits the
/// terminal event.
fn apply_driver_result(
    store: &dyn Store,
    agent_id: &AgentId,
    user_id: &UserId,
    execution: &mut Execution,
    budget: &mut crate::models::Budget,
    result: crate::driver::DriverExecuteResult,
    now: u64,
) -> Result<ExecuteOutcome, KernelError> {
    for env_event in &result.env_events {
        if let Some(delta) = env_event.cost_delta_cents {
            budget.adjust(delta);
            emit(
                store,
                agent_id,
                user_id,
                EventPayload::BudgetAdjustment {
                    delta_cents: delta,
                    reason: env_event.event_type.clone(),
                },
                now,
                ReceiptSource::Env,
                "Budget adjusted by environment-reported delta",
                &env_event.event_type,
                "effective spend power reflects the adjustment on next quote",
            )?;
        }
        if let Some(transfer) = &env_event.transfer {
            if let Some(mut recipient_budget) = store.get_budget(&transfer.to_agent_id)? {
                recipient_budget.credit(transfer.amount_cents);
                store.save_budget(&recipient_budget)?;
            }
            emit(
                store,
                agent_id,
                user_id,
                EventPayload::Transfer {
                    to_agent_id: transfer.to_agent_id.clone(),
                    amount_cents: transfer.amount_cents,
                },
                now,
                ReceiptSource::Env,
                "Transfer side effect applied",
                &env_event.event_type,
                "recipient's credits reflect the transfer immediately",
            )?;
        }
    }

    match result.status {
        DriverStatus::Applied | DriverStatus::Idempotent => {
            execution.finish(ExecutionStatus::Applied, result.external_ref.clone(), now);
            store.update_execution(execution)?;
            emit(
                store,
                agent_id,
                user_id,
                EventPayload::ExecutionApplied {
                    exec_id: execution.exec_id.clone(),
                    external_ref: result.external_ref.clone(),
                },
                now,
                ReceiptSource::Execution,
                "Execution applied",
                "driver reported success",
                "quote is now consumed",
            )?;
            Ok(ExecuteOutcome::Applied {
                exec_id: execution.exec_id.clone(),
                external_ref: result.external_ref,
            })
        }
        DriverStatus::Failed | DriverStatus::Rejected => {
            let reason = result.reason.clone().unwrap_or_else(|| "execution_error".to_string());
            execution.finish(ExecutionStatus::Failed, None, now);
            store.update_execution(execution)?;
            emit(
                store,
                agent_id,
                user_id,
                EventPayload::ExecutionFailed {
                    exec_id: execution.exec_id.clone(),
                    reason: reason.clone(),
                },
                now,
                ReceiptSource::Execution,
                "Execution failed",
                &reason,
                "credits already debited are not refunded automatically",
            )?;
            Ok(ExecuteOutcome::Failed {
                exec_id: execution.exec_id.clone(),
                reason,
            })
        }
    }
}

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
) -> Result<Event, KernelError> {
    let event = store.append_event(agent_id, user_id, EventId::new(new_id("event")), payload, now, now)?;
    store.append_receipt(Receipt {
        receipt_id: ReceiptId::new(new_id("receipt")),
        agent_id: agent_id.clone(),
        user_id: user_id.clone(),
        source,
        event_id: Some(event.event_id.clone()),
        external_ref: None,
        what_happened: what_happened.to_string(),
        why_changed: why_changed.to_string(),
        what_happens_next: what_happens_next.to_string(),
        occurred_at: now,
        created_at: now,
    })?;
    Ok(event)
}
