//! Policy Evaluator — allowlist/blocklist, per-intent daily counts, daily
//! spend, step-up threshold.
//!
//! A pure function over pre-gathered facts rather than a component that
//! reaches into the store itself: callers ([`crate::quote_engine`],
//! [`crate::execute_engine`]) assemble a [`PolicyEvalContext`] from the
//! store/driver/freshness gate and this module only judges it. That split
//! is what makes the evaluator testable without a database.

use crate::driver::CostEstimate;
use crate::error::DriverError;
use crate::models::{Agent, Budget, Policy};

#[derive(Debug, Clone)]
pub struct PolicyEvalContext<'a> {
    pub agent: &'a Agent,
    pub policy: &'a Policy,
    pub budget: &'a Budget,
    pub intent_type: &'a str,
    pub applied_count_today: u32,
    pub cost_estimate: CostEstimate,
    pub is_balance_backed: bool,
    pub is_outgoing_transfer: bool,
    /// `Ok(())` when freshness either does not apply or has already been
    /// checked by [`crate::freshness`]; the evaluator itself never talks
    /// to a driver.
    pub freshness_check: Result<(), &'static str>,
    pub effective_spend_power_cents: i64,
    pub driver_pre_check: Result<(), DriverError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub requires_step_up: bool,
    pub base_cost_cents: i64,
    pub transfer_amount_cents: i64,
}

impl PolicyDecision {
    fn reject(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            requires_step_up: false,
            base_cost_cents: 0,
            transfer_amount_cents: 0,
        }
    }
}

/// Runs the policy evaluation steps in order, short-circuiting on the first
/// failure.
pub fn evaluate(ctx: &PolicyEvalContext) -> PolicyDecision {
    // Step 1: agent must be active.
    if let Some(reason) = ctx.agent.status.rejection_reason() {
        return PolicyDecision::reject(reason);
    }

    // Step 3: blocklist / allowlist.
    if let Err(reason) = ctx.policy.intent_permitted(ctx.intent_type) {
        return PolicyDecision::reject(reason);
    }

    // Step 4: per-intent daily count.
    if let Some(max_per_day) = ctx.policy.max_per_day(ctx.intent_type) {
        if ctx.applied_count_today >= max_per_day {
            return PolicyDecision::reject("per_intent_limit_reached");
        }
    }

    // Step 5: credits must be positive.
    if ctx.budget.is_exhausted() {
        return PolicyDecision::reject("agent_dead");
    }

    let base_cost = ctx.cost_estimate.base_cost_cents;
    let transfer_amount = ctx.cost_estimate.transfer_amount_cents;

    // Step 7: projected daily cap and credits.
    if let Err(budget_reason) = ctx.budget.can_afford(base_cost, transfer_amount) {
        return PolicyDecision::reject(&budget_reason.to_string());
    }

    // Step 8: balance-backed environments require freshness and spend power.
    if ctx.is_balance_backed {
        if let Err(reason) = ctx.freshness_check {
            return PolicyDecision::reject(reason);
        }
        let amount_to_commit = base_cost + transfer_amount;
        if amount_to_commit > ctx.effective_spend_power_cents {
            return PolicyDecision::reject("insufficient_spend_power");
        }
        if ctx.is_outgoing_transfer {
            if let Err(err) = &ctx.driver_pre_check {
                return PolicyDecision::reject(&err.to_string());
            }
        }
    }

    // Step 9: step-up requirement.
    let requires_step_up = ctx.policy.requires_step_up_for_cost(base_cost)
        || (ctx.is_outgoing_transfer && ctx.is_balance_backed);

    PolicyDecision {
        allowed: true,
        reason: None,
        requires_step_up,
        base_cost_cents: base_cost,
        transfer_amount_cents: transfer_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::{AgentId, PolicyId, UserId};
    use crate::models::AgentStatus;

    fn agent(status: AgentStatus) -> Agent {
        Agent {
            agent_id: AgentId::new("agent_1"),
            user_id: UserId::new("user_1"),
            status,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn policy() -> Policy {
        Policy::default_for(AgentId::new("agent_1"), UserId::new("user_1"), PolicyId::new("policy_1"), 0)
    }

    fn budget(credits: i64, daily_limit: i64) -> Budget {
        Budget::new(AgentId::new("agent_1"), credits, daily_limit, 0)
    }

    fn ctx<'a>(
        agent: &'a Agent,
        policy: &'a Policy,
        budget: &'a Budget,
        cost: CostEstimate,
    ) -> PolicyEvalContext<'a> {
        PolicyEvalContext {
            agent,
            policy,
            budget,
            intent_type: "request_job",
            applied_count_today: 0,
            cost_estimate: cost,
            is_balance_backed: false,
            is_outgoing_transfer: false,
            freshness_check: Ok(()),
            effective_spend_power_cents: i64::MAX,
            driver_pre_check: Ok(()),
        }
    }

    #[test]
    fn frozen_agent_is_rejected_first() {
        let agent = agent(AgentStatus::Frozen);
        let policy = policy();
        let budget = budget(500, 200);
        let decision = evaluate(&ctx(&agent, &policy, &budget, CostEstimate::default()));
        assert_eq!(decision.reason.as_deref(), Some("agent_frozen"));
    }

    #[test]
    fn happy_path_allows_and_does_not_require_step_up() {
        let agent = agent(AgentStatus::Active);
        let policy = policy();
        let budget = budget(500, 200);
        let decision = evaluate(&ctx(
            &agent,
            &policy,
            &budget,
            CostEstimate {
                base_cost_cents: 50,
                transfer_amount_cents: 0,
            },
        ));
        assert!(decision.allowed);
        assert!(!decision.requires_step_up);
        assert_eq!(decision.base_cost_cents, 50);
    }

    #[test]
    fn daily_limit_is_enforced_projectively() {
        let agent = agent(AgentStatus::Active);
        let policy = policy();
        let mut budget = budget(500, 200);
        budget.daily_spend_used_cents = 180;
        let decision = evaluate(&ctx(
            &agent,
            &policy,
            &budget,
            CostEstimate {
                base_cost_cents: 50,
                transfer_amount_cents: 0,
            },
        ));
        assert_eq!(decision.reason.as_deref(), Some("daily_limit_exceeded"));
    }

    #[test]
    fn per_intent_cap_rejects_at_the_limit() {
        let agent = agent(AgentStatus::Active);
        let mut policy = policy();
        policy.per_intent_daily_caps.insert("request_job".to_string(), 4);
        let budget = budget(500, 200);
        let mut context = ctx(
            &agent,
            &policy,
            &budget,
            CostEstimate {
                base_cost_cents: 50,
                transfer_amount_cents: 0,
            },
        );
        context.applied_count_today = 4;
        let decision = evaluate(&context);
        assert_eq!(decision.reason.as_deref(), Some("per_intent_limit_reached"));
    }

    #[test]
    fn balance_backed_outgoing_transfer_requires_step_up() {
        let agent = agent(AgentStatus::Active);
        let policy = policy();
        let budget = budget(2_000_000, 2_000_000);
        let mut context = ctx(
            &agent,
            &policy,
            &budget,
            CostEstimate {
                base_cost_cents: 0,
                transfer_amount_cents: 100,
            },
        );
        context.is_balance_backed = true;
        context.is_outgoing_transfer = true;
        context.effective_spend_power_cents = 2_000_000;
        let decision = evaluate(&context);
        assert!(decision.allowed);
        assert!(decision.requires_step_up);
    }

    #[test]
    fn balance_backed_stale_freshness_rejects() {
        let agent = agent(AgentStatus::Active);
        let policy = policy();
        let budget = budget(2_000_000, 2_000_000);
        let mut context = ctx(
            &agent,
            &policy,
            &budget,
            CostEstimate {
                base_cost_cents: 0,
                transfer_amount_cents: 100,
            },
        );
        context.is_balance_backed = true;
        context.freshness_check = Err("env_unknown");
        let decision = evaluate(&context);
        assert_eq!(decision.reason.as_deref(), Some("env_unknown"));
    }
}
