//! `JobEconomyDriver` — an in-kernel-settlement driver for `request_job`
//! intents: no balance-backed freshness requirement, a fixed
//! `base_cost_cents`, and no `transfer` side-effect beyond the debit the
//! Execute Engine already applies.

use super::{CostEstimate, Driver, DriverContext, DriverExecuteResult, DriverStatus, EnvEvent};
use crate::error::DriverError;
use serde_json::Value;

pub struct JobEconomyDriver {
    base_cost_cents: i64,
}

impl JobEconomyDriver {
    pub fn new(base_cost_cents: i64) -> Self {
        Self { base_cost_cents }
    }
}

impl Driver for JobEconomyDriver {
    fn supports(&self, intent_type: &str) -> bool {
        intent_type == "request_job"
    }

    fn normalize(&self, intent: &Value) -> Result<Value, DriverError> {
        let job_name = intent
            .get("job")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Other("invalid_job".to_string()))?;
        Ok(serde_json::json!({"type": "request_job", "job": job_name}))
    }

    fn estimate_cost(&self, _intent: &Value) -> Result<CostEstimate, DriverError> {
        Ok(CostEstimate {
            base_cost_cents: self.base_cost_cents,
            transfer_amount_cents: 0,
        })
    }

    fn pre_check(&self, _ctx: &DriverContext) -> Result<(), DriverError> {
        Ok(())
    }

    fn commit_check(&self, _ctx: &DriverContext) -> Result<(), DriverError> {
        Ok(())
    }

    fn execute(&self, ctx: &DriverContext) -> Result<DriverExecuteResult, DriverError> {
        Ok(DriverExecuteResult {
            status: DriverStatus::Applied,
            external_ref: None,
            env_events: vec![EnvEvent {
                event_type: "job_dispatched".to_string(),
                payload: ctx.normalized_intent.clone(),
                cost_delta_cents: None,
                transfer: None,
            }],
            reason: None,
        })
    }
}
