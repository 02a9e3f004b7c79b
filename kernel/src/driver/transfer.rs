//! `BalanceTransferDriver` — a balance-backed outgoing transfer driver for
//! `usdc_transfer` intents.

use super::{
    CostEstimate, Driver, DriverContext, DriverExecuteResult, DriverStatus, Environment, EnvEvent,
    FreshnessReport, FreshnessStatus, TransferReceipt,
};
use crate::error::DriverError;
use crate::models::ids::AgentId;
use serde_json::Value;
use std::sync::Mutex;

pub struct BalanceTransferDriver {
    environment: Box<dyn Environment>,
}

impl BalanceTransferDriver {
    pub fn new(environment: Box<dyn Environment>) -> Self {
        Self { environment }
    }

    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }
}

fn normalize_address(raw: &str) -> Result<String, DriverError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("0x") || trimmed.len() < 4 {
        return Err(DriverError::Other("invalid_to_address".to_string()));
    }
    Ok(trimmed.to_lowercase())
}

impl Driver for BalanceTransferDriver {
    fn supports(&self, intent_type: &str) -> bool {
        intent_type == "usdc_transfer"
    }

    fn normalize(&self, intent: &Value) -> Result<Value, DriverError> {
        let to = intent
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Other("invalid_to_address".to_string()))?;
        let amount_cents = intent
            .get("amount_cents")
            .and_then(Value::as_i64)
            .ok_or_else(|| DriverError::Other("invalid_amount_cents".to_string()))?;
        if amount_cents <= 0 {
            return Err(DriverError::Other("invalid_amount_cents".to_string()));
        }
        let normalized_to = normalize_address(to)?;
        Ok(serde_json::json!({
            "type": "usdc_transfer",
            "to": normalized_to,
            "amount_cents": amount_cents,
        }))
    }

    fn estimate_cost(&self, intent: &Value) -> Result<CostEstimate, DriverError> {
        let amount_cents = intent
            .get("amount_cents")
            .and_then(Value::as_i64)
            .ok_or_else(|| DriverError::Other("invalid_amount_cents".to_string()))?;
        Ok(CostEstimate {
            base_cost_cents: 0,
            transfer_amount_cents: amount_cents,
        })
    }

    fn pre_check(&self, ctx: &DriverContext) -> Result<(), DriverError> {
        if !self.environment.gas_available(&ctx.agent_id) {
            return Err(DriverError::Other("insufficient_gas".to_string()));
        }
        Ok(())
    }

    fn commit_check(&self, ctx: &DriverContext) -> Result<(), DriverError> {
        if ctx.transfer_amount_cents > ctx.effective_spend_power_cents {
            return Err(DriverError::Other("insufficient_spend_power".to_string()));
        }
        self.pre_check(ctx)
    }

    fn execute(&self, ctx: &DriverContext) -> Result<DriverExecuteResult, DriverError> {
        let to = ctx
            .normalized_intent
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Other("invalid_to_address".to_string()))?;
        let receipt = self
            .environment
            .send_transfer(&ctx.agent_id, to, ctx.transfer_amount_cents)?;
        Ok(DriverExecuteResult {
            status: DriverStatus::Applied,
            external_ref: Some(receipt.tx_ref.clone()),
            env_events: vec![EnvEvent {
                event_type: "transfer_broadcast".to_string(),
                payload: serde_json::json!({"to": to, "amount_cents": ctx.transfer_amount_cents, "tx_ref": receipt.tx_ref}),
                cost_delta_cents: None,
                transfer: None,
            }],
            reason: None,
        })
    }

    fn is_balance_backed(&self) -> bool {
        true
    }

    fn freshness(&self) -> Option<FreshnessReport> {
        Some(self.environment.freshness())
    }

    fn confirmed_balance_cents(&self, agent_id: &AgentId) -> Option<i64> {
        self.environment
            .observation(agent_id)
            .get("confirmed_balance_cents")
            .and_then(Value::as_i64)
    }
}

/// Test/demo-only environment: a fixed confirmed balance, deterministic
/// `send_transfer`, and a freshness report the caller can mutate. This is
/// the seam at which a real chain RPC driver would plug in.
pub struct FakeEnvironment {
    confirmed_balance_cents: i64,
    freshness: Mutex<FreshnessReport>,
    gas_available: bool,
}

impl FakeEnvironment {
    pub fn new(confirmed_balance_cents: i64) -> Self {
        Self {
            confirmed_balance_cents,
            freshness: Mutex::new(FreshnessReport {
                status: FreshnessStatus::Fresh,
                updated_ago_seconds: 0,
                details: "synthetic".to_string(),
            }),
            gas_available: true,
        }
    }

    pub fn set_freshness(&self, report: FreshnessReport) {
        *self.freshness.lock().expect("freshness mutex poisoned") = report;
    }

    pub fn with_gas_available(mut self, gas_available: bool) -> Self {
        self.gas_available = gas_available;
        self
    }
}

impl Environment for FakeEnvironment {
    fn freshness(&self) -> FreshnessReport {
        self.freshness.lock().expect("freshness mutex poisoned").clone()
    }

    fn observation(&self, _agent_id: &AgentId) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("env_name".to_string(), Value::String("fake_chain".to_string()));
        map.insert(
            "confirmed_balance_cents".to_string(),
            Value::from(self.confirmed_balance_cents),
        );
        map
    }

    fn send_transfer(&self, agent_id: &AgentId, to: &str, amount_cents: i64) -> Result<TransferReceipt, DriverError> {
        Ok(TransferReceipt {
            tx_ref: format!("tx_{}_{}_{}", agent_id.as_str(), to, amount_cents),
            from: agent_id.as_str().to_string(),
        })
    }

    fn gas_available(&self, _agent_id: &AgentId) -> bool {
        self.gas_available
    }
}
