//! Driver Interface — pluggable intent drivers.
//!
//! A driver is polymorphic over the capability set `{supports, normalize,
//! estimate_cost, pre_check, commit_check, execute}`. Drivers never hold a
//! back-reference to the kernel; they are handed a narrow [`DriverContext`]
//! instead: a small trait object selected by a tag, implemented by several
//! concrete strategies, with no back-pointer into the facade.

pub mod job_economy;
pub mod transfer;

use crate::error::DriverError;
use crate::models::ids::AgentId;
use serde_json::Value;

/// Driver-reported recency of its own observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessStatus {
    Fresh,
    Stale,
    Unknown,
}

impl FreshnessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreshnessStatus::Fresh => "fresh",
            FreshnessStatus::Stale => "stale",
            FreshnessStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FreshnessReport {
    pub status: FreshnessStatus,
    pub updated_ago_seconds: u64,
    pub details: String,
}

/// The driver-to-core contract for environments that back an outgoing
/// balance. Not every driver needs one — the in-kernel job economy has no
/// external balance to observe — so it is a capability injected only into
/// drivers that do, never a kernel-wide singleton.
pub trait Environment: Send + Sync {
    fn freshness(&self) -> FreshnessReport;
    fn observation(&self, agent_id: &AgentId) -> serde_json::Map<String, Value>;
    fn send_transfer(&self, agent_id: &AgentId, to: &str, amount_cents: i64) -> Result<TransferReceipt, DriverError>;
    fn gas_available(&self, agent_id: &AgentId) -> bool;
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub tx_ref: String,
    pub from: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CostEstimate {
    pub base_cost_cents: i64,
    pub transfer_amount_cents: i64,
}

/// A side-effect recorded by `Driver::execute`.
#[derive(Debug, Clone)]
pub struct EnvEvent {
    pub event_type: String,
    pub payload: Value,
    pub cost_delta_cents: Option<i64>,
    pub transfer: Option<TransferSideEffect>,
}

/// The cross-agent credit composed by an in-kernel-settlement environment —
/// explicitly confined to simulated economies, never to a balance-backed
/// one.
#[derive(Debug, Clone)]
pub struct TransferSideEffect {
    pub to_agent_id: AgentId,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Applied,
    Failed,
    Rejected,
    Idempotent,
}

#[derive(Debug, Clone)]
pub struct DriverExecuteResult {
    pub status: DriverStatus,
    pub external_ref: Option<String>,
    pub env_events: Vec<EnvEvent>,
    pub reason: Option<String>,
}

/// Narrow context handed to a driver for `pre_check`/`commit_check`/
/// `execute`. Carries no reference back to the `Kernel` facade.
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub agent_id: AgentId,
    pub normalized_intent: Value,
    pub base_cost_cents: i64,
    pub transfer_amount_cents: i64,
    pub effective_spend_power_cents: i64,
    pub override_freshness: bool,
    pub now: u64,
}

pub trait Driver: Send + Sync {
    fn supports(&self, intent_type: &str) -> bool;
    fn normalize(&self, intent: &Value) -> Result<Value, DriverError>;
    fn estimate_cost(&self, intent: &Value) -> Result<CostEstimate, DriverError>;
    fn pre_check(&self, ctx: &DriverContext) -> Result<(), DriverError>;
    fn commit_check(&self, ctx: &DriverContext) -> Result<(), DriverError>;
    fn execute(&self, ctx: &DriverContext) -> Result<DriverExecuteResult, DriverError>;
    /// Whether this driver requires a fresh environment observation before
    /// quoting/executing. The in-kernel job economy answers `false`;
    /// balance-backed drivers answer `true`.
    fn is_balance_backed(&self) -> bool {
        false
    }

    /// The driver's environment freshness report, when it has one. `None`
    /// for drivers with no external observation to go stale.
    fn freshness(&self) -> Option<FreshnessReport> {
        None
    }

    /// The driver's view of the agent's confirmed balance, when it has an
    /// external one to observe. `None` for in-kernel-settlement drivers.
    fn confirmed_balance_cents(&self, _agent_id: &AgentId) -> Option<i64> {
        None
    }
}

/// Selects the driver matching an intent's `type` field — drivers are
/// tagged variants selected by intent type.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Box<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Box<dyn Driver>) -> &mut Self {
        self.drivers.push(driver);
        self
    }

    pub fn for_intent(&self, intent_type: &str) -> Result<&dyn Driver, DriverError> {
        self.drivers
            .iter()
            .find(|d| d.supports(intent_type))
            .map(|d| d.as_ref())
            .ok_or_else(|| DriverError::Other("unsupported_intent".to_string()))
    }
}
