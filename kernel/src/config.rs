//! Kernel configuration.
//!
//! A single strongly-typed configuration value with every recognized option
//! enumerated: one struct, validated once at construction instead of
//! trusted ad hoc at each read site.

use crate::error::ConfigError;
use crate::models::ids::AgentId;

/// Narrow allowlist entry for skipping step-up on a specific, pre-approved
/// transfer route (`auto_approve_{agent_ids,to,max_cents}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoApproveRoute {
    pub agent_id: AgentId,
    pub to: String,
    pub max_cents: i64,
}

/// All recognized configuration options, with the defaults a
/// freshly-admitted kernel uses when the caller does not override them.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Upper bound, in seconds, of a `fresh` observation.
    pub env_stale_seconds: u64,
    /// Upper bound, in seconds, of a `stale` (not yet `unknown`) observation.
    pub env_unknown_seconds: u64,
    /// Starting `credits_cents` for a newly created agent's budget.
    pub default_credits_cents: i64,
    /// Starting `daily_spend_cents` cap for a newly created agent's budget.
    pub default_daily_spend_cents: i64,
    /// Step-up challenge lifetime, seconds.
    pub step_up_challenge_ttl_seconds: u64,
    /// Step-up token lifetime, seconds.
    pub step_up_token_ttl_seconds: u64,
    /// Confirmation depth a balance driver must reach to count a balance as
    /// confirmed.
    pub confirmations_required: u32,
    /// Safety margin subtracted from effective spend power.
    pub buffer_cents: i64,
    /// Pre-approved transfer routes that may skip step-up.
    pub auto_approve_routes: Vec<AutoApproveRoute>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            env_stale_seconds: 60,
            env_unknown_seconds: 300,
            default_credits_cents: 0,
            default_daily_spend_cents: 0,
            step_up_challenge_ttl_seconds: 300,
            step_up_token_ttl_seconds: 300,
            confirmations_required: 1,
            buffer_cents: 0,
            auto_approve_routes: Vec::new(),
        }
    }
}

impl KernelConfig {
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }

    /// Validates cross-field invariants. Called once from `Kernel::new`
    /// rather than trusted at every read site.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.env_stale_seconds >= self.env_unknown_seconds {
            return Err(ConfigError::StaleNotBeforeUnknown);
        }
        if self.default_credits_cents < 0 {
            return Err(ConfigError::NegativeCents {
                field: "default_credits_cents",
            });
        }
        if self.default_daily_spend_cents < 0 {
            return Err(ConfigError::NegativeCents {
                field: "default_daily_spend_cents",
            });
        }
        if self.buffer_cents < 0 {
            return Err(ConfigError::NegativeCents {
                field: "buffer_cents",
            });
        }
        if self.confirmations_required == 0 {
            return Err(ConfigError::ZeroConfirmations);
        }
        Ok(())
    }

    /// True when `(agent_id, to, amount_cents)` matches a pre-approved
    /// route narrow enough to skip step-up.
    pub fn is_auto_approved(&self, agent_id: &AgentId, to: &str, amount_cents: i64) -> bool {
        self.auto_approve_routes.iter().any(|route| {
            &route.agent_id == agent_id && route.to == to && amount_cents <= route.max_cents
        })
    }
}

/// Builder for [`KernelConfig`].
#[derive(Debug, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    pub fn env_stale_seconds(mut self, v: u64) -> Self {
        self.config.env_stale_seconds = v;
        self
    }

    pub fn env_unknown_seconds(mut self, v: u64) -> Self {
        self.config.env_unknown_seconds = v;
        self
    }

    pub fn default_credits_cents(mut self, v: i64) -> Self {
        self.config.default_credits_cents = v;
        self
    }

    pub fn default_daily_spend_cents(mut self, v: i64) -> Self {
        self.config.default_daily_spend_cents = v;
        self
    }

    pub fn step_up_challenge_ttl_seconds(mut self, v: u64) -> Self {
        self.config.step_up_challenge_ttl_seconds = v;
        self
    }

    pub fn step_up_token_ttl_seconds(mut self, v: u64) -> Self {
        self.config.step_up_token_ttl_seconds = v;
        self
    }

    pub fn confirmations_required(mut self, v: u32) -> Self {
        self.config.confirmations_required = v;
        self
    }

    pub fn buffer_cents(mut self, v: i64) -> Self {
        self.config.buffer_cents = v;
        self
    }

    pub fn auto_approve_route(mut self, route: AutoApproveRoute) -> Self {
        self.config.auto_approve_routes.push(route);
        self
    }

    pub fn build(self) -> Result<KernelConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
