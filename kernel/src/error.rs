//! Error taxonomy.
//!
//! One `thiserror` enum per failure family, wrapped by a top-level enum with
//! `#[from]` at the boundary. The `Display` impl of every variant here is
//! the *stable reason string* that crosses the
//! `can_do`/`execute` boundary — callers match on `reason()`, never on the
//! variant name, so these strings are part of the contract and must not
//! change once shipped.

use thiserror::Error;

/// Malformed or self-contradictory caller input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("agent_id_required")]
    AgentIdRequired,
    #[error("invalid_amount_cents")]
    InvalidAmountCents,
    #[error("invalid_to_address")]
    InvalidToAddress,
    #[error("idempotency_mismatch")]
    IdempotencyMismatch,
    #[error("unsupported_intent")]
    UnsupportedIntent,
}

/// Authorization and step-up failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("agent_not_found")]
    AgentNotFound,
    #[error("agent_frozen")]
    AgentFrozen,
    #[error("agent_dead")]
    AgentDead,
    #[error("forbidden")]
    Forbidden,
    #[error("step_up_required")]
    StepUpRequired,
    #[error("step_up_mismatch")]
    StepUpMismatch,
    #[error("step_up_token_expired")]
    StepUpTokenExpired,
    #[error("step_up_token_invalid")]
    StepUpTokenInvalid,
    #[error("invalid_code")]
    InvalidCode,
}

/// Policy and budget rejections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("intent_not_allowlisted")]
    IntentNotAllowlisted,
    #[error("blocked_intent")]
    BlockedIntent,
    #[error("per_intent_limit_reached")]
    PerIntentLimitReached,
    #[error("daily_limit_exceeded")]
    DailyLimitExceeded,
    #[error("insufficient_credits")]
    InsufficientCredits,
    #[error("insufficient_confirmed_usdc")]
    InsufficientConfirmedUsdc,
    #[error("insufficient_gas")]
    InsufficientGas,
    #[error("insufficient_spend_power")]
    InsufficientSpendPower,
}

/// Environment freshness rejections.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FreshnessError {
    #[error("env_stale")]
    EnvStale,
    #[error("env_unknown")]
    EnvUnknown,
    #[error("env_observation_failed")]
    EnvObservationFailed,
}

/// Quote lifecycle failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("quote_not_found")]
    QuoteNotFound,
    #[error("quote_expired")]
    QuoteExpired,
}

/// Driver and environment failures. `Other` passes a driver-returned reason
/// through verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("execution_error")]
    ExecutionError,
    #[error("transfer_failed")]
    TransferFailed,
    #[error("{0}")]
    Other(String),
}

/// Configuration validation failures, raised only at `Kernel::new`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("env_stale_seconds must be less than env_unknown_seconds")]
    StaleNotBeforeUnknown,
    #[error("{field} must be non-negative")]
    NegativeCents { field: &'static str },
    #[error("confirmations_required must be at least 1")]
    ZeroConfirmations,
}

/// Storage-layer failures: append-only violations, lock contention, and the
/// underlying `rusqlite` error surface.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("append_only_violation: {0}")]
    AppendOnlyViolation(String),
    #[error("lock_contention")]
    LockContention,
    #[error("not_found")]
    NotFound,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The single error type every public `Kernel` operation may return for
/// *unexpected* failures. Expected failures (policy rejections, freshness
/// gates, step-up mismatches) are represented as data — `{allowed: false,
/// reason}` or `{status: rejected|failed, reason}` — never as this type.
/// The core never raises through commits.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("input error: {0}")]
    Input(#[from] InputError),
    #[error("authz error: {0}")]
    Authz(#[from] AuthzError),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("freshness error: {0}")]
    Freshness(#[from] FreshnessError),
    #[error("quote error: {0}")]
    Quote(#[from] QuoteError),
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl KernelError {
    /// The stable reason string carried by this error, for callers that
    /// need to surface it the same way a rejected quote/execution would.
    pub fn reason(&self) -> String {
        self.to_string()
            .split_once(": ")
            .map(|(_, rest)| rest.to_string())
            .unwrap_or_else(|| self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_stable() {
        assert_eq!(PolicyError::DailyLimitExceeded.to_string(), "daily_limit_exceeded");
        assert_eq!(FreshnessError::EnvUnknown.to_string(), "env_unknown");
        assert_eq!(AuthzError::StepUpMismatch.to_string(), "step_up_mismatch");
    }

    #[test]
    fn driver_other_passes_reason_through_verbatim() {
        let err = DriverError::Other("insufficient_liquidity_pool".to_string());
        assert_eq!(err.to_string(), "insufficient_liquidity_pool");
    }

    #[test]
    fn kernel_error_wraps_family_via_from() {
        let err: KernelError = PolicyError::InsufficientCredits.into();
        assert!(matches!(err, KernelError::Policy(PolicyError::InsufficientCredits)));
    }
}
