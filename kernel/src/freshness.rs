//! Freshness Gate — fail-closed consumption of driver freshness.

use crate::config::KernelConfig;
use crate::driver::{FreshnessReport, FreshnessStatus};
use crate::error::FreshnessError;

/// Classifies a driver's self-reported `updated_ago_seconds` into
/// `fresh|stale|unknown` using the configured thresholds. The driver's own
/// `status` is honored as a floor: a driver that already says `unknown` is
/// never reclassified as fresher just because it forgot to set
/// `updated_ago_seconds`.
pub fn classify(report: &FreshnessReport, config: &KernelConfig) -> FreshnessStatus {
    let by_age = if report.updated_ago_seconds <= config.env_stale_seconds {
        FreshnessStatus::Fresh
    } else if report.updated_ago_seconds <= config.env_unknown_seconds {
        FreshnessStatus::Stale
    } else {
        FreshnessStatus::Unknown
    };
    match (report.status, by_age) {
        (FreshnessStatus::Unknown, _) => FreshnessStatus::Unknown,
        (FreshnessStatus::Stale, FreshnessStatus::Fresh) => FreshnessStatus::Stale,
        (_, by_age) => by_age,
    }
}

/// `can_do` never sees an override: any non-fresh status rejects outright.
pub fn gate_for_quote(report: &FreshnessReport, config: &KernelConfig) -> Result<(), FreshnessError> {
    match classify(report, config) {
        FreshnessStatus::Fresh => Ok(()),
        FreshnessStatus::Stale => Err(FreshnessError::EnvStale),
        FreshnessStatus::Unknown => Err(FreshnessError::EnvUnknown),
    }
}

/// `execute` additionally accepts an explicit override. Returns `Ok(true)`
/// when the override was actually needed (so the caller knows to emit
/// `freshness_override`).
pub fn gate_for_execute(
    report: &FreshnessReport,
    config: &KernelConfig,
    override_freshness: bool,
) -> Result<bool, FreshnessError> {
    match gate_for_quote(report, config) {
        Ok(()) => Ok(false),
        Err(err) => {
            if override_freshness {
                Ok(true)
            } else {
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KernelConfig {
        KernelConfig::builder()
            .env_stale_seconds(60)
            .env_unknown_seconds(300)
            .build()
            .unwrap()
    }

    fn report(status: FreshnessStatus, updated_ago_seconds: u64) -> FreshnessReport {
        FreshnessReport {
            status,
            updated_ago_seconds,
            details: String::new(),
        }
    }

    #[test]
    fn classifies_by_age_within_thresholds() {
        let config = config();
        assert_eq!(classify(&report(FreshnessStatus::Fresh, 10), &config), FreshnessStatus::Fresh);
        assert_eq!(classify(&report(FreshnessStatus::Fresh, 120), &config), FreshnessStatus::Stale);
        assert_eq!(classify(&report(FreshnessStatus::Fresh, 500), &config), FreshnessStatus::Unknown);
    }

    #[test]
    fn driver_reported_unknown_is_never_downgraded_by_age() {
        let config = config();
        assert_eq!(classify(&report(FreshnessStatus::Unknown, 1), &config), FreshnessStatus::Unknown);
    }

    #[test]
    fn quote_gate_rejects_any_non_fresh_status() {
        let config = config();
        assert_eq!(
            gate_for_quote(&report(FreshnessStatus::Fresh, 500), &config),
            Err(FreshnessError::EnvUnknown)
        );
        assert!(gate_for_quote(&report(FreshnessStatus::Fresh, 10), &config).is_ok());
    }

    #[test]
    fn execute_gate_accepts_explicit_override_only() {
        let config = config();
        let stale = report(FreshnessStatus::Fresh, 500);
        assert_eq!(gate_for_execute(&stale, &config, false), Err(FreshnessError::EnvUnknown));
        assert_eq!(gate_for_execute(&stale, &config, true), Ok(true));
        assert_eq!(gate_for_execute(&report(FreshnessStatus::Fresh, 10), &config, true), Ok(false));
    }
}
