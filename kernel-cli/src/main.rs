//! Demo binary driving the constraint kernel end to end against a SQLite
//! store: admit an agent, quote a job, execute it, then quote and step up
//! a balance-backed transfer and replay-verify the resulting audit chain.

use agent_kernel_core::clock::SystemClock;
use agent_kernel_core::driver::job_economy::JobEconomyDriver;
use agent_kernel_core::driver::transfer::{BalanceTransferDriver, FakeEnvironment};
use agent_kernel_core::driver::DriverRegistry;
use agent_kernel_core::models::ids::{AgentId, UserId};
use agent_kernel_core::models::ExecuteOutcome;
use agent_kernel_core::store::sqlite::SqliteStore;
use agent_kernel_core::{ExecuteRequest, Kernel, KernelConfig, QuoteRequest};
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let mut drivers = DriverRegistry::new();
    drivers.register(Box::new(JobEconomyDriver::new(50)));
    drivers.register(Box::new(BalanceTransferDriver::new(Box::new(FakeEnvironment::new(1_000_000)))));

    let store = match SqliteStore::open_in_memory() {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(%err, "failed to open store");
            return ExitCode::FAILURE;
        }
    };

    let config = KernelConfig::builder()
        .default_credits_cents(10_000)
        .default_daily_spend_cents(5_000)
        .build()
        .expect("default config is valid");

    let kernel = Kernel::new(Box::new(store), Box::new(SystemClock), drivers, config);
    if let Err(err) = run(&kernel) {
        tracing::error!(%err, "kernel demo run failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(kernel: &Kernel) -> Result<(), agent_kernel_core::KernelError> {
    let user_id = UserId::new("user_demo");
    let agent_id = AgentId::new("agent_demo");
    kernel.create_agent(user_id.clone(), agent_id.clone())?;
    tracing::info!(agent = agent_id.as_str(), "agent admitted");

    let job_quote = kernel.can_do(QuoteRequest {
        user_id: user_id.clone(),
        agent_id: agent_id.clone(),
        idempotency_key: "demo-job-1".to_string(),
        intent: serde_json::json!({"type": "request_job", "job": "render_frame"}),
    })?;
    tracing::info!(allowed = job_quote.allowed, "job quoted");

    if job_quote.allowed {
        let outcome = kernel.execute(ExecuteRequest {
            user_id: user_id.clone(),
            agent_id: agent_id.clone(),
            quote_id: job_quote.quote_id,
            idempotency_key: "demo-job-1".to_string(),
            step_up_token: None,
            override_freshness: false,
        })?;
        tracing::info!(?outcome, "job executed");
    }

    let transfer_quote = kernel.can_do(QuoteRequest {
        user_id: user_id.clone(),
        agent_id: agent_id.clone(),
        idempotency_key: "demo-transfer-1".to_string(),
        intent: serde_json::json!({"type": "usdc_transfer", "to": "0xabc123", "amount_cents": 500}),
    })?;
    tracing::info!(allowed = transfer_quote.allowed, requires_step_up = transfer_quote.requires_step_up, "transfer quoted");

    if transfer_quote.allowed && transfer_quote.requires_step_up {
        let requested = kernel.request_step_up(&user_id, &agent_id, &transfer_quote.quote_id)?;
        let code = requested.code.expect("freshly minted challenge carries a code");
        let raw_token = kernel
            .confirm_step_up(&requested.challenge_id, &code, true)?
            .expect("approval mints a token");

        let outcome = kernel.execute(ExecuteRequest {
            user_id,
            agent_id: agent_id.clone(),
            quote_id: transfer_quote.quote_id,
            idempotency_key: "demo-transfer-1".to_string(),
            step_up_token: Some(raw_token),
            override_freshness: false,
        })?;
        match &outcome {
            ExecuteOutcome::Applied { exec_id, .. } => tracing::info!(exec = exec_id.as_str(), "transfer applied"),
            other => tracing::warn!(?other, "transfer did not apply"),
        }
    }

    match kernel.verify_replay(&agent_id)? {
        Ok(()) => tracing::info!("audit chain verified"),
        Err(err) => tracing::error!(%err, "audit chain verification failed"),
    }

    Ok(())
}
