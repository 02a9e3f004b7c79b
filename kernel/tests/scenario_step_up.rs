//! Step-up challenge/confirm/execute flow for a balance-backed transfer,
//! including a wrong-code rejection and a denied challenge.

use agent_kernel_core::clock::FixedClock;
use agent_kernel_core::driver::transfer::{BalanceTransferDriver, FakeEnvironment};
use agent_kernel_core::driver::DriverRegistry;
use agent_kernel_core::models::ids::{AgentId, UserId};
use agent_kernel_core::models::ExecuteOutcome;
use agent_kernel_core::store::memory::MemoryStore;
use agent_kernel_core::{ExecuteRequest, Kernel, KernelConfig, QuoteRequest};

fn kernel() -> Kernel {
    let mut drivers = DriverRegistry::new();
    drivers.register(Box::new(BalanceTransferDriver::new(Box::new(FakeEnvironment::new(1_000_000)))));
    let config = KernelConfig::builder()
        .default_credits_cents(10_000)
        .default_daily_spend_cents(10_000)
        .build()
        .unwrap();
    Kernel::new(Box::new(MemoryStore::default()), Box::new(FixedClock::new(1_000)), drivers, config)
}

fn transfer_intent(amount_cents: i64) -> serde_json::Value {
    serde_json::json!({"type": "usdc_transfer", "to": "0xabc123", "amount_cents": amount_cents})
}

#[test]
fn approved_step_up_unlocks_execution() {
    let kernel = kernel();
    let user_id = UserId::new("user_1");
    let agent_id = AgentId::new("agent_1");
    kernel.create_agent(user_id.clone(), agent_id.clone()).unwrap();

    let quote = kernel
        .can_do(QuoteRequest {
            user_id: user_id.clone(),
            agent_id: agent_id.clone(),
            idempotency_key: "transfer-1".to_string(),
            intent: transfer_intent(250),
        })
        .unwrap();
    assert!(quote.allowed);
    assert!(quote.requires_step_up);

    let blocked = kernel
        .execute(ExecuteRequest {
            user_id: user_id.clone(),
            agent_id: agent_id.clone(),
            quote_id: quote.quote_id.clone(),
            idempotency_key: "transfer-1".to_string(),
            step_up_token: None,
            override_freshness: false,
        })
        .unwrap_err();
    assert_eq!(blocked.reason(), "step_up_required");

    let requested = kernel.request_step_up(&user_id, &agent_id, &quote.quote_id).unwrap();
    let code = requested.code.expect("freshly minted challenge carries a code");
    let token = kernel
        .confirm_step_up(&requested.challenge_id, &code, true)
        .unwrap()
        .expect("approval mints a token");

    let outcome = kernel
        .execute(ExecuteRequest {
            user_id,
            agent_id,
            quote_id: quote.quote_id,
            idempotency_key: "transfer-1".to_string(),
            step_up_token: Some(token),
            override_freshness: false,
        })
        .unwrap();
    assert!(matches!(outcome, ExecuteOutcome::Applied { external_ref: Some(_), .. }));
}

#[test]
fn wrong_code_does_not_mint_a_token() {
    let kernel = kernel();
    let user_id = UserId::new("user_1");
    let agent_id = AgentId::new("agent_1");
    kernel.create_agent(user_id.clone(), agent_id.clone()).unwrap();

    let quote = kernel
        .can_do(QuoteRequest {
            user_id: user_id.clone(),
            agent_id: agent_id.clone(),
            idempotency_key: "transfer-1".to_string(),
            intent: transfer_intent(250),
        })
        .unwrap();
    let requested = kernel.request_step_up(&user_id, &agent_id, &quote.quote_id).unwrap();
    let err = kernel.confirm_step_up(&requested.challenge_id, "000000", true).unwrap_err();
    assert_eq!(err.reason(), "invalid_code");
}

#[test]
fn denied_challenge_leaves_the_quote_unexecutable() {
    let kernel = kernel();
    let user_id = UserId::new("user_1");
    let agent_id = AgentId::new("agent_1");
    kernel.create_agent(user_id.clone(), agent_id.clone()).unwrap();

    let quote = kernel
        .can_do(QuoteRequest {
            user_id: user_id.clone(),
            agent_id: agent_id.clone(),
            idempotency_key: "transfer-1".to_string(),
            intent: transfer_intent(250),
        })
        .unwrap();
    let requested = kernel.request_step_up(&user_id, &agent_id, &quote.quote_id).unwrap();
    let code = requested.code.unwrap();
    let token = kernel.confirm_step_up(&requested.challenge_id, &code, false).unwrap();
    assert!(token.is_none());

    let err = kernel
        .execute(ExecuteRequest {
            user_id,
            agent_id,
            quote_id: quote.quote_id,
            idempotency_key: "transfer-1".to_string(),
            step_up_token: None,
            override_freshness: false,
        })
        .unwrap_err();
    assert_eq!(err.reason(), "step_up_required");
}
