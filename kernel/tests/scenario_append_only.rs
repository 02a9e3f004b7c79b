//! The audit log grows monotonically and every event chains from its
//! predecessor's hash; nothing is ever rewritten.

use agent_kernel_core::clock::FixedClock;
use agent_kernel_core::driver::job_economy::JobEconomyDriver;
use agent_kernel_core::driver::DriverRegistry;
use agent_kernel_core::models::ids::{AgentId, UserId};
use agent_kernel_core::store::memory::MemoryStore;
use agent_kernel_core::{ExecuteRequest, Kernel, KernelConfig, QuoteRequest};

fn kernel() -> Kernel {
    let mut drivers = DriverRegistry::new();
    drivers.register(Box::new(JobEconomyDriver::new(50)));
    let config = KernelConfig::builder()
        .default_credits_cents(10_000)
        .default_daily_spend_cents(10_000)
        .build()
        .unwrap();
    Kernel::new(Box::new(MemoryStore::default()), Box::new(FixedClock::new(1_000)), drivers, config)
}

#[test]
fn events_accumulate_and_chain_without_ever_shrinking() {
    let kernel = kernel();
    let user_id = UserId::new("user_1");
    let agent_id = AgentId::new("agent_1");
    kernel.create_agent(user_id.clone(), agent_id.clone()).unwrap();

    let mut previous_len = kernel.get_timeline(&agent_id, None, None).unwrap().len();
    assert!(previous_len >= 1, "agent_created must already be on the chain");

    for i in 0..5 {
        let quote = kernel
            .can_do(QuoteRequest {
                user_id: user_id.clone(),
                agent_id: agent_id.clone(),
                idempotency_key: format!("job-{i}"),
                intent: serde_json::json!({"type": "request_job", "job": "render_frame"}),
            })
            .unwrap();
        kernel
            .execute(ExecuteRequest {
                user_id: user_id.clone(),
                agent_id: agent_id.clone(),
                quote_id: quote.quote_id,
                idempotency_key: format!("job-{i}"),
                step_up_token: None,
                override_freshness: false,
            })
            .unwrap();

        let len = kernel.get_timeline(&agent_id, None, None).unwrap().len();
        assert!(len > previous_len, "timeline must grow with every quote/execute pair");
        previous_len = len;
    }

    assert_eq!(kernel.verify_replay(&agent_id).unwrap(), Ok(()));
}

#[test]
fn every_receipt_names_a_causal_event() {
    let kernel = kernel();
    let user_id = UserId::new("user_1");
    let agent_id = AgentId::new("agent_1");
    kernel.create_agent(user_id.clone(), agent_id.clone()).unwrap();

    let quote = kernel
        .can_do(QuoteRequest {
            user_id,
            agent_id: agent_id.clone(),
            idempotency_key: "job-1".to_string(),
            intent: serde_json::json!({"type": "request_job", "job": "render_frame"}),
        })
        .unwrap();
    assert!(quote.allowed);

    let receipts = kernel.get_receipts(&agent_id, None).unwrap();
    assert!(!receipts.is_empty());
    for receipt in receipts {
        assert!(receipt.event_id.is_some(), "every receipt must cite the event that caused it");
    }
}
