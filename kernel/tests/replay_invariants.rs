//! Property: no matter what sequence of quote/execute/step-up operations
//! an agent goes through, its audit chain always replays clean.

use agent_kernel_core::clock::FixedClock;
use agent_kernel_core::driver::job_economy::JobEconomyDriver;
use agent_kernel_core::driver::DriverRegistry;
use agent_kernel_core::models::ids::{AgentId, UserId};
use agent_kernel_core::store::memory::MemoryStore;
use agent_kernel_core::{ExecuteRequest, Kernel, KernelConfig, QuoteRequest};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    QuoteAndExecute { idempotency_key: String, job: String },
    ReplayQuote { idempotency_key: String, job: String },
    Freeze,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..8usize, "[a-z]{3,8}").prop_map(|(i, job)| Op::QuoteAndExecute {
            idempotency_key: format!("key-{i}"),
            job,
        }),
        (0..8usize, "[a-z]{3,8}").prop_map(|(i, job)| Op::ReplayQuote {
            idempotency_key: format!("key-{i}"),
            job,
        }),
        Just(Op::Freeze),
    ]
}

fn run_ops(ops: &[Op]) {
    let mut drivers = DriverRegistry::new();
    drivers.register(Box::new(JobEconomyDriver::new(25)));
    let config = KernelConfig::builder()
        .default_credits_cents(1_000_000)
        .default_daily_spend_cents(1_000_000)
        .build()
        .unwrap();
    let kernel = Kernel::new(Box::new(MemoryStore::default()), Box::new(FixedClock::new(1_000)), drivers, config);

    let user_id = UserId::new("user_1");
    let agent_id = AgentId::new("agent_1");
    kernel.create_agent(user_id.clone(), agent_id.clone()).unwrap();

    for op in ops {
        match op {
            Op::QuoteAndExecute { idempotency_key, job } => {
                if let Ok(quote) = kernel.can_do(QuoteRequest {
                    user_id: user_id.clone(),
                    agent_id: agent_id.clone(),
                    idempotency_key: idempotency_key.clone(),
                    intent: serde_json::json!({"type": "request_job", "job": job}),
                }) {
                    let _ = kernel.execute(ExecuteRequest {
                        user_id: user_id.clone(),
                        agent_id: agent_id.clone(),
                        quote_id: quote.quote_id,
                        idempotency_key: idempotency_key.clone(),
                        step_up_token: None,
                        override_freshness: false,
                    });
                }
            }
            Op::ReplayQuote { idempotency_key, job } => {
                let _ = kernel.can_do(QuoteRequest {
                    user_id: user_id.clone(),
                    agent_id: agent_id.clone(),
                    idempotency_key: idempotency_key.clone(),
                    intent: serde_json::json!({"type": "request_job", "job": job}),
                });
            }
            Op::Freeze => {
                let _ = kernel.freeze(&agent_id, "property test");
            }
        }
    }

    assert_eq!(kernel.verify_replay(&agent_id).unwrap(), Ok(()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arbitrary_operation_sequences_always_replay_clean(ops in prop::collection::vec(op_strategy(), 0..20)) {
        run_ops(&ops);
    }
}
