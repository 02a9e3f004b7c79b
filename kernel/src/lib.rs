//! Agent Constraint Kernel
//!
//! Mediates every externally-visible action a semi-autonomous agent takes
//! against a persistent economic environment through a quote, step-up, and
//! execute pipeline, recording every decision on an append-only,
//! hash-chained audit log.
//!
//! # Architecture
//!
//! - **models**: domain entities (Agent, Budget, Policy, Quote, Execution,
//!   Event, Receipt, Reservation, StepUp)
//! - **store**: the storage contract and its in-memory and SQLite backings
//! - **driver**: pluggable intent drivers and the environments they wrap
//! - **policy_eval**: the pure allow/deny/step-up judgment
//! - **quote_engine**, **execute_engine**: the two commit paths
//! - **step_up_machine**: human-in-the-loop confirmation
//! - **timeline**, **replay**: read-side views and audit-chain verification
//! - **lifecycle**: agent admission, freezing, token revocation
//! - **kernel**: the facade tying the above together
//!
//! # Critical invariants
//!
//! 1. All money values are `i64` cents.
//! 2. The audit log is append-only and hash-chained; nothing is ever
//!    mutated or deleted once written.
//! 3. The core never raises through a commit: policy and driver rejections
//!    surface as data, not as `Err`.

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod execute_engine;
pub mod freshness;
pub mod kernel;
pub mod lifecycle;
pub mod models;
pub mod policy_eval;
pub mod quote_engine;
pub mod replay;
pub mod step_up_machine;
pub mod store;
pub mod timeline;

pub use config::{AutoApproveRoute, KernelConfig};
pub use error::KernelError;
pub use execute_engine::ExecuteRequest;
pub use kernel::Kernel;
pub use quote_engine::QuoteRequest;
pub use replay::ReplayError;
pub use step_up_machine::StepUpRequested;
