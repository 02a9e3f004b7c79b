//! Domain entities.

pub mod agent;
pub mod budget;
pub mod event;
pub mod execution;
pub mod ids;
pub mod policy;
pub mod quote;
pub mod receipt;
pub mod reservation;
pub mod snapshot;
pub mod step_up;
pub mod user;

pub use agent::{Agent, AgentStatus};
pub use budget::{Budget, BudgetError};
pub use event::{Event, EventPayload};
pub use execution::{ExecuteOutcome, Execution, ExecutionStatus};
pub use ids::{
    AgentId, ChallengeId, EventId, ExecId, PolicyId, QuoteId, ReceiptId, StepUpTokenId, UserId,
};
pub use policy::Policy;
pub use quote::Quote;
pub use receipt::{Receipt, ReceiptSource};
pub use reservation::{Reservation, ReservationKind, ReservationStatus};
pub use snapshot::{AgentSpendSnapshot, SnapshotInputs};
pub use step_up::{ChallengeStatus, StepUpChallenge, StepUpToken};
pub use user::User;
