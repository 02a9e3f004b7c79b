//! Opaque, prefixed identifiers.
//!
//! Every entity in the kernel is addressed by an opaque string carrying a
//! human-readable prefix (`agent_…`, `quote_…`, `exec_…`). Newtypes keep the
//! compiler from letting an `AgentId` slide into a slot that expects a
//! `QuoteId`.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }
    };
}

opaque_id!(UserId, "Identifies the principal that owns one or more agents.");
opaque_id!(AgentId, "Identifies a bounded actor mediated by the kernel.");
opaque_id!(PolicyId, "Identifies a policy revision attached to an agent.");
opaque_id!(QuoteId, "Identifies an idempotent, expiring quote record.");
opaque_id!(ExecId, "Identifies an execution attempt against a quote.");
opaque_id!(EventId, "Identifies a single hash-chained audit event.");
opaque_id!(ReceiptId, "Identifies a human-grade audit receipt.");
opaque_id!(ChallengeId, "Identifies a step-up challenge.");
opaque_id!(StepUpTokenId, "Identifies an issued step-up token.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_string() {
        let id = AgentId::new("agent_abc123");
        assert_eq!(id.to_string(), "agent_abc123");
        assert_eq!(id.as_str(), "agent_abc123");
    }

    #[test]
    fn distinct_id_types_do_not_compare() {
        let agent = AgentId::new("x");
        let quote = QuoteId::new("x");
        assert_eq!(agent.as_str(), quote.as_str());
        // Different types entirely; this just documents that the newtype
        // wrapping is the only thing keeping them apart at compile time.
    }
}
