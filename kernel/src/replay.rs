//! Replay Verifier — recomputes an agent's hash chain from its stored
//! events and flags the first point of divergence.
//!
//! Walks history in order, recomputes a hash at each step, and compares
//! against the persisted value rather than trusting it.

use crate::error::KernelError;
use crate::models::event::compute_event_hash;
use crate::models::ids::AgentId;
use crate::models::Event;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// The event at `index` (0-based, append order) does not chain from
    /// its predecessor the way it claims to.
    HashMismatch { index: usize, event_id: String },
    /// `prev_hash` on the first event was not `None`.
    NonNullGenesisPrevHash { event_id: String },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::HashMismatch { index, event_id } => {
                write!(f, "hash chain diverges at position {index} (event {event_id})")
            }
            ReplayError::NonNullGenesisPrevHash { event_id } => {
                write!(f, "first event {event_id} must not carry a prev_hash")
            }
        }
    }
}

/// Walks `agent_id`'s full event history in append order and recomputes
/// the hash chain. Returns the first divergent event on failure.
pub fn verify_replay(store: &dyn Store, agent_id: &AgentId) -> Result<Result<(), ReplayError>, KernelError> {
    let events = store.events_for_agent(agent_id, None)?;
    Ok(verify_chain(&events))
}

/// Pure chain verification over an explicit event slice, independent of
/// any store, so a tampered or reordered chain can be exercised directly.
pub fn verify_chain(events: &[Event]) -> Result<(), ReplayError> {
    let mut prev_hash: Option<String> = None;
    for (index, event) in events.iter().enumerate() {
        if index == 0 && event.prev_hash.is_some() {
            return Err(ReplayError::NonNullGenesisPrevHash {
                event_id: event.event_id.as_str().to_string(),
            });
        }
        if event.prev_hash != prev_hash {
            return Err(ReplayError::HashMismatch {
                index,
                event_id: event.event_id.as_str().to_string(),
            });
        }
        let recomputed = compute_event_hash(
            prev_hash.as_deref(),
            &event.agent_id,
            &event.user_id,
            &event.payload,
            event.occurred_at,
        )
        .expect("payload serialization cannot fail for a previously-persisted event");
        if recomputed != event.hash {
            return Err(ReplayError::HashMismatch {
                index,
                event_id: event.event_id.as_str().to_string(),
            });
        }
        prev_hash = Some(event.hash.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::{EventId, UserId};
    use crate::models::EventPayload;
    use crate::store::memory::MemoryStore;

    #[test]
    fn intact_chain_verifies() {
        let store = MemoryStore::default();
        let agent_id = AgentId::new("agent_1");
        let user_id = UserId::new("user_1");
        store
            .append_event(&agent_id, &user_id, EventId::new("event_1"), EventPayload::AgentCreated, 100, 100)
            .unwrap();
        store
            .append_event(
                &agent_id,
                &user_id,
                EventId::new("event_2"),
                EventPayload::AgentFrozen { reason: "manual".to_string() },
                200,
                200,
            )
            .unwrap();
        assert_eq!(verify_replay(&store, &agent_id).unwrap(), Ok(()));
    }

    #[test]
    fn tampered_hash_is_detected() {
        let store = MemoryStore::default();
        let agent_id = AgentId::new("agent_1");
        let user_id = UserId::new("user_1");
        store
            .append_event(&agent_id, &user_id, EventId::new("event_1"), EventPayload::AgentCreated, 100, 100)
            .unwrap();
        let mut events = store.events_for_agent(&agent_id, None).unwrap();
        events[0].hash = "deadbeef".to_string();
        let err = verify_chain(&events).unwrap_err();
        assert_eq!(
            err,
            ReplayError::HashMismatch {
                index: 0,
                event_id: "event_1".to_string(),
            }
        );
    }

    #[test]
    fn reordered_chain_breaks_prev_hash_linkage() {
        let store = MemoryStore::default();
        let agent_id = AgentId::new("agent_1");
        let user_id = UserId::new("user_1");
        store
            .append_event(&agent_id, &user_id, EventId::new("event_1"), EventPayload::AgentCreated, 100, 100)
            .unwrap();
        store
            .append_event(
                &agent_id,
                &user_id,
                EventId::new("event_2"),
                EventPayload::AgentFrozen { reason: "manual".to_string() },
                200,
                200,
            )
            .unwrap();
        let mut events = store.events_for_agent(&agent_id, None).unwrap();
        events.reverse();
        assert!(verify_chain(&events).is_err());
    }

    #[test]
    fn empty_history_verifies_trivially() {
        let store = MemoryStore::default();
        let agent_id = AgentId::new("agent_1");
        assert_eq!(verify_replay(&store, &agent_id).unwrap(), Ok(()));
    }
}
