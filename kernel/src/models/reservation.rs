//! Reservations — outgoing transfers and holds that reduce spend power
//! without changing confirmed balance.

use super::ids::AgentId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Released,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationKind {
    Outgoing,
    Hold,
}

/// A pending outgoing transfer (e.g. broadcast but unconfirmed) or a
/// driver-initiated hold. Both decrement `effective_spend_power` until
/// released or settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: String,
    pub agent_id: AgentId,
    pub kind: ReservationKind,
    pub amount_cents: i64,
    pub status: ReservationStatus,
    pub external_ref: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Reservation {
    pub fn new(
        reservation_id: String,
        agent_id: AgentId,
        kind: ReservationKind,
        amount_cents: i64,
        external_ref: Option<String>,
        now: u64,
    ) -> Self {
        Self {
            reservation_id,
            agent_id,
            kind,
            amount_cents,
            status: ReservationStatus::Pending,
            external_ref,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    pub fn release(&mut self, now: u64) {
        self.status = ReservationStatus::Released;
        self.updated_at = now;
    }

    pub fn settle(&mut self, now: u64) {
        self.status = ReservationStatus::Settled;
        self.updated_at = now;
    }
}

/// Sums pending reservations of a given kind for a snapshot refresh.
pub fn sum_pending(reservations: &[Reservation], kind: ReservationKind) -> i64 {
    reservations
        .iter()
        .filter(|r| r.kind == kind && r.is_pending())
        .map(|r| r.amount_cents)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_pending_ignores_released_and_other_kind() {
        let mut released = Reservation::new(
            "res_1".to_string(),
            AgentId::new("agent_1"),
            ReservationKind::Outgoing,
            100,
            None,
            0,
        );
        released.release(10);
        let pending_outgoing = Reservation::new(
            "res_2".to_string(),
            AgentId::new("agent_1"),
            ReservationKind::Outgoing,
            50,
            None,
            0,
        );
        let pending_hold = Reservation::new(
            "res_3".to_string(),
            AgentId::new("agent_1"),
            ReservationKind::Hold,
            999,
            None,
            0,
        );
        let reservations = vec![released, pending_outgoing, pending_hold];
        assert_eq!(sum_pending(&reservations, ReservationKind::Outgoing), 50);
    }
}
