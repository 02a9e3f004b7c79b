//! Timeline — merged, human-readable view over events and receipts.

use crate::error::KernelError;
use crate::models::ids::{AgentId, ReceiptId};
use crate::models::{AgentSpendSnapshot, Event, Receipt};
use crate::store::Store;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub snapshot: Option<AgentSpendSnapshot>,
    pub latest_event: Option<Event>,
}

/// A single merged timeline row: either a raw audit event or a grounding
/// receipt, ordered by `occurred_at` descending with `id` as a tiebreak.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEntry {
    Event(Event),
    Receipt(Receipt),
}

fn entry_key(entry: &TimelineEntry) -> (u64, std::cmp::Reverse<String>) {
    match entry {
        TimelineEntry::Event(e) => (e.occurred_at, std::cmp::Reverse(e.event_id.as_str().to_string())),
        TimelineEntry::Receipt(r) => (r.occurred_at, std::cmp::Reverse(r.receipt_id.as_str().to_string())),
    }
}

pub fn get_state(store: &dyn Store, agent_id: &AgentId) -> Result<AgentState, KernelError> {
    Ok(AgentState {
        snapshot: store.get_snapshot(agent_id)?,
        latest_event: store.latest_event(agent_id)?,
    })
}

pub fn get_receipts(store: &dyn Store, agent_id: &AgentId, since: Option<u64>) -> Result<Vec<Receipt>, KernelError> {
    let mut receipts = store.receipts_for_agent(agent_id, since)?;
    receipts.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then(b.receipt_id.as_str().cmp(a.receipt_id.as_str())));
    Ok(receipts)
}

/// Merges events and receipts into one chronological view, newest first,
/// optionally capped at `limit` rows.
pub fn get_timeline(
    store: &dyn Store,
    agent_id: &AgentId,
    since: Option<u64>,
    limit: Option<usize>,
) -> Result<Vec<TimelineEntry>, KernelError> {
    let events = store.events_for_agent(agent_id, since)?;
    let receipts = store.receipts_for_agent(agent_id, since)?;
    let mut entries: Vec<TimelineEntry> = events
        .into_iter()
        .map(TimelineEntry::Event)
        .chain(receipts.into_iter().map(TimelineEntry::Receipt))
        .collect();
    entries.sort_by(|a, b| entry_key(a).cmp(&entry_key(b)));
    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    Ok(entries)
}

pub fn get_receipt_with_facts(
    store: &dyn Store,
    agent_id: &AgentId,
    receipt_id: &ReceiptId,
) -> Result<Option<Receipt>, KernelError> {
    Ok(store.get_receipt(agent_id, receipt_id)?)
}
