//! SQLite-backed `Store`.
//!
//! Grounded in the retrieval pack's `DbBroker` (`decapod/src/core/broker.rs`):
//! a single `rusqlite::Connection` guarded by a `Mutex` and accessed only
//! through a narrow `with_conn` closure, so every statement runs against a
//! connection nobody else is touching concurrently. The append-only
//! contract itself is enforced by `schema.sql`'s `BEFORE UPDATE`/`BEFORE
//! DELETE` triggers, not by anything in this file — a storage-level
//! mutation attempt fails even if this code had a bug that tried one.

use super::Store;
use crate::error::StoreError;
use crate::models::event::compute_event_hash;
use crate::models::ids::{AgentId, ChallengeId, EventId, QuoteId, ReceiptId, StepUpTokenId, UserId};
use crate::models::{
    Agent, AgentSpendSnapshot, AgentStatus, Budget, ChallengeStatus, Event, EventPayload,
    ExecId, Execution, ExecutionStatus, Policy, Quote, Receipt, ReceiptSource, Reservation,
    ReservationKind, ReservationStatus, StepUpChallenge, StepUpToken, User,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        f(&conn)
    }
}

fn agent_status_str(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Active => "active",
        AgentStatus::Frozen => "frozen",
        AgentStatus::Dead => "dead",
    }
}

fn agent_status_from_str(s: &str) -> AgentStatus {
    match s {
        "frozen" => AgentStatus::Frozen,
        "dead" => AgentStatus::Dead,
        _ => AgentStatus::Active,
    }
}

fn execution_status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Queued => "queued",
        ExecutionStatus::Applied => "applied",
        ExecutionStatus::Failed => "failed",
    }
}

fn execution_status_from_str(s: &str) -> ExecutionStatus {
    match s {
        "applied" => ExecutionStatus::Applied,
        "failed" => ExecutionStatus::Failed,
        _ => ExecutionStatus::Queued,
    }
}

fn challenge_status_str(status: ChallengeStatus) -> &'static str {
    match status {
        ChallengeStatus::Pending => "pending",
        ChallengeStatus::Approved => "approved",
        ChallengeStatus::Denied => "denied",
        ChallengeStatus::Expired => "expired",
    }
}

fn challenge_status_from_str(s: &str) -> ChallengeStatus {
    match s {
        "approved" => ChallengeStatus::Approved,
        "denied" => ChallengeStatus::Denied,
        "expired" => ChallengeStatus::Expired,
        _ => ChallengeStatus::Pending,
    }
}

fn receipt_source_str(source: ReceiptSource) -> &'static str {
    match source {
        ReceiptSource::Policy => "policy",
        ReceiptSource::Execution => "execution",
        ReceiptSource::Env => "env",
        ReceiptSource::Repair => "repair",
    }
}

fn receipt_source_from_str(s: &str) -> ReceiptSource {
    match s {
        "execution" => ReceiptSource::Execution,
        "env" => ReceiptSource::Env,
        "repair" => ReceiptSource::Repair,
        _ => ReceiptSource::Policy,
    }
}

fn reservation_kind_str(kind: ReservationKind) -> &'static str {
    match kind {
        ReservationKind::Outgoing => "outgoing",
        ReservationKind::Hold => "hold",
    }
}

fn reservation_kind_from_str(s: &str) -> ReservationKind {
    match s {
        "hold" => ReservationKind::Hold,
        _ => ReservationKind::Outgoing,
    }
}

fn reservation_status_str(status: ReservationStatus) -> &'static str {
    match status {
        ReservationStatus::Pending => "pending",
        ReservationStatus::Released => "released",
        ReservationStatus::Settled => "settled",
    }
}

fn reservation_status_from_str(s: &str) -> ReservationStatus {
    match s {
        "released" => ReservationStatus::Released,
        "settled" => ReservationStatus::Settled,
        _ => ReservationStatus::Pending,
    }
}

impl Store for SqliteStore {
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, created_at FROM users WHERE user_id = ?1",
                params![user_id.as_str()],
                |row| {
                    Ok(User {
                        user_id: UserId::new(row.get::<_, String>(0)?),
                        created_at: row.get::<_, i64>(1)? as u64,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, created_at) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO NOTHING",
                params![user.user_id.as_str(), user.created_at as i64],
            )?;
            Ok(())
        })
    }

    fn get_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT agent_id, user_id, status, created_at, updated_at FROM agents WHERE agent_id = ?1",
                params![agent_id.as_str()],
                |row| {
                    Ok(Agent {
                        agent_id: AgentId::new(row.get::<_, String>(0)?),
                        user_id: UserId::new(row.get::<_, String>(1)?),
                        status: agent_status_from_str(&row.get::<_, String>(2)?),
                        created_at: row.get::<_, i64>(3)? as u64,
                        updated_at: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn save_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agents (agent_id, user_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(agent_id) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
                params![
                    agent.agent_id.as_str(),
                    agent.user_id.as_str(),
                    agent_status_str(agent.status),
                    agent.created_at as i64,
                    agent.updated_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn get_latest_policy(&self, agent_id: &AgentId) -> Result<Option<Policy>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT body_json FROM policies WHERE agent_id = ?1 ORDER BY created_at DESC LIMIT 1",
                params![agent_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|body| serde_json::from_str(&body).map_err(StoreError::from))
            .transpose()
        })
    }

    fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let body = serde_json::to_string(policy)?;
            conn.execute(
                "INSERT INTO policies (policy_id, agent_id, user_id, body_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    policy.policy_id.as_str(),
                    policy.agent_id.as_str(),
                    policy.user_id.as_str(),
                    body,
                    policy.created_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn get_budget(&self, agent_id: &AgentId) -> Result<Option<Budget>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT agent_id, credits_cents, daily_spend_cents, daily_spend_used_cents, last_reset_at
                 FROM budgets WHERE agent_id = ?1",
                params![agent_id.as_str()],
                |row| {
                    Ok(Budget {
                        agent_id: AgentId::new(row.get::<_, String>(0)?),
                        credits_cents: row.get(1)?,
                        daily_spend_cents: row.get(2)?,
                        daily_spend_used_cents: row.get(3)?,
                        last_reset_at: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn save_budget(&self, budget: &Budget) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO budgets (agent_id, credits_cents, daily_spend_cents, daily_spend_used_cents, last_reset_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(agent_id) DO UPDATE SET
                    credits_cents = excluded.credits_cents,
                    daily_spend_cents = excluded.daily_spend_cents,
                    daily_spend_used_cents = excluded.daily_spend_used_cents,
                    last_reset_at = excluded.last_reset_at",
                params![
                    budget.agent_id.as_str(),
                    budget.credits_cents,
                    budget.daily_spend_cents,
                    budget.daily_spend_used_cents,
                    budget.last_reset_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn get_quote_by_idempotency(
        &self,
        agent_id: &AgentId,
        idempotency_key: &str,
    ) -> Result<Option<Quote>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT body_json FROM quotes WHERE agent_id = ?1 AND idempotency_key = ?2",
                params![agent_id.as_str(), idempotency_key],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|body| serde_json::from_str(&body).map_err(StoreError::from))
            .transpose()
        })
    }

    fn get_quote(&self, quote_id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT body_json FROM quotes WHERE quote_id = ?1",
                params![quote_id.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|body| serde_json::from_str(&body).map_err(StoreError::from))
            .transpose()
        })
    }

    fn insert_quote(&self, quote: &Quote) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let body = serde_json::to_string(quote)?;
            conn.execute(
                "INSERT INTO quotes (quote_id, agent_id, user_id, idempotency_key, body_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    quote.quote_id.as_str(),
                    quote.agent_id.as_str(),
                    quote.user_id.as_str(),
                    quote.idempotency_key,
                    body,
                    quote.created_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn get_execution_by_quote(&self, quote_id: &QuoteId) -> Result<Option<Execution>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT exec_id, agent_id, user_id, status, external_ref, created_at, updated_at
                 FROM executions WHERE quote_id = ?1",
                params![quote_id.as_str()],
                |row| {
                    Ok(Execution {
                        exec_id: ExecId::new(row.get::<_, String>(0)?),
                        quote_id: quote_id.clone(),
                        agent_id: AgentId::new(row.get::<_, String>(1)?),
                        user_id: UserId::new(row.get::<_, String>(2)?),
                        status: execution_status_from_str(&row.get::<_, String>(3)?),
                        external_ref: row.get(4)?,
                        created_at: row.get::<_, i64>(5)? as u64,
                        updated_at: row.get::<_, i64>(6)? as u64,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let quote_body: Option<String> = conn
                .query_row(
                    "SELECT body_json FROM quotes WHERE quote_id = ?1",
                    params![execution.quote_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let intent_type = quote_body
                .and_then(|body| serde_json::from_str::<Quote>(&body).ok())
                .and_then(|q| q.intent_json.get("type").and_then(|t| t.as_str()).map(str::to_string))
                .unwrap_or_default();
            conn.execute(
                "INSERT INTO executions (quote_id, exec_id, agent_id, user_id, status, external_ref, created_at, updated_at, intent_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    execution.quote_id.as_str(),
                    execution.exec_id.as_str(),
                    execution.agent_id.as_str(),
                    execution.user_id.as_str(),
                    execution_status_str(execution.status),
                    execution.external_ref,
                    execution.created_at as i64,
                    execution.updated_at as i64,
                    intent_type,
                ],
            )?;
            Ok(())
        })
    }

    fn update_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE executions SET status = ?2, external_ref = ?3, updated_at = ?4 WHERE quote_id = ?1",
                params![
                    execution.quote_id.as_str(),
                    execution_status_str(execution.status),
                    execution.external_ref,
                    execution.updated_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn append_event(
        &self,
        agent_id: &AgentId,
        user_id: &UserId,
        event_id: EventId,
        payload: EventPayload,
        occurred_at: u64,
        created_at: u64,
    ) -> Result<Event, StoreError> {
        self.with_conn(|conn| {
            let prev_hash: Option<String> = conn
                .query_row(
                    "SELECT hash FROM events WHERE agent_id = ?1 ORDER BY seq DESC LIMIT 1",
                    params![agent_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let next_seq: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE agent_id = ?1",
                    params![agent_id.as_str()],
                    |row| row.get(0),
                )?;
            let hash = compute_event_hash(prev_hash.as_deref(), agent_id, user_id, &payload, occurred_at)?;
            let payload_json = serde_json::to_string(&payload)?;
            conn.execute(
                "INSERT INTO events (event_id, agent_id, user_id, event_type, payload_json, occurred_at, created_at, prev_hash, hash, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    event_id.as_str(),
                    agent_id.as_str(),
                    user_id.as_str(),
                    payload.event_type(),
                    payload_json,
                    occurred_at as i64,
                    created_at as i64,
                    prev_hash,
                    hash,
                    next_seq,
                ],
            )?;
            Ok(Event {
                event_id,
                agent_id: agent_id.clone(),
                user_id: user_id.clone(),
                payload,
                occurred_at,
                created_at,
                prev_hash,
                hash,
            })
        })
    }

    fn events_for_agent(&self, agent_id: &AgentId, since: Option<u64>) -> Result<Vec<Event>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id, user_id, payload_json, occurred_at, created_at, prev_hash, hash
                 FROM events WHERE agent_id = ?1 AND occurred_at >= ?2 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![agent_id.as_str(), since.unwrap_or(0) as i64], |row| {
                let payload_json: String = row.get(2)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    payload_json,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?;
            let mut events = Vec::new();
            for row in rows {
                let (event_id, user_id, payload_json, occurred_at, created_at, prev_hash, hash) = row?;
                let payload: EventPayload = serde_json::from_str(&payload_json)?;
                events.push(Event {
                    event_id: EventId::new(event_id),
                    agent_id: agent_id.clone(),
                    user_id: UserId::new(user_id),
                    payload,
                    occurred_at: occurred_at as u64,
                    created_at: created_at as u64,
                    prev_hash,
                    hash,
                });
            }
            Ok(events)
        })
    }

    fn latest_event(&self, agent_id: &AgentId) -> Result<Option<Event>, StoreError> {
        Ok(self.events_for_agent(agent_id, None)?.into_iter().last())
    }

    fn append_receipt(&self, receipt: Receipt) -> Result<Receipt, StoreError> {
        self.with_conn(|conn| {
            let next_seq: i64 = conn.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM receipts WHERE agent_id = ?1",
                params![receipt.agent_id.as_str()],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO receipts (receipt_id, agent_id, user_id, source, event_id, external_ref,
                    what_happened, why_changed, what_happens_next, occurred_at, created_at, seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    receipt.receipt_id.as_str(),
                    receipt.agent_id.as_str(),
                    receipt.user_id.as_str(),
                    receipt_source_str(receipt.source),
                    receipt.event_id.as_ref().map(|e| e.as_str()),
                    receipt.external_ref,
                    receipt.what_happened,
                    receipt.why_changed,
                    receipt.what_happens_next,
                    receipt.occurred_at as i64,
                    receipt.created_at as i64,
                    next_seq,
                ],
            )?;
            Ok(receipt)
        })
    }

    fn receipts_for_agent(&self, agent_id: &AgentId, since: Option<u64>) -> Result<Vec<Receipt>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT receipt_id, user_id, source, event_id, external_ref, what_happened, why_changed,
                    what_happens_next, occurred_at, created_at
                 FROM receipts WHERE agent_id = ?1 AND occurred_at >= ?2 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![agent_id.as_str(), since.unwrap_or(0) as i64], |row| {
                Ok(Receipt {
                    receipt_id: ReceiptId::new(row.get::<_, String>(0)?),
                    agent_id: agent_id.clone(),
                    user_id: UserId::new(row.get::<_, String>(1)?),
                    source: receipt_source_from_str(&row.get::<_, String>(2)?),
                    event_id: row.get::<_, Option<String>>(3)?.map(crate::models::ids::EventId::new),
                    external_ref: row.get(4)?,
                    what_happened: row.get(5)?,
                    why_changed: row.get(6)?,
                    what_happens_next: row.get(7)?,
                    occurred_at: row.get::<_, i64>(8)? as u64,
                    created_at: row.get::<_, i64>(9)? as u64,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
    }

    fn get_receipt(&self, agent_id: &AgentId, receipt_id: &ReceiptId) -> Result<Option<Receipt>, StoreError> {
        Ok(self
            .receipts_for_agent(agent_id, None)?
            .into_iter()
            .find(|r| &r.receipt_id == receipt_id))
    }

    fn insert_challenge(&self, challenge: &StepUpChallenge) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO step_up_challenges (id, user_id, agent_id, quote_id, status, code_hash, created_at, expires_at, approved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    challenge.id.as_str(),
                    challenge.user_id.as_str(),
                    challenge.agent_id.as_str(),
                    challenge.quote_id.as_str(),
                    challenge_status_str(challenge.status),
                    challenge.code_hash,
                    challenge.created_at as i64,
                    challenge.expires_at as i64,
                    challenge.approved_at.map(|v| v as i64),
                ],
            )?;
            Ok(())
        })
    }

    fn get_pending_challenge(
        &self,
        agent_id: &AgentId,
        quote_id: &QuoteId,
    ) -> Result<Option<StepUpChallenge>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, status, code_hash, created_at, expires_at, approved_at
                 FROM step_up_challenges WHERE agent_id = ?1 AND quote_id = ?2 ORDER BY created_at DESC LIMIT 1",
                params![agent_id.as_str(), quote_id.as_str()],
                |row| {
                    Ok(StepUpChallenge {
                        id: ChallengeId::new(row.get::<_, String>(0)?),
                        user_id: UserId::new(row.get::<_, String>(1)?),
                        agent_id: agent_id.clone(),
                        quote_id: quote_id.clone(),
                        status: challenge_status_from_str(&row.get::<_, String>(2)?),
                        code_hash: row.get(3)?,
                        created_at: row.get::<_, i64>(4)? as u64,
                        expires_at: row.get::<_, i64>(5)? as u64,
                        approved_at: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn get_challenge(&self, id: &ChallengeId) -> Result<Option<StepUpChallenge>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, agent_id, quote_id, status, code_hash, created_at, expires_at, approved_at
                 FROM step_up_challenges WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(StepUpChallenge {
                        id: id.clone(),
                        user_id: UserId::new(row.get::<_, String>(0)?),
                        agent_id: AgentId::new(row.get::<_, String>(1)?),
                        quote_id: QuoteId::new(row.get::<_, String>(2)?),
                        status: challenge_status_from_str(&row.get::<_, String>(3)?),
                        code_hash: row.get(4)?,
                        created_at: row.get::<_, i64>(5)? as u64,
                        expires_at: row.get::<_, i64>(6)? as u64,
                        approved_at: row.get::<_, Option<i64>>(7)?.map(|v| v as u64),
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn update_challenge(&self, challenge: &StepUpChallenge) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE step_up_challenges SET status = ?2, approved_at = ?3 WHERE id = ?1",
                params![
                    challenge.id.as_str(),
                    challenge_status_str(challenge.status),
                    challenge.approved_at.map(|v| v as i64),
                ],
            )?;
            Ok(())
        })
    }

    fn insert_token(&self, token: &StepUpToken) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO step_up_tokens (id, challenge_id, token_hash, created_at, expires_at, revoked)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    token.id.as_str(),
                    token.challenge_id.as_str(),
                    token.token_hash,
                    token.created_at as i64,
                    token.expires_at as i64,
                    token.revoked as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn get_token_by_hash(&self, token_hash: &str) -> Result<Option<StepUpToken>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, challenge_id, created_at, expires_at, revoked FROM step_up_tokens WHERE token_hash = ?1",
                params![token_hash],
                |row| {
                    Ok(StepUpToken {
                        id: StepUpTokenId::new(row.get::<_, String>(0)?),
                        challenge_id: ChallengeId::new(row.get::<_, String>(1)?),
                        token_hash: token_hash.to_string(),
                        created_at: row.get::<_, i64>(2)? as u64,
                        expires_at: row.get::<_, i64>(3)? as u64,
                        revoked: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn update_token(&self, token: &StepUpToken) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE step_up_tokens SET revoked = ?2 WHERE token_hash = ?1",
                params![token.token_hash, token.revoked as i64],
            )?;
            Ok(())
        })
    }

    fn insert_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reservations (reservation_id, agent_id, kind, amount_cents, status, external_ref, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    reservation.reservation_id,
                    reservation.agent_id.as_str(),
                    reservation_kind_str(reservation.kind),
                    reservation.amount_cents,
                    reservation_status_str(reservation.status),
                    reservation.external_ref,
                    reservation.created_at as i64,
                    reservation.updated_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn update_reservation(&self, reservation: &Reservation) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE reservations SET status = ?2, updated_at = ?3 WHERE reservation_id = ?1",
                params![
                    reservation.reservation_id,
                    reservation_status_str(reservation.status),
                    reservation.updated_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn reservations_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Reservation>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT reservation_id, kind, amount_cents, status, external_ref, created_at, updated_at
                 FROM reservations WHERE agent_id = ?1",
            )?;
            let rows = stmt.query_map(params![agent_id.as_str()], |row| {
                Ok(Reservation {
                    reservation_id: row.get(0)?,
                    agent_id: agent_id.clone(),
                    kind: reservation_kind_from_str(&row.get::<_, String>(1)?),
                    amount_cents: row.get(2)?,
                    status: reservation_status_from_str(&row.get::<_, String>(3)?),
                    external_ref: row.get(4)?,
                    created_at: row.get::<_, i64>(5)? as u64,
                    updated_at: row.get::<_, i64>(6)? as u64,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
    }

    fn get_snapshot(&self, agent_id: &AgentId) -> Result<Option<AgentSpendSnapshot>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT confirmed_balance_cents, reserved_outgoing_cents, reserved_holds_cents,
                    policy_spendable_cents, effective_spend_power_cents, updated_at
                 FROM agent_spend_snapshot WHERE agent_id = ?1",
                params![agent_id.as_str()],
                |row| {
                    Ok(AgentSpendSnapshot {
                        agent_id: agent_id.clone(),
                        confirmed_balance_cents: row.get(0)?,
                        reserved_outgoing_cents: row.get(1)?,
                        reserved_holds_cents: row.get(2)?,
                        policy_spendable_cents: row.get(3)?,
                        effective_spend_power_cents: row.get(4)?,
                        updated_at: row.get::<_, i64>(5)? as u64,
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
    }

    fn save_snapshot(&self, snapshot: &AgentSpendSnapshot) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agent_spend_snapshot (agent_id, confirmed_balance_cents, reserved_outgoing_cents,
                    reserved_holds_cents, policy_spendable_cents, effective_spend_power_cents, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(agent_id) DO UPDATE SET
                    confirmed_balance_cents = excluded.confirmed_balance_cents,
                    reserved_outgoing_cents = excluded.reserved_outgoing_cents,
                    reserved_holds_cents = excluded.reserved_holds_cents,
                    policy_spendable_cents = excluded.policy_spendable_cents,
                    effective_spend_power_cents = excluded.effective_spend_power_cents,
                    updated_at = excluded.updated_at",
                params![
                    snapshot.agent_id.as_str(),
                    snapshot.confirmed_balance_cents,
                    snapshot.reserved_outgoing_cents,
                    snapshot.reserved_holds_cents,
                    snapshot.policy_spendable_cents,
                    snapshot.effective_spend_power_cents,
                    snapshot.updated_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    fn applied_count_today(
        &self,
        agent_id: &AgentId,
        intent_type: &str,
        day_start: u64,
    ) -> Result<u32, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM executions
                 WHERE agent_id = ?1 AND status = 'applied' AND updated_at >= ?2 AND intent_type = ?3",
                params![agent_id.as_str(), day_start as i64, intent_type],
                |row| row.get(0),
            )?;
            Ok(count as u32)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventPayload;

    #[test]
    fn append_only_triggers_reject_update_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let agent_id = AgentId::new("agent_1");
        let user_id = UserId::new("user_1");
        store
            .append_event(&agent_id, &user_id, EventId::new("event_1"), EventPayload::AgentCreated, 100, 100)
            .unwrap();

        let result = store.with_conn(|conn| {
            conn.execute("UPDATE events SET hash = 'tampered' WHERE event_id = 'event_1'", [])
                .map_err(StoreError::from)
        });
        assert!(result.is_err());

        let result = store.with_conn(|conn| {
            conn.execute("DELETE FROM events WHERE event_id = 'event_1'", [])
                .map_err(StoreError::from)
        });
        assert!(result.is_err());
    }

    #[test]
    fn event_chain_persists_prev_hash_across_reopen_of_same_connection() {
        let store = SqliteStore::open_in_memory().unwrap();
        let agent_id = AgentId::new("agent_1");
        let user_id = UserId::new("user_1");
        let first = store
            .append_event(&agent_id, &user_id, EventId::new("event_1"), EventPayload::AgentCreated, 100, 100)
            .unwrap();
        let second = store
            .append_event(
                &agent_id,
                &user_id,
                EventId::new("event_2"),
                EventPayload::AgentFrozen { reason: "manual".to_string() },
                200,
                200,
            )
            .unwrap();
        assert_eq!(second.prev_hash, Some(first.hash));
        let events = store.events_for_agent(&agent_id, None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, EventId::new("event_1"));
    }

    #[test]
    fn quote_idempotency_key_is_unique_per_agent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let quote = Quote {
            quote_id: QuoteId::new("quote_1"),
            user_id: UserId::new("user_1"),
            agent_id: AgentId::new("agent_1"),
            intent_json: serde_json::json!({"type": "request_job"}),
            allowed: true,
            requires_step_up: false,
            reason: None,
            expires_at: 300,
            idempotency_key: "idem-1".to_string(),
            created_at: 0,
            base_cost_cents: 50,
            transfer_amount_cents: 0,
        };
        store.insert_quote(&quote).unwrap();
        let mut duplicate = quote.clone();
        duplicate.quote_id = QuoteId::new("quote_2");
        assert!(store.insert_quote(&duplicate).is_err());
    }
}
