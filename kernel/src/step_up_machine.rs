//! Step-Up State Machine — human-in-the-loop approval for quotes the
//! Policy Evaluator marked `requires_step_up`.
//!
//! A pending record minted once, moved through a small explicit state
//! machine, and never mutated outside that machine. The raw confirmation
//! code and the raw bearer token are each held only in the caller's hand;
//! the store persists nothing but their SHA256 hashes.

use crate::clock::{new_id, Clock};
use crate::config::KernelConfig;
use crate::error::{AuthzError, KernelError};
use crate::models::ids::{AgentId, ChallengeId, EventId, QuoteId, ReceiptId, StepUpTokenId, UserId};
use crate::models::{ChallengeStatus, EventPayload, Receipt, ReceiptSource, StepUpChallenge, StepUpToken};
use crate::store::Store;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Returned by [`request`]: the challenge identifier always, and the raw
/// code only when a challenge was freshly minted (a replayed request
/// against a still-live challenge never re-reveals the code).
pub struct StepUpRequested {
    pub challenge_id: ChallengeId,
    pub code: Option<String>,
}

fn hash_code(challenge_id: &ChallengeId, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge_id.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(code.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

/// `request(user, agent, quote)`: returns the already-live challenge for
/// this quote if one exists, otherwise mints a new one.
pub fn request(
    store: &dyn Store,
    clock: &dyn Clock,
    config: &KernelConfig,
    user_id: &UserId,
    agent_id: &AgentId,
    quote_id: &QuoteId,
) -> Result<StepUpRequested, KernelError> {
    let now = clock.now_seconds();
    if let Some(existing) = store.get_pending_challenge(agent_id, quote_id)? {
        if existing.is_live(now) {
            return Ok(StepUpRequested {
                challenge_id: existing.id,
                code: None,
            });
        }
    }

    let code = random_code();
    let challenge_id = ChallengeId::new(new_id("challenge"));
    let challenge = StepUpChallenge {
        code_hash: hash_code(&challenge_id, &code),
        id: challenge_id,
        user_id: user_id.clone(),
        agent_id: agent_id.clone(),
        quote_id: quote_id.clone(),
        status: ChallengeStatus::Pending,
        created_at: now,
        expires_at: now + config.step_up_challenge_ttl_seconds,
        approved_at: None,
    };
    store.insert_challenge(&challenge)?;

    emit(
        store,
        agent_id,
        user_id,
        EventPayload::StepUpRequested {
            challenge_id: challenge.id.clone(),
            quote_id: quote_id.clone(),
        },
        now,
        "Step-up challenge issued",
        "quote requires human confirmation before executing",
        "caller confirms with the code delivered out of band",
    )?;

    Ok(StepUpRequested {
        challenge_id: challenge.id,
        code: Some(code),
    })
}

/// `confirm(challenge_id, code, approve)`. On approval, mints a bearer
/// token scoped to exactly this `(user_id, agent_id, quote_id)`.
pub fn confirm(
    store: &dyn Store,
    clock: &dyn Clock,
    config: &KernelConfig,
    challenge_id: &ChallengeId,
    code: &str,
    approve: bool,
) -> Result<Option<String>, KernelError> {
    let now = clock.now_seconds();
    let mut challenge = store.get_challenge(challenge_id)?.ok_or(AuthzError::Forbidden)?;
    if !challenge.is_live(now) {
        return Err(AuthzError::StepUpTokenExpired.into());
    }
    if hash_code(&challenge.id, code) != challenge.code_hash {
        return Err(AuthzError::InvalidCode.into());
    }

    if !approve {
        challenge.status = ChallengeStatus::Denied;
        store.update_challenge(&challenge)?;
        return Ok(None);
    }

    challenge.status = ChallengeStatus::Approved;
    challenge.approved_at = Some(now);
    store.update_challenge(&challenge)?;

    let raw_token = new_id("tok");
    let token = StepUpToken {
        id: StepUpTokenId::new(new_id("steptoken")),
        challenge_id: challenge.id.clone(),
        token_hash: hash_token(&raw_token),
        created_at: now,
        expires_at: now + config.step_up_token_ttl_seconds,
        revoked: false,
    };
    store.insert_token(&token)?;
    Ok(Some(raw_token))
}

/// Validates a bearer token presented at `execute` against exactly the
/// `(user_id, agent_id, quote_id)` it was minted for.
pub fn validate_token(
    store: &dyn Store,
    clock: &dyn Clock,
    raw_token: &str,
    user_id: &UserId,
    agent_id: &AgentId,
    quote_id: &QuoteId,
) -> Result<(), KernelError> {
    let token = store
        .get_token_by_hash(&hash_token(raw_token))?
        .ok_or(AuthzError::StepUpTokenInvalid)?;
    let now = clock.now_seconds();
    if !token.is_live(now) {
        return Err(AuthzError::StepUpTokenExpired.into());
    }
    let challenge = store
        .get_challenge(&token.challenge_id)?
        .ok_or(AuthzError::StepUpTokenInvalid)?;
    if challenge.status != ChallengeStatus::Approved {
        return Err(AuthzError::StepUpTokenInvalid.into());
    }
    if &challenge.user_id != user_id || &challenge.agent_id != agent_id || &challenge.quote_id != quote_id {
        return Err(AuthzError::StepUpMismatch.into());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit(
    store: &dyn Store,
    agent_id: &AgentId,
    user_id: &UserId,
    payload: EventPayload,
    now: u64,
    what_happened: &str,
    why_changed: &str,
    what_happens_next: &str,
) -> Result<(), KernelError> {
    let event = store.append_event(agent_id, user_id, EventId::new(new_id("event")), payload, now, now)?;
    store.append_receipt(Receipt {
        receipt_id: ReceiptId::new(new_id("receipt")),
        agent_id: agent_id.clone(),
        user_id: user_id.clone(),
        source: ReceiptSource::Policy,
        event_id: Some(event.event_id),
        external_ref: None,
        what_happened: what_happened.to_string(),
        why_changed: why_changed.to_string(),
        what_happens_next: what_happens_next.to_string(),
        occurred_at: now,
        created_at: now,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::memory::MemoryStore;

    fn ids() -> (AgentId, UserId, QuoteId) {
        (AgentId::new("agent_1"), UserId::new("user_1"), QuoteId::new("quote_1"))
    }

    #[test]
    fn request_then_confirm_with_correct_code_approves_and_mints_token() {
        let store = MemoryStore::default();
        let clock = FixedClock::new(1_000);
        let config = KernelConfig::default();
        let (agent_id, user_id, quote_id) = ids();
        let requested = request(&store, &clock, &config, &user_id, &agent_id, &quote_id).unwrap();
        let code = requested.code.unwrap();
        let token = confirm(&store, &clock, &config, &requested.challenge_id, &code, true).unwrap();
        assert!(token.is_some());
        validate_token(&store, &clock, &token.unwrap(), &user_id, &agent_id, &quote_id).unwrap();
    }

    #[test]
    fn wrong_code_is_rejected() {
        let store = MemoryStore::default();
        let clock = FixedClock::new(1_000);
        let config = KernelConfig::default();
        let (agent_id, user_id, quote_id) = ids();
        let requested = request(&store, &clock, &config, &user_id, &agent_id, &quote_id).unwrap();
        let err = confirm(&store, &clock, &config, &requested.challenge_id, "000000", true).unwrap_err();
        assert_eq!(err.reason(), "invalid_code");
    }

    #[test]
    fn denied_challenge_mints_no_token() {
        let store = MemoryStore::default();
        let clock = FixedClock::new(1_000);
        let config = KernelConfig::default();
        let (agent_id, user_id, quote_id) = ids();
        let requested = request(&store, &clock, &config, &user_id, &agent_id, &quote_id).unwrap();
        let code = requested.code.unwrap();
        let token = confirm(&store, &clock, &config, &requested.challenge_id, &code, false).unwrap();
        assert!(token.is_none());
    }

    #[test]
    fn token_scoped_to_a_different_quote_is_a_mismatch() {
        let store = MemoryStore::default();
        let clock = FixedClock::new(1_000);
        let config = KernelConfig::default();
        let (agent_id, user_id, quote_id) = ids();
        let requested = request(&store, &clock, &config, &user_id, &agent_id, &quote_id).unwrap();
        let code = requested.code.unwrap();
        let raw_token = confirm(&store, &clock, &config, &requested.challenge_id, &code, true)
            .unwrap()
            .unwrap();
        let other_quote = QuoteId::new("quote_2");
        let err = validate_token(&store, &clock, &raw_token, &user_id, &agent_id, &other_quote).unwrap_err();
        assert_eq!(err.reason(), "step_up_mismatch");
    }

    #[test]
    fn expired_token_is_rejected() {
        let store = MemoryStore::default();
        let clock = FixedClock::new(1_000);
        let config = KernelConfig::builder().step_up_token_ttl_seconds(10).build().unwrap();
        let (agent_id, user_id, quote_id) = ids();
        let requested = request(&store, &clock, &config, &user_id, &agent_id, &quote_id).unwrap();
        let code = requested.code.unwrap();
        let raw_token = confirm(&store, &clock, &config, &requested.challenge_id, &code, true)
            .unwrap()
            .unwrap();
        clock.advance(11);
        let err = validate_token(&store, &clock, &raw_token, &user_id, &agent_id, &quote_id).unwrap_err();
        assert_eq!(err.reason(), "step_up_token_expired");
    }

    #[test]
    fn replayed_live_request_does_not_reveal_code_again() {
        let store = MemoryStore::default();
        let clock = FixedClock::new(1_000);
        let config = KernelConfig::default();
        let (agent_id, user_id, quote_id) = ids();
        let first = request(&store, &clock, &config, &user_id, &agent_id, &quote_id).unwrap();
        assert!(first.code.is_some());
        let second = request(&store, &clock, &config, &user_id, &agent_id, &quote_id).unwrap();
        assert_eq!(second.challenge_id, first.challenge_id);
        assert!(second.code.is_none());
    }
}
