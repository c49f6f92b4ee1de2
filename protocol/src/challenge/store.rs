//! [`ChallengeStore`] implementations.
//!
//! - [`MemoryChallengeStore`]: a mutex-guarded map. Single process only.
//! - [`SledChallengeStore`]: a sled tree. Survives restarts, and consume
//!   is a compare-and-swap so it stays atomic under contention.

use parking_lot::Mutex;
use sled::Tree;
use std::collections::HashMap;

use super::{AuthChallenge, ChallengeStore};
use crate::db::{decode, encode, AuthDb, DbResult};
use crate::error::AuthError;

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Challenge store backed by a `HashMap`. Every operation takes the lock
/// once, so consume is trivially atomic.
#[derive(Debug, Default)]
pub struct MemoryChallengeStore {
    entries: Mutex<HashMap<String, AuthChallenge>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChallengeStore for MemoryChallengeStore {
    fn insert(&self, challenge: AuthChallenge) -> Result<(), AuthError> {
        self.entries
            .lock()
            .insert(challenge.challenge.clone(), challenge);
        Ok(())
    }

    fn get(&self, challenge: &str) -> Result<Option<AuthChallenge>, AuthError> {
        Ok(self.entries.lock().get(challenge).cloned())
    }

    fn consume(&self, challenge: &str, now: u64) -> Result<AuthChallenge, AuthError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(challenge)
            .ok_or(AuthError::ChallengeUnknown)?;
        entry.check_redeemable(now)?;
        entry.consumed = true;
        Ok(entry.clone())
    }

    fn sweep_expired(&self, now: u64) -> Result<usize, AuthError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, c| !c.is_expired(now));
        Ok(before - entries.len())
    }

    fn len(&self) -> Result<usize, AuthError> {
        Ok(self.entries.lock().len())
    }
}

// ---------------------------------------------------------------------------
// sled
// ---------------------------------------------------------------------------

/// Name of the sled tree holding challenges.
const CHALLENGES_TREE: &str = "challenges";

/// Challenge store on a sled tree.
///
/// Consumption reads the current record, validates it, and swaps it for
/// the consumed record only if the stored bytes are still the ones it
/// read. A lost race re-reads and re-validates, so the loser sees
/// `ChallengeConsumed`.
#[derive(Debug, Clone)]
pub struct SledChallengeStore {
    tree: Tree,
}

impl SledChallengeStore {
    pub fn new(db: &AuthDb) -> DbResult<Self> {
        Ok(Self {
            tree: db.open_tree(CHALLENGES_TREE)?,
        })
    }
}

impl ChallengeStore for SledChallengeStore {
    fn insert(&self, challenge: AuthChallenge) -> Result<(), AuthError> {
        let bytes = encode(&challenge)?;
        self.tree.insert(challenge.challenge.as_bytes(), bytes)?;
        Ok(())
    }

    fn get(&self, challenge: &str) -> Result<Option<AuthChallenge>, AuthError> {
        match self.tree.get(challenge.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn consume(&self, challenge: &str, now: u64) -> Result<AuthChallenge, AuthError> {
        let key = challenge.as_bytes();
        loop {
            let current = self
                .tree
                .get(key)?
                .ok_or(AuthError::ChallengeUnknown)?;
            let mut record: AuthChallenge = decode(&current)?;
            record.check_redeemable(now)?;
            record.consumed = true;
            let updated = encode(&record)?;

            match self.tree.compare_and_swap(key, Some(current), Some(updated))? {
                Ok(()) => return Ok(record),
                Err(_) => {
                    tracing::trace!(challenge, "consume lost a race, retrying");
                    continue;
                }
            }
        }
    }

    fn sweep_expired(&self, now: u64) -> Result<usize, AuthError> {
        let mut expired = Vec::new();
        for item in self.tree.iter() {
            let (key, bytes) = item?;
            let record: AuthChallenge = decode(&bytes)?;
            if record.is_expired(now) {
                expired.push(key);
            }
        }
        // Expiry never moves, so removing without a re-check is safe.
        for key in &expired {
            self.tree.remove(key)?;
        }
        Ok(expired.len())
    }

    fn len(&self) -> Result<usize, AuthError> {
        Ok(self.tree.len())
    }
}
