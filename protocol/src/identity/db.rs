//! Persistent identity storage.
//!
//! Two sled trees, kept in step by transactions:
//!
//! | Tree         | Key      | Value                   |
//! |--------------|----------|-------------------------|
//! | `identities` | user id  | `bincode(NostrIdentity)`|
//! | `pubkeys`    | pubkey   | user id                 |
//!
//! Creation is one multi-tree transaction that aborts if either key is
//! already present, so "one key per account, one account per key" holds
//! no matter how many requests race.

use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::Tree;

use super::record::NostrIdentity;
use crate::db::{decode, encode, AuthDb, DbResult};
use crate::error::AuthError;

const IDENTITIES_TREE: &str = "identities";
const PUBKEYS_TREE: &str = "pubkeys";

fn unwrap_tx<T>(result: Result<T, TransactionError<AuthError>>) -> Result<T, AuthError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(err.into()),
    }
}

/// Identity records keyed by account and by public key.
#[derive(Debug, Clone)]
pub struct IdentityDb {
    identities: Tree,
    pubkeys: Tree,
}

impl IdentityDb {
    pub fn new(db: &AuthDb) -> DbResult<Self> {
        Ok(Self {
            identities: db.open_tree(IDENTITIES_TREE)?,
            pubkeys: db.open_tree(PUBKEYS_TREE)?,
        })
    }

    /// Insert a new identity. Fails with `AlreadyLinked` if the account
    /// already has a key or the key already has an account.
    pub fn create(&self, identity: &NostrIdentity) -> Result<(), AuthError> {
        let bytes = encode(identity)?;
        let user_key = identity.user_id.as_bytes();
        let pubkey_key = identity.pubkey.as_bytes();

        let result = (&self.identities, &self.pubkeys).transaction(|(identities, pubkeys)| {
            if identities.get(user_key)?.is_some() {
                return Err(ConflictableTransactionError::Abort(AuthError::AlreadyLinked(
                    "account already has a linked key".into(),
                )));
            }
            if pubkeys.get(pubkey_key)?.is_some() {
                return Err(ConflictableTransactionError::Abort(AuthError::AlreadyLinked(
                    "key is linked to another account".into(),
                )));
            }
            identities.insert(user_key, bytes.as_slice())?;
            pubkeys.insert(pubkey_key, user_key)?;
            Ok(())
        });
        unwrap_tx(result)
    }

    /// Remove the identity of an account, returning it.
    pub fn delete(&self, user_id: &str) -> Result<NostrIdentity, AuthError> {
        let result = (&self.identities, &self.pubkeys).transaction(|(identities, pubkeys)| {
            let bytes = identities
                .remove(user_id.as_bytes())?
                .ok_or(ConflictableTransactionError::Abort(AuthError::IdentityNotFound))?;
            let identity: NostrIdentity = decode(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
            pubkeys.remove(identity.pubkey.as_bytes())?;
            Ok(identity)
        });
        unwrap_tx(result)
    }

    pub fn get_by_user(&self, user_id: &str) -> Result<Option<NostrIdentity>, AuthError> {
        match self.identities.get(user_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_by_pubkey(&self, pubkey: &str) -> Result<Option<NostrIdentity>, AuthError> {
        match self.pubkeys.get(pubkey.as_bytes())? {
            Some(user_id) => {
                let user_id = String::from_utf8_lossy(&user_id);
                self.get_by_user(&user_id)
            }
            None => Ok(None),
        }
    }

    /// Apply `f` to an existing record. Never recreates a record that was
    /// deleted concurrently.
    pub fn update<F>(&self, user_id: &str, f: F) -> Result<NostrIdentity, AuthError>
    where
        F: Fn(&mut NostrIdentity),
    {
        let key = user_id.as_bytes();
        loop {
            let current = self
                .identities
                .get(key)?
                .ok_or(AuthError::IdentityNotFound)?;
            let mut record: NostrIdentity = decode(&current)?;
            f(&mut record);
            let updated = encode(&record)?;
            if self
                .identities
                .compare_and_swap(key, Some(current), Some(updated))?
                .is_ok()
            {
                return Ok(record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
