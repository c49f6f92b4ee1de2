//! # AuthDb: Persistent Storage Engine
//!
//! Thin wrapper over sled's embedded key-value store. Everything the
//! server persists lives in one sled database, split into named trees:
//!
//! | Tree         | Key                   | Value                   |
//! |--------------|-----------------------|-------------------------|
//! | `challenges` | challenge hex (UTF-8) | `bincode(AuthChallenge)`|
//! | `identities` | user id (UTF-8)       | `bincode(NostrIdentity)`|
//! | `pubkeys`    | pubkey hex (UTF-8)    | user id (UTF-8)         |
//!
//! The typed accessors live next to their domain types
//! ([`crate::challenge::SledChallengeStore`], [`crate::identity::IdentityDb`]);
//! this module only owns the handle, the error type and the bincode helpers.
//!
//! sled is thread-safe, so an `AuthDb` can be cloned freely and shared
//! across tasks without extra locking.

use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use std::path::Path;

use crate::error::AuthError;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for AuthError {
    fn from(e: DbError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

impl From<sled::Error> for AuthError {
    fn from(e: sled::Error) -> Self {
        AuthError::Storage(e.to_string())
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// AuthDb
// ---------------------------------------------------------------------------

/// Handle to the on-disk database.
#[derive(Debug, Clone)]
pub struct AuthDb {
    db: Db,
}

impl AuthDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// A database that lives in a temporary location and is removed when
    /// dropped. No filesystem side effects, ideal for tests.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Open (creating if needed) a named tree.
    pub fn open_tree(&self, name: &str) -> DbResult<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_temporary_database() {
        let db = AuthDb::open_temporary().expect("should create temp db");
        let tree = db.open_tree("t").unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn persistent_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = AuthDb::open(dir.path()).unwrap();
            db.open_tree("t").unwrap().insert("k", "v").unwrap();
            db.flush().unwrap();
        }
        let db = AuthDb::open(dir.path()).unwrap();
        let value = db.open_tree("t").unwrap().get("k").unwrap();
        assert_eq!(value.as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn bincode_helpers_roundtrip() {
        let bytes = encode(&("abc".to_string(), 42u64)).unwrap();
        let (s, n): (String, u64) = decode(&bytes).unwrap();
        assert_eq!(s, "abc");
        assert_eq!(n, 42);
        assert!(decode::<(String, u64)>(&[0xff]).is_err());
    }

    #[test]
    fn db_error_maps_to_storage() {
        let err: AuthError = DbError::Serialization("boom".into()).into();
        assert_eq!(err.code(), "storage_error");
    }
}
