//! # Identity Linking
//!
//! Binds a Nostr public key to an account that already exists on the
//! platform. The account proves who it is with its session; the key proves
//! who it is by signing a challenge. Once both check out the pair is
//! persisted, and from then on the key can log in as that account.
//!
//! The layers:
//!
//! 1. **record**: [`NostrIdentity`] plus the alias values attached to it.
//! 2. **db**: sled storage that enforces one key per account and one
//!    account per key.
//! 3. **linker**: the `Unlinked → ChallengeIssued → Verified → Linked`
//!    state machine.
//!
//! ## Design Decisions
//!
//! - The 1:1 invariant lives in the storage transaction, not in a
//!   check-then-write in the linker. Two racing link requests for the same
//!   key can both pass every check; only one commits.
//! - Alias verification (NIP-05 and friends) arrives as a plain
//!   [`AliasVerification`] value. Nothing here touches the network.

pub mod db;
pub mod linker;
pub mod record;

pub use db::IdentityDb;
pub use linker::{IdentityLinker, LinkState};
pub use record::{AliasClaim, AliasVerification, NostrIdentity};
