// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # nostr-auth: Core Library
//!
//! Log in, link accounts and authenticate requests with a Nostr key. The
//! user proves control of a secp256k1 key by signing; the server never
//! sees anything but the public key.
//!
//! ## Architecture
//!
//! - **event**: NIP-01 events: canonical hashing, BIP-340 signing and
//!   verification. Everything else builds on this.
//! - **challenge**: One-time, expiring challenges for login and linking.
//!   Redeeming one is atomic; a replay is always caught.
//! - **proof**: Stateless NIP-98 proofs for individual HTTP requests.
//! - **policy**: One function deciding whether a caller may hit an endpoint.
//! - **identity**: The account ↔ key binding and its state machine.
//! - **did**: `did:nostr` documents, derived on demand.
//! - **collab**: Traits for the accounts, sessions and alias lookups that
//!   live outside this crate.
//! - **flow**: Login, link and per-request auth composed end to end.
//! - **db**: sled handle shared by the persistent stores.
//! - **config**: Protocol constants and tunables.
//!
//! ## Design Philosophy
//!
//! 1. Verification never panics on input. Every rejection has a reason
//!    and a stable code.
//! 2. Cheap checks first. Malformed input never reaches the curve math.
//! 3. Invariants live in storage. Atomic consume and the 1:1 link are
//!    enforced where the data is, not by check-then-write in callers.

pub mod challenge;
pub mod collab;
pub mod config;
pub mod db;
pub mod did;
pub mod error;
pub mod event;
pub mod flow;
pub mod identity;
pub mod policy;
pub mod proof;

pub use error::AuthError;
