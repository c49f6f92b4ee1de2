//! End-to-end integration tests for nostr-auth.
//!
//! These tests run the login, link and per-request flows the way the server
//! does: sled-backed challenge and identity stores on a temporary database,
//! in-test account and session collaborators, and real Schnorr signatures.
//!
//! Each test stands alone with its own temporary database. No shared state,
//! no test ordering dependencies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use nostr_auth::challenge::{ChallengeStore, ChallengeVerifier, SledChallengeStore};
use nostr_auth::collab::{Account, AccountStore, AliasVerifier, SessionIssuer, SessionTokens};
use nostr_auth::config::{unix_now, AuthConfig};
use nostr_auth::db::AuthDb;
use nostr_auth::did::resolve_with;
use nostr_auth::event::{sha256_hex, EventBuilder, Keys, SignedEvent};
use nostr_auth::flow::{Authenticator, LinkRequest, LoginRequest};
use nostr_auth::identity::{AliasVerification, IdentityDb, IdentityLinker, LinkState};
use nostr_auth::policy::AuthContext;
use nostr_auth::proof::{encode_proof_header, ProofVerifier};
use nostr_auth::AuthError;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Accounts resolved through the identity store, the way a platform with
/// a `linked_pubkey` column would.
struct Accounts {
    linker: Arc<IdentityLinker>,
}

#[async_trait]
impl AccountStore for Accounts {
    async fn find_by_pubkey_linkage(&self, pubkey: &str) -> Result<Option<Account>, AuthError> {
        Ok(self.linker.find_by_pubkey(pubkey)?.map(|identity| Account {
            user_id: identity.user_id,
            display_name: None,
        }))
    }

    async fn find_by_id(&self, user_id: &str) -> Result<Option<Account>, AuthError> {
        Ok(Some(Account {
            user_id: user_id.to_string(),
            display_name: None,
        }))
    }
}

struct Aliases;

#[async_trait]
impl AliasVerifier for Aliases {
    async fn verify(&self, alias: &str, _pubkey: &str) -> AliasVerification {
        AliasVerification {
            verified: !alias.starts_with("fake"),
            checked_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct Sessions {
    tokens: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SessionIssuer for Sessions {
    async fn issue_tokens(&self, account: &Account) -> Result<SessionTokens, AuthError> {
        let access = format!("tok-{}", uuid::Uuid::new_v4());
        self.tokens
            .lock()
            .insert(access.clone(), account.user_id.clone());
        Ok(SessionTokens {
            access,
            refresh: "refresh".into(),
            expires_in: 900,
        })
    }

    async fn verify_access_token(&self, token: &str) -> Option<String> {
        self.tokens.lock().get(token).cloned()
    }
}

struct Harness {
    auth: Authenticator,
    store: Arc<SledChallengeStore>,
    _db: AuthDb,
}

fn setup(config: AuthConfig, replay_cache: bool) -> Harness {
    let db = AuthDb::open_temporary().expect("temp db");
    let store = Arc::new(SledChallengeStore::new(&db).expect("challenge tree"));
    let verifier = ChallengeVerifier::new(store.clone(), &config);
    let identities = IdentityDb::new(&db).expect("identity trees");
    let linker = Arc::new(IdentityLinker::new(verifier.clone(), identities));

    let mut proofs = ProofVerifier::new(&config);
    if replay_cache {
        proofs = proofs.with_replay_cache();
    }

    let auth = Authenticator::new(
        verifier,
        Arc::clone(&linker),
        proofs,
        Arc::new(Accounts { linker }),
        Arc::new(Aliases),
        Arc::new(Sessions::default()),
    );
    Harness {
        auth,
        store,
        _db: db,
    }
}

fn session(user: &str) -> AuthContext {
    AuthContext::Session {
        user_id: user.to_string(),
    }
}

fn answer(keys: &Keys, challenge: &str, relay: Option<&str>) -> SignedEvent {
    EventBuilder::auth_response(challenge, relay)
        .build()
        .sign(keys)
        .expect("sign")
}

async fn link(h: &Harness, user: &str, keys: &Keys, alias: Option<&str>) {
    let c = h
        .auth
        .linker()
        .issue_link_challenge(&session(user))
        .unwrap();
    let request = LinkRequest {
        signed_event: answer(keys, &c.challenge, c.relay.as_deref()),
        alias: alias.map(str::to_string),
    };
    h.auth.link(&session(user), &request).await.unwrap();
}

// ---------------------------------------------------------------------------
// 1. Link, Then Log In
// ---------------------------------------------------------------------------

#[tokio::test]
async fn link_then_login() {
    let h = setup(AuthConfig::default(), false);
    let keys = Keys::generate();

    link(&h, "alice", &keys, Some("alice@example.com")).await;
    assert_eq!(
        h.auth.linker().link_state("alice").unwrap(),
        LinkState::Linked
    );

    let c = h.auth.issue_login_challenge(None).unwrap();
    let response = h
        .auth
        .login(&LoginRequest {
            pubkey: keys.public_key_hex(),
            signed_event: answer(&keys, &c.challenge, None),
            alias: None,
        })
        .await
        .unwrap();
    assert_eq!(response.user_id, "alice");
    assert_eq!(response.pubkey, keys.public_key_hex());

    // The issued token authenticates follow-up requests.
    let ctx = h
        .auth
        .context_from_header(
            Some(&format!("Bearer {}", response.tokens.access)),
            "https://auth.example/identity/me",
            "GET",
            None,
        )
        .await
        .unwrap();
    assert_eq!(ctx, session("alice"));

    let identity = h.auth.linker().find_by_account("alice").unwrap().unwrap();
    assert!(identity.alias_verified);
    assert!(identity.last_auth_at.is_some());
}

// ---------------------------------------------------------------------------
// 2. Replay Protection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn challenge_lifecycle_on_sled() {
    let h = setup(AuthConfig::default(), false);
    let keys = Keys::generate();
    let verifier = h.auth.verifier();

    let t0 = 1_700_000_000;
    let c = verifier.issue_challenge_at(None, t0).unwrap();
    assert_eq!(c.expires_at, t0 + 300);

    let event = answer(&keys, &c.challenge, None);
    let first = verifier.verify_challenge_response_at(&event, t0 + 10);
    assert!(first.valid);
    assert_eq!(first.pubkey, Some(keys.public_key_hex()));

    let replay = verifier.verify_challenge_response_at(&event, t0 + 10);
    assert_eq!(replay.error, Some(AuthError::ChallengeConsumed));

    let late = verifier.issue_challenge_at(None, t0).unwrap();
    let event = answer(&keys, &late.challenge, None);
    assert_eq!(
        verifier.verify_challenge_response_at(&event, t0 + 301).error,
        Some(AuthError::ChallengeExpired)
    );

    assert_eq!(verifier.sweep_expired_at(t0 + 300).unwrap(), 2);
    assert!(h.store.is_empty().unwrap());
}

#[tokio::test]
async fn concurrent_logins_with_one_challenge() {
    let h = Arc::new(setup(AuthConfig::default(), false));
    let keys = Keys::generate();
    link(&h, "alice", &keys, None).await;

    let c = h.auth.issue_login_challenge(None).unwrap();
    let request = LoginRequest {
        pubkey: keys.public_key_hex(),
        signed_event: answer(&keys, &c.challenge, None),
        alias: None,
    };

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = Arc::clone(&h);
        let request = request.clone();
        tasks.push(tokio::spawn(async move { h.auth.login(&request).await }));
    }
    let mut ok = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => ok += 1,
            Err(err) => assert_eq!(err, AuthError::ChallengeConsumed),
        }
    }
    assert_eq!(ok, 1);
}

// ---------------------------------------------------------------------------
// 3. One Key, One Account
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_to_one_binding() {
    let h = setup(AuthConfig::default(), false);
    let keys = Keys::generate();
    link(&h, "alice", &keys, None).await;

    // Bob can't take Alice's key.
    let c = h
        .auth
        .linker()
        .issue_link_challenge(&session("bob"))
        .unwrap();
    let request = LinkRequest {
        signed_event: answer(&keys, &c.challenge, None),
        alias: None,
    };
    assert!(matches!(
        h.auth.link(&session("bob"), &request).await,
        Err(AuthError::AlreadyLinked(_))
    ));

    // Alice can't add a second key.
    let other = Keys::generate();
    let c = h
        .auth
        .linker()
        .issue_link_challenge(&session("alice"))
        .unwrap();
    let request = LinkRequest {
        signed_event: answer(&other, &c.challenge, None),
        alias: None,
    };
    assert!(matches!(
        h.auth.link(&session("alice"), &request).await,
        Err(AuthError::AlreadyLinked(_))
    ));

    // After unlinking, Bob can.
    h.auth.linker().unlink(&session("alice")).unwrap();
    link(&h, "bob", &keys, None).await;
    assert_eq!(
        h.auth
            .linker()
            .find_by_pubkey(&keys.public_key_hex())
            .unwrap()
            .unwrap()
            .user_id,
        "bob"
    );
}

// ---------------------------------------------------------------------------
// 4. Per-Request Proofs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn proof_with_body_and_replay_cache() {
    let h = setup(AuthConfig::default(), true);
    let keys = Keys::generate();
    let url = "https://auth.example/identity/link";
    let body = br#"{"alias":"alice@example.com"}"#;

    let event = EventBuilder::http_proof(url, "POST", Some(&sha256_hex(body)))
        .created_at(unix_now())
        .build()
        .sign(&keys)
        .unwrap();
    let header = encode_proof_header(&event);

    let ctx = h
        .auth
        .authenticate_proof(&header, url, "POST", Some(body))
        .unwrap();
    assert_eq!(
        ctx,
        AuthContext::Proof {
            pubkey: keys.public_key_hex()
        }
    );

    assert_eq!(
        h.auth
            .authenticate_proof(&header, url, "POST", Some(body))
            .unwrap_err(),
        AuthError::ProofReplayed
    );

    let other_body = EventBuilder::http_proof(url, "POST", Some(&sha256_hex(body)))
        .created_at(unix_now())
        .content("distinct id")
        .build()
        .sign(&keys)
        .unwrap();
    assert_eq!(
        h.auth
            .authenticate_proof(&encode_proof_header(&other_body), url, "POST", Some(b"{}"))
            .unwrap_err(),
        AuthError::PayloadMismatch
    );
}

#[tokio::test]
async fn proof_for_another_endpoint_rejected() {
    let h = setup(AuthConfig::default(), false);
    let keys = Keys::generate();
    let event = EventBuilder::http_proof("https://auth.example/identity/me", "GET", None)
        .created_at(unix_now())
        .build()
        .sign(&keys)
        .unwrap();
    let header = encode_proof_header(&event);

    assert!(matches!(
        h.auth
            .authenticate_proof(&header, "https://auth.example/identity/link", "GET", None),
        Err(AuthError::RequestMismatch(_))
    ));
    assert!(matches!(
        h.auth
            .authenticate_proof(&header, "https://auth.example/identity/me", "DELETE", None),
        Err(AuthError::RequestMismatch(_))
    ));
}

// ---------------------------------------------------------------------------
// 5. Relay-Bound Challenges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn default_relay_binds_login_challenges() {
    let config = AuthConfig {
        default_relay: Some("wss://auth.example".into()),
        ..AuthConfig::default()
    };
    let h = setup(config, false);
    let keys = Keys::generate();
    link(&h, "alice", &keys, None).await;

    let c = h.auth.issue_login_challenge(None).unwrap();
    assert_eq!(c.relay.as_deref(), Some("wss://auth.example"));

    let wrong = LoginRequest {
        pubkey: keys.public_key_hex(),
        signed_event: answer(&keys, &c.challenge, Some("wss://evil.example")),
        alias: None,
    };
    assert!(matches!(
        h.auth.login(&wrong).await,
        Err(AuthError::RelayMismatch { .. })
    ));

    let right = LoginRequest {
        pubkey: keys.public_key_hex(),
        signed_event: answer(&keys, &c.challenge, Some("wss://auth.example")),
        alias: None,
    };
    assert!(h.auth.login(&right).await.is_ok());
}

// ---------------------------------------------------------------------------
// 6. DID Resolution Against Linked Identities
// ---------------------------------------------------------------------------

#[tokio::test]
async fn did_document_reflects_verified_alias() {
    let h = setup(AuthConfig::default(), false);
    let verified = Keys::generate();
    let unverified = Keys::generate();
    link(&h, "alice", &verified, Some("alice@example.com")).await;
    link(&h, "mallory", &unverified, Some("fake@example.com")).await;

    let lookup = |pubkey: &str| -> Result<_, AuthError> {
        Ok(h
            .auth
            .linker()
            .find_by_pubkey(pubkey)?
            .and_then(|identity| identity.alias_claim()))
    };

    let doc = resolve_with(&format!("did:nostr:{}", verified.public_key_hex()), lookup)
        .unwrap()
        .did_document
        .unwrap();
    assert_eq!(doc.service.len(), 1);
    assert_eq!(doc.service[0].service_endpoint, "alice@example.com");

    let doc = resolve_with(&format!("did:nostr:{}", unverified.public_key_hex()), lookup)
        .unwrap()
        .did_document
        .unwrap();
    assert!(doc.service.is_empty());

    let bad = resolve_with("did:nostr:xyz", lookup).unwrap();
    assert_eq!(
        bad.did_resolution_metadata.error.as_deref(),
        Some("invalidDid")
    );
}
