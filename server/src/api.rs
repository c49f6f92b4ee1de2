//! # REST API
//!
//! The axum router for the authentication service. All handlers share
//! [`AppState`] through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                        | Caller             | Description                 |
//! |--------|-----------------------------|--------------------|-----------------------------|
//! | GET    | `/health`                   | anyone             | Liveness probe              |
//! | POST   | `/auth/challenge`           | anyone             | Issue a login challenge     |
//! | POST   | `/auth/login`               | anyone             | Redeem it for a session     |
//! | POST   | `/identity/link/challenge`  | session            | Issue a link challenge      |
//! | POST   | `/identity/link`            | session            | Link the signing key        |
//! | DELETE | `/identity/link`            | session            | Unlink                      |
//! | GET    | `/identity/me`              | session or proof   | Caller's linked identity    |
//! | GET    | `/identity/pubkey/:pubkey`  | anyone             | Public view of a linked key |
//! | GET    | `/did/:did`                 | anyone             | did:nostr resolution        |
//! | POST   | `/dev/session`              | anyone (dev only)  | Session for any account ID  |
//!
//! Failures are `{ "error": …, "code": … }` where `code` is
//! [`AuthError::code`].

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use nostr_auth::challenge::{ChallengeIssuance, ChallengeVerifier, SledChallengeStore};
use nostr_auth::config::AuthConfig;
use nostr_auth::db::{AuthDb, DbResult};
use nostr_auth::did::{resolve_with, ResolutionResult};
use nostr_auth::event::decode_npub;
use nostr_auth::flow::{Authenticator, LinkRequest, LoginRequest, LoginResponse};
use nostr_auth::identity::{IdentityDb, IdentityLinker, NostrIdentity};
use nostr_auth::policy::AuthContext;
use nostr_auth::proof::ProofVerifier;
use nostr_auth::AuthError;

use crate::dev::{LinkedAccounts, MemorySessions, UnverifiedAliases};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Service settings that aren't verifier tunables.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub auth: AuthConfig,
    /// Base URL clients use to reach this service, without trailing slash.
    pub public_url: String,
    pub proof_replay_cache: bool,
    pub dev_sessions: bool,
}

/// Shared application state available to all request handlers.
///
/// Cheap to clone, everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub public_url: String,
    pub dev_sessions: bool,
    pub auth: Arc<Authenticator>,
    pub sessions: Arc<MemorySessions>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Wire the stores, verifiers and dev collaborators over `db`.
    pub fn new(db: &AuthDb, options: ServiceOptions, metrics: SharedMetrics) -> DbResult<Self> {
        let challenges = Arc::new(SledChallengeStore::new(db)?);
        let verifier = ChallengeVerifier::new(challenges, &options.auth);
        let linker = Arc::new(IdentityLinker::new(verifier.clone(), IdentityDb::new(db)?));

        let mut proofs = ProofVerifier::new(&options.auth);
        if options.proof_replay_cache {
            proofs = proofs.with_replay_cache();
        }

        let sessions = Arc::new(MemorySessions::new());
        let auth = Authenticator::new(
            verifier,
            Arc::clone(&linker),
            proofs,
            Arc::new(LinkedAccounts::new(linker, Arc::clone(&sessions))),
            Arc::new(UnverifiedAliases),
            sessions.clone(),
        );

        Ok(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            public_url: options.public_url.trim_end_matches('/').to_string(),
            dev_sessions: options.dev_sessions,
            auth: Arc::new(auth),
            sessions,
            metrics,
        })
    }

    /// One pass of housekeeping: expired challenges, abandoned link
    /// attempts, stale replay-cache entries and expired dev sessions.
    pub fn sweep(&self, now: u64) {
        match self.auth.verifier().sweep_expired_at(now) {
            Ok(removed) => self.metrics.challenges_swept_total.inc_by(removed as u64),
            Err(e) => tracing::warn!(error = %e, "challenge sweep failed"),
        }
        let pending = self.auth.linker().sweep_pending(now);
        let proofs = self
            .auth
            .proofs()
            .replay_cache()
            .map_or(0, |cache| cache.evict_expired(now));
        let sessions = self.sessions.sweep_expired(now);

        match self.auth.verifier().store().len() {
            Ok(live) => self.metrics.live_challenges.set(live as i64),
            Err(e) => tracing::warn!(error = %e, "failed to count live challenges"),
        }
        tracing::debug!(pending, proofs, sessions, "sweep complete");
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/auth/challenge", post(login_challenge_handler))
        .route("/auth/login", post(login_handler))
        .route("/identity/link/challenge", post(link_challenge_handler))
        .route("/identity/link", post(link_handler).delete(unlink_handler))
        .route("/identity/me", get(me_handler))
        .route("/identity/pubkey/:pubkey", get(pubkey_handler))
        .route("/did/:did", get(did_handler));

    if state.dev_sessions {
        tracing::warn!("POST /dev/session is enabled; anyone can obtain a session for any account");
        router = router.route("/dev/session", post(dev_session_handler));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChallengeRequest {
    pub relay: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevSessionRequest {
    pub user_id: String,
}

/// What anyone may learn about a linked key. No account ID.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    pub pubkey: String,
    pub did: String,
    /// Only present once verified.
    pub alias: Option<String>,
}

impl From<NostrIdentity> for PublicIdentity {
    fn from(identity: NostrIdentity) -> Self {
        Self {
            alias: identity.alias.filter(|_| identity.alias_verified),
            pubkey: identity.pubkey,
            did: identity.did,
        }
    }
}

/// Error body returned on every failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An [`AuthError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

/// HTTP status for each failure kind.
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Malformed(_)
        | AuthError::PubkeyMismatch { .. }
        | AuthError::RequestMismatch(_)
        | AuthError::PayloadMismatch
        | AuthError::RelayMismatch { .. }
        | AuthError::InvalidDid(_) => StatusCode::BAD_REQUEST,
        AuthError::SignatureInvalid(_)
        | AuthError::ChallengeUnknown
        | AuthError::ChallengeExpired
        | AuthError::ChallengeConsumed
        | AuthError::TimestampOutOfWindow { .. }
        | AuthError::ProofReplayed
        | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
        AuthError::IdentityNotFound => StatusCode::NOT_FOUND,
        AuthError::AlreadyLinked(_) => StatusCode::CONFLICT,
        AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = ErrorResponse {
            error,
            code: self.0.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, AuthError> {
    serde_json::from_slice(body).map_err(|e| AuthError::Malformed(format!("request body: {e}")))
}

// ---------------------------------------------------------------------------
// Caller Classification
// ---------------------------------------------------------------------------

/// Absolute URL of the request as the client addressed it.
fn request_url(public_url: &str, uri: &Uri) -> String {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("{public_url}{path}")
}

fn is_proof_header(header: &str) -> bool {
    header
        .trim_start()
        .split_once(' ')
        .is_some_and(|(scheme, _)| {
            scheme.eq_ignore_ascii_case(nostr_auth::config::PROOF_HEADER_SCHEME)
        })
}

async fn caller(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<AuthContext, AuthError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .map(|v| v.to_str())
        .transpose()
        .map_err(|_| AuthError::Malformed("authorization header is not ASCII".into()))?;

    let url = request_url(&state.public_url, uri);
    let body = (!body.is_empty()).then_some(body);
    let result = state
        .auth
        .context_from_header(authorization, &url, method.as_str(), body)
        .await;

    match &result {
        Ok(AuthContext::Proof { pubkey }) => {
            state.metrics.proofs_succeeded_total.inc();
            tracing::debug!(%pubkey, %url, "request proof accepted");
        }
        Err(e) if authorization.is_some_and(is_proof_header) => {
            state.metrics.proofs_failed_total.inc();
            tracing::warn!(code = e.code(), %url, "request proof rejected");
        }
        _ => {}
    }
    result
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": state.version }))
}

/// `POST /auth/challenge`: body optional, `{ "relay": … }`.
async fn login_challenge_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ChallengeIssuance>> {
    let request: ChallengeRequest = if body.is_empty() {
        ChallengeRequest::default()
    } else {
        parse_json(&body)?
    };
    let challenge = state.auth.issue_login_challenge(request.relay.as_deref())?;
    state.metrics.challenges_issued_total.inc();
    Ok(Json(ChallengeIssuance::from(&challenge)))
}

/// `POST /auth/login`: redeem a signed challenge for session tokens.
async fn login_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<LoginResponse>> {
    let timer = state.metrics.login_latency_seconds.start_timer();
    let result = match parse_json::<LoginRequest>(&body) {
        Ok(request) => state.auth.login(&request).await,
        Err(e) => Err(e),
    };
    timer.observe_duration();

    match &result {
        Ok(_) => state.metrics.logins_succeeded_total.inc(),
        Err(e) => {
            state.metrics.logins_failed_total.inc();
            tracing::warn!(code = e.code(), "login rejected");
        }
    }
    Ok(Json(result?))
}

/// `POST /identity/link/challenge`
async fn link_challenge_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ChallengeIssuance>> {
    let ctx = caller(&state, &method, &uri, &headers, &body).await?;
    let challenge = state.auth.linker().issue_link_challenge(&ctx)?;
    state.metrics.challenges_issued_total.inc();
    Ok(Json(ChallengeIssuance::from(&challenge)))
}

/// `POST /identity/link`: `{ "signedEvent": …, "alias"? }`.
async fn link_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<NostrIdentity>)> {
    let ctx = caller(&state, &method, &uri, &headers, &body).await?;
    let request: LinkRequest = parse_json(&body)?;
    let identity = state.auth.link(&ctx, &request).await?;
    state.metrics.links_created_total.inc();
    Ok((StatusCode::CREATED, Json(identity)))
}

/// `DELETE /identity/link`: returns the removed identity.
async fn unlink_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<NostrIdentity>> {
    let ctx = caller(&state, &method, &uri, &headers, &body).await?;
    let identity = state.auth.linker().unlink(&ctx)?;
    state.metrics.unlinks_total.inc();
    Ok(Json(identity))
}

/// `GET /identity/me`: by account for sessions, by key for proofs.
async fn me_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<NostrIdentity>> {
    let ctx = caller(&state, &method, &uri, &headers, &body).await?;
    let identity = state.auth.linker().find_for_caller(&ctx)?;
    Ok(Json(identity.ok_or(AuthError::IdentityNotFound)?))
}

/// `GET /identity/pubkey/:pubkey`: hex or `npub1…`.
async fn pubkey_handler(
    State(state): State<AppState>,
    Path(pubkey): Path<String>,
) -> ApiResult<Json<PublicIdentity>> {
    let pubkey = if pubkey.starts_with("npub1") {
        decode_npub(&pubkey).map_err(|e| AuthError::Malformed(e.to_string()))?
    } else {
        pubkey
    };
    let identity = state
        .auth
        .linker()
        .find_by_pubkey(&pubkey)?
        .ok_or(AuthError::IdentityNotFound)?;
    Ok(Json(identity.into()))
}

/// `GET /did/:did`: W3C resolution result. Syntax errors come back as
/// 400 with `didResolutionMetadata.error = "invalidDid"`.
async fn did_handler(
    State(state): State<AppState>,
    Path(did): Path<String>,
) -> ApiResult<(StatusCode, Json<ResolutionResult>)> {
    let linker = state.auth.linker();
    let result = resolve_with(&did, |pubkey| {
        Ok::<_, AuthError>(
            linker
                .find_by_pubkey(pubkey)?
                .and_then(|identity| identity.alias_claim()),
        )
    })?;
    let status = if result.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)))
}

/// `POST /dev/session`: `{ "userId": … }`. Only routed with `--dev-sessions`.
async fn dev_session_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<nostr_auth::collab::SessionTokens>> {
    let request: DevSessionRequest = parse_json(&body)?;
    tracing::warn!(user_id = %request.user_id, "issuing development session");
    Ok(Json(state.sessions.issue_for(&request.user_id)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
