//! Who is calling, and are they allowed to.
//!
//! A request is classified once into an [`AuthContext`]; each endpoint
//! declares an [`AuthPolicy`]; [`authorize`] is the only place the two
//! meet. There is no middleware chain to fall through.

use serde::Serialize;

use crate::error::AuthError;

/// What the request proved about its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    Unauthenticated,
    /// A platform session (bearer token) for an account.
    Session { user_id: String },
    /// A per-request signed proof from a key.
    Proof { pubkey: String },
}

/// What an endpoint requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    Public,
    /// Only an account session will do (linking needs an account).
    SessionRequired,
    /// A session or a signed proof.
    AnyAuthenticated,
}

/// The caller an endpoint ends up serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    Anonymous,
    Account { user_id: String },
    Key { pubkey: String },
}

pub fn authorize(ctx: &AuthContext, policy: AuthPolicy) -> Result<Principal, AuthError> {
    match (policy, ctx) {
        (AuthPolicy::Public, AuthContext::Unauthenticated) => Ok(Principal::Anonymous),
        (_, AuthContext::Session { user_id }) => Ok(Principal::Account {
            user_id: user_id.clone(),
        }),
        (AuthPolicy::Public | AuthPolicy::AnyAuthenticated, AuthContext::Proof { pubkey }) => {
            Ok(Principal::Key {
                pubkey: pubkey.clone(),
            })
        }
        (AuthPolicy::SessionRequired, AuthContext::Proof { .. })
        | (AuthPolicy::SessionRequired | AuthPolicy::AnyAuthenticated, AuthContext::Unauthenticated) => {
            Err(AuthError::Unauthenticated)
        }
    }
}
