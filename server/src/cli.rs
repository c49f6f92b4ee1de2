//! # CLI Interface
//!
//! Command-line arguments for `nostr-auth-server`, via `clap` derive. Every
//! `run` flag can also come from a `NOSTR_AUTH_*` environment variable.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use nostr_auth::config::{
    CHALLENGE_TTL, DEFAULT_API_PORT, DEFAULT_METRICS_PORT, PROOF_WINDOW,
};

/// Nostr key authentication service.
///
/// Issues login and link challenges, verifies signed responses and
/// per-request proofs, and resolves did:nostr identifiers.
#[derive(Parser, Debug)]
#[command(
    name = "nostr-auth-server",
    about = "Nostr key authentication service",
    version,
    propagate_version = true
)]
pub struct NostrAuthCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the API and metrics servers.
    Run(RunArgs),
    /// Generate a fresh key pair and print it.
    Keygen,
    /// Sign a challenge response (kind 22242) for manual testing.
    SignChallenge(SignChallengeArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the sled database.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "NOSTR_AUTH_DATA_DIR", default_value = "./nostr-auth-data")]
    pub data_dir: PathBuf,

    /// Port for the JSON API.
    #[arg(long, env = "NOSTR_AUTH_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "NOSTR_AUTH_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Externally visible base URL. Request proofs must name
    /// `<public-url><path>` in their `u` tag.
    #[arg(long, env = "NOSTR_AUTH_PUBLIC_URL", default_value = "http://localhost:9841")]
    pub public_url: String,

    /// Relay URL stamped on login challenges that don't ask for one.
    #[arg(long, env = "NOSTR_AUTH_RELAY")]
    pub relay: Option<String>,

    /// Challenge lifetime in seconds.
    #[arg(long, env = "NOSTR_AUTH_CHALLENGE_TTL", default_value_t = CHALLENGE_TTL.as_secs())]
    pub challenge_ttl: u64,

    /// Accepted clock distance for request proofs, in seconds.
    #[arg(long, env = "NOSTR_AUTH_PROOF_WINDOW", default_value_t = PROOF_WINDOW.as_secs())]
    pub proof_window: u64,

    /// Reject a request proof whose event ID was already accepted.
    #[arg(long, env = "NOSTR_AUTH_PROOF_REPLAY_CACHE")]
    pub proof_replay_cache: bool,

    /// Expose `POST /dev/session`, which hands out a session for any
    /// account ID. Never enable this outside development.
    #[arg(long, env = "NOSTR_AUTH_DEV_SESSIONS")]
    pub dev_sessions: bool,

    #[arg(long, env = "NOSTR_AUTH_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,
}

/// Arguments for the `sign-challenge` subcommand.
#[derive(Parser, Debug)]
pub struct SignChallengeArgs {
    /// Challenge string as returned by `/auth/challenge`.
    #[arg(long)]
    pub challenge: String,

    /// Hex-encoded secret key.
    ///
    /// Prefer the environment variable; flags end up in shell history.
    #[arg(long, env = "NOSTR_AUTH_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Relay tag to include, if the challenge was issued for one.
    #[arg(long)]
    pub relay: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        NostrAuthCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = NostrAuthCli::parse_from(["nostr-auth-server", "run"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.api_port, DEFAULT_API_PORT);
        assert_eq!(args.challenge_ttl, 300);
        assert_eq!(args.proof_window, 60);
        assert!(!args.proof_replay_cache);
        assert_eq!(args.log_format, LogFormatArg::Pretty);
    }
}
