use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::dispatch::{DispatchSettings, FailurePolicy};
use crate::intersect::{Membership, DEFAULT_FALSE_POSITIVE_RATE};

/// Membership test used when narrowing the common-games set
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipKind {
    /// Bloom filter keyed by app id (approximate, no false removals)
    Bloom,
    /// Hash set keyed by app id
    Exact,
}

/// Shows the Steam games every listed player owns
#[derive(Parser, Debug, Clone)]
#[command(name = "steamowned", version, about)]
pub struct Config {
    /// Host to listen on for the webserver
    #[arg(long, env = "HOST", default_value = "localhost")]
    pub host: String,

    /// Port to listen on for the webserver
    #[arg(long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Serve over TLS (https)
    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub tls: bool,

    /// Path to the PEM certificate file
    #[arg(long, env = "TLS_CERT_PATH", default_value = "/cert.pem")]
    pub tls_cert: PathBuf,

    /// Path to the PEM private key for the certificate
    #[arg(long, env = "TLS_KEY_PATH", default_value = "/key.pem")]
    pub tls_key: PathBuf,

    /// Steam Web API key
    #[arg(long, env = "STEAM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Steam Web API base URL
    #[arg(long, env = "STEAM_API_URL", default_value = "https://api.steampowered.com")]
    pub api_url: String,

    /// Deadline for a single player's owned-games fetch, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "10")]
    pub fetch_timeout_secs: u64,

    /// Maximum upstream fetches in flight per request (unbounded when unset)
    #[arg(long, env = "MAX_CONCURRENT_FETCHES")]
    pub max_concurrent_fetches: Option<usize>,

    /// Fail the whole request if any player's games cannot be fetched
    #[arg(long, env = "STRICT", default_value = "false")]
    pub strict: bool,

    /// Membership test used when narrowing the result
    #[arg(long, env = "MEMBERSHIP", value_enum, default_value = "bloom")]
    pub membership: MembershipKind,

    /// Target false-positive rate of the Bloom filter
    #[arg(long, env = "FALSE_POSITIVE_RATE", default_value_t = DEFAULT_FALSE_POSITIVE_RATE)]
    pub false_positive_rate: f64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            anyhow::bail!("STEAM_API_KEY is required; without it Steam answers every request with 403");
        }
        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be positive");
        }
        if self.max_concurrent_fetches == Some(0) {
            anyhow::bail!("max_concurrent_fetches must be positive when set");
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            anyhow::bail!("false_positive_rate must be between 0.0 and 1.0 (exclusive)");
        }
        if self.tls {
            if !self.tls_cert.is_file() {
                anyhow::bail!("TLS certificate not found: {}", self.tls_cert.display());
            }
            if !self.tls_key.is_file() {
                anyhow::bail!("TLS private key not found: {}", self.tls_key.display());
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            fetch_timeout: self.fetch_timeout(),
            max_concurrent_fetches: self.max_concurrent_fetches,
            failure_policy: if self.strict {
                FailurePolicy::Strict
            } else {
                FailurePolicy::Lenient
            },
            membership: match self.membership {
                MembershipKind::Bloom => Membership::Bloom {
                    false_positive_rate: self.false_positive_rate,
                },
                MembershipKind::Exact => Membership::Exact,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, FromArgMatches};

    /// Parse flags only, so `PORT`, `STEAM_API_KEY` etc. in the test
    /// environment cannot leak into the result.
    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["steamowned"];
        argv.extend_from_slice(args);
        let matches = Config::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(argv)
            .unwrap();
        Config::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--api-key", "KEY"]);
        assert_eq!(config.bind_addr(), "localhost:8000");
        assert!(!config.tls);
        assert_eq!(config.tls_cert, PathBuf::from("/cert.pem"));
        assert_eq!(config.tls_key, PathBuf::from("/key.pem"));
        assert!(config.validate().is_ok());

        let settings = config.dispatch_settings();
        assert_eq!(settings.fetch_timeout, Duration::from_secs(10));
        assert_eq!(settings.failure_policy, FailurePolicy::Lenient);
        assert_eq!(settings.max_concurrent_fetches, None);
        assert_eq!(settings.membership, Membership::default());
    }

    #[test]
    fn test_flags_map_to_dispatch_settings() {
        let config = parse(&[
            "--api-key",
            "KEY",
            "--strict",
            "--membership",
            "exact",
            "--max-concurrent-fetches",
            "4",
            "--fetch-timeout-secs",
            "3",
        ]);
        let settings = config.dispatch_settings();
        assert_eq!(settings.failure_policy, FailurePolicy::Strict);
        assert_eq!(settings.membership, Membership::Exact);
        assert_eq!(settings.max_concurrent_fetches, Some(4));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(parse(&[]).validate().is_err());
        assert!(parse(&["--api-key", " "]).validate().is_err());
        assert!(parse(&["--api-key", "K", "--fetch-timeout-secs", "0"]).validate().is_err());
        assert!(parse(&["--api-key", "K", "--max-concurrent-fetches", "0"]).validate().is_err());
        assert!(parse(&["--api-key", "K", "--false-positive-rate", "1.5"]).validate().is_err());
    }

    #[test]
    fn test_parser_ignores_environment() {
        // nothing else in the test binary reads these
        std::env::set_var("PORT", "9999");
        std::env::set_var("STEAM_API_KEY", "from-env");
        let config = parse(&[]);
        std::env::remove_var("PORT");
        std::env::remove_var("STEAM_API_KEY");

        assert_eq!(config.bind_addr(), "localhost:8000");
        assert!(config.api_key.is_none());
        assert!(config.validate().is_err());

        let config = parse(&["--host", "0.0.0.0", "--port", "9000"]);
        assert_eq!(config.bind_addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_tls_requires_existing_files() {
        let config = parse(&[
            "--api-key",
            "K",
            "--tls",
            "--tls-cert",
            "/definitely/missing/cert.pem",
        ]);
        assert!(config.validate().is_err());
    }
}
