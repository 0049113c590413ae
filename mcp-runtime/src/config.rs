use std::time::Duration;

use clap::Args;
use thiserror::Error;

use crate::credentials::DEFAULT_TOKEN_TTL;

pub const DEFAULT_SKIP: u64 = 0;
pub const DEFAULT_LIMIT: u64 = 10;

/// Runtime settings shared by every subcommand. Read once at startup.
#[derive(Args, Clone, Debug)]
pub struct RuntimeArgs {
    /// Base URL of the Kynhood events API
    #[arg(long, env = "API_BASE_URL")]
    pub api_url: String,

    /// Default number of events to skip when listEvents omits `skip`
    #[arg(long, env = "DEFAULT_SKIP", default_value_t = DEFAULT_SKIP)]
    pub default_skip: u64,

    /// Default page size when listEvents omits `limit`
    #[arg(long, env = "DEFAULT_LIMIT", default_value_t = DEFAULT_LIMIT)]
    pub default_limit: u64,

    /// Lifetime of a cached guest token, kept below the upstream's own expiry
    #[arg(
        long,
        env = "TOKEN_TTL_SECS",
        default_value_t = DEFAULT_TOKEN_TTL.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub token_ttl_secs: u64,

    /// Enable debug logging. `DEBUG` values such as `0`, `no`, `off` or an
    /// empty string read as false; any other value enables it.
    #[arg(
        long,
        env = "DEBUG",
        action = clap::ArgAction::SetTrue,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub debug: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaginationDefaults {
    pub skip: u64,
    pub limit: u64,
}

impl Default for PaginationDefaults {
    fn default() -> Self {
        Self {
            skip: DEFAULT_SKIP,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub api_url: String,
    pub pagination: PaginationDefaults,
    pub token_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid API base URL '{url}': {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("API base URL must use http or https, got '{0}'")]
    UnsupportedScheme(String),
}

impl RuntimeConfig {
    pub fn new(api_url: impl Into<String>) -> Result<Self, ConfigError> {
        let api_url = api_url.into();
        let parsed = url::Url::parse(&api_url).map_err(|source| ConfigError::InvalidApiUrl {
            url: api_url.clone(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        Ok(Self {
            api_url,
            pagination: PaginationDefaults::default(),
            token_ttl: DEFAULT_TOKEN_TTL,
        })
    }

    pub fn from_args(args: &RuntimeArgs) -> Result<Self, ConfigError> {
        let mut config = Self::new(args.api_url.clone())?;
        config.pagination = PaginationDefaults {
            skip: args.default_skip,
            limit: args.default_limit,
        };
        config.token_ttl = Duration::from_secs(args.token_ttl_secs);
        Ok(config)
    }
}
