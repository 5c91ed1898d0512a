//! Transport configuration loaded from environment variables.
//!
//! Defaults point at a local gateway so a development setup needs nothing
//! but a running node.

use std::time::Duration;

use tender_shared::Address;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// JSON-RPC gateway in front of the ledger and the wallet.
    /// Env: `TENDER_RPC_URL`
    /// Default: `http://127.0.0.1:8545`
    pub rpc_url: String,

    /// Deployed tender contract.
    /// Env: `TENDER_CONTRACT_ADDRESS`
    /// Default: the zero address (development only).
    pub contract: Address,

    /// Per-request timeout.
    /// Env: `TENDER_RPC_TIMEOUT_SECS`
    /// Default: 20 seconds.
    pub request_timeout: Duration,

    /// How often the wallet is polled for account / chain changes.
    /// Env: `TENDER_WALLET_POLL_SECS`
    /// Default: 4 seconds.
    pub wallet_poll: Duration,

    /// Pinning endpoint. Pinning is disabled when unset.
    /// Env: `TENDER_PINNING_URL`
    pub pinning_url: Option<String>,

    /// Bearer token for the pinning endpoint.
    /// Env: `TENDER_PINNING_JWT`
    pub pinning_jwt: Option<String>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            contract: Address::parse("0x0000000000000000000000000000000000000000")
                .unwrap_or_default(),
            request_timeout: Duration::from_secs(20),
            wallet_poll: Duration::from_secs(4),
            pinning_url: None,
            pinning_jwt: None,
        }
    }
}

impl NetConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("TENDER_RPC_URL") {
            config.rpc_url = url;
        }

        if let Ok(raw) = std::env::var("TENDER_CONTRACT_ADDRESS") {
            match Address::parse(&raw) {
                Ok(addr) => config.contract = addr,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid TENDER_CONTRACT_ADDRESS, using default");
                }
            }
        }

        if let Some(secs) = parse_secs("TENDER_RPC_TIMEOUT_SECS") {
            config.request_timeout = secs;
        }

        if let Some(secs) = parse_secs("TENDER_WALLET_POLL_SECS") {
            config.wallet_poll = secs;
        }

        if let Ok(url) = std::env::var("TENDER_PINNING_URL") {
            if !url.is_empty() {
                config.pinning_url = Some(url);
            }
        }

        if let Ok(jwt) = std::env::var("TENDER_PINNING_JWT") {
            if !jwt.is_empty() {
                config.pinning_jwt = Some(jwt);
            }
        }

        config
    }

    pub fn pinning_enabled(&self) -> bool {
        self.pinning_url.is_some() && self.pinning_jwt.is_some()
    }
}

fn parse_secs(var: &str) -> Option<Duration> {
    let raw = std::env::var(var).ok()?;
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Some(Duration::from_secs(n)),
        _ => {
            tracing::warn!(var, value = %raw, "Invalid duration, using default");
            None
        }
    }
}
