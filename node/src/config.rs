//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use chainpay_types::{Address, Amount, Asset, KeyPair, NodeId};

use crate::NodeError;

/// Configuration for one chainpay node.
///
/// Loaded with [`NodeConfig::from_toml_file`] or built programmatically
/// (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Hex-encoded 32-byte Ed25519 seed. A fresh key is generated when absent.
    #[serde(default)]
    pub key_seed: Option<String>,

    /// Fee this node charges for relaying one payment.
    #[serde(default)]
    pub fee: u64,

    /// Asset the node settles in.
    #[serde(default = "default_asset")]
    pub asset: String,

    /// Fold repeated payments from the same counterparty into one ledger
    /// transaction and submit them on flush.
    #[serde(default)]
    pub accumulate: bool,

    /// Auto-flush period in seconds; `0` disables the timer.
    #[serde(default)]
    pub auto_flush_secs: u64,

    /// How long to wait for a remote hop to answer a command.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Upper bound on one payment session, end to end.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Run payment sessions in the background and answer the caller
    /// immediately with the session id.
    #[serde(default)]
    pub async_completion: bool,

    /// Answer inbound commands with `202 Accepted` and post the response to
    /// the caller's `reply_to` URL later.
    #[serde(default)]
    pub async_replies: bool,

    #[serde(default)]
    pub status_callback_url: Option<String>,

    #[serde(default)]
    pub route_discovery_url: Option<String>,

    /// Base URL other nodes and `reply_to` fields use to reach this node.
    #[serde(default)]
    pub public_endpoint: Option<String>,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Accounts pre-funded on the in-process development ledger.
    #[serde(default)]
    pub dev_accounts: Vec<DevAccount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevAccount {
    pub address: String,
    pub balance: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_node_id() -> String {
    "node-0".to_string()
}

fn default_asset() -> String {
    "XLM".to_string()
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_session_timeout_ms() -> u64 {
    120_000
}

fn default_rpc_port() -> u16 {
    7180
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.node_id.clone())
    }

    pub fn fee(&self) -> Amount {
        Amount::from(self.fee)
    }

    pub fn asset(&self) -> Asset {
        Asset::new(self.asset.clone())
    }

    /// The configured key pair, or a fresh one when no seed is set.
    pub fn keypair(&self) -> Result<KeyPair, NodeError> {
        match &self.key_seed {
            Some(seed) => chainpay_crypto::keypair_from_hex_seed(seed)
                .ok_or_else(|| NodeError::Key("key_seed must be 64 hex characters".into())),
            None => chainpay_crypto::generate_keypair().map_err(|e| NodeError::Key(e.to_string())),
        }
    }

    pub fn auto_flush_period(&self) -> Option<Duration> {
        (self.auto_flush_secs > 0).then(|| Duration::from_secs(self.auto_flush_secs))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn dev_balances(&self) -> Vec<(Address, Amount)> {
        self.dev_accounts
            .iter()
            .map(|a| (Address::new(a.address.clone()), Amount::from(a.balance)))
            .collect()
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            key_seed: None,
            fee: 0,
            asset: default_asset(),
            accumulate: false,
            auto_flush_secs: 0,
            command_timeout_ms: default_command_timeout_ms(),
            session_timeout_ms: default_session_timeout_ms(),
            async_completion: false,
            async_replies: false,
            status_callback_url: None,
            route_discovery_url: None,
            public_endpoint: None,
            rpc_port: default_rpc_port(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: default_true(),
            dev_accounts: Vec::new(),
        }
    }
}
