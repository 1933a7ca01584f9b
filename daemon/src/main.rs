//! chainpay daemon: entry point for running a relay node.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chainpay_network::{HttpRouteDiscovery, HttpTransport};
use chainpay_node::{
    init_logging, AutoFlusher, LocalNode, LogFormat, NodeConfig, NodeSettings, ShutdownController,
};
use chainpay_nullables::NullLedger;
use chainpay_payment::{PaymentManagerRegistry, RegistryConfig};
use chainpay_protocol::NodeOperations;
use chainpay_rpc::{RpcServer, RpcState};
use clap::Parser;

#[derive(Parser)]
#[command(name = "chainpay-daemon", about = "chainpay payment relay node")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long, env = "CHAINPAY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "CHAINPAY_NODE_ID")]
    node_id: Option<String>,

    /// Hex-encoded 32-byte key seed.
    #[arg(long, env = "CHAINPAY_KEY_SEED", hide_env_values = true)]
    key_seed: Option<String>,

    /// Fee charged when relaying as an intermediary.
    #[arg(long, env = "CHAINPAY_FEE")]
    fee: Option<u64>,

    /// Accumulate incoming payments and settle them on flush.
    #[arg(long, env = "CHAINPAY_ACCUMULATE")]
    accumulate: bool,

    /// Auto-flush period in seconds; 0 disables it.
    #[arg(long, env = "CHAINPAY_AUTO_FLUSH_SECS")]
    auto_flush_secs: Option<u64>,

    #[arg(long, env = "CHAINPAY_RPC_PORT")]
    rpc_port: Option<u16>,

    /// Base URL other nodes use to reach this one.
    #[arg(long, env = "CHAINPAY_PUBLIC_ENDPOINT")]
    public_endpoint: Option<String>,

    #[arg(long, env = "CHAINPAY_ROUTE_DISCOVERY_URL")]
    route_discovery_url: Option<String>,

    #[arg(long, env = "CHAINPAY_STATUS_CALLBACK_URL")]
    status_callback_url: Option<String>,

    /// Answer inbound commands asynchronously through `reply_to`.
    #[arg(long, env = "CHAINPAY_ASYNC_REPLIES")]
    async_replies: bool,

    /// Answer payment calls before the session completes.
    #[arg(long, env = "CHAINPAY_ASYNC_COMPLETION")]
    async_completion: bool,

    /// "human" or "json".
    #[arg(long, env = "CHAINPAY_LOG_FORMAT")]
    log_format: Option<String>,

    /// "trace", "debug", "info", "warn" or "error".
    #[arg(long, env = "CHAINPAY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Node operations.
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

#[derive(clap::Subcommand)]
enum NodeAction {
    /// Run the node until SIGINT or SIGTERM.
    Run,
    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    /// File settings overlaid with whatever was given on the command line.
    fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };

        if let Some(node_id) = &self.node_id {
            config.node_id = node_id.clone();
        }
        if self.key_seed.is_some() {
            config.key_seed = self.key_seed.clone();
        }
        if let Some(fee) = self.fee {
            config.fee = fee;
        }
        config.accumulate |= self.accumulate;
        if let Some(secs) = self.auto_flush_secs {
            config.auto_flush_secs = secs;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if self.public_endpoint.is_some() {
            config.public_endpoint = self.public_endpoint.clone();
        }
        if self.route_discovery_url.is_some() {
            config.route_discovery_url = self.route_discovery_url.clone();
        }
        if self.status_callback_url.is_some() {
            config.status_callback_url = self.status_callback_url.clone();
        }
        config.async_replies |= self.async_replies;
        config.async_completion |= self.async_completion;
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.node_config()?;

    match cli.command {
        Command::Node { action } => match action {
            NodeAction::Config => {
                println!("{}", config.to_toml_string()?);
            }
            NodeAction::Run => {
                let format: LogFormat = config
                    .log_format
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))?;
                init_logging(format, &config.log_level)?;
                run(config).await?;
            }
        },
    }

    Ok(())
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let ledger = Arc::new(NullLedger::new());
    for (address, balance) in config.dev_balances() {
        ledger.fund_asset(&address, &config.asset(), balance);
    }

    let keypair = config.keypair()?;
    let node = Arc::new(LocalNode::new(
        NodeSettings::from_config(&config),
        keypair,
        ledger,
    ));
    tracing::info!(
        node_id = %node.node_id(),
        address = %node.address(),
        fee = %config.fee(),
        accumulate = config.accumulate,
        "starting chainpay node"
    );

    let flusher = AutoFlusher::spawn(node.clone(), config.auto_flush_period());

    let transport = HttpTransport::with_timeout(config.command_timeout());
    let mut payments = PaymentManagerRegistry::new(
        node.clone(),
        Arc::new(transport.clone()),
        RegistryConfig::from_node_config(&config),
    );
    if let Some(url) = &config.route_discovery_url {
        tracing::info!(%url, "using route discovery");
        payments = payments.with_discovery(Arc::new(HttpRouteDiscovery::new(url.clone())));
    }
    if config.public_endpoint.is_none() {
        tracing::warn!("no public_endpoint configured; hops must answer synchronously");
    }

    let state = Arc::new(RpcState {
        node: node.clone(),
        payments: Arc::new(payments),
        responder: transport,
        async_replies: config.async_replies,
        enable_metrics: config.enable_metrics,
    });

    let shutdown = Arc::new(ShutdownController::new());
    let server = RpcServer::new(config.rpc_port, state);
    let serving = server.start(shutdown.signalled());

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    let result = serving.await;

    tracing::info!("stopping auto-flush");
    flusher.stop().await;
    if !node.registry().is_empty() {
        tracing::warn!(
            outstanding = node.registry().len(),
            "exiting with unflushed transactions"
        );
    }

    result?;
    tracing::info!("chainpay daemon exited cleanly");
    Ok(())
}
