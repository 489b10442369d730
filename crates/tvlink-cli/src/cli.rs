//! CLI argument definitions using clap.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tvlink_core::DiscoveryStrategy;

/// tvlink - discover TV receivers on the local network and cast media to them
#[derive(Parser, Debug)]
#[command(name = "tvlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Connect timeout in milliseconds (overrides settings)
    #[arg(long, global = true, env = "TVLINK_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Local interface address used for broadcast discovery
    #[arg(long, global = true, env = "TVLINK_LOCAL_IP")]
    pub local_ip: Option<IpAddr>,

    /// Settings file (default: platform config directory)
    #[arg(long, global = true, env = "TVLINK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover receivers on the network
    Discover(DiscoverArgs),

    /// Open a control session and follow its state
    Connect(ConnectArgs),

    /// Send a media reference to a receiver
    Cast(CastArgs),

    /// Settings management
    Config(ConfigArgs),
}

// ==================== Discover ====================

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Watch mode - keep scanning and refresh the list
    #[arg(short, long)]
    pub watch: bool,

    /// Scan duration in seconds (per round in watch mode)
    #[arg(short, long, default_value = "5")]
    pub duration: u64,

    /// Discovery strategy (default from settings)
    #[arg(short, long, value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Receiver address for the static strategy (repeatable)
    #[arg(short, long = "address", value_name = "ADDRESS")]
    pub addresses: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    Broadcast,
    Mdns,
    Static,
}

impl From<StrategyArg> for DiscoveryStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Broadcast => DiscoveryStrategy::Broadcast,
            StrategyArg::Mdns => DiscoveryStrategy::Mdns,
            StrategyArg::Static => DiscoveryStrategy::Static,
        }
    }
}

// ==================== Connect ====================

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Receiver IP address
    pub address: String,
}

// ==================== Cast ====================

#[derive(Args, Debug)]
pub struct CastArgs {
    /// Receiver IP address
    pub address: String,

    /// Media reference to send (default from settings)
    pub reference: Option<String>,
}

// ==================== Config ====================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective settings
    Show,

    /// Write default settings to the settings file
    Init(ConfigInitArgs),

    /// Print the settings file location
    Path,
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Overwrite an existing settings file
    #[arg(long)]
    pub force: bool,
}
