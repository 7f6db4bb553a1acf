use clap::{Parser, Subcommand};

pub mod formatters;
pub mod runner;

#[derive(Parser)]
#[command(name = "fundlens")]
#[command(
    version,
    about = "Trading-unit asset reconciliation and return reporting"
)]
#[command(
    long_about = "Reconcile trading-terminal asset exports (equity + futures) per trading unit, \
manage the manual cash-flow ledger, and compute cash-flow-adjusted daily returns with time-sliced caching."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Config file path (default: ~/.fundlens/config.toml)
    #[arg(long = "config", global = true)]
    pub config: Option<String>,

    /// Database path (default: from config, then ~/.fundlens/data.db)
    #[arg(long = "db", global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manual cash-flow ledger (deposits and withdrawals per unit)
    Flows {
        #[command(subcommand)]
        action: FlowCommands,
    },

    /// Cash-flow-adjusted daily returns
    Returns {
        #[command(subcommand)]
        action: ReturnCommands,
    },

    /// Show the freshest export files visible for a data source
    Scan {
        /// Data source name from the config (e.g. live, sim)
        source: String,
    },

    /// Cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum FlowCommands {
    /// Record a flow; an existing (unit, date, type) row is replaced
    Add {
        unit: String,
        /// Date as YYYY-MM-DD
        date: String,
        /// "inflow" or "outflow"
        flow_type: String,
        amount: String,
        /// Optional free-text note
        #[arg(short, long)]
        note: Option<String>,
    },

    /// Remove the row matching unit, date, type and amount exactly
    Remove {
        unit: String,
        date: String,
        flow_type: String,
        amount: String,
    },

    /// List all flows for a unit
    List { unit: String },

    /// Delete every flow for a unit
    Clear {
        unit: String,
        /// Required confirmation; refuses to run without it
        #[arg(long)]
        yes: bool,
    },

    /// Net flow (inflow - outflow) for a unit on a date
    Net {
        unit: String,
        date: String,
    },
}

#[derive(Subcommand)]
pub enum ReturnCommands {
    /// Return for one unit
    Unit {
        unit: String,
        /// Data source name from the config
        #[arg(short, long, default_value = "live")]
        source: String,
    },

    /// Returns for every unit in a source
    All {
        #[arg(short, long, default_value = "live")]
        source: String,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Delete cache entries older than one day
    Purge,
}
