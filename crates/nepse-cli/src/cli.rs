//! CLI argument definitions for `nepse`.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `serve` | Run the HTTP gateway |
//! | `validate-stock` | Check a symbol against the stock map |
//! | `validate-index` | Check an index name |
//! | `lookup-company` | Map a company name to its symbol, or a symbol to its company |
//! | `update-stock-map` | Rebuild the stock map from the exchange |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--config` | none | JSON gateway configuration |
//! | `--stock-map` | `stockmap.json` | Symbol corpus on disk |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--verbose` | `false` | Debug logging when `RUST_LOG` is unset |
//!
//! # Examples
//!
//! ```bash
//! nepse serve --listen 0.0.0.0:8080
//! nepse validate-stock nabil --pretty
//! nepse lookup-company --name "Nabil Bank Limited"
//! NEPSE_UPSTREAM_URL=http://localhost:8000 nepse update-stock-map
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// NEPSE gateway: rate limiting, validation and caching in front of the exchange.
#[derive(Debug, Parser)]
#[command(name = "nepse", author, version, about)]
pub struct Cli {
    /// Gateway configuration file (JSON). Environment overrides still apply.
    #[arg(long, global = true, env = "NEPSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Stock map used as the symbol corpus.
    #[arg(long, global = true, env = "NEPSE_STOCK_MAP", default_value = "stockmap.json")]
    pub stock_map: PathBuf,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the gateway over HTTP until Ctrl-C.
    Serve(ServeArgs),
    /// Check a stock symbol and suggest close matches.
    ValidateStock(ValidateStockArgs),
    /// Check an index name and suggest close matches.
    ValidateIndex(ValidateIndexArgs),
    /// Resolve a company name to its symbol or a symbol to its company.
    LookupCompany(LookupCompanyArgs),
    /// Rebuild the stock map from the exchange's security and sector lists.
    UpdateStockMap(UpdateStockMapArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "NEPSE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Build the corpus from the exchange instead of the stock map.
    #[arg(long, default_value_t = false)]
    pub corpus_from_exchange: bool,
}

#[derive(Debug, Args)]
pub struct ValidateStockArgs {
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct ValidateIndexArgs {
    pub index: String,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct LookupCompanyArgs {
    /// Company name to resolve to a symbol.
    #[arg(long)]
    pub name: Option<String>,

    /// Symbol to resolve to its company.
    #[arg(long)]
    pub symbol: Option<String>,
}

#[derive(Debug, Args)]
pub struct UpdateStockMapArgs {
    /// Where to write the map. Defaults to `--stock-map`.
    #[arg(long)]
    pub output: Option<PathBuf>,
}
