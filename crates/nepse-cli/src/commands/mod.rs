mod lookup;
mod serve;
mod update_stock_map;
mod validate;

use std::path::Path;
use std::sync::Arc;

use nepse_core::{
    ExchangeClient, GatewayConfig, ReqwestHttpClient, StockMapFile, SymbolValidator,
    UpstreamThrottle,
};
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    /// The command ran but the input it checked was not valid.
    pub invalid: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            invalid: false,
        }
    }

    pub fn invalid(data: Value) -> Self {
        Self {
            invalid: true,
            ..Self::ok(data)
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    match &cli.command {
        Command::Serve(args) => serve::run(args, load_config(cli)?, &cli.stock_map).await,
        Command::ValidateStock(args) => validate::stock(args, &cli.stock_map),
        Command::ValidateIndex(args) => validate::index(args),
        Command::LookupCompany(args) => lookup::run(args, &cli.stock_map),
        Command::UpdateStockMap(args) => {
            let output = args.output.as_deref().unwrap_or(&cli.stock_map);
            update_stock_map::run(&load_config(cli)?, output).await
        }
    }
}

fn load_config(cli: &Cli) -> Result<GatewayConfig, CliError> {
    Ok(GatewayConfig::load(cli.config.as_deref())?)
}

fn exchange_client(config: &GatewayConfig) -> ExchangeClient {
    ExchangeClient::new(
        config.upstream.base_url.clone(),
        config.upstream.timeout(),
        Arc::new(ReqwestHttpClient::new()),
        UpstreamThrottle::new(config.upstream.throttle),
    )
}

/// Validator over the stock map at `path`.
fn load_validator(path: &Path) -> Result<SymbolValidator, CliError> {
    let records = StockMapFile::new(path).read()?;
    Ok(SymbolValidator::with_records(records)?)
}
