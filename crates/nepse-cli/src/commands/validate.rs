use std::path::Path;

use nepse_core::{SymbolValidator, ValidationReport};

use crate::cli::{ValidateIndexArgs, ValidateStockArgs};
use crate::error::CliError;

use super::CommandResult;

pub fn stock(args: &ValidateStockArgs, stock_map: &Path) -> Result<CommandResult, CliError> {
    let validator = super::load_validator(stock_map)?;
    let outcome = validator.validate_symbol(&args.symbol);
    into_result(ValidationReport::from_outcome(&args.symbol, outcome))
}

/// Index names are fixed, so no stock map is needed.
pub fn index(args: &ValidateIndexArgs) -> Result<CommandResult, CliError> {
    let outcome = SymbolValidator::new().validate_index(&args.index);
    into_result(ValidationReport::from_outcome(&args.index, outcome))
}

fn into_result(report: ValidationReport) -> Result<CommandResult, CliError> {
    let valid = report.is_valid;
    let data = serde_json::to_value(report)?;
    Ok(if valid {
        CommandResult::ok(data)
    } else {
        CommandResult::invalid(data)
    })
}
