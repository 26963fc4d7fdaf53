use std::path::Path;

use nepse_core::{SymbolValidator, ValidationFailure};
use serde_json::{json, Value};

use crate::cli::LookupCompanyArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &LookupCompanyArgs, stock_map: &Path) -> Result<CommandResult, CliError> {
    let validator = super::load_validator(stock_map)?;
    Ok(lookup(&validator, args))
}

fn lookup(validator: &SymbolValidator, args: &LookupCompanyArgs) -> CommandResult {
    let outcome = match (&args.name, &args.symbol) {
        (Some(name), _) => validator
            .find_symbol_by_company_name(name)
            .map(|symbol| describe(validator, &symbol)),
        (None, Some(symbol)) => validator
            .validate_symbol(symbol)
            .map(|symbol| describe(validator, &symbol)),
        (None, None) => Err(ValidationFailure {
            input: String::new(),
            message: String::from("either --name or --symbol is required"),
            suggestions: Vec::new(),
        }),
    };

    match outcome {
        Ok(found) => CommandResult::ok(found),
        Err(failure) => CommandResult::invalid(json!({
            "found": false,
            "input": failure.input,
            "message": failure.message,
            "suggestions": failure.suggestions,
        })),
    }
}

fn describe(validator: &SymbolValidator, symbol: &str) -> Value {
    let record = validator.record(symbol);
    let index = validator.index_for_symbol(symbol).ok();
    json!({
        "found": true,
        "symbol": symbol,
        "company_name": record.as_ref().map(|record| record.company_name.as_str()),
        "sector": record.as_ref().map(|record| record.sector.as_str()),
        "index": index.map(|index| index.name),
    })
}

#[cfg(test)]
mod tests {
    use nepse_core::SymbolRecord;

    use super::*;

    fn validator() -> SymbolValidator {
        SymbolValidator::with_records(vec![SymbolRecord::new(
            "UPPER",
            "Upper Tamakoshi Hydropower Ltd",
            "Hydro Power",
            "Equity",
        )])
        .expect("valid corpus")
    }

    #[test]
    fn company_name_resolves_with_sector_index() {
        let args = LookupCompanyArgs {
            name: Some(String::from("upper tamakoshi hydropower ltd")),
            symbol: None,
        };

        let result = lookup(&validator(), &args);

        assert!(!result.invalid);
        assert_eq!(result.data["symbol"], "UPPER");
        assert_eq!(result.data["index"], "HydroPower Index");
    }

    #[test]
    fn unknown_symbol_reports_suggestions() {
        let args = LookupCompanyArgs {
            name: None,
            symbol: Some(String::from("UPPR")),
        };

        let result = lookup(&validator(), &args);

        assert!(result.invalid);
        assert_eq!(result.data["suggestions"][0], "UPPER");
    }
}
