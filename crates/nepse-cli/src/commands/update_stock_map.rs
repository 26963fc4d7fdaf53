use std::path::Path;

use nepse_core::{CorpusSnapshot, ExchangeCorpusLoader, GatewayConfig, StockMapFile, SymbolRecord};
use serde_json::json;

use crate::error::CliError;

use super::CommandResult;

pub async fn run(config: &GatewayConfig, output: &Path) -> Result<CommandResult, CliError> {
    let loader = ExchangeCorpusLoader::new(super::exchange_client(config));
    let records = loader.fetch_records().await?;

    let mut result = write_canonical(records, output)?;
    result.data["upstream"] = json!(config.upstream.base_url);
    Ok(result)
}

/// Writes the records as the validator would hold them: trimmed, uppercased
/// and sorted. Nothing is written if they do not form a valid corpus.
fn write_canonical(records: Vec<SymbolRecord>, output: &Path) -> Result<CommandResult, CliError> {
    let snapshot = CorpusSnapshot::build(records, 0)?;
    let canonical: Vec<SymbolRecord> = snapshot.records().cloned().collect();
    StockMapFile::new(output).write(&canonical)?;
    tracing::info!(path = %output.display(), symbols = canonical.len(), "stock map updated");

    let unknown_sector = canonical
        .iter()
        .filter(|record| record.sector == "Unknown")
        .count();
    let mut result = CommandResult::ok(json!({
        "path": output.display().to_string(),
        "total_symbols": canonical.len(),
    }));
    if unknown_sector > 0 {
        result = result.with_warning(format!(
            "{unknown_sector} symbols are missing from the sector listing"
        ));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_canonical_symbols_and_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stockmap.json");
        let records = vec![
            SymbolRecord::new(" nabil ", "  Nabil Bank Limited ", "Commercial Banks", "Equity"),
            SymbolRecord::new("upper", "Upper Tamakoshi Hydropower Ltd", "Unknown", "Equity"),
        ];

        let result = write_canonical(records, &path).expect("written");

        let written = StockMapFile::new(&path).read().expect("readable");
        assert_eq!(written[0].symbol, "NABIL");
        assert_eq!(written[0].company_name, "Nabil Bank Limited");
        assert_eq!(written[1].symbol, "UPPER");
        assert_eq!(result.data["total_symbols"], 2);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn invalid_corpus_leaves_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stockmap.json");
        let records = vec![
            SymbolRecord::new("NABIL", "Nabil Bank Limited", "Commercial Banks", "Equity"),
            SymbolRecord::new("nabil", "Nabil Bank Limited", "Commercial Banks", "Equity"),
        ];

        assert!(matches!(
            write_canonical(records, &path),
            Err(CliError::Corpus(_))
        ));
        assert!(!path.exists());
    }
}
