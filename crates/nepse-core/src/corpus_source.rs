//! Where corpus records come from.
//!
//! | Loader | Source |
//! |--------|--------|
//! | [`StockMapFile`] | `stockmap.json` on disk: `{SYMBOL: {name, sector, internalSector}}` |
//! | [`ExchangeCorpusLoader`] | `/SecurityList` joined with `/SectorScrips` from any [`Upstream`] |

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::index_for_sector;
use crate::upstream::Upstream;
use crate::{CoreError, CorpusRefreshError, LogicalQuery, MarketEndpoint, SymbolRecord};

const UNKNOWN_SECTOR: &str = "Unknown";
const DEFAULT_INSTRUMENT: &str = "Equity";

pub type CorpusFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<SymbolRecord>, CorpusRefreshError>> + Send + 'a>>;

/// Produces the full record list for a corpus refresh.
pub trait CorpusLoader: Send + Sync {
    fn load_corpus<'a>(&'a self) -> CorpusFuture<'a>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StockMapEntry {
    name: String,
    #[serde(default)]
    sector: String,
    #[serde(rename = "internalSector", default)]
    internal_sector: String,
}

/// `stockmap.json` reader and writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMapFile {
    path: PathBuf,
}

impl StockMapFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Vec<SymbolRecord>, CoreError> {
        let raw = std::fs::read_to_string(&self.path)?;
        parse_stock_map(&raw)
    }

    /// Writes `records` sorted by symbol, replacing the file in one rename.
    pub fn write(&self, records: &[SymbolRecord]) -> Result<(), CoreError> {
        let map: BTreeMap<&str, StockMapEntry> = records
            .iter()
            .map(|record| {
                let entry = StockMapEntry {
                    name: record.company_name.clone(),
                    sector: record.sector.clone(),
                    internal_sector: index_for_sector(&record.sector).display_name.to_owned(),
                };
                (record.symbol.as_str(), entry)
            })
            .collect();

        let body = serde_json::to_string_pretty(&map)?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, body)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl CorpusLoader for StockMapFile {
    fn load_corpus<'a>(&'a self) -> CorpusFuture<'a> {
        Box::pin(async move {
            let raw = tokio::fs::read_to_string(&self.path).await.map_err(|error| {
                CorpusRefreshError::Load(format!("{}: {error}", self.path.display()))
            })?;
            parse_stock_map(&raw).map_err(|error| CorpusRefreshError::Load(error.to_string()))
        })
    }
}

/// Parses the `stockmap.json` format. Symbols come back in ascending order.
pub fn parse_stock_map(raw: &str) -> Result<Vec<SymbolRecord>, CoreError> {
    let entries: BTreeMap<String, StockMapEntry> = serde_json::from_str(raw)?;
    Ok(entries
        .into_iter()
        .map(|(symbol, entry)| {
            let sector = if entry.sector.trim().is_empty() {
                String::from(UNKNOWN_SECTOR)
            } else {
                entry.sector
            };
            SymbolRecord::new(symbol, entry.name, sector, DEFAULT_INSTRUMENT)
        })
        .collect())
}

/// Builds the corpus from the exchange's own security and sector listings.
#[derive(Debug)]
pub struct ExchangeCorpusLoader<U> {
    upstream: U,
}

impl<U: Upstream> ExchangeCorpusLoader<U> {
    pub fn new(upstream: U) -> Self {
        Self { upstream }
    }

    pub async fn fetch_records(&self) -> Result<Vec<SymbolRecord>, CorpusRefreshError> {
        let securities = self
            .upstream
            .fetch(&LogicalQuery::new(MarketEndpoint::SecurityList))
            .await?;
        let sectors = self
            .upstream
            .fetch(&LogicalQuery::new(MarketEndpoint::SectorScrips))
            .await?;

        let records = join_listings(&securities, &sectors)?;
        tracing::info!(records = records.len(), "built corpus from exchange listings");
        Ok(records)
    }
}

impl<U: Upstream> CorpusLoader for ExchangeCorpusLoader<U> {
    fn load_corpus<'a>(&'a self) -> CorpusFuture<'a> {
        Box::pin(self.fetch_records())
    }
}

/// Active securities from a `/SecurityList` payload, with sectors resolved
/// through a `/SectorScrips` payload (`{sector: [symbol, ...]}`).
pub fn join_listings(
    securities: &Value,
    sectors: &Value,
) -> Result<Vec<SymbolRecord>, CorpusRefreshError> {
    let listed = securities.as_array().ok_or_else(|| {
        CorpusRefreshError::Load(String::from("security list is not a JSON array"))
    })?;
    let sector_map = sectors.as_object().ok_or_else(|| {
        CorpusRefreshError::Load(String::from("sector scrips is not a JSON object"))
    })?;

    let mut sector_by_symbol: HashMap<&str, &str> = HashMap::new();
    for (sector, symbols) in sector_map {
        for symbol in symbols.as_array().into_iter().flatten().filter_map(Value::as_str) {
            sector_by_symbol.insert(symbol, sector.as_str());
        }
    }

    let mut records = Vec::with_capacity(listed.len());
    for item in listed {
        if item.get("activeStatus").and_then(Value::as_str) != Some("A") {
            continue;
        }
        let Some(symbol) = item.get("symbol").and_then(Value::as_str) else {
            continue;
        };
        if symbol.trim().is_empty() {
            continue;
        }

        let name = item
            .get("securityName")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(symbol);
        let sector = sector_by_symbol
            .get(symbol)
            .copied()
            .unwrap_or(UNKNOWN_SECTOR);
        let instrument = item
            .get("instrumentType")
            .and_then(|kind| kind.get("description").or(Some(kind)))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_INSTRUMENT);

        records.push(SymbolRecord::new(symbol, name, sector, instrument));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_stock_map_entries() {
        let records = parse_stock_map(
            r#"{
                "NICA": {"name": "NIC Asia Bank Ltd.", "sector": "Commercial Banks", "internalSector": "Banking SubIndex"},
                "ADBL": {"name": "Agricultural Development Bank Limited", "sector": ""}
            }"#,
        )
        .expect("valid stock map");

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].symbol, "ADBL");
        assert_eq!(records[0].sector, "Unknown");
        assert_eq!(records[1].company_name, "NIC Asia Bank Ltd.");
    }

    #[test]
    fn write_then_read_keeps_records_and_adds_internal_sector() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = StockMapFile::new(dir.path().join("stockmap.json"));
        let records = vec![SymbolRecord::new(
            "UPPER",
            "Upper Tamakoshi Hydropower Ltd",
            "Hydro Power",
            "Equity",
        )];

        file.write(&records).expect("written");
        let raw = std::fs::read_to_string(file.path()).expect("readable");
        let value: Value = serde_json::from_str(&raw).expect("json");

        assert_eq!(value["UPPER"]["internalSector"], "HydroPower Index");
        assert_eq!(file.read().expect("parsed"), records);
    }

    #[test]
    fn joins_only_active_securities() {
        let securities = json!([
            {"symbol": "NABIL", "securityName": "Nabil Bank Limited", "activeStatus": "A",
             "instrumentType": {"description": "Equity"}},
            {"symbol": "OLDCO", "securityName": "Delisted Co", "activeStatus": "S"},
            {"symbol": "NIBLPF", "securityName": "NIBL Pragati Fund", "activeStatus": "A",
             "instrumentType": {"description": "Mutual Funds"}}
        ]);
        let sectors = json!({"Commercial Banks": ["NABIL"], "Mutual Fund": ["NIBLPF"]});

        let records = join_listings(&securities, &sectors).expect("joined");

        assert_eq!(
            records,
            vec![
                SymbolRecord::new("NABIL", "Nabil Bank Limited", "Commercial Banks", "Equity"),
                SymbolRecord::new("NIBLPF", "NIBL Pragati Fund", "Mutual Fund", "Mutual Funds"),
            ]
        );
    }

    #[test]
    fn non_array_security_list_is_a_load_error() {
        let error = join_listings(&json!({}), &json!({})).expect_err("must fail");
        assert!(matches!(error, CorpusRefreshError::Load(_)));
    }
}
