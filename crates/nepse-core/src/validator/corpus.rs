use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{CorpusError, Symbol, UtcDateTime};

/// One tradable security as listed by the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol: String,
    pub company_name: String,
    pub sector: String,
    pub instrument_type: String,
}

impl SymbolRecord {
    pub fn new(
        symbol: impl Into<String>,
        company_name: impl Into<String>,
        sector: impl Into<String>,
        instrument_type: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            company_name: company_name.into(),
            sector: sector.into(),
            instrument_type: instrument_type.into(),
        }
    }
}

/// Immutable, point-in-time view of the corpus.
///
/// Built completely before it is published; the validator only ever swaps whole
/// snapshots, so a reader holding one sees a consistent corpus for as long as
/// it keeps the `Arc`.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    generation: u64,
    loaded_at: UtcDateTime,
    by_symbol: HashMap<String, SymbolRecord>,
    symbol_by_name: HashMap<String, String>,
    symbols: Vec<String>,
}

impl CorpusSnapshot {
    /// Snapshot used before the first corpus load.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            loaded_at: UtcDateTime::now(),
            by_symbol: HashMap::new(),
            symbol_by_name: HashMap::new(),
            symbols: Vec::new(),
        }
    }

    /// Builds a snapshot, rejecting the whole input on the first bad record.
    pub fn build(records: Vec<SymbolRecord>, generation: u64) -> Result<Self, CorpusError> {
        if records.is_empty() {
            return Err(CorpusError::Empty);
        }

        let mut canonical = Vec::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            let symbol = Symbol::parse(&record.symbol)
                .map_err(|source| CorpusError::InvalidSymbol { position, source })?;
            let company_name = record.company_name.trim().to_owned();
            if company_name.is_empty() {
                return Err(CorpusError::EmptyCompanyName {
                    position,
                    symbol: symbol.into(),
                });
            }

            canonical.push(SymbolRecord {
                symbol: symbol.into(),
                company_name,
                sector: record.sector.trim().to_owned(),
                instrument_type: record.instrument_type.trim().to_owned(),
            });
        }
        canonical.sort_by(|left, right| left.symbol.cmp(&right.symbol));

        let mut by_symbol = HashMap::with_capacity(canonical.len());
        let mut symbol_by_name = HashMap::with_capacity(canonical.len());
        let mut symbols = Vec::with_capacity(canonical.len());
        for record in canonical {
            if by_symbol.contains_key(&record.symbol) {
                return Err(CorpusError::DuplicateSymbol {
                    symbol: record.symbol,
                });
            }

            symbol_by_name
                .entry(record.company_name.to_lowercase())
                .or_insert_with(|| record.symbol.clone());
            symbols.push(record.symbol.clone());
            by_symbol.insert(record.symbol.clone(), record);
        }

        Ok(Self {
            generation,
            loaded_at: UtcDateTime::now(),
            by_symbol,
            symbol_by_name,
            symbols,
        })
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub const fn loaded_at(&self) -> UtcDateTime {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Lookup by canonical (uppercase) symbol.
    pub fn get(&self, symbol: &str) -> Option<&SymbolRecord> {
        self.by_symbol.get(symbol)
    }

    /// Lookup by company name, case-insensitive.
    pub fn symbol_for_company(&self, name: &str) -> Option<&str> {
        self.symbol_by_name
            .get(&name.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Symbols in ascending order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Records in ascending symbol order.
    pub fn records(&self) -> impl Iterator<Item = &SymbolRecord> {
        self.symbols
            .iter()
            .filter_map(|symbol| self.by_symbol.get(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, name: &str) -> SymbolRecord {
        SymbolRecord::new(symbol, name, "Commercial Banks", "Equity")
    }

    #[test]
    fn canonicalizes_symbols_and_sorts() {
        let snapshot = CorpusSnapshot::build(
            vec![record(" nica ", "NIC Asia Bank"), record("ADBL", "Agricultural Development Bank")],
            1,
        )
        .expect("valid corpus");

        assert_eq!(snapshot.symbols(), ["ADBL", "NICA"]);
        assert_eq!(snapshot.get("NICA").map(|r| r.company_name.as_str()), Some("NIC Asia Bank"));
        assert_eq!(snapshot.symbol_for_company("nic asia bank"), Some("NICA"));
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(CorpusSnapshot::build(Vec::new(), 1).unwrap_err(), CorpusError::Empty);
    }

    #[test]
    fn rejects_duplicates_after_normalization() {
        let err = CorpusSnapshot::build(vec![record("NABIL", "Nabil Bank"), record("nabil", "Nabil")], 1)
            .expect_err("must fail");
        assert_eq!(
            err,
            CorpusError::DuplicateSymbol {
                symbol: String::from("NABIL")
            }
        );
    }

    #[test]
    fn rejects_blank_company_names() {
        let err = CorpusSnapshot::build(vec![record("NABIL", "  ")], 1).expect_err("must fail");
        assert!(matches!(err, CorpusError::EmptyCompanyName { position: 0, .. }));
    }

    #[test]
    fn shared_company_name_maps_to_first_symbol() {
        let snapshot = CorpusSnapshot::build(
            vec![record("NABILP", "Nabil Bank Limited"), record("NABIL", "Nabil Bank Limited")],
            1,
        )
        .expect("valid corpus");
        assert_eq!(snapshot.symbol_for_company("NABIL BANK LIMITED"), Some("NABIL"));
    }
}
