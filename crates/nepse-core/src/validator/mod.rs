//! # Symbol and Index Validation
//!
//! Exact lookups against the live [`CorpusSnapshot`], with fuzzy suggestions when
//! the exact path misses.
//!
//! ## Snapshot lifecycle
//!
//! The validator publishes exactly one snapshot at a time behind an
//! `RwLock<Arc<_>>`. Every operation clones the `Arc` once up front and works on
//! that snapshot only, so a [`SymbolValidator::refresh`] that lands mid-call is
//! invisible to it. Refresh builds the replacement off to the side and swaps the
//! pointer; a build failure leaves the live snapshot untouched.
//!
//! ## Example
//!
//! ```rust
//! use nepse_core::{SymbolRecord, SymbolValidator};
//!
//! let validator = SymbolValidator::with_records(vec![
//!     SymbolRecord::new("NABIL", "Nabil Bank Limited", "Commercial Banks", "Equity"),
//! ])
//! .expect("corpus is well formed");
//!
//! assert_eq!(validator.validate_symbol("nabil").as_deref(), Ok("NABIL"));
//! let failure = validator.validate_symbol("NABIL123").unwrap_err();
//! assert_eq!(failure.suggestions, vec!["NABIL"]);
//! ```

mod corpus;
pub mod similarity;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;

pub use corpus::{CorpusSnapshot, SymbolRecord};

use crate::domain::{
    find_index, index_for_sector, normalize_symbol, IndexRecord, INDICES, MAX_SYMBOL_LEN,
    OTHERS_INDEX,
};
use crate::{CorpusError, UtcDateTime};

const SAMPLE_SIZE: usize = 10;

/// A lookup that found nothing. Carries ranked suggestions, possibly none.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct ValidationFailure {
    pub input: String,
    pub message: String,
    pub suggestions: Vec<String>,
}

impl ValidationFailure {
    fn new(input: &str, message: String, suggestions: Vec<String>) -> Self {
        Self {
            input: input.to_owned(),
            message,
            suggestions,
        }
    }

    fn required(input: &str, what: &str) -> Self {
        Self::new(input, format!("{what} is required"), Vec::new())
    }
}

/// Summary returned after a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub generation: u64,
    pub previous_generation: u64,
    pub total_symbols: usize,
}

/// Operational view of the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorStats {
    pub total_symbols: usize,
    pub total_indices: usize,
    pub generation: u64,
    pub loaded_at: UtcDateTime,
    pub sample_symbols: Vec<String>,
    pub available_indices: Vec<&'static str>,
}

/// Validator over a hot-swappable symbol corpus and the fixed index set.
#[derive(Debug)]
pub struct SymbolValidator {
    live: RwLock<Arc<CorpusSnapshot>>,
    next_generation: AtomicU64,
}

impl Default for SymbolValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolValidator {
    /// A validator with no corpus yet; symbol lookups fail until the first refresh.
    pub fn new() -> Self {
        Self {
            live: RwLock::new(Arc::new(CorpusSnapshot::empty())),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn with_records(records: Vec<SymbolRecord>) -> Result<Self, CorpusError> {
        let validator = Self::new();
        validator.refresh(records)?;
        Ok(validator)
    }

    /// The live snapshot. Holding it pins that corpus version.
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        Arc::clone(&self.live.read())
    }

    /// Canonical symbol for `input`, or suggestions ranked against every symbol.
    pub fn validate_symbol(&self, input: &str) -> Result<String, ValidationFailure> {
        validate_symbol_in(&self.snapshot(), input)
    }

    /// Canonical index name for `input` (canonical or display name, any case).
    pub fn validate_index(&self, input: &str) -> Result<&'static str, ValidationFailure> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationFailure::required(input, "index name"));
        }

        if let Some(record) = find_index(trimmed) {
            return Ok(record.name);
        }

        let query = trimmed.to_lowercase();
        let keys: Vec<(String, &'static str)> = INDICES
            .iter()
            .flat_map(|record| {
                [
                    (record.name.to_lowercase(), record.name),
                    (record.display_name.to_lowercase(), record.name),
                ]
            })
            .collect();
        let suggestions = similarity::rank(
            &query,
            keys.iter().map(|(key, name)| (key.as_str(), *name)),
        );
        Err(ValidationFailure::new(
            input,
            format!("index '{trimmed}' not found"),
            suggestions,
        ))
    }

    pub fn find_symbol_by_company_name(&self, name: &str) -> Result<String, ValidationFailure> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ValidationFailure::required(name, "company name"));
        }

        let snapshot = self.snapshot();
        if let Some(symbol) = snapshot.symbol_for_company(trimmed) {
            return Ok(symbol.to_owned());
        }

        let query = trimmed.to_lowercase();
        let keys: Vec<(String, &str)> = snapshot
            .records()
            .map(|record| (record.company_name.to_lowercase(), record.company_name.as_str()))
            .collect();
        let suggestions = similarity::rank(
            &query,
            keys.iter().map(|(key, display)| (key.as_str(), *display)),
        );
        Err(ValidationFailure::new(
            name,
            format!("no listed company named '{trimmed}'"),
            suggestions,
        ))
    }

    pub fn find_company_name_by_symbol(&self, symbol: &str) -> Result<String, ValidationFailure> {
        let snapshot = self.snapshot();
        let canonical = validate_symbol_in(&snapshot, symbol)?;
        snapshot
            .get(&canonical)
            .map(|record| record.company_name.clone())
            .ok_or_else(|| {
                ValidationFailure::new(symbol, format!("stock symbol '{canonical}' not found"), Vec::new())
            })
    }

    /// Full record for a symbol.
    pub fn record(&self, symbol: &str) -> Option<SymbolRecord> {
        self.snapshot().get(&normalize_symbol(symbol)).cloned()
    }

    /// Index tracking the symbol's sector.
    pub fn index_for_symbol(&self, symbol: &str) -> Result<IndexRecord, ValidationFailure> {
        let snapshot = self.snapshot();
        let canonical = validate_symbol_in(&snapshot, symbol)?;
        Ok(snapshot
            .get(&canonical)
            .map(|record| index_for_sector(&record.sector))
            .unwrap_or(OTHERS_INDEX))
    }

    /// Builds a new snapshot from `records` and publishes it atomically.
    ///
    /// On error the live snapshot is untouched.
    pub fn refresh(&self, records: Vec<SymbolRecord>) -> Result<RefreshReport, CorpusError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let snapshot = Arc::new(CorpusSnapshot::build(records, generation)?);
        let total_symbols = snapshot.len();

        let mut live = self.live.write();
        let previous_generation = live.generation();
        if previous_generation > generation {
            // A later refresh already published; keep it.
            return Ok(RefreshReport {
                generation: previous_generation,
                previous_generation,
                total_symbols: live.len(),
            });
        }
        *live = snapshot;
        drop(live);

        tracing::info!(generation, previous_generation, total_symbols, "corpus snapshot published");
        Ok(RefreshReport {
            generation,
            previous_generation,
            total_symbols,
        })
    }

    pub fn stats(&self) -> ValidatorStats {
        let snapshot = self.snapshot();
        ValidatorStats {
            total_symbols: snapshot.len(),
            total_indices: INDICES.len(),
            generation: snapshot.generation(),
            loaded_at: snapshot.loaded_at(),
            sample_symbols: snapshot.symbols().iter().take(SAMPLE_SIZE).cloned().collect(),
            available_indices: INDICES.iter().map(|record| record.name).collect(),
        }
    }
}

fn validate_symbol_in(
    snapshot: &CorpusSnapshot,
    input: &str,
) -> Result<String, ValidationFailure> {
    let symbol = normalize_symbol(input);
    if symbol.is_empty() {
        return Err(ValidationFailure::required(input, "stock symbol"));
    }
    if snapshot.get(&symbol).is_some() {
        return Ok(symbol);
    }
    let message = format!("stock symbol '{symbol}' not found; check that it is a listed company");
    if symbol.chars().count() > MAX_SYMBOL_LEN {
        return Err(ValidationFailure::new(input, message, Vec::new()));
    }
    let suggestions = similarity::rank(
        &symbol,
        snapshot
            .symbols()
            .iter()
            .map(|candidate| (candidate.as_str(), candidate.as_str())),
    );
    Err(ValidationFailure::new(input, message, suggestions))
}
