use serde::Serialize;

/// A NEPSE index or sub-index.
///
/// `name` is the canonical form returned to callers; `display_name` is the
/// abbreviated label the exchange uses in its own payloads. Both are accepted
/// on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IndexRecord {
    pub name: &'static str,
    pub display_name: &'static str,
}

impl IndexRecord {
    const fn new(name: &'static str, display_name: &'static str) -> Self {
        Self { name, display_name }
    }
}

pub const OTHERS_INDEX: IndexRecord = IndexRecord::new("Others Index", "Others Index");

/// Every index the exchange publishes. Not refreshed at runtime.
pub const INDICES: [IndexRecord; 14] = [
    IndexRecord::new("Banking SubIndex", "Banking SubIndex"),
    IndexRecord::new("Development Bank Index", "Development Bank Ind."),
    IndexRecord::new("Finance Index", "Finance Index"),
    IndexRecord::new("Hotels And Tourism Index", "Hotels And Tourism"),
    IndexRecord::new("HydroPower Index", "HydroPower Index"),
    IndexRecord::new("Investment Index", "Investment"),
    IndexRecord::new("Life Insurance", "Life Insurance"),
    IndexRecord::new("Manufacturing And Processing", "Manufacturing And Pr."),
    IndexRecord::new("Microfinance Index", "Microfinance Index"),
    IndexRecord::new("Mutual Fund", "Mutual Fund"),
    IndexRecord::new("NEPSE Index", "NEPSE Index"),
    IndexRecord::new("Non Life Insurance", "Non Life Insurance"),
    OTHERS_INDEX,
    IndexRecord::new("Trading Index", "Trading Index"),
];

/// Exchange sector name → canonical name of the index tracking it.
const SECTOR_INDEX: [(&str, &str); 14] = [
    ("Commercial Banks", "Banking SubIndex"),
    ("Development Banks", "Development Bank Index"),
    ("Finance", "Finance Index"),
    ("Hotels And Tourism", "Hotels And Tourism Index"),
    ("Hydro Power", "HydroPower Index"),
    ("Investment", "Investment Index"),
    ("Life Insurance", "Life Insurance"),
    ("Manufacturing And Processing", "Manufacturing And Processing"),
    ("Microfinance", "Microfinance Index"),
    ("Mutual Fund", "Mutual Fund"),
    ("NEPSE", "NEPSE Index"),
    ("Non Life Insurance", "Non Life Insurance"),
    ("Others", "Others Index"),
    ("Tradings", "Trading Index"),
];

/// Exact, case-insensitive lookup on canonical or display name.
pub fn find_index(input: &str) -> Option<IndexRecord> {
    let needle = input.trim();
    INDICES.into_iter().find(|record| {
        record.name.eq_ignore_ascii_case(needle) || record.display_name.eq_ignore_ascii_case(needle)
    })
}

/// Index covering an exchange sector; unknown sectors fall under `Others Index`.
pub fn index_for_sector(sector: &str) -> IndexRecord {
    let sector = sector.trim();
    SECTOR_INDEX
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(sector))
        .and_then(|(_, index)| find_index(index))
        .unwrap_or(OTHERS_INDEX)
}
