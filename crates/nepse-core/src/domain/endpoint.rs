use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{RateCategory, ValidationError};

/// Time-to-live for reference lists that change a few times a year.
const REFERENCE_TTL: Duration = Duration::from_secs(3_600);

/// Parameter a market endpoint needs before it can be sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointParam {
    None,
    Symbol,
    Index,
}

/// Exchange routes served through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketEndpoint {
    Summary,
    NepseIndex,
    NepseSubIndices,
    LiveMarket,
    PriceVolume,
    TopGainers,
    TopLosers,
    TopTenTradeScrips,
    TopTenTurnoverScrips,
    TopTenTransactionScrips,
    SupplyDemand,
    IsNepseOpen,
    CompanyList,
    SecurityList,
    SectorScrips,
    TradeTurnoverTransactionSubindices,
    MarketDepth,
    CompanyDetails,
    FloorsheetOf,
    PriceVolumeHistory,
    DailyScripPriceGraph,
    DailyIndexGraph,
}

impl MarketEndpoint {
    pub const ALL: [Self; 22] = [
        Self::Summary,
        Self::NepseIndex,
        Self::NepseSubIndices,
        Self::LiveMarket,
        Self::PriceVolume,
        Self::TopGainers,
        Self::TopLosers,
        Self::TopTenTradeScrips,
        Self::TopTenTurnoverScrips,
        Self::TopTenTransactionScrips,
        Self::SupplyDemand,
        Self::IsNepseOpen,
        Self::CompanyList,
        Self::SecurityList,
        Self::SectorScrips,
        Self::TradeTurnoverTransactionSubindices,
        Self::MarketDepth,
        Self::CompanyDetails,
        Self::FloorsheetOf,
        Self::PriceVolumeHistory,
        Self::DailyScripPriceGraph,
        Self::DailyIndexGraph,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "Summary",
            Self::NepseIndex => "NepseIndex",
            Self::NepseSubIndices => "NepseSubIndices",
            Self::LiveMarket => "LiveMarket",
            Self::PriceVolume => "PriceVolume",
            Self::TopGainers => "TopGainers",
            Self::TopLosers => "TopLosers",
            Self::TopTenTradeScrips => "TopTenTradeScrips",
            Self::TopTenTurnoverScrips => "TopTenTurnoverScrips",
            Self::TopTenTransactionScrips => "TopTenTransactionScrips",
            Self::SupplyDemand => "SupplyDemand",
            Self::IsNepseOpen => "IsNepseOpen",
            Self::CompanyList => "CompanyList",
            Self::SecurityList => "SecurityList",
            Self::SectorScrips => "SectorScrips",
            Self::TradeTurnoverTransactionSubindices => "TradeTurnoverTransactionSubindices",
            Self::MarketDepth => "MarketDepth",
            Self::CompanyDetails => "CompanyDetails",
            Self::FloorsheetOf => "FloorsheetOf",
            Self::PriceVolumeHistory => "PriceVolumeHistory",
            Self::DailyScripPriceGraph => "DailyScripPriceGraph",
            Self::DailyIndexGraph => "DailyIndexGraph",
        }
    }

    pub const fn param(self) -> EndpointParam {
        match self {
            Self::MarketDepth
            | Self::CompanyDetails
            | Self::FloorsheetOf
            | Self::PriceVolumeHistory
            | Self::DailyScripPriceGraph => EndpointParam::Symbol,
            Self::DailyIndexGraph => EndpointParam::Index,
            _ => EndpointParam::None,
        }
    }

    /// Rate category applied when the endpoint is reached over HTTP.
    pub fn category(self) -> RateCategory {
        RateCategory::for_path(&format!("/{}", self.as_str()))
    }

    /// TTL override; `None` means the configured market-data default.
    pub const fn ttl_override(self) -> Option<Duration> {
        match self {
            Self::CompanyList | Self::SecurityList | Self::SectorScrips => Some(REFERENCE_TTL),
            _ => None,
        }
    }
}

impl Display for MarketEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketEndpoint {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_start_matches('/');
        Self::ALL
            .into_iter()
            .find(|endpoint| endpoint.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValidationError::UnknownEndpoint {
                value: value.to_owned(),
            })
    }
}

/// Upstream graph route for each index, keyed by canonical index name.
const INDEX_GRAPH_PATHS: [(&str, &str); 14] = [
    ("NEPSE Index", "/DailyNepseIndexGraph"),
    ("Banking SubIndex", "/DailyBankSubindexGraph"),
    ("Development Bank Index", "/DailyDevelopmentBankSubindexGraph"),
    ("Finance Index", "/DailyFinanceSubindexGraph"),
    ("Hotels And Tourism Index", "/DailyHotelTourismSubindexGraph"),
    ("HydroPower Index", "/DailyHydroPowerSubindexGraph"),
    ("Investment Index", "/DailyInvestmentSubindexGraph"),
    ("Life Insurance", "/DailyLifeInsuranceSubindexGraph"),
    (
        "Manufacturing And Processing",
        "/DailyManufacturingProcessingSubindexGraph",
    ),
    ("Microfinance Index", "/DailyMicrofinanceSubindexGraph"),
    ("Mutual Fund", "/DailyMutualFundSubindexGraph"),
    ("Non Life Insurance", "/DailyNonLifeInsuranceSubindexGraph"),
    ("Others Index", "/DailyOthersSubindexGraph"),
    ("Trading Index", "/DailyTradingSubindexGraph"),
];

/// One logical upstream query. Its canonical string form is the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalQuery {
    pub endpoint: MarketEndpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

impl LogicalQuery {
    pub fn new(endpoint: MarketEndpoint) -> Self {
        Self {
            endpoint,
            symbol: None,
            index: None,
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Checks the endpoint's required parameter is present.
    pub fn check_params(&self) -> Result<(), ValidationError> {
        let missing = |parameter| ValidationError::MissingParameter {
            endpoint: self.endpoint.as_str(),
            parameter,
        };
        match self.endpoint.param() {
            EndpointParam::Symbol if self.symbol.is_none() => Err(missing("symbol")),
            EndpointParam::Index if self.index.is_none() => Err(missing("index")),
            _ => Ok(()),
        }
    }

    /// Path on the upstream service.
    pub fn upstream_path(&self) -> Result<Cow<'static, str>, ValidationError> {
        if self.endpoint != MarketEndpoint::DailyIndexGraph {
            return Ok(Cow::Owned(format!("/{}", self.endpoint.as_str())));
        }

        let index = self.index.as_deref().unwrap_or_default();
        INDEX_GRAPH_PATHS
            .iter()
            .find(|(name, _)| *name == index)
            .map(|(_, path)| Cow::Borrowed(*path))
            .ok_or_else(|| ValidationError::UnknownEndpoint {
                value: format!("DailyIndexGraph for index '{index}'"),
            })
    }

    /// Query-string parameters forwarded upstream.
    pub fn upstream_params(&self) -> Vec<(&'static str, &str)> {
        match (self.endpoint.param(), self.symbol.as_deref()) {
            (EndpointParam::Symbol, Some(symbol)) => vec![("symbol", symbol)],
            _ => Vec::new(),
        }
    }

    pub fn cache_key(&self) -> String {
        let mut key = format!("/{}", self.endpoint.as_str());
        let mut separator = '?';
        if let Some(index) = &self.index {
            key.push(separator);
            key.push_str("index=");
            key.push_str(index);
            separator = '&';
        }
        if let Some(symbol) = &self.symbol {
            key.push(separator);
            key.push_str("symbol=");
            key.push_str(symbol);
        }
        key
    }
}

impl Display for LogicalQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cache_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::INDICES;

    #[test]
    fn parses_endpoints_case_insensitively() {
        assert_eq!(
            "/livemarket".parse::<MarketEndpoint>().expect("known"),
            MarketEndpoint::LiveMarket
        );
        assert!("Nope".parse::<MarketEndpoint>().is_err());
    }

    #[test]
    fn market_endpoints_share_http_categories() {
        assert_eq!(MarketEndpoint::Summary.category(), RateCategory::MarketData);
        assert_eq!(MarketEndpoint::CompanyList.category(), RateCategory::Default);
    }

    #[test]
    fn cache_key_carries_parameters() {
        let query = LogicalQuery::new(MarketEndpoint::CompanyDetails).with_symbol("NABIL");
        assert_eq!(query.cache_key(), "/CompanyDetails?symbol=NABIL");
        assert_eq!(query.upstream_params(), vec![("symbol", "NABIL")]);
    }

    #[test]
    fn symbol_endpoints_require_a_symbol() {
        let err = LogicalQuery::new(MarketEndpoint::FloorsheetOf)
            .check_params()
            .expect_err("must fail");
        assert!(matches!(
            err,
            ValidationError::MissingParameter {
                parameter: "symbol",
                ..
            }
        ));
    }

    #[test]
    fn every_index_has_a_graph_route() {
        for record in INDICES {
            let query = LogicalQuery::new(MarketEndpoint::DailyIndexGraph).with_index(record.name);
            assert!(query.upstream_path().is_ok(), "{} has no route", record.name);
        }
    }
}
