//! # Domain Types
//!
//! Strongly-typed values shared by the admission, validation and caching layers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RateCategory`] | Request classification sharing one rate-limit policy |
//! | [`CategoryLimit`] / [`RateLimits`] | Immutable category → (limit, window) table |
//! | [`Symbol`] | Validated, uppercase exchange ticker |
//! | [`IndexRecord`] | Compiled-in NEPSE index set |
//! | [`MarketEndpoint`] / [`LogicalQuery`] | Upstream routes and cache keys |
//! | [`UtcDateTime`] | Wall-clock UTC timestamp |

mod category;
mod endpoint;
mod index;
mod symbol;
mod timestamp;

pub use category::{CategoryLimit, RateCategory, RateLimits};
pub use endpoint::{EndpointParam, LogicalQuery, MarketEndpoint};
pub use index::{find_index, index_for_sector, IndexRecord, INDICES, OTHERS_INDEX};
pub use symbol::{normalize as normalize_symbol, Symbol, MAX_SYMBOL_LEN};
pub use timestamp::UtcDateTime;
