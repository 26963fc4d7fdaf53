use thiserror::Error;

use nepse_core::{ConfigError, CoreError, CorpusError, CorpusRefreshError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("stock map: {0}")]
    StockMap(#[from] CoreError),

    #[error("stock map: {0}")]
    Corpus(#[from] CorpusError),

    #[error("corpus refresh failed: {0}")]
    Refresh(#[from] CorpusRefreshError),

    #[error("server error: {0}")]
    Server(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Refresh(_) => 3,
            Self::Config(_) | Self::StockMap(_) | Self::Corpus(_) => 4,
            Self::Server(_) | Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nepse_core::UpstreamError;

    #[test]
    fn upstream_failures_exit_with_three() {
        let error = CliError::from(CorpusRefreshError::from(UpstreamError::transient("offline")));
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn bad_stock_map_is_a_configuration_problem() {
        assert_eq!(CliError::from(CorpusError::Empty).exit_code(), 4);
    }
}
