use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const MAX_SYMBOL_LEN: usize = 20;

/// Normalized exchange ticker.
///
/// NEPSE tickers carry digits (`NICAD8283`) and occasionally `/` or `-`
/// for promoter and debenture lines, so the accepted alphabet is a little
/// wider than plain letters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Trims, uppercases and checks the ticker alphabet.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let normalized = normalize(input);
        if normalized.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            if index == 0 && !ch.is_ascii_alphabetic() {
                return Err(ValidationError::SymbolInvalidStart { ch });
            }
            if !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '/')) {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Canonical comparison form for user-supplied tickers: trimmed, uppercase.
pub fn normalize(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalizes_symbol() {
        let parsed = Symbol::parse(" nabil ").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "NABIL");
    }

    #[test]
    fn accepts_debenture_style_symbols() {
        let parsed = Symbol::parse("nicad8283").expect("symbol should parse");
        assert_eq!(parsed.as_str(), "NICAD8283");
    }

    #[test]
    fn rejects_invalid_start() {
        let err = Symbol::parse("1NABIL").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidStart { .. }));
    }

    #[test]
    fn rejects_invalid_chars() {
        let err = Symbol::parse("NABIL$").expect_err("must fail");
        assert!(matches!(err, ValidationError::SymbolInvalidChar { .. }));
    }

    #[test]
    fn rejects_blank_input() {
        let err = Symbol::parse("   ").expect_err("must fail");
        assert_eq!(err, ValidationError::EmptySymbol);
    }
}
