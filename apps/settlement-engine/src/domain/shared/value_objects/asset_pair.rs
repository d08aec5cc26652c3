//! Base/quote asset resolution for spot instruments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote assets tried, in order, when an instrument has no catalog entry.
///
/// Longer codes come first so `BTCFDUSD` resolves to `FDUSD` and not `USD`.
pub const DEFAULT_QUOTE_ASSETS: &[&str] = &[
    "FDUSD", "USDT", "USDC", "BUSD", "TUSD", "DAI", "BTC", "ETH", "BNB", "EUR", "TRY", "USD",
];

/// The two assets a spot instrument trades.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetPair {
    /// Asset being bought or sold.
    pub base: String,
    /// Asset prices are quoted in.
    pub quote: String,
}

impl AssetPair {
    /// Build a pair from explicit base and quote codes.
    #[must_use]
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Derive a pair from a symbol.
    ///
    /// Separated symbols (`BTC-USDT`, `BTC/USDT`, `BTC_USDT`) split on the
    /// separator. Concatenated symbols (`BTCUSDT`) are matched against the
    /// known quote suffixes; the base must be non-empty.
    #[must_use]
    pub fn derive(symbol: &str, known_quotes: &[String]) -> Option<Self> {
        let symbol = symbol.trim().to_uppercase();

        if let Some((base, quote)) = symbol.split_once(['-', '/', '_']) {
            if base.is_empty() || quote.is_empty() {
                return None;
            }
            return Some(Self::new(base, quote));
        }

        let mut candidates: Vec<&String> = known_quotes.iter().collect();
        candidates.sort_by_key(|q| std::cmp::Reverse(q.len()));

        candidates.into_iter().find_map(|quote| {
            let quote = quote.to_uppercase();
            symbol
                .strip_suffix(quote.as_str())
                .filter(|base| !base.is_empty())
                .map(|base| Self::new(base, quote.clone()))
        })
    }

    /// The default known-quote list as owned strings.
    #[must_use]
    pub fn default_quotes() -> Vec<String> {
        DEFAULT_QUOTE_ASSETS.iter().map(|q| (*q).to_string()).collect()
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("BTCUSDT", "BTC", "USDT")]
    #[test_case("ethbtc", "ETH", "BTC")]
    #[test_case("BTC-USDT", "BTC", "USDT")]
    #[test_case("SOL/USDC", "SOL", "USDC")]
    #[test_case("BTCFDUSD", "BTC", "FDUSD")]
    fn derives_known_symbols(symbol: &str, base: &str, quote: &str) {
        let pair = AssetPair::derive(symbol, &AssetPair::default_quotes()).unwrap();
        assert_eq!(pair, AssetPair::new(base, quote));
    }

    #[test]
    fn unknown_quote_does_not_resolve() {
        assert!(AssetPair::derive("FOOBAR", &AssetPair::default_quotes()).is_none());
    }

    #[test]
    fn bare_quote_does_not_resolve() {
        assert!(AssetPair::derive("USDT", &AssetPair::default_quotes()).is_none());
        assert!(AssetPair::derive("-USDT", &AssetPair::default_quotes()).is_none());
    }
}
