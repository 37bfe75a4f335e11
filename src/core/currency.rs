use crate::core::period::Period;
use crate::error::{ConsolidationError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// ISO 4217-style currency code.
///
/// # Examples
///
/// ```
/// use consolidation_engine::core::currency::CurrencyCode;
///
/// let usd = CurrencyCode::new("USD");
/// let eur = CurrencyCode::new("EUR");
/// assert_ne!(usd, eur);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Which rate applies when translating a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateBasis {
    /// Spot rate at the period end.
    Closing,
    /// Average rate over the period.
    Average,
    /// Rate in effect when the balance originated.
    Historical,
}

impl fmt::Display for RateBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateBasis::Closing => "closing",
            RateBasis::Average => "average",
            RateBasis::Historical => "historical",
        };
        f.write_str(s)
    }
}

/// Supplied translation rates into one presentation currency.
///
/// A rate is the number of presentation-currency units per one unit of the
/// local currency, keyed by local currency, basis and period. Rates are
/// supplied by the caller; the engine never fetches them.
///
/// # Examples
///
/// ```
/// use consolidation_engine::core::currency::{CurrencyCode, RateBasis, RateTable};
/// use consolidation_engine::core::period::Period;
/// use rust_decimal_macros::dec;
///
/// let period = Period::new(2025, 11).unwrap();
/// let mut rates = RateTable::new(CurrencyCode::new("USD"));
/// rates
///     .set_rate(CurrencyCode::new("EUR"), RateBasis::Closing, period, dec!(1.10))
///     .unwrap();
///
/// let rate = rates
///     .rate(&CurrencyCode::new("EUR"), RateBasis::Closing, period)
///     .unwrap();
/// assert_eq!(rate, dec!(1.10));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateTable {
    pub presentation_currency: Option<CurrencyCode>,
    #[serde(with = "rates_serde")]
    rates: HashMap<(CurrencyCode, RateBasis, Period), Decimal>,
}

mod rates_serde {
    use super::*;
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;

    #[derive(Serialize, Deserialize)]
    struct RateRow {
        currency: CurrencyCode,
        basis: RateBasis,
        year: i32,
        month: u32,
        rate: Decimal,
    }

    pub fn serialize<S: serde::Serializer>(
        rates: &HashMap<(CurrencyCode, RateBasis, Period), Decimal>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        let mut rows: Vec<_> = rates.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        let mut seq = serializer.serialize_seq(Some(rows.len()))?;
        for ((currency, basis, period), rate) in rows {
            seq.serialize_element(&RateRow {
                currency: currency.clone(),
                basis: *basis,
                year: period.year,
                month: period.month,
                rate: *rate,
            })?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<HashMap<(CurrencyCode, RateBasis, Period), Decimal>, D::Error> {
        let rows = Vec::<RateRow>::deserialize(deserializer)?;
        let mut map = HashMap::new();
        for row in rows {
            let period = Period::new(row.year, row.month).ok_or_else(|| {
                D::Error::custom(format!("invalid period {}-{}", row.year, row.month))
            })?;
            if row.rate <= Decimal::ZERO {
                return Err(D::Error::custom(format!(
                    "rate must be positive, got {} for {}",
                    row.rate, row.currency
                )));
            }
            map.insert((row.currency, row.basis, period), row.rate);
        }
        Ok(map)
    }
}

impl RateTable {
    pub fn new(presentation_currency: CurrencyCode) -> Self {
        Self {
            presentation_currency: Some(presentation_currency),
            rates: HashMap::new(),
        }
    }

    /// Set a rate: 1 unit of `currency` = `rate` units of presentation currency.
    pub fn set_rate(
        &mut self,
        currency: CurrencyCode,
        basis: RateBasis,
        period: Period,
        rate: Decimal,
    ) -> Result<()> {
        if rate <= Decimal::ZERO {
            return Err(ConsolidationError::InvalidConfiguration(format!(
                "{basis} rate for {currency} in {period} must be positive, got {rate}"
            )));
        }
        self.rates.insert((currency, basis, period), rate);
        Ok(())
    }

    /// Builder form of [`RateTable::set_rate`] used by fixtures.
    pub fn with_rate(
        mut self,
        currency: impl Into<CurrencyCode>,
        basis: RateBasis,
        period: Period,
        rate: Decimal,
    ) -> Result<Self> {
        self.set_rate(currency.into(), basis, period, rate)?;
        Ok(self)
    }

    /// Look up a rate. The presentation currency always translates at 1.
    pub fn rate(&self, currency: &CurrencyCode, basis: RateBasis, period: Period) -> Option<Decimal> {
        if self.presentation_currency.as_ref() == Some(currency) {
            return Some(Decimal::ONE);
        }
        self.rates.get(&(currency.clone(), basis, period)).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn nov() -> Period {
        Period::new(2025, 11).unwrap()
    }

    #[test]
    fn test_currency_code_equality() {
        assert_eq!(CurrencyCode::new("USD"), CurrencyCode::new("USD"));
    }

    #[test]
    fn test_rate_lookup_by_basis() {
        let table = RateTable::new(CurrencyCode::new("USD"))
            .with_rate("EUR", RateBasis::Closing, nov(), dec!(1.10))
            .unwrap()
            .with_rate("EUR", RateBasis::Average, nov(), dec!(1.08))
            .unwrap();

        let eur = CurrencyCode::new("EUR");
        assert_eq!(table.rate(&eur, RateBasis::Closing, nov()), Some(dec!(1.10)));
        assert_eq!(table.rate(&eur, RateBasis::Average, nov()), Some(dec!(1.08)));
        assert_eq!(table.rate(&eur, RateBasis::Historical, nov()), None);
    }

    #[test]
    fn test_presentation_currency_is_identity() {
        let table = RateTable::new(CurrencyCode::new("USD"));
        assert_eq!(
            table.rate(&CurrencyCode::new("USD"), RateBasis::Historical, nov()),
            Some(Decimal::ONE)
        );
    }

    #[test]
    fn test_invalid_rate() {
        let mut table = RateTable::new(CurrencyCode::new("USD"));
        let result = table.set_rate(CurrencyCode::new("BRL"), RateBasis::Closing, nov(), dec!(-0.5));
        assert!(result.is_err());
    }

    #[test]
    fn test_rate_table_json() {
        let table = RateTable::new(CurrencyCode::new("USD"))
            .with_rate("GBP", RateBasis::Closing, nov(), dec!(1.27))
            .unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let back: RateTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.rate(&CurrencyCode::new("GBP"), RateBasis::Closing, nov()), Some(dec!(1.27)));
    }
}
