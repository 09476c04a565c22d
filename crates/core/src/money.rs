use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Non-negative transaction magnitude. Direction lives in `TransactionType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(Decimal);

impl Money {
    pub fn from_decimal(decimal: Decimal) -> Self {
        Money(decimal.abs())
    }

    /// Parses `1234.56` style text. Thousands separators and decimal commas
    /// are not accepted.
    pub fn parse(s: &str) -> Option<Self> {
        Decimal::from_str(s.trim()).ok().map(Money::from_decimal)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_decimal() {
        let m = Money::parse("12.50").unwrap();
        assert_eq!(m.as_decimal(), Decimal::new(1250, 2));
        assert_eq!(m.to_string(), "12.50");
    }

    #[test]
    fn parse_keeps_magnitude_of_negative() {
        assert_eq!(Money::parse("-7.3").unwrap(), Money::parse("7.3").unwrap());
    }

    #[test]
    fn parse_trims_whitespace() {
        assert!(Money::parse("  100 ").is_some());
    }

    #[test]
    fn parse_rejects_locale_formats() {
        assert!(Money::parse("1,234.56").is_none());
        assert!(Money::parse("12,50").is_none());
        assert!(Money::parse("").is_none());
    }
}
