//! Decimal conversion for on-chain integer amounts
//!
//! Event parameters arrive as unsigned 256-bit mantissas at a token's implicit
//! scale. Every quantity stored on an entity is a [`BigDecimal`] truncated to
//! the precision of the token it is denominated in.
//!
//! # Invariants
//!
//! - `scale_factor(d)` is exactly 10^d (no floating point anywhere)
//! - `to_decimal` is an exact shift of the decimal point
//! - `truncate` drops digits toward zero and never rounds, so a stored
//!   balance is never larger than the integer-backed value

use crate::{Error, Result};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::One;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Integer event parameter at an implicit scale
pub type Mantissa = BigInt;

/// Precision of `*Mantissa` parameters (collateral factor, reserve factor, ...)
pub const MANTISSA_DECIMALS: u8 = 18;

/// Pool-token precision used when the pool token cannot be queried
pub const CTOKEN_DECIMALS: u8 = 8;

/// Underlying precision assumed when the asset is not deployed yet
pub const DEFAULT_UNDERLYING_DECIMALS: u8 = 18;

/// Number of fractional digits of a token
///
/// Construction from an unchecked source (`FromStr`, signed integers) rejects
/// non-numeric or negative input instead of coercing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Decimals(u8);

impl Decimals {
    /// 18 fractional digits (`*Mantissa` values, exchange rates)
    pub const MANTISSA: Decimals = Decimals(MANTISSA_DECIMALS);

    /// Pool-token fallback precision
    pub const CTOKEN: Decimals = Decimals(CTOKEN_DECIMALS);

    /// Underlying fallback precision
    pub const DEFAULT_UNDERLYING: Decimals = Decimals(DEFAULT_UNDERLYING_DECIMALS);

    /// Create from a raw `uint8`
    pub const fn new(decimals: u8) -> Self {
        Self(decimals)
    }

    /// Get as integer
    pub fn get(self) -> u8 {
        self.0
    }

    fn scale(self) -> i64 {
        i64::from(self.0)
    }
}

impl From<u8> for Decimals {
    fn from(decimals: u8) -> Self {
        Self(decimals)
    }
}

impl TryFrom<i64> for Decimals {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        u8::try_from(value)
            .map(Decimals)
            .map_err(|_| Error::InvalidDecimals(value.to_string()))
    }
}

impl TryFrom<i32> for Decimals {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        Decimals::try_from(i64::from(value))
    }
}

impl FromStr for Decimals {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u8>()
            .map(Decimals)
            .map_err(|_| Error::InvalidDecimals(s.to_string()))
    }
}

impl fmt::Display for Decimals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 10^decimals
pub fn scale_factor(decimals: Decimals) -> BigDecimal {
    // digits * 10^-scale with a negative scale is an exact power of ten
    BigDecimal::new(BigInt::one(), -decimals.scale())
}

/// mantissa / 10^decimals
pub fn to_decimal(mantissa: &Mantissa, decimals: Decimals) -> BigDecimal {
    BigDecimal::new(mantissa.clone(), decimals.scale())
}

/// Drop fractional digits beyond `decimals` (toward zero, never rounding)
pub fn truncate(value: &BigDecimal, decimals: Decimals) -> BigDecimal {
    let (_, scale) = value.as_bigint_and_exponent();
    if scale <= decimals.scale() {
        value.clone()
    } else {
        value.with_scale(decimals.scale())
    }
}

/// `truncate(to_decimal(mantissa, decimals), decimals)`
pub fn normalize(mantissa: &Mantissa, decimals: Decimals) -> BigDecimal {
    truncate(&to_decimal(mantissa, decimals), decimals)
}

/// Exchange rate assigned to a freshly listed market (0.02 underlying per pool token)
pub fn initial_exchange_rate() -> BigDecimal {
    BigDecimal::new(BigInt::from(2), 2)
}

/// Serde adapter storing a [`BigDecimal`] as its base-10 string
///
/// Works for both JSON and bincode, unlike the self-describing default impl.
pub mod decimal_string {
    use bigdecimal::BigDecimal;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    /// Serialize
    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserialize
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
        let raw = String::deserialize(deserializer)?;
        BigDecimal::from_str(&raw).map_err(D::Error::custom)
    }
}

/// Serde adapter for integer event parameters
///
/// Accepts base-10 strings, `0x` hex strings and plain JSON integers of any
/// width; always emits base-10 strings. JSON numbers are read from their
/// source text, so a fraction or exponent is rejected rather than rounded.
pub mod mantissa_string {
    use super::Mantissa;
    use num_bigint::BigInt;
    use num_traits::Num;
    use serde::de::{self, value::MapAccessDeserializer, MapAccess, Visitor};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::fmt;

    /// Serialize
    pub fn serialize<S: Serializer>(value: &Mantissa, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    /// Deserialize
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mantissa, D::Error> {
        deserializer.deserialize_any(MantissaVisitor)
    }

    /// Parse a base-10 or `0x` hex integer
    pub fn parse(raw: &str) -> Option<Mantissa> {
        let raw = raw.trim();
        match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            Some(hex) => BigInt::from_str_radix(hex, 16).ok(),
            None => BigInt::from_str_radix(raw, 10).ok(),
        }
    }

    struct MantissaVisitor;

    impl<'de> Visitor<'de> for MantissaVisitor {
        type Value = Mantissa;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer or an integer string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Mantissa, E> {
            Ok(BigInt::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Mantissa, E> {
            Ok(BigInt::from(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Mantissa, E> {
            parse(v).ok_or_else(|| E::custom(format!("invalid integer: {}", v)))
        }

        // serde_json hands numbers wider than 64 bits over as a one-entry map
        fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Mantissa, A::Error> {
            let number = serde_json::Number::deserialize(MapAccessDeserializer::new(map))?;
            let raw = number.to_string();
            BigInt::from_str_radix(&raw, 10)
                .map_err(|_| de::Error::custom(format!("invalid integer: {}", raw)))
        }
    }
}
