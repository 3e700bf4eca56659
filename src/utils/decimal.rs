use bigdecimal::BigDecimal;
use num_traits::{FromPrimitive, ToPrimitive};

/// Money enters the API as f64 and is stored as BigDecimal; these helpers
/// keep the conversion in one place.
pub fn from_f64(value: f64) -> Option<BigDecimal> {
    BigDecimal::from_f64(value)
}

pub trait BigDecimalHelpers {
    fn to_f64_or_zero(&self) -> f64;
}

impl BigDecimalHelpers for BigDecimal {
    fn to_f64_or_zero(&self) -> f64 {
        self.to_f64().unwrap_or(0.0)
    }
}
