//! Coin amounts
//!
//! Amounts arrive as integer base units of arbitrary size. Conversion to
//! display units keeps the integer part and the remainder separate so the
//! whole-unit value is never rounded.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    units: BigUint,
    divisibility: u32,
}

impl Amount {
    pub fn from_units(units: impl Into<BigUint>, divisibility: u32) -> Self {
        Self {
            units: units.into(),
            divisibility,
        }
    }

    pub fn zero(divisibility: u32) -> Self {
        Self::from_units(BigUint::zero(), divisibility)
    }

    pub fn units(&self) -> &BigUint {
        &self.units
    }

    pub fn divisibility(&self) -> u32 {
        self.divisibility
    }

    fn divisor(&self) -> BigUint {
        BigUint::from(10u32).pow(self.divisibility)
    }

    /// Whole display units (`units / 10^divisibility`)
    pub fn whole(&self) -> BigUint {
        &self.units / self.divisor()
    }

    /// Remaining base units (`units % 10^divisibility`)
    pub fn fraction(&self) -> BigUint {
        &self.units % self.divisor()
    }

    /// Approximate value, only for comparisons and display math
    pub fn to_f64(&self) -> f64 {
        let divisor = self.divisor();
        let (quotient, remainder) = self.units.div_rem(&divisor);
        let whole = quotient.to_f64().unwrap_or(f64::MAX);
        let fraction = match (remainder.to_f64(), divisor.to_f64()) {
            (Some(r), Some(d)) if d > 0.0 => r / d,
            _ => 0.0,
        };
        whole + fraction
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        if self.divisibility != other.divisibility {
            return None;
        }
        Some(Self::from_units(&self.units + &other.units, self.divisibility))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.divisibility == 0 {
            return write!(f, "{}", self.units);
        }
        let fraction = self.fraction().to_string();
        write!(
            f,
            "{}.{:0>width$}",
            self.whole(),
            fraction,
            width = self.divisibility as usize
        )
    }
}
