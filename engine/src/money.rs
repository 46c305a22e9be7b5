//! Fixed-precision currency arithmetic.
//!
//! All amounts are stored as signed minor units (cents) so two-decimal
//! currency semantics are exact — no floating point inside the engine.
//! Conversion to and from major units happens only at the API and
//! processor boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A currency amount in minor units (cents).
///
/// `Money::from_minor_units(x).as_minor_units() == x` for every `x`;
/// `from_major` rounds `amount × 100` to the nearest minor unit, so a
/// major-unit round trip is exact within one minor unit.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor_units(minor: i64) -> Self {
        Money(minor)
    }

    pub fn as_minor_units(self) -> i64 {
        self.0
    }

    /// Parse a major-unit amount (e.g. dollars) into minor units,
    /// rounding to the nearest cent.
    pub fn from_major(amount: f64) -> Self {
        Money((amount * 100.0).round() as i64)
    }

    pub fn as_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl std::ops::Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Tip derived from a percentage of the quest price.
///
/// The UI offers 0 / 5 / 10 / 15 / 20 presets but any non-negative
/// percentage is accepted. Rounds half-up to the nearest minor unit.
pub fn tip_for_percent(price: Money, percent: u32) -> Money {
    Money((price.0 * percent as i64 + 50) / 100)
}
