//! Cost measure of a built artifact (lower is better)

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display};

/// Measured cost of a flag set.
///
/// Failed builds and failed runs are recorded as [`Cost::INFINITE`], which
/// sorts after every finite cost. Ordering is total (`f64::total_cmp`);
/// negative zero is folded into zero on construction so both compare equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Cost(f64);

impl Cost {
    /// Cost of a candidate that could not be built or run
    pub const INFINITE: Cost = Cost(f64::INFINITY);

    /// Wrap a measured value. NaN is treated as a failed measurement.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self::INFINITE
        } else if value == 0.0 {
            Self(0.0)
        } else {
            Self(value)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    /// Strict improvement: `self` is better than `other`
    pub fn improves_on(self, other: Cost) -> bool {
        self < other
    }
}

impl From<f64> for Cost {
    fn from(value: f64) -> Self {
        Cost::new(value)
    }
}

impl From<Cost> for f64 {
    fn from(cost: Cost) -> Self {
        cost.0
    }
}

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_finite() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "inf")
        }
    }
}
