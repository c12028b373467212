//! Iterative approximations of pi.
//!
//! Two interchangeable engines implement [`ApproximationEngine`]:
//!
//! - [`LeibnizSeries`] -- the Madhava-Leibniz alternating series. It gains
//!   roughly one correct digit per tenfold increase in steps and is only
//!   useful as a liveness workload.
//! - [`ChudnovskySeries`] -- the Chudnovsky series, which adds about 14
//!   correct digits per step.
//!
//! Engines are pure state machines: no I/O, no awareness of the scheduler.
//! The producer loop in [`crate::producer`] drives them.

use std::fmt;

use num::BigInt;
use serde::{Deserialize, Serialize};

use crate::numeric::{Decimal, Precision};

/// Selects which series the producer runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Madhava-Leibniz alternating series.
    #[default]
    SlowSeries,
    /// Chudnovsky series.
    FastSeries,
}

impl Algorithm {
    /// Precision used when none is configured.
    pub fn default_precision(self) -> Precision {
        match self {
            Self::SlowSeries => Precision::new(28),
            Self::FastSeries => Precision::new(200),
        }
    }

    /// Builds a fresh engine for this algorithm.
    pub fn engine(self, precision: Precision) -> Box<dyn ApproximationEngine> {
        match self {
            Self::SlowSeries => Box::new(LeibnizSeries::new(precision)),
            Self::FastSeries => Box::new(ChudnovskySeries::new(precision)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SlowSeries => "slow-series",
            Self::FastSeries => "fast-series",
        })
    }
}

/// One published approximation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Estimate {
    /// The series' own iteration index for this term.
    pub iteration: u64,
    /// Number of steps the engine has executed, this one included.
    pub steps: u64,
    /// Current value, rounded to the engine's precision.
    pub value: Decimal,
}

/// A step-at-a-time approximation state machine.
pub trait ApproximationEngine: Send {
    /// Which algorithm this engine runs.
    fn algorithm(&self) -> Algorithm;

    /// Published precision.
    fn precision(&self) -> Precision;

    /// Advances the state by one term and returns the new estimate.
    fn step(&mut self) -> Estimate;
}

/// Madhava-Leibniz series: `pi = 4 * (1 - 1/3 + 1/5 - ...)`.
#[derive(Debug, Clone)]
pub struct LeibnizSeries {
    sum: Decimal,
    index: u64,
    positive: bool,
    steps: u64,
    precision: Precision,
}

impl LeibnizSeries {
    pub fn new(precision: Precision) -> Self {
        Self {
            sum: Decimal::zero(precision.working_scale()),
            index: 0,
            positive: true,
            steps: 0,
            precision,
        }
    }
}

impl ApproximationEngine for LeibnizSeries {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SlowSeries
    }

    fn precision(&self) -> Precision {
        self.precision
    }

    fn step(&mut self) -> Estimate {
        let sign = if self.positive { 1 } else { -1 };
        let term = Decimal::from_ratio(
            &BigInt::from(sign),
            &BigInt::from(2 * self.index + 1),
            self.precision.working_scale(),
        );
        self.sum += &term;
        self.steps += 1;

        let estimate = Estimate {
            iteration: self.index,
            steps: self.steps,
            value: self.sum.mul_int(4).rescale(self.precision.digits()),
        };

        self.index += 1;
        self.positive = !self.positive;
        estimate
    }
}

const CHUDNOVSKY_L0: u64 = 13_591_409;
const CHUDNOVSKY_L_STEP: u64 = 545_140_134;
const CHUDNOVSKY_X_FACTOR: i64 = -262_537_412_640_768_000;
const CHUDNOVSKY_C: u64 = 426_880;
const CHUDNOVSKY_D: u64 = 10_005;

/// Chudnovsky series: `pi = 426880 * sqrt(10005) / S`.
///
/// `M`, `L` and `X` are kept as exact integers; only the running sum `S`
/// is fixed-point.
#[derive(Debug, Clone)]
pub struct ChudnovskySeries {
    k: BigInt,
    m: BigInt,
    l: BigInt,
    x: BigInt,
    sum: Decimal,
    index: u64,
    steps: u64,
    numerator: Decimal,
    precision: Precision,
}

impl ChudnovskySeries {
    pub fn new(precision: Precision) -> Self {
        let scale = precision.working_scale();
        Self {
            k: BigInt::from(6),
            m: BigInt::from(1),
            l: BigInt::from(CHUDNOVSKY_L0),
            x: BigInt::from(1),
            sum: Decimal::from_integer(CHUDNOVSKY_L0, scale),
            index: 1,
            steps: 0,
            numerator: Decimal::sqrt_of(CHUDNOVSKY_D, scale).mul_int(CHUDNOVSKY_C),
            precision,
        }
    }
}

impl ApproximationEngine for ChudnovskySeries {
    fn algorithm(&self) -> Algorithm {
        Algorithm::FastSeries
    }

    fn precision(&self) -> Precision {
        self.precision
    }

    fn step(&mut self) -> Estimate {
        let i = BigInt::from(self.index);
        let k_cubed = self.k.pow(3);
        // Exact: the product of the three factorial ratios is always integral.
        self.m = (k_cubed - &self.k * BigInt::from(16)) * &self.m / i.pow(3);
        self.l += BigInt::from(CHUDNOVSKY_L_STEP);
        self.x *= BigInt::from(CHUDNOVSKY_X_FACTOR);

        let term = Decimal::from_ratio(
            &(&self.m * &self.l),
            &self.x,
            self.precision.working_scale(),
        );
        self.sum += &term;
        self.steps += 1;

        let estimate = Estimate {
            iteration: self.index,
            steps: self.steps,
            value: (&self.numerator / &self.sum).rescale(self.precision.digits()),
        };

        self.k += BigInt::from(12);
        self.index += 1;
        estimate
    }
}
