//! Wall-clock cost estimation.
//!
//! Cost is derived from elapsed wall-clock time and a statically configured
//! hourly instance rate. It is an estimate (an upper bound on what the job
//! occupied the machine for), never a reconciled bill.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Seconds per hour (3600.0).
pub const SECS_PER_HOUR: f64 = 3600.0;

/// Instance type assumed when none is configured.
pub const DEFAULT_INSTANCE_TYPE: &str = "g4dn.xlarge";

/// Rate used for instance types missing from [`ON_DEMAND_RATES`].
pub const FALLBACK_HOURLY_RATE: f64 = 0.50;

/// Approximate on-demand USD/hour prices for common worker instance types.
pub const ON_DEMAND_RATES: &[(&str, f64)] = &[
    ("g4dn.xlarge", 0.526),
    ("g4dn.2xlarge", 0.752),
    ("p3.2xlarge", 3.06),
    ("p3.8xlarge", 12.24),
    ("m5.large", 0.096),
    ("m5.xlarge", 0.192),
];

// ---------------------------------------------------------------------------
// HourlyRate
// ---------------------------------------------------------------------------

/// USD per hour of worker time. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct HourlyRate(f64);

impl HourlyRate {
    pub fn new(usd_per_hour: f64) -> Result<Self, CoreError> {
        if usd_per_hour.is_finite() && usd_per_hour > 0.0 {
            Ok(Self(usd_per_hour))
        } else {
            Err(CoreError::Validation(format!(
                "hourly rate must be a positive number, got {usd_per_hour}"
            )))
        }
    }

    /// Static on-demand rate for `instance_type`, or
    /// [`FALLBACK_HOURLY_RATE`] when the type is unknown.
    pub fn for_instance_type(instance_type: &str) -> Self {
        let rate = ON_DEMAND_RATES
            .iter()
            .find(|(name, _)| *name == instance_type)
            .map(|(_, rate)| *rate)
            .unwrap_or(FALLBACK_HOURLY_RATE);
        Self(rate)
    }

    pub fn usd_per_hour(self) -> f64 {
        self.0
    }

    /// Estimated cost of occupying the worker for `elapsed`.
    pub fn cost_of(self, elapsed: Duration) -> f64 {
        estimate_cost_usd(elapsed.as_secs_f64(), self)
    }
}

/// `cost = (elapsed_secs / 3600) * rate`.
pub fn estimate_cost_usd(elapsed_secs: f64, rate: HourlyRate) -> f64 {
    (elapsed_secs / SECS_PER_HOUR) * rate.0
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// Time and cost of one measured operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measured {
    pub elapsed: Duration,
    pub cost_usd: f64,
}

/// Monotonic timer paired with the rate used to price it.
#[derive(Debug, Clone, Copy)]
pub struct CostAccountant {
    rate: HourlyRate,
}

impl CostAccountant {
    pub fn new(rate: HourlyRate) -> Self {
        Self { rate }
    }

    pub fn rate(&self) -> HourlyRate {
        self.rate
    }

    /// Await `fut` and report its wall-clock time and cost alongside the
    /// output. The measurement is taken whether the future succeeds or not.
    pub async fn measure<F, T>(&self, fut: F) -> (T, Measured)
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = fut.await;
        let elapsed = started.elapsed();
        (
            output,
            Measured {
                elapsed,
                cost_usd: self.rate.cost_of(elapsed),
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(v: f64) -> HourlyRate {
        HourlyRate::new(v).unwrap()
    }

    #[test]
    fn rate_rejects_non_positive() {
        assert!(HourlyRate::new(0.0).is_err());
        assert!(HourlyRate::new(-1.0).is_err());
        assert!(HourlyRate::new(f64::NAN).is_err());
        assert!(HourlyRate::new(f64::INFINITY).is_err());
    }

    #[test]
    fn cost_formula_is_exact() {
        let r = rate(0.526);
        assert_eq!(estimate_cost_usd(3600.0, r), 0.526);
        assert_eq!(estimate_cost_usd(1800.0, r), (1800.0 / 3600.0) * 0.526);
        assert_eq!(estimate_cost_usd(0.0, r), 0.0);
    }

    #[test]
    fn cost_is_monotonic_in_time() {
        let r = rate(0.40);
        let times = [0.5, 1.0, 12.75, 60.0, 3599.0, 7200.0];
        for pair in times.windows(2) {
            assert!(estimate_cost_usd(pair[0], r) < estimate_cost_usd(pair[1], r));
        }
    }

    #[test]
    fn cost_of_duration_matches_formula() {
        let r = rate(3.06);
        let elapsed = Duration::from_millis(90_500);
        assert_eq!(r.cost_of(elapsed), (90.5 / 3600.0) * 3.06);
    }

    #[test]
    fn instance_type_lookup() {
        assert_eq!(HourlyRate::for_instance_type("g4dn.xlarge").usd_per_hour(), 0.526);
        assert_eq!(HourlyRate::for_instance_type("p3.8xlarge").usd_per_hour(), 12.24);
        assert_eq!(
            HourlyRate::for_instance_type("x9.mega").usd_per_hour(),
            FALLBACK_HOURLY_RATE
        );
    }

    #[tokio::test]
    async fn measure_reports_elapsed_and_cost() {
        let accountant = CostAccountant::new(rate(36.0));
        let (value, measured) = accountant
            .measure(async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                7
            })
            .await;

        assert_eq!(value, 7);
        assert!(measured.elapsed >= Duration::from_millis(20));
        assert_eq!(measured.cost_usd, rate(36.0).cost_of(measured.elapsed));
    }
}
