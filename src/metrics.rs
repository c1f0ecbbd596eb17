//! Profitability metrics over an annual cash-flow sequence
//!
//! Index `t` of every slice is year `t`, with year 0 undiscounted.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Bounds and budget for the IRR root search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    #[serde(default = "default_irr_lower")]
    pub irr_lower: f64,
    #[serde(default = "default_irr_upper")]
    pub irr_upper: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_irr_lower() -> f64 {
    -0.99
}

fn default_irr_upper() -> f64 {
    10.0
}

fn default_max_iterations() -> u32 {
    100
}

fn default_tolerance() -> f64 {
    1e-6
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            irr_lower: default_irr_lower(),
            irr_upper: default_irr_upper(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Net present value at `rate` (a fraction).
pub fn npv(rate: f64, cash_flows: &[f64]) -> f64 {
    let base = 1.0 + rate;
    cash_flows
        .iter()
        .enumerate()
        .map(|(year, cf)| cf / base.powi(year as i32))
        .sum()
}

/// Internal rate of return by bisection over `[irr_lower, irr_upper]`.
///
/// Returns `NoConvergence` when the flows never change sign, when NPV has the
/// same sign at both bounds, or when the interval does not shrink below
/// `tolerance` within `max_iterations`.
pub fn irr(cash_flows: &[f64], settings: &SolverSettings) -> Result<f64> {
    let no_root = ModelError::NoConvergence {
        iterations: settings.max_iterations,
    };

    let has_inflow = cash_flows.iter().any(|cf| *cf > 0.0);
    let has_outflow = cash_flows.iter().any(|cf| *cf < 0.0);
    if !(has_inflow && has_outflow) {
        return Err(no_root);
    }

    let mut lo = settings.irr_lower;
    let mut hi = settings.irr_upper;
    let mut f_lo = npv(lo, cash_flows);
    let f_hi = npv(hi, cash_flows);

    if f_lo == 0.0 {
        return Ok(lo);
    }
    if f_hi == 0.0 {
        return Ok(hi);
    }
    if !f_lo.is_finite() || !f_hi.is_finite() || f_lo.signum() == f_hi.signum() {
        return Err(no_root);
    }

    for iteration in 0..settings.max_iterations {
        let mid = 0.5 * (lo + hi);
        let f_mid = npv(mid, cash_flows);

        if f_mid == 0.0 || 0.5 * (hi - lo) < settings.tolerance {
            tracing::debug!(iteration, irr = mid, "irr converged");
            return Ok(mid);
        }

        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(no_root)
}

/// First (possibly fractional) year at which cumulative undiscounted cash
/// flow is non-negative, interpolating linearly inside the crossing year.
/// `None` when it never gets there within the sequence.
pub fn payback_period(cash_flows: &[f64]) -> Option<f64> {
    let mut cumulative = 0.0;
    for (year, cf) in cash_flows.iter().enumerate() {
        let before = cumulative;
        cumulative += cf;
        if cumulative >= 0.0 {
            if year == 0 || *cf <= 0.0 {
                return Some(year as f64);
            }
            // before < 0 <= cumulative, so cf > 0
            return Some((year - 1) as f64 + (-before / cf));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npv_at_zero_rate_is_sum() {
        assert_eq!(npv(0.0, &[-100.0, 30.0, 40.0, 50.0]), 20.0);
    }

    #[test]
    fn npv_discounts_by_year() {
        let value = npv(0.1, &[0.0, 110.0, 121.0]);
        assert!((value - 200.0).abs() < 1e-9);
    }

    #[test]
    fn irr_of_simple_bond() {
        // 1000 in, 100 coupon for two years, 1100 at the end: 10%
        let rate = irr(&[-1000.0, 100.0, 100.0, 1100.0], &SolverSettings::default()).unwrap();
        assert!((rate - 0.10).abs() < 1e-6, "irr = {rate}");
    }

    #[test]
    fn irr_zeroes_npv() {
        let flows = [-100_000_000.0, 10_000_000.0, 12_000_000.0, 15_000_000.0, 18_000_000.0, 80_000_000.0];
        let rate = irr(&flows, &SolverSettings::default()).unwrap();
        let slope_scale = flows.iter().map(|cf| cf.abs()).sum::<f64>();
        assert!(npv(rate, &flows).abs() < slope_scale * 1e-5);
    }

    #[test]
    fn irr_undefined_without_sign_change() {
        let err = irr(&[-100.0, -10.0, -5.0], &SolverSettings::default()).unwrap_err();
        assert!(matches!(err, ModelError::NoConvergence { iterations: 100 }));
        assert!(irr(&[0.0, 0.0], &SolverSettings::default()).is_err());
    }

    #[test]
    fn irr_outside_interval_is_reported() {
        let settings = SolverSettings {
            irr_lower: 0.5,
            irr_upper: 1.0,
            ..SolverSettings::default()
        };
        assert!(irr(&[-1000.0, 100.0, 100.0, 1100.0], &settings).is_err());
    }

    #[test]
    fn irr_respects_iteration_budget() {
        let settings = SolverSettings {
            max_iterations: 3,
            ..SolverSettings::default()
        };
        let err = irr(&[-1000.0, 100.0, 100.0, 1100.0], &settings).unwrap_err();
        assert_eq!(err, ModelError::NoConvergence { iterations: 3 });
    }

    #[test]
    fn payback_interpolates() {
        let period = payback_period(&[-100.0, 40.0, 40.0, 40.0]).unwrap();
        assert!((period - 2.5).abs() < 1e-12);
    }

    #[test]
    fn payback_exact_year() {
        assert_eq!(payback_period(&[-100.0, 50.0, 50.0]), Some(2.0));
    }

    #[test]
    fn payback_unreachable() {
        assert_eq!(payback_period(&[-100.0, -10.0, -10.0]), None);
        assert_eq!(payback_period(&[-100.0, 10.0, 10.0]), None);
    }

    #[test]
    fn payback_immediate_when_no_outlay() {
        assert_eq!(payback_period(&[0.0, 10.0]), Some(0.0));
    }
}
