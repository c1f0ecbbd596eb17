//! NPV and IRR under relative shocks to the main model drivers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calculator::{
    ANNUAL_OPERATING_COST, ANNUAL_REVENUE, DISCOUNT_RATE, InputKey, PURCHASE_PRICE, VesselModel, lookup,
};
use crate::error::{ModelError, Result};
use crate::metrics::SolverSettings;
use crate::models::{ParameterSet, ParameterValue, TypedParameter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Driver {
    AnnualRevenue,
    AnnualOperatingCost,
    PurchasePrice,
    DiscountRate,
}

impl Driver {
    pub const ALL: [Driver; 4] = [
        Driver::AnnualRevenue,
        Driver::AnnualOperatingCost,
        Driver::PurchasePrice,
        Driver::DiscountRate,
    ];

    /// The model input this driver shocks.
    pub fn input(&self) -> InputKey {
        match self {
            Driver::AnnualRevenue => ANNUAL_REVENUE,
            Driver::AnnualOperatingCost => ANNUAL_OPERATING_COST,
            Driver::PurchasePrice => PURCHASE_PRICE,
            Driver::DiscountRate => DISCOUNT_RATE,
        }
    }

    pub fn key(&self) -> &'static str {
        self.input().canonical
    }

    /// Scale this driver's parameter by `1 + shift` and rebuild the model, so
    /// the shocked case passes the same domain checks as the base case.
    fn apply(&self, params: &ParameterSet, shift: f64) -> Result<VesselModel> {
        let input = self.input();
        let param = lookup(params, &input).ok_or_else(|| ModelError::MissingParameter {
            key: input.canonical.to_string(),
        })?;
        let value = param
            .number()
            .ok_or_else(|| ModelError::invalid(&param.key, "expected a number, got text"))?;

        let shocked = TypedParameter {
            key: param.key.clone(),
            value: ParameterValue::Number(value * (1.0 + shift)),
            unit: param.unit,
        };
        VesselModel::from_parameters(&params.merged([shocked]))
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityCase {
    pub driver: Driver,
    pub shift: f64,
    pub npv: f64,
    pub irr: Option<f64>,
}

/// Default shifts when none are configured.
pub fn default_shifts() -> Vec<f64> {
    vec![-0.2, -0.1, 0.1, 0.2]
}

/// Run every driver at every shift, in driver-then-shift order.
pub fn sensitivity(params: &ParameterSet, shifts: &[f64], settings: &SolverSettings) -> Result<Vec<SensitivityCase>> {
    VesselModel::from_parameters(params)?;
    let mut cases = Vec::with_capacity(Driver::ALL.len() * shifts.len());

    for driver in Driver::ALL {
        for &shift in shifts {
            let shocked = driver.apply(params, shift)?;
            let metrics = shocked.evaluate(settings)?.profitability_metrics;
            cases.push(SensitivityCase {
                driver,
                shift,
                npv: metrics.npv,
                irr: metrics.irr,
            });
        }
    }

    tracing::debug!(cases = cases.len(), "sensitivity complete");
    Ok(cases)
}

/// Format sensitivity cases as a table
pub fn format_cases(base_npv: f64, cases: &[SensitivityCase]) -> String {
    let mut output = format!("Base NPV: {:.0}\n\n", base_npv);
    output.push_str(&format!(
        "{:<22} {:>8} {:>18} {:>18} {:>9}\n",
        "Driver", "Shift", "NPV", "Change", "IRR"
    ));
    for case in cases {
        let irr = case
            .irr
            .map(|r| format!("{:.2}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string());
        output.push_str(&format!(
            "{:<22} {:>+7.0}% {:>18.0} {:>+18.0} {:>9}\n",
            case.driver.key(),
            case.shift * 100.0,
            case.npv,
            case.npv - base_npv,
            irr
        ));
    }
    output
}
