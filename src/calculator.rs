//! Vessel purchase cash-flow engine
//!
//! Reads model inputs out of a `ParameterSet`, projects annual cash flows for
//! years `0..=term` and derives NPV, IRR and payback period from them.
//! Everything here is a pure function of the parameter set.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{ModelError, Result};
use crate::metrics::{self, SolverSettings};
use crate::models::{
    CalculationResult, CashFlowPoint, ChartPoint, ParameterSet, ParameterUnit, ProfitabilityMetrics,
    TypedParameter,
};

/// A model input: its canonical key and the alternative keys the extractor
/// is known to produce for it. The canonical key wins over aliases.
#[derive(Debug, Clone, Copy)]
pub struct InputKey {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

pub const PURCHASE_PRICE: InputKey = InputKey {
    canonical: "purchasePrice",
    aliases: &["vesselPrice", "purchaseCost", "acquisitionCost"],
};
pub const TERM: InputKey = InputKey {
    canonical: "term",
    aliases: &["financingTerm", "projectionYears", "holdingPeriod", "analysisPeriod"],
};
pub const DISCOUNT_RATE: InputKey = InputKey {
    canonical: "discountRate",
    aliases: &["hurdleRate", "wacc", "requiredReturn"],
};
pub const ANNUAL_REVENUE: InputKey = InputKey {
    canonical: "annualRevenue",
    aliases: &["revenue", "charterRevenue", "annualCharterRevenue"],
};
pub const ANNUAL_OPERATING_COST: InputKey = InputKey {
    canonical: "annualOperatingCost",
    aliases: &["operatingCost", "opex", "annualOpex"],
};
pub const REVENUE_GROWTH_RATE: InputKey = InputKey {
    canonical: "revenueGrowthRate",
    aliases: &["revenueEscalation", "charterRateGrowth"],
};
pub const COST_GROWTH_RATE: InputKey = InputKey {
    canonical: "costGrowthRate",
    aliases: &["costEscalation", "opexGrowthRate", "inflationRate"],
};
pub const LOAN_AMOUNT: InputKey = InputKey {
    canonical: "loanAmount",
    aliases: &["loanPrincipal", "debtAmount"],
};
pub const LOAN_TO_VALUE: InputKey = InputKey {
    canonical: "loanToValue",
    aliases: &["ltv", "financingRatio"],
};
pub const LOAN_INTEREST_RATE: InputKey = InputKey {
    canonical: "loanInterestRate",
    aliases: &["loanRate", "interestRate"],
};
pub const LOAN_TERM: InputKey = InputKey {
    canonical: "loanTerm",
    aliases: &["loanTenor", "amortizationPeriod"],
};
pub const TAX_RATE: InputKey = InputKey {
    canonical: "taxRate",
    aliases: &["corporateTaxRate"],
};
pub const USEFUL_LIFE: InputKey = InputKey {
    canonical: "usefulLife",
    aliases: &["depreciationPeriod", "economicLife"],
};
pub const RESIDUAL_VALUE: InputKey = InputKey {
    canonical: "residualValue",
    aliases: &["scrapValue", "salvageValue", "resaleValue"],
};

/// Required inputs, in the order `calculate` checks them.
pub const REQUIRED_INPUTS: [InputKey; 5] = [
    PURCHASE_PRICE,
    TERM,
    DISCOUNT_RATE,
    ANNUAL_REVENUE,
    ANNUAL_OPERATING_COST,
];

const MAX_TERM_YEARS: u32 = 100;
const DEFAULT_USEFUL_LIFE: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Financing {
    pub principal: f64,
    pub rate: f64,
    pub term: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxTreatment {
    pub rate: f64,
    pub useful_life: u32,
}

/// Validated inputs of the vessel model
#[derive(Debug, Clone, PartialEq)]
pub struct VesselModel {
    pub purchase_price: f64,
    pub term: u32,
    pub discount_rate: f64,
    pub annual_revenue: f64,
    pub annual_operating_cost: f64,
    pub revenue_growth: f64,
    pub cost_growth: f64,
    pub financing: Option<Financing>,
    pub tax: Option<TaxTreatment>,
    pub residual_value: f64,
}

/// One row of the projection. Year 0 carries only the purchase outlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearBreakdown {
    pub year: u32,
    pub revenue: f64,
    pub operating_cost: f64,
    pub interest: f64,
    pub principal: f64,
    pub depreciation: f64,
    pub tax: f64,
    pub residual: f64,
    pub cash_flow: f64,
    pub cumulative: f64,
}

impl YearBreakdown {
    pub fn debt_service(&self) -> f64 {
        self.interest + self.principal
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub years: Vec<YearBreakdown>,
}

impl Projection {
    pub fn cash_flows(&self) -> Vec<f64> {
        self.years.iter().map(|y| y.cash_flow).collect()
    }
}

/// Run the model with default solver settings.
pub fn calculate(params: &ParameterSet) -> Result<CalculationResult> {
    calculate_with(params, &SolverSettings::default())
}

/// Run the model.
///
/// Fails with `MissingParameter` for the first absent required input and
/// `InvalidParameter` for inputs outside their domain, or when the discount
/// rate drives the NPV out of floating-point range. An IRR with no root in
/// the search interval is reported as `irr: None`, not as an error.
pub fn calculate_with(params: &ParameterSet, settings: &SolverSettings) -> Result<CalculationResult> {
    let model = VesselModel::from_parameters(params)?;
    let result = model.evaluate(settings)?;
    debug!(
        term = model.term,
        npv = result.profitability_metrics.npv,
        "calculation complete"
    );
    Ok(result)
}

/// Year-by-year breakdown for the given parameters.
pub fn project(params: &ParameterSet) -> Result<Projection> {
    Ok(VesselModel::from_parameters(params)?.project())
}

pub(crate) fn lookup<'a>(params: &'a ParameterSet, input: &InputKey) -> Option<&'a TypedParameter> {
    std::iter::once(input.canonical)
        .chain(input.aliases.iter().copied())
        .find_map(|key| params.get(key))
}

fn numeric(param: &TypedParameter) -> Result<f64> {
    param
        .number()
        .ok_or_else(|| ModelError::invalid(&param.key, "expected a number, got text"))
}

fn required(params: &ParameterSet, input: &InputKey) -> Result<(String, f64)> {
    let param = lookup(params, input).ok_or_else(|| ModelError::MissingParameter {
        key: input.canonical.to_string(),
    })?;
    Ok((param.key.clone(), numeric(param)?))
}

fn optional(params: &ParameterSet, input: &InputKey) -> Result<Option<(String, f64)>> {
    lookup(params, input)
        .map(|param| -> Result<(String, f64)> { Ok((param.key.clone(), numeric(param)?)) })
        .transpose()
}

fn whole_years(key: &str, value: f64, max: u32) -> Result<u32> {
    if value.fract() != 0.0 {
        return Err(ModelError::invalid(key, format!("{} is not a whole number of years", value)));
    }
    if value < 1.0 || value > max as f64 {
        return Err(ModelError::invalid(key, format!("must be between 1 and {} years", max)));
    }
    Ok(value as u32)
}

fn rate_above_minus_one(key: &str, value: f64) -> Result<f64> {
    if value <= -1.0 {
        return Err(ModelError::invalid(key, "rate must be greater than -100%"));
    }
    Ok(value)
}

fn non_negative(key: &str, value: f64) -> Result<f64> {
    if value < 0.0 {
        return Err(ModelError::invalid(key, "must not be negative"));
    }
    Ok(value)
}

fn fraction_in_unit_range(key: &str, value: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ModelError::invalid(key, "must be between 0 and 1"));
    }
    Ok(value)
}

impl VesselModel {
    /// Extract and validate model inputs.
    pub fn from_parameters(params: &ParameterSet) -> Result<Self> {
        // all required keys are checked for presence before any range check
        let price = required(params, &PURCHASE_PRICE)?;
        let term = required(params, &TERM)?;
        let discount = required(params, &DISCOUNT_RATE)?;
        let revenue = required(params, &ANNUAL_REVENUE)?;
        let cost = required(params, &ANNUAL_OPERATING_COST)?;

        if price.1 <= 0.0 {
            return Err(ModelError::invalid(&price.0, "purchase price must be positive"));
        }
        let purchase_price = price.1;
        let term = whole_years(&term.0, term.1, MAX_TERM_YEARS)?;
        let discount_rate = rate_above_minus_one(&discount.0, discount.1)?;
        let annual_revenue = non_negative(&revenue.0, revenue.1)?;
        let annual_operating_cost = non_negative(&cost.0, cost.1)?;

        for param in params.iter().filter(|p| p.unit == ParameterUnit::Tonnage) {
            if param.number().is_some_and(|t| t < 0.0) {
                return Err(ModelError::invalid(&param.key, "tonnage must not be negative"));
            }
        }

        let revenue_growth = match optional(params, &REVENUE_GROWTH_RATE)? {
            Some((key, g)) => rate_above_minus_one(&key, g)?,
            None => 0.0,
        };
        let cost_growth = match optional(params, &COST_GROWTH_RATE)? {
            Some((key, g)) => rate_above_minus_one(&key, g)?,
            None => 0.0,
        };

        let residual_value = match optional(params, &RESIDUAL_VALUE)? {
            Some((key, v)) => {
                let v = non_negative(&key, v)?;
                if v > purchase_price {
                    return Err(ModelError::invalid(&key, "residual value exceeds purchase price"));
                }
                v
            }
            None => 0.0,
        };

        let financing = Self::read_financing(params, purchase_price, term)?;

        // usefulLife only feeds depreciation, so it is ignored without a tax rate
        let tax = match optional(params, &TAX_RATE)? {
            Some((key, rate)) => {
                let rate = fraction_in_unit_range(&key, rate)?;
                let useful_life = match optional(params, &USEFUL_LIFE)? {
                    Some((key, v)) => whole_years(&key, v, MAX_TERM_YEARS)?,
                    None => DEFAULT_USEFUL_LIFE,
                };
                Some(TaxTreatment { rate, useful_life })
            }
            None => None,
        };

        Ok(VesselModel {
            purchase_price,
            term,
            discount_rate,
            annual_revenue,
            annual_operating_cost,
            revenue_growth,
            cost_growth,
            financing,
            tax,
            residual_value,
        })
    }

    fn read_financing(params: &ParameterSet, purchase_price: f64, term: u32) -> Result<Option<Financing>> {
        let principal = if let Some((key, amount)) = optional(params, &LOAN_AMOUNT)? {
            let amount = non_negative(&key, amount)?;
            if amount > purchase_price {
                return Err(ModelError::invalid(&key, "loan exceeds purchase price"));
            }
            amount
        } else if let Some((key, ltv)) = optional(params, &LOAN_TO_VALUE)? {
            fraction_in_unit_range(&key, ltv)? * purchase_price
        } else {
            return Ok(None);
        };

        let (rate_key, rate) = optional(params, &LOAN_INTEREST_RATE)?.ok_or_else(|| {
            ModelError::MissingParameter {
                key: LOAN_INTEREST_RATE.canonical.to_string(),
            }
        })?;
        let rate = non_negative(&rate_key, rate)?;
        let loan_term = match optional(params, &LOAN_TERM)? {
            Some((key, years)) => whole_years(&key, years, MAX_TERM_YEARS)?,
            None => term,
        };

        if principal == 0.0 {
            return Ok(None);
        }
        Ok(Some(Financing {
            principal,
            rate,
            term: loan_term,
        }))
    }

    /// (interest, principal) paid in each year `1..=self.term`.
    pub fn debt_schedule(&self) -> Vec<(f64, f64)> {
        let Some(loan) = self.financing else {
            return vec![(0.0, 0.0); self.term as usize];
        };

        let n = loan.term;
        let payment = if loan.rate == 0.0 {
            loan.principal / n as f64
        } else {
            loan.principal * loan.rate / (1.0 - (1.0 + loan.rate).powi(-(n as i32)))
        };

        let mut balance = loan.principal;
        let mut schedule = Vec::with_capacity(self.term as usize);
        for year in 1..=self.term {
            if year > n || balance <= 0.0 {
                schedule.push((0.0, 0.0));
                continue;
            }
            let interest = balance * loan.rate;
            // final instalment or balloon at the horizon clears the balance
            let principal = if year == n || year == self.term {
                balance
            } else {
                (payment - interest).min(balance)
            };
            balance -= principal;
            schedule.push((interest, principal));
        }
        schedule
    }

    fn depreciation(&self, year: u32) -> f64 {
        match self.tax {
            Some(tax) if year <= tax.useful_life => {
                (self.purchase_price - self.residual_value) / tax.useful_life as f64
            }
            _ => 0.0,
        }
    }

    /// Project cash flows for years `0..=term`.
    pub fn project(&self) -> Projection {
        let outlay = -self.purchase_price;
        let mut years = Vec::with_capacity(self.term as usize + 1);
        years.push(YearBreakdown {
            year: 0,
            revenue: 0.0,
            operating_cost: 0.0,
            interest: 0.0,
            principal: 0.0,
            depreciation: 0.0,
            tax: 0.0,
            residual: 0.0,
            cash_flow: outlay,
            cumulative: outlay,
        });

        let mut cumulative = outlay;
        for (idx, (interest, principal)) in self.debt_schedule().into_iter().enumerate() {
            let year = idx as u32 + 1;
            let elapsed = (year - 1) as i32;
            let revenue = self.annual_revenue * (1.0 + self.revenue_growth).powi(elapsed);
            let operating_cost = self.annual_operating_cost * (1.0 + self.cost_growth).powi(elapsed);
            let depreciation = self.depreciation(year);
            let tax = match self.tax {
                Some(t) => t.rate * (revenue - operating_cost - interest - depreciation).max(0.0),
                None => 0.0,
            };
            let residual = if year == self.term { self.residual_value } else { 0.0 };

            let cash_flow = revenue - operating_cost - (interest + principal) - tax + residual;
            cumulative += cash_flow;
            years.push(YearBreakdown {
                year,
                revenue,
                operating_cost,
                interest,
                principal,
                depreciation,
                tax,
                residual,
                cash_flow,
                cumulative,
            });
        }

        Projection { years }
    }

    /// Project and derive the result bundle.
    pub fn evaluate(&self, settings: &SolverSettings) -> Result<CalculationResult> {
        let projection = self.project();
        let flows = projection.cash_flows();

        let npv = metrics::npv(self.discount_rate, &flows);
        if !npv.is_finite() {
            return Err(ModelError::invalid(
                DISCOUNT_RATE.canonical,
                format!("NPV at a rate of {} over {} years is not a finite number", self.discount_rate, self.term),
            ));
        }
        let irr = match metrics::irr(&flows, settings) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!("IRR undefined: {}", e);
                None
            }
        };
        let payback_period = metrics::payback_period(&flows);

        let cash_flow_projections: Vec<CashFlowPoint> = projection
            .years
            .iter()
            .map(|y| CashFlowPoint {
                year: y.year,
                cash_flow: y.cash_flow,
            })
            .collect();

        Ok(CalculationResult {
            chart_data: chart_series(&cash_flow_projections),
            cash_flow_projections,
            profitability_metrics: ProfitabilityMetrics {
                npv,
                irr,
                payback_period,
            },
        })
    }
}

/// Display projection of the cash-flow sequence.
pub fn chart_series(points: &[CashFlowPoint]) -> Vec<ChartPoint> {
    points
        .iter()
        .map(|p| ChartPoint {
            name: format!("Year {}", p.year),
            value: p.cash_flow,
        })
        .collect()
}

/// Format a projection as a fixed-width table
pub fn format_projection(projection: &Projection) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:>4} {:>15} {:>15} {:>15} {:>13} {:>13} {:>15} {:>16}\n",
        "Year", "Revenue", "Opex", "Debt service", "Tax", "Residual", "Cash flow", "Cumulative"
    ));
    output.push_str(&format!("{}\n", "-".repeat(113)));
    for y in &projection.years {
        output.push_str(&format!(
            "{:>4} {:>15.0} {:>15.0} {:>15.0} {:>13.0} {:>13.0} {:>15.0} {:>16.0}\n",
            y.year,
            y.revenue,
            y.operating_cost,
            y.debt_service(),
            y.tax,
            y.residual,
            y.cash_flow,
            y.cumulative
        ));
    }
    output
}

impl fmt::Display for CalculationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Vessel Investment Summary ===")?;
        writeln!(f, "Cash flows:")?;
        for point in &self.cash_flow_projections {
            writeln!(f, "  Year {:>3}: {:>18.2}", point.year, point.cash_flow)?;
        }
        writeln!(f)?;

        let m = &self.profitability_metrics;
        writeln!(f, "Profitability:")?;
        writeln!(f, "  NPV:     {:.2}", m.npv)?;
        match m.irr {
            Some(irr) => writeln!(f, "  IRR:     {:.2}%", irr * 100.0)?,
            None => writeln!(f, "  IRR:     undefined")?,
        }
        match m.payback_period {
            Some(years) => writeln!(f, "  Payback: {:.2} years", years)?,
            None => writeln!(f, "  Payback: not reached")?,
        }

        Ok(())
    }
}
