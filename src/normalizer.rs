//! Raw parameter normalization
//!
//! Turns extractor key/value/type triples into a typed `ParameterSet`.
//! Percentages are stored as fractions (0.08, not 8). A value written with a
//! trailing `%` is unambiguous and is divided by 100; a bare value is read
//! according to the configured `PercentConvention` and is never rescaled
//! on a per-value guess.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::models::{ParameterSet, ParameterUnit, ParameterValue, RawParameter, TypedParameter};

// sign, currency symbol, digits (optionally comma grouped), fraction, exponent, percent
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<sign>[-+])?\s*(?P<sym>[$€£¥])?\s*(?P<num>(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?|\.\d+)(?P<exp>[eE][-+]?\d+)?\s*(?P<pct>%)?$",
    )
    .expect("number pattern is valid")
});

/// How a bare (no `%` suffix) percentage value is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentConvention {
    /// "0.15" means 15%. Values above `max_fraction` in magnitude are rejected.
    Fraction,
    /// "15" means 15%.
    WholeNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeOptions {
    #[serde(default = "default_convention")]
    pub percent_convention: PercentConvention,
    #[serde(default = "default_max_fraction")]
    pub max_fraction: f64,
}

fn default_convention() -> PercentConvention {
    PercentConvention::Fraction
}

fn default_max_fraction() -> f64 {
    1.0
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            percent_convention: default_convention(),
            max_fraction: default_max_fraction(),
        }
    }
}

/// Normalize `raw` and layer it over `existing` using the default options.
pub fn normalize(raw: &[RawParameter], existing: &ParameterSet) -> Result<ParameterSet> {
    normalize_with(raw, existing, &NormalizeOptions::default())
}

/// Normalize `raw` and layer it over `existing`.
///
/// Fails on the first invalid parameter; nothing is merged in that case.
/// Duplicate keys resolve last-write-wins, within `raw` and against `existing`.
pub fn normalize_with(
    raw: &[RawParameter],
    existing: &ParameterSet,
    options: &NormalizeOptions,
) -> Result<ParameterSet> {
    let typed = raw
        .iter()
        .map(|param| normalize_parameter(param, options))
        .collect::<Result<Vec<_>>>()?;

    let merged = existing.merged(typed);
    debug!(
        incoming = raw.len(),
        prior = existing.len(),
        total = merged.len(),
        "normalized parameters"
    );
    Ok(merged)
}

/// Validate a single raw parameter.
pub fn normalize_parameter(raw: &RawParameter, options: &NormalizeOptions) -> Result<TypedParameter> {
    let key = raw.key.trim();
    if key.is_empty() {
        return Err(ModelError::validation(&raw.key, "parameter key is empty"));
    }

    let unit: ParameterUnit = raw
        .kind
        .parse()
        .map_err(|_| ModelError::validation(key, format!("unrecognized type tag '{}'", raw.kind)))?;

    let value = if unit.is_numeric() {
        ParameterValue::Number(parse_number(key, &raw.value, unit, options)?)
    } else {
        ParameterValue::Text(raw.value.clone())
    };

    Ok(TypedParameter {
        key: key.to_string(),
        value,
        unit,
    })
}

fn parse_number(key: &str, text: &str, unit: ParameterUnit, options: &NormalizeOptions) -> Result<f64> {
    let caps = NUMBER_RE
        .captures(text.trim())
        .ok_or_else(|| ModelError::validation(key, format!("'{}' is not a number", text)))?;

    if caps.name("sym").is_some() && unit != ParameterUnit::Currency {
        return Err(ModelError::validation(
            key,
            format!("currency symbol on a {} value", unit),
        ));
    }
    let has_percent = caps.name("pct").is_some();
    if has_percent && unit != ParameterUnit::Percentage {
        return Err(ModelError::validation(key, format!("'%' on a {} value", unit)));
    }

    let mut literal = caps["num"].replace(',', "");
    if let Some(exp) = caps.name("exp") {
        literal.push_str(exp.as_str());
    }
    let mut value: f64 = literal
        .parse()
        .map_err(|_| ModelError::validation(key, format!("'{}' is not a number", text)))?;
    if caps.name("sign").is_some_and(|s| s.as_str() == "-") {
        value = -value;
    }
    if !value.is_finite() {
        return Err(ModelError::validation(key, format!("'{}' is not finite", text)));
    }

    if unit != ParameterUnit::Percentage {
        return Ok(value);
    }
    if has_percent {
        return Ok(value / 100.0);
    }
    match options.percent_convention {
        PercentConvention::WholeNumber => Ok(value / 100.0),
        PercentConvention::Fraction => {
            if value.abs() > options.max_fraction {
                Err(ModelError::validation(
                    key,
                    format!(
                        "{} looks like a whole-number percentage; send a fraction (0.08) or a '%' suffix",
                        text.trim()
                    ),
                ))
            } else {
                Ok(value)
            }
        }
    }
}
