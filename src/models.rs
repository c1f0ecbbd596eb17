//! Data models for vessel analysis parameters and calculation results
//!
//! Field names on the serialized forms are the wire contract shared with the
//! presentation and persistence layers, so they stay camelCase.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A parameter as emitted by the extraction step, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParameter {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl RawParameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: kind.into(),
        }
    }
}

/// Closed set of parameter type tags accepted from the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterUnit {
    Currency,
    Percentage,
    Years,
    Tonnage,
    Text,
}

impl ParameterUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Currency => "currency",
            Self::Percentage => "percentage",
            Self::Years => "years",
            Self::Tonnage => "tonnage",
            Self::Text => "text",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl fmt::Display for ParameterUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when a type tag is outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUnit(pub String);

impl FromStr for ParameterUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "currency" => Ok(Self::Currency),
            "percentage" => Ok(Self::Percentage),
            "years" => Ok(Self::Years),
            "tonnage" => Ok(Self::Tonnage),
            "text" => Ok(Self::Text),
            _ => Err(UnknownUnit(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A validated parameter. Numeric units always carry `ParameterValue::Number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedParameter {
    pub key: String,
    pub value: ParameterValue,
    pub unit: ParameterUnit,
}

impl TypedParameter {
    pub fn number(&self) -> Option<f64> {
        match self.value {
            ParameterValue::Number(n) => Some(n),
            ParameterValue::Text(_) => None,
        }
    }
}

/// Normalized inputs to one calculation run, keyed by parameter key.
///
/// Never mutated after construction; merging produces a new set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    params: BTreeMap<String, TypedParameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&TypedParameter> {
        self.params.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = &TypedParameter> {
        self.params.values()
    }

    /// Returns a new set with `incoming` layered over `self`. Later entries
    /// replace earlier ones with the same key.
    pub fn merged<I>(&self, incoming: I) -> ParameterSet
    where
        I: IntoIterator<Item = TypedParameter>,
    {
        let mut params = self.params.clone();
        for param in incoming {
            params.insert(param.key.clone(), param);
        }
        ParameterSet { params }
    }
}

impl FromIterator<TypedParameter> for ParameterSet {
    fn from_iter<T: IntoIterator<Item = TypedParameter>>(iter: T) -> Self {
        ParameterSet::new().merged(iter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowPoint {
    pub year: u32,
    pub cash_flow: f64,
}

/// `irr` is `None` when no root was found; `payback_period` is `None` when
/// cumulative cash flow never turns non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitabilityMetrics {
    pub npv: f64,
    pub irr: Option<f64>,
    pub payback_period: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
}

/// Output bundle of one calculation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub cash_flow_projections: Vec<CashFlowPoint>,
    pub profitability_metrics: ProfitabilityMetrics,
    pub chart_data: Vec<ChartPoint>,
}

/// A stored analysis in the local CLI store
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub turns: i64,
    pub has_result: bool,
}
