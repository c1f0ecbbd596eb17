//! Vessel purchase financial model
//!
//! Normalizes loosely-typed parameters produced by a chat extraction step and
//! runs a deterministic cash-flow calculation over them.

pub mod calculator;
pub mod config;
pub mod db;
pub mod error;
pub mod extraction;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod sensitivity;

pub use calculator::{calculate, calculate_with, project};
pub use error::{ModelError, Result};
pub use models::{CalculationResult, ParameterSet, RawParameter, TypedParameter};
pub use normalizer::{normalize, normalize_with};
