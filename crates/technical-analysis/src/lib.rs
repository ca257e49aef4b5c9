pub mod analyzer;
pub mod indicators;

#[cfg(test)]
mod indicators_tests;

pub use analyzer::{IndicatorBundle, IndicatorKind, TechnicalAnalyzer};
