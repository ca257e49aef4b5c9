pub mod engine;
pub mod metrics;
pub mod models;
pub mod optimizer;
pub mod strategy;

#[cfg(test)]
mod tests;

pub use engine::{exit_for_bar, BacktestEngine};
pub use models::*;
pub use optimizer::{grid_search, GridSearchResult, GridSearchRow, Objective, ParamGrid};
pub use strategy::{CompositeStrategy, Evaluation, Strategy};
