use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::CoreError;
use crate::types::{FundamentalSnapshot, SentimentScore, Series};

/// Supplies validated, currency-normalized, gap-free daily series.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Series, CoreError>;
}

/// Supplies point-in-time fundamental snapshots; fields may be absent.
#[async_trait]
pub trait FundamentalSource: Send + Sync {
    async fn get_snapshot(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> Result<FundamentalSnapshot, CoreError>;
}

/// Optional external sentiment reading. Absence makes the fusion layer
/// renormalize over the remaining sub-scores.
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn get_score(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> Result<SentimentScore, CoreError>;
}

/// Enumerates trading days; gaps in a series must be explicit through this.
#[async_trait]
pub trait Calendar: Send + Sync {
    async fn trading_days(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<NaiveDate>, CoreError>;
}
