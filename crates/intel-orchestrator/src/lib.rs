//! Adapts the async data ports into eager values and drives the synchronous
//! core: indicator bundle, sub-scores, fused composite, recommendation.

use std::sync::Arc;

use chrono::NaiveDate;

use fundamental_analysis::{FundamentalAnalyzer, HealthGrade};
use intel_core::config::CoreConfig;
use intel_core::error::CoreError;
use intel_core::ports::{FundamentalSource, PriceSource, SentimentSource};
use intel_core::types::{
    CompositeScore, Horizon, Recommendation, SubScore, SubScoreName,
};
use recommendation::RecommendationEngine;
use signal_fusion::{momentum_sub_score, risk_flags, risk_sub_score, SignalFusion};
use technical_analysis::{IndicatorBundle, TechnicalAnalyzer};

/// Everything one pipeline pass produces for a symbol.
#[derive(Debug, Clone)]
pub struct SymbolAnalysis {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub sub_scores: Vec<SubScore>,
    pub composite: CompositeScore,
    pub recommendation: Recommendation,
    pub fundamental_grade: Option<HealthGrade>,
}

/// Intermediate state shared by [`IntelOrchestrator::analyze`] and
/// [`IntelOrchestrator::analyze_composite`].
struct ComposedScores {
    bundle: IndicatorBundle,
    sub_scores: Vec<SubScore>,
    composite: CompositeScore,
    fundamental_grade: Option<HealthGrade>,
}

/// Owns the port handles and the core engines. All engines are pure values;
/// the orchestrator holds no caches and no mutable state between calls.
pub struct IntelOrchestrator {
    price_source: Arc<dyn PriceSource>,
    fundamental_source: Arc<dyn FundamentalSource>,
    sentiment_source: Option<Arc<dyn SentimentSource>>,
    config: CoreConfig,
    analyzer: TechnicalAnalyzer,
    fundamental: FundamentalAnalyzer,
    fusion: SignalFusion,
    engine: RecommendationEngine,
}

impl IntelOrchestrator {
    pub fn new(
        config: CoreConfig,
        price_source: Arc<dyn PriceSource>,
        fundamental_source: Arc<dyn FundamentalSource>,
        sentiment_source: Option<Arc<dyn SentimentSource>>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let analyzer = TechnicalAnalyzer::new(config.indicator_params.clone());
        let fundamental = FundamentalAnalyzer::new(
            config.fundamental_thresholds.clone(),
            config.fundamental_weights.clone(),
            config.dcf.clone(),
        );
        let fusion = SignalFusion::new(config.fusion_weights.clone());
        let engine = RecommendationEngine::new(&config);
        Ok(Self {
            price_source,
            fundamental_source,
            sentiment_source,
            config,
            analyzer,
            fundamental,
            fusion,
            engine,
        })
    }

    /// Fetch through the ports and fuse everything up to the composite.
    /// Price data is required; a fundamental or sentiment shortfall narrows
    /// the composite instead of failing the call.
    async fn compose(
        &self,
        symbol: &str,
        from: NaiveDate,
        as_of: NaiveDate,
    ) -> Result<ComposedScores, CoreError> {
        tracing::info!(%symbol, %as_of, "starting analysis");

        let (series_result, snapshot_result) = tokio::join!(
            self.price_source.get_series(symbol, from, as_of),
            self.fundamental_source.get_snapshot(symbol, as_of),
        );

        let series = series_result?;
        let bundle = self.analyzer.compute_bundle(&series)?;
        let mut sub_scores = vec![self.analyzer.sub_score(&bundle)];

        let mut intrinsic_to_market = None;
        let mut fundamental_grade = None;
        match snapshot_result {
            Ok(snapshot) => match self.fundamental.analyze(&snapshot, Some(bundle.close)) {
                Ok(assessment) => {
                    intrinsic_to_market = assessment.intrinsic_to_market;
                    fundamental_grade = Some(assessment.grade);
                    sub_scores.push(assessment.sub_score);
                }
                Err(CoreError::InsufficientData(reason)) => {
                    tracing::warn!(%symbol, %reason, "fundamental analysis skipped");
                }
                Err(other) => return Err(other),
            },
            Err(CoreError::DataUnavailable(reason))
            | Err(CoreError::InsufficientData(reason)) => {
                tracing::warn!(%symbol, %reason, "fundamentals unavailable");
            }
            Err(other) => return Err(other),
        }

        if let Some(sentiment_source) = &self.sentiment_source {
            match sentiment_source.get_score(symbol, as_of).await {
                Ok(score) => sub_scores.push(SubScore::new(
                    SubScoreName::Sentiment,
                    score.value,
                    score.confidence,
                    "external sentiment reading",
                )),
                Err(CoreError::DataUnavailable(reason))
                | Err(CoreError::InsufficientData(reason)) => {
                    tracing::warn!(%symbol, %reason, "sentiment unavailable");
                }
                Err(other) => return Err(other),
            }
        }

        if let Some(momentum) = momentum_sub_score(&series) {
            sub_scores.push(momentum);
        }
        if let Some(risk) = risk_sub_score(&series, self.config.periods_per_year) {
            sub_scores.push(risk);
        }
        let flags = risk_flags(
            &series,
            intrinsic_to_market,
            &self.config.risk_flag_thresholds,
            self.config.periods_per_year,
        );

        let composite = self.fusion.fuse(&sub_scores, flags)?;
        Ok(ComposedScores {
            bundle,
            sub_scores,
            composite,
            fundamental_grade,
        })
    }

    /// Run the full pipeline for one symbol, through to the trade plan.
    pub async fn analyze(
        &self,
        symbol: &str,
        from: NaiveDate,
        as_of: NaiveDate,
        horizon: Horizon,
    ) -> Result<SymbolAnalysis, CoreError> {
        let composed = self.compose(symbol, from, as_of).await?;
        let recommendation = self.engine.recommend(
            symbol,
            composed.bundle.as_of,
            &composed.composite,
            composed.bundle.close,
            composed.bundle.latest_atr(),
            horizon,
        )?;
        tracing::info!(
            %symbol,
            score = composed.composite.score,
            action = %recommendation.action,
            "analysis complete"
        );

        Ok(SymbolAnalysis {
            symbol: symbol.to_string(),
            as_of: composed.bundle.as_of,
            sub_scores: composed.sub_scores,
            composite: composed.composite,
            recommendation,
            fundamental_grade: composed.fundamental_grade,
        })
    }

    /// Fuse the sub-scores for one symbol without mapping them to a trade
    /// plan.
    pub async fn analyze_composite(
        &self,
        symbol: &str,
        from: NaiveDate,
        as_of: NaiveDate,
    ) -> Result<CompositeScore, CoreError> {
        Ok(self.compose(symbol, from, as_of).await?.composite)
    }
}
