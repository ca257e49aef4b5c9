use intel_core::config::CoreConfig;
use intel_core::error::CoreError;
use intel_core::types::{Horizon, Recommendation, Series};
use recommendation::RecommendationEngine;
use signal_fusion::{momentum_sub_score, risk_flags, risk_sub_score, SignalFusion};
use technical_analysis::TechnicalAnalyzer;

/// A recommendation plus the composite score it came from. The state machine
/// needs the raw score for its threshold-crossing and hysteresis logic.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub recommendation: Recommendation,
    pub score: f64,
}

/// The simulator's view of signal generation. `history` is always the
/// candidate's prefix through the current day, so an implementation cannot
/// look ahead.
pub trait Strategy {
    fn evaluate(&mut self, symbol: &str, history: &Series) -> Result<Evaluation, CoreError>;
}

/// The default strategy: technical + momentum + risk sub-scores fused into a
/// composite, mapped through the recommendation engine. Fundamentals and
/// sentiment are port-fed concerns and do not exist inside a price-only
/// backtest, so the fusion layer renormalizes without them.
pub struct CompositeStrategy {
    config: CoreConfig,
    analyzer: TechnicalAnalyzer,
    fusion: SignalFusion,
    engine: RecommendationEngine,
    horizon: Horizon,
}

impl CompositeStrategy {
    pub fn new(config: CoreConfig, horizon: Horizon) -> Self {
        let analyzer = TechnicalAnalyzer::new(config.indicator_params.clone());
        let fusion = SignalFusion::new(config.fusion_weights.clone());
        let engine = RecommendationEngine::new(&config);
        Self {
            config,
            analyzer,
            fusion,
            engine,
            horizon,
        }
    }
}

impl Strategy for CompositeStrategy {
    fn evaluate(&mut self, symbol: &str, history: &Series) -> Result<Evaluation, CoreError> {
        let min_bars = self.config.indicator_params.sma_long;
        if history.len() < min_bars {
            return Err(CoreError::InsufficientData(format!(
                "need at least {} bars for {}, have {}",
                min_bars,
                symbol,
                history.len()
            )));
        }
        let bundle = self.analyzer.compute_bundle(history)?;
        let mut sub_scores = vec![self.analyzer.sub_score(&bundle)];
        if let Some(momentum) = momentum_sub_score(history) {
            sub_scores.push(momentum);
        }
        if let Some(risk) = risk_sub_score(history, self.config.periods_per_year) {
            sub_scores.push(risk);
        }
        let flags = risk_flags(
            history,
            None,
            &self.config.risk_flag_thresholds,
            self.config.periods_per_year,
        );

        let composite = self.fusion.fuse(&sub_scores, flags)?;
        let recommendation = self.engine.recommend(
            symbol,
            bundle.as_of,
            &composite,
            bundle.close,
            bundle.latest_atr(),
            self.horizon,
        )?;
        Ok(Evaluation {
            recommendation,
            score: composite.score,
        })
    }
}
