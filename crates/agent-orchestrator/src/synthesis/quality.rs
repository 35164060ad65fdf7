//! Per-result quality scoring

use super::lexicon;
use agent_core::AgentResult;
use serde::{Deserialize, Serialize};

/// Relative weight of each quality dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    /// Whether the insight is about this ticker and market
    pub relevance: f64,
    /// Dissimilarity from the agent's previous insight
    pub novelty: f64,
    /// Absence of self-contradiction
    pub consistency: f64,
    /// Presence of a concrete direction or action
    pub actionability: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            relevance: 0.25,
            novelty: 0.25,
            consistency: 0.25,
            actionability: 0.25,
        }
    }
}

/// The four quality dimensions of one result, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub relevance: f64,
    pub novelty: f64,
    pub consistency: f64,
    pub actionability: f64,
}

impl QualityBreakdown {
    /// Score `result` against the agent's previous insight, if any
    pub fn assess(ticker: &str, result: &AgentResult, previous: Option<&str>) -> Self {
        let text = &result.insight;
        let signal = lexicon::signal(text);

        let relevance = if lexicon::mentions_symbol(text, ticker) {
            1.0
        } else if lexicon::mentions_domain(text) {
            0.6
        } else {
            0.2
        };

        let novelty = previous.map_or(1.0, |prev| 1.0 - lexicon::similarity(text, prev));

        let consistency = if signal.is_directional() {
            let (lo, hi) = if signal.bullish < signal.bearish {
                (signal.bullish, signal.bearish)
            } else {
                (signal.bearish, signal.bullish)
            };
            1.0 - lo as f64 / hi as f64
        } else {
            1.0
        };

        let actionability = if lexicon::mentions_action(text) {
            1.0
        } else if signal.is_directional() {
            0.5
        } else {
            0.0
        };

        Self {
            relevance,
            novelty,
            consistency,
            actionability,
        }
    }

    /// Weighted mean under `weights`
    pub fn score(&self, weights: &QualityWeights) -> f64 {
        let total = weights.relevance + weights.novelty + weights.consistency + weights.actionability;
        if total <= 0.0 {
            return 0.0;
        }
        (self.relevance * weights.relevance
            + self.novelty * weights.novelty
            + self.consistency * weights.consistency
            + self.actionability * weights.actionability)
            / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::AgentKind;

    fn result(text: &str) -> AgentResult {
        AgentResult::new(AgentKind::Technical, "AAPL", text, 0.7, true)
    }

    #[test]
    fn test_focused_actionable_insight_scores_high() {
        let q = QualityBreakdown::assess("AAPL", &result("AAPL is in a strong uptrend; buy on dips"), None);
        assert_eq!(q.relevance, 1.0);
        assert_eq!(q.novelty, 1.0);
        assert_eq!(q.consistency, 1.0);
        assert_eq!(q.actionability, 1.0);
        assert_eq!(q.score(&QualityWeights::default()), 1.0);
    }

    #[test]
    fn test_dotted_ticker_is_relevant() {
        let result = AgentResult::new(
            AgentKind::Technical,
            "BRK.B",
            "BRK.B is in a strong uptrend; buy on dips",
            0.7,
            true,
        );
        let q = QualityBreakdown::assess("BRK.B", &result, None);
        assert_eq!(q.relevance, 1.0);
        assert_eq!(q.score(&QualityWeights::default()), 1.0);
    }

    #[test]
    fn test_contradictory_insight_loses_consistency() {
        let q = QualityBreakdown::assess("AAPL", &result("bullish trend but bearish divergence"), None);
        assert_eq!(q.consistency, 0.0);
        assert_eq!(q.relevance, 0.2);
        assert_eq!(q.actionability, 0.5);
    }

    #[test]
    fn test_repeat_insight_is_not_novel() {
        let text = "AAPL holds support";
        let q = QualityBreakdown::assess("AAPL", &result(text), Some(text));
        assert_eq!(q.novelty, 0.0);
        assert_eq!(q.relevance, 1.0);
    }

    #[test]
    fn test_weights_normalise() {
        let q = QualityBreakdown {
            relevance: 1.0,
            novelty: 0.0,
            consistency: 1.0,
            actionability: 0.0,
        };
        let weights = QualityWeights {
            relevance: 3.0,
            novelty: 1.0,
            consistency: 0.0,
            actionability: 0.0,
        };
        assert!((q.score(&weights) - 0.75).abs() < 1e-12);
    }
}
