//! Quality scoring, conflict resolution and consensus synthesis
//!
//! [`QualitySynthesizer::synthesize`] scores each contributing result,
//! remembers it for future novelty checks, and hands the scored set to
//! [`QualitySynthesizer::combine`], which is a pure function of its inputs.

pub mod lexicon;
pub mod quality;

pub use quality::{QualityBreakdown, QualityWeights};

use crate::cache::{CacheKey, CacheManager};
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use agent_core::{AgentKind, AgentResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Directional score beyond which a result or the overall view is bullish
/// (or, negated, bearish)
const DIRECTION_THRESHOLD: f64 = 0.3;

/// Consensus required for a buy or sell recommendation
const CONSENSUS_THRESHOLD: f64 = 0.7;

/// Weighted-vote margin below which a conflict is a tie
const TIE_EPSILON: f64 = 1e-9;

const HISTORY_NAMESPACE: &str = "history";

/// Overall market direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

impl Sentiment {
    /// Classify a directional score in [-1, 1]
    pub fn from_score(score: f64) -> Self {
        if score > DIRECTION_THRESHOLD {
            Self::Bullish
        } else if score < -DIRECTION_THRESHOLD {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Neutral => "NEUTRAL",
        })
    }
}

/// Synthesized risk grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        })
    }
}

/// Recommended action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Hold,
    Sell,
    Monitor,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
            Self::Monitor => "MONITOR",
        })
    }
}

/// Vote weight of each agent when directional results conflict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecializationWeights {
    pub technical: f64,
    pub fundamental: f64,
    pub sentiment: f64,
    pub risk: f64,
}

impl Default for SpecializationWeights {
    fn default() -> Self {
        Self {
            technical: 1.0,
            fundamental: 1.1,
            sentiment: 1.2,
            risk: 0.6,
        }
    }
}

impl SpecializationWeights {
    /// Weight for one agent
    pub fn weight(&self, agent: AgentKind) -> f64 {
        match agent {
            AgentKind::Technical => self.technical,
            AgentKind::Fundamental => self.fundamental,
            AgentKind::Sentiment => self.sentiment,
            AgentKind::Risk => self.risk,
        }
    }
}

/// Consensus view for one ticker, built once per completed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedInsight {
    pub ticker: String,
    pub overall_sentiment: Sentiment,
    pub risk_level: RiskLevel,
    pub action_recommendation: Action,
    /// Confidence-weighted share of results agreeing with the sentiment
    pub agent_consensus: f64,
    /// Scored results, in agent order
    pub contributing_results: Vec<AgentResult>,
    pub conflicts_resolved: usize,
    pub synthesis_summary: String,
    /// Set when fewer agents contributed than were requested
    pub degraded_quality: bool,
    pub average_quality: f64,
    pub generated_at: DateTime<Utc>,
}

impl SynthesizedInsight {
    /// Agents that contributed, in agent order
    pub fn contributors(&self) -> Vec<AgentKind> {
        self.contributing_results.iter().map(|r| r.agent).collect()
    }
}

/// The last two distinct results an agent produced for a ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
struct History {
    latest: AgentResult,
    previous: Option<AgentResult>,
}

impl History {
    /// Insight to measure novelty against
    ///
    /// A result re-served from the cache is the stored `latest`; it is
    /// compared with the output before it instead of with itself.
    fn baseline_for(&self, result: &AgentResult) -> Option<&str> {
        if same_output(&self.latest, result) {
            self.previous.as_ref().map(|r| r.insight.as_str())
        } else {
            Some(self.latest.insight.as_str())
        }
    }

    fn record(self, result: &AgentResult) -> Self {
        if same_output(&self.latest, result) {
            self
        } else {
            Self {
                latest: result.clone(),
                previous: Some(self.latest),
            }
        }
    }
}

fn same_output(a: &AgentResult, b: &AgentResult) -> bool {
    a.produced_at == b.produced_at && a.insight == b.insight
}

/// Scores agent results and merges them into one recommendation
pub struct QualitySynthesizer {
    cache: Arc<CacheManager>,
    weights: QualityWeights,
    specialization: SpecializationWeights,
    min_conflict_confidence: f64,
    history_ttl: Duration,
}

impl QualitySynthesizer {
    /// Create a synthesizer keeping insight history in `cache`
    pub fn new(cache: Arc<CacheManager>, config: &OrchestratorConfig) -> Self {
        Self {
            cache,
            weights: QualityWeights::default(),
            specialization: SpecializationWeights::default(),
            min_conflict_confidence: config.min_conflict_confidence,
            history_ttl: config.history_ttl,
        }
    }

    /// Use custom quality weights
    pub fn with_weights(mut self, weights: QualityWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Use custom specialization weights
    pub fn with_specialization(mut self, specialization: SpecializationWeights) -> Self {
        self.specialization = specialization;
        self
    }

    /// Score `results` and synthesize them
    ///
    /// `requested` is the agent set of the request; fewer results than
    /// requested agents marks the insight as degraded. An empty result set
    /// is [`OrchestratorError::InsufficientResults`].
    pub async fn synthesize(
        &self,
        ticker: &str,
        requested: &[AgentKind],
        results: Vec<AgentResult>,
    ) -> Result<SynthesizedInsight> {
        if results.is_empty() {
            return Err(OrchestratorError::InsufficientResults {
                ticker: ticker.to_string(),
                requested: requested.len(),
            });
        }

        let mut scored = Vec::with_capacity(results.len());
        for result in results {
            let baseline = self.remember(ticker, &result).await;
            let breakdown = QualityBreakdown::assess(ticker, &result, baseline.as_deref());
            let quality = breakdown.score(&self.weights);
            debug!(agent = %result.agent, ticker, quality, ?breakdown, "scored result");

            scored.push(result.with_quality_score(quality));
        }

        self.combine(ticker, requested, scored)
    }

    /// Merge scored results into one insight
    ///
    /// Deterministic in the results' confidences, quality scores and text.
    pub fn combine(
        &self,
        ticker: &str,
        requested: &[AgentKind],
        mut results: Vec<AgentResult>,
    ) -> Result<SynthesizedInsight> {
        if results.is_empty() {
            return Err(OrchestratorError::InsufficientResults {
                ticker: ticker.to_string(),
                requested: requested.len(),
            });
        }
        results.sort_by_key(|r| r.agent);

        let scores: Vec<f64> = results
            .iter()
            .map(|r| lexicon::signal(&r.insight).score())
            .collect();

        // Confidence-weighted mean over the sentiment-bearing agents
        let (weighted, weight) = results
            .iter()
            .zip(&scores)
            .filter(|(r, _)| r.agent.is_sentiment_bearing())
            .fold((0.0, 0.0), |(sum, total), (r, score)| {
                (sum + r.confidence * score, total + r.confidence)
            });
        let base_score = if weight > 0.0 { weighted / weight } else { 0.0 };
        let mut sentiment = Sentiment::from_score(base_score);

        // Directional disagreement between confident agents
        let classes: Vec<Sentiment> = scores.iter().map(|s| Sentiment::from_score(*s)).collect();
        let confident = |i: usize| results[i].confidence >= self.min_conflict_confidence;
        let bulls: Vec<usize> = (0..results.len())
            .filter(|&i| classes[i] == Sentiment::Bullish && confident(i))
            .collect();
        let bears: Vec<usize> = (0..results.len())
            .filter(|&i| classes[i] == Sentiment::Bearish && confident(i))
            .collect();

        let conflicts_resolved = bulls.len() * bears.len();
        if conflicts_resolved > 0 {
            let vote = |side: &[usize]| -> f64 {
                side.iter()
                    .map(|&i| {
                        let r = &results[i];
                        r.confidence * r.quality_score * self.specialization.weight(r.agent)
                    })
                    .sum()
            };
            let (bull_vote, bear_vote) = (vote(&bulls), vote(&bears));
            sentiment = if (bull_vote - bear_vote).abs() <= TIE_EPSILON {
                Sentiment::Neutral
            } else if bull_vote > bear_vote {
                Sentiment::Bullish
            } else {
                Sentiment::Bearish
            };
            debug!(ticker, bull_vote, bear_vote, %sentiment, "resolved directional conflict");
        }

        let flagged = results
            .iter()
            .filter(|r| lexicon::is_high_risk(&r.insight))
            .count();
        let risk_level = if flagged * 3 > results.len() {
            RiskLevel::High
        } else if flagged > 0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let total_confidence: f64 = results.iter().map(|r| r.confidence).sum();
        let agreeing: f64 = results
            .iter()
            .zip(&classes)
            .filter(|(_, class)| **class == sentiment)
            .map(|(r, _)| r.confidence)
            .sum();
        let agent_consensus = if total_confidence > 0.0 {
            agreeing / total_confidence
        } else {
            0.0
        };

        let action_recommendation = recommend(sentiment, risk_level, agent_consensus);
        let average_quality =
            results.iter().map(|r| r.quality_score).sum::<f64>() / results.len() as f64;
        let degraded_quality = results.len() < requested.len();

        let mut synthesis_summary = format!(
            "{ticker}: {sentiment} sentiment, {risk_level} risk, recommendation {action_recommendation} \
             (consensus {:.0}% across {} of {} agents",
            agent_consensus * 100.0,
            results.len(),
            requested.len()
        );
        if conflicts_resolved > 0 {
            synthesis_summary.push_str(&format!(", {conflicts_resolved} conflicts resolved"));
        }
        synthesis_summary.push(')');
        if degraded_quality {
            let missing: Vec<&str> = requested
                .iter()
                .filter(|kind| !results.iter().any(|r| r.agent == **kind))
                .map(|kind| kind.as_str())
                .collect();
            synthesis_summary.push_str(&format!("; degraded, missing {}", missing.join(", ")));
        }

        Ok(SynthesizedInsight {
            ticker: ticker.to_string(),
            overall_sentiment: sentiment,
            risk_level,
            action_recommendation,
            agent_consensus,
            contributing_results: results,
            conflicts_resolved,
            synthesis_summary,
            degraded_quality,
            average_quality,
            generated_at: Utc::now(),
        })
    }

    /// Record `result` in its agent's history and return the novelty
    /// baseline it is scored against
    ///
    /// Read and write happen under one cache lock, so concurrent requests
    /// for the same ticker never drop each other's history.
    async fn remember(&self, ticker: &str, result: &AgentResult) -> Option<String> {
        let mut baseline = None;
        self.cache
            .update(history_key(ticker, result.agent), self.history_ttl, |prior| {
                let history: Option<History> =
                    prior.and_then(|value| serde_json::from_value(value).ok());
                baseline = history
                    .as_ref()
                    .and_then(|h| h.baseline_for(result))
                    .map(str::to_string);
                let updated = match history {
                    Some(history) => history.record(result),
                    None => History {
                        latest: result.clone(),
                        previous: None,
                    },
                };
                match serde_json::to_value(&updated) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        debug!(agent = %result.agent, error = %e, "could not record history");
                        None
                    },
                }
            })
            .await;
        baseline
    }
}

fn history_key(ticker: &str, agent: AgentKind) -> CacheKey {
    CacheKey::new(ticker, HISTORY_NAMESPACE, agent)
}

/// Action table applied after sentiment, risk and conflict resolution
pub fn recommend(sentiment: Sentiment, risk: RiskLevel, consensus: f64) -> Action {
    let strong = consensus >= CONSENSUS_THRESHOLD;
    match (sentiment, risk) {
        (Sentiment::Bullish, RiskLevel::Low | RiskLevel::Medium) if strong => Action::Buy,
        (Sentiment::Bearish, _) if strong => Action::Sell,
        (_, RiskLevel::High) if !strong => Action::Monitor,
        _ => Action::Hold,
    }
}

impl fmt::Debug for QualitySynthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualitySynthesizer")
            .field("weights", &self.weights)
            .field("specialization", &self.specialization)
            .field("min_conflict_confidence", &self.min_conflict_confidence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthesizer() -> QualitySynthesizer {
        QualitySynthesizer::new(
            Arc::new(CacheManager::new(64)),
            &OrchestratorConfig::default(),
        )
    }

    fn scored(agent: AgentKind, text: &str, confidence: f64, quality: f64) -> AgentResult {
        AgentResult::new(agent, "AAPL", text, confidence, true).with_quality_score(quality)
    }

    #[test]
    fn test_action_table() {
        use Action::*;
        use RiskLevel::*;
        use Sentiment::*;

        assert_eq!(recommend(Bullish, Low, 0.7), Buy);
        assert_eq!(recommend(Bullish, Medium, 0.9), Buy);
        assert_eq!(recommend(Bullish, High, 0.9), Hold);
        assert_eq!(recommend(Bearish, High, 0.8), Sell);
        assert_eq!(recommend(Bullish, High, 0.5), Monitor);
        assert_eq!(recommend(Neutral, High, 0.2), Monitor);
        assert_eq!(recommend(Bullish, Low, 0.69), Hold);
        assert_eq!(recommend(Neutral, Low, 1.0), Hold);
    }

    #[test]
    fn test_unanimous_bullish_buys() {
        let insight = synthesizer()
            .combine(
                "AAPL",
                &[AgentKind::Technical, AgentKind::Fundamental],
                vec![
                    scored(AgentKind::Fundamental, "AAPL growth is robust, buy", 0.8, 0.9),
                    scored(AgentKind::Technical, "AAPL uptrend with strong momentum", 0.7, 0.9),
                ],
            )
            .unwrap();

        assert_eq!(insight.overall_sentiment, Sentiment::Bullish);
        assert_eq!(insight.risk_level, RiskLevel::Low);
        assert_eq!(insight.action_recommendation, Action::Buy);
        assert_eq!(insight.agent_consensus, 1.0);
        assert_eq!(insight.conflicts_resolved, 0);
        assert!(!insight.degraded_quality);
        assert_eq!(
            insight.contributors(),
            vec![AgentKind::Technical, AgentKind::Fundamental]
        );
    }

    #[test]
    fn test_conflict_resolved_by_weighted_vote() {
        let results = vec![
            scored(AgentKind::Technical, "AAPL bullish breakout", 0.9, 0.5),
            scored(AgentKind::Sentiment, "AAPL mood is bearish", 0.6, 0.9),
        ];
        let insight = synthesizer()
            .combine("AAPL", &[AgentKind::Technical, AgentKind::Sentiment], results)
            .unwrap();

        // technical 0.9 * 0.5 * 1.0 = 0.45, sentiment 0.6 * 0.9 * 1.2 = 0.648
        assert_eq!(insight.conflicts_resolved, 1);
        assert_eq!(insight.overall_sentiment, Sentiment::Bearish);
        assert!((insight.agent_consensus - 0.4).abs() < 1e-12);
        assert_eq!(insight.action_recommendation, Action::Hold);
    }

    #[test]
    fn test_low_confidence_disagreement_is_not_a_conflict() {
        let results = vec![
            scored(AgentKind::Technical, "AAPL bullish breakout", 0.9, 0.5),
            scored(AgentKind::Sentiment, "AAPL mood is bearish", 0.3, 0.9),
        ];
        let insight = synthesizer()
            .combine("AAPL", &[AgentKind::Technical, AgentKind::Sentiment], results)
            .unwrap();
        assert_eq!(insight.conflicts_resolved, 0);
        // (0.9 * 1 + 0.3 * -1) / 1.2 = 0.5
        assert_eq!(insight.overall_sentiment, Sentiment::Bullish);
    }

    #[test]
    fn test_tied_vote_is_neutral() {
        let results = vec![
            scored(AgentKind::Technical, "bullish", 0.6, 1.0),
            scored(AgentKind::Fundamental, "bearish", 0.6, 1.0),
        ];
        let synth = synthesizer().with_specialization(SpecializationWeights {
            technical: 1.0,
            fundamental: 1.0,
            sentiment: 1.0,
            risk: 1.0,
        });
        let insight = synth
            .combine("AAPL", &[AgentKind::Technical, AgentKind::Fundamental], results)
            .unwrap();
        assert_eq!(insight.overall_sentiment, Sentiment::Neutral);
        assert_eq!(insight.agent_consensus, 0.0);
        assert_eq!(insight.action_recommendation, Action::Hold);
    }

    #[test]
    fn test_risk_grading() {
        let requested = AgentKind::ALL;
        let flagged = |n: usize| -> Vec<AgentResult> {
            AgentKind::ALL
                .iter()
                .enumerate()
                .map(|(i, kind)| {
                    let text = if i < n { "elevated volatility ahead" } else { "steady" };
                    scored(*kind, text, 0.5, 0.5)
                })
                .collect()
        };

        let synth = synthesizer();
        let level = |n| synth.combine("AAPL", &requested, flagged(n)).unwrap().risk_level;
        assert_eq!(level(0), RiskLevel::Low);
        assert_eq!(level(1), RiskLevel::Medium);
        assert_eq!(level(2), RiskLevel::High);

        // Unanimously neutral, so high risk alone does not force monitoring
        let insight = synth.combine("AAPL", &requested, flagged(2)).unwrap();
        assert_eq!(insight.agent_consensus, 1.0);
        assert_eq!(insight.action_recommendation, Action::Hold);
    }

    #[test]
    fn test_risk_agent_does_not_move_base_sentiment() {
        let results = vec![
            scored(AgentKind::Sentiment, "AAPL neutral mood", 0.9, 0.5),
            scored(AgentKind::Risk, "bearish downside", 0.4, 0.5),
        ];
        let insight = synthesizer()
            .combine("AAPL", &[AgentKind::Sentiment, AgentKind::Risk], results)
            .unwrap();
        assert_eq!(insight.overall_sentiment, Sentiment::Neutral);
    }

    #[test]
    fn test_empty_results_are_insufficient() {
        let err = synthesizer()
            .combine("AAPL", &AgentKind::ALL, Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InsufficientResults { requested: 4, .. }
        ));
    }

    #[tokio::test]
    async fn test_degraded_when_agents_missing() {
        let insight = synthesizer()
            .synthesize(
                "AAPL",
                &AgentKind::ALL,
                vec![AgentResult::new(AgentKind::Sentiment, "AAPL", "AAPL is fine", 0.5, false)],
            )
            .await
            .unwrap();
        assert!(insight.degraded_quality);
        assert!(insight.synthesis_summary.contains("missing technical, fundamental, risk"));
        assert!(insight.contributing_results[0].quality_score > 0.0);
    }

    #[tokio::test]
    async fn test_novelty_uses_previous_distinct_output() {
        let synth = synthesizer();
        let first = AgentResult::new(AgentKind::Technical, "AAPL", "AAPL uptrend buy", 0.8, true);
        let second =
            AgentResult::new(AgentKind::Technical, "AAPL", "AAPL weak sell now", 0.8, true);

        let q1 = synth
            .synthesize("AAPL", &[AgentKind::Technical], vec![first.clone()])
            .await
            .unwrap()
            .average_quality;
        let q2 = synth
            .synthesize("AAPL", &[AgentKind::Technical], vec![second.clone()])
            .await
            .unwrap()
            .average_quality;
        // Re-serving the second result compares it against the first again
        let q3 = synth
            .synthesize("AAPL", &[AgentKind::Technical], vec![second])
            .await
            .unwrap()
            .average_quality;
        let q4 = synth
            .synthesize("AAPL", &[AgentKind::Technical], vec![first])
            .await
            .unwrap()
            .average_quality;

        assert_eq!(q1, 1.0);
        assert!(q2 < 1.0);
        assert_eq!(q2, q3);
        assert!(q4 < q1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_requests_keep_both_histories() {
        let cache = Arc::new(CacheManager::new(64));
        let synth = Arc::new(QualitySynthesizer::new(
            Arc::clone(&cache),
            &OrchestratorConfig::default(),
        ));

        let mut tasks = tokio::task::JoinSet::new();
        for text in ["AAPL uptrend buy", "AAPL weak sell now"] {
            let synth = Arc::clone(&synth);
            tasks.spawn(async move {
                let result = AgentResult::new(AgentKind::Technical, "AAPL", text, 0.8, true);
                synth
                    .synthesize("AAPL", &[AgentKind::Technical], vec![result])
                    .await
                    .unwrap()
                    .average_quality
            });
        }
        let mut qualities = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            qualities.push(joined.unwrap());
        }

        // Exactly one request saw the other's output as its baseline
        assert_eq!(qualities.iter().filter(|q| **q == 1.0).count(), 1);

        let value = cache
            .get(&history_key("AAPL", AgentKind::Technical))
            .await
            .unwrap();
        let history: History = serde_json::from_value(value).unwrap();
        let mut texts = vec![
            history.latest.insight,
            history.previous.unwrap().insight,
        ];
        texts.sort();
        assert_eq!(texts, vec!["AAPL uptrend buy", "AAPL weak sell now"]);
    }
}
