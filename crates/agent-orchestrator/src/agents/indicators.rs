//! Price-series statistics fed into agent prompts

use agent_core::Bar;
use serde::Serialize;
use ta::Next;
use ta::indicators::{RelativeStrengthIndex, SimpleMovingAverage};

/// Trading days per year used to annualise volatility
const TRADING_DAYS: f64 = 252.0;

/// Technical snapshot of a daily series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TechnicalSnapshot {
    /// Most recent close
    pub last_close: f64,
    /// 14-day RSI
    pub rsi_14: Option<f64>,
    /// 20-day simple moving average
    pub sma_20: Option<f64>,
    /// 50-day simple moving average
    pub sma_50: Option<f64>,
    /// 20-day price change as a fraction
    pub momentum_20: Option<f64>,
}

impl TechnicalSnapshot {
    /// Compute from bars ordered oldest first
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        let closes = closes(bars);
        let last_close = *closes.last()?;
        Some(Self {
            last_close,
            rsi_14: rsi(&closes, 14),
            sma_20: sma(&closes, 20),
            sma_50: sma(&closes, 50),
            momentum_20: momentum(&closes, 20),
        })
    }

    /// Plain-language RSI band
    pub fn rsi_band(&self) -> &'static str {
        match self.rsi_14 {
            Some(v) if v >= 70.0 => "overbought",
            Some(v) if v <= 30.0 => "oversold",
            Some(_) => "neutral",
            None => "unavailable",
        }
    }

    /// Relation of the 20-day to the 50-day average
    pub fn trend(&self) -> &'static str {
        match (self.sma_20, self.sma_50) {
            (Some(fast), Some(slow)) if fast > slow => "uptrend",
            (Some(fast), Some(slow)) if fast < slow => "downtrend",
            (Some(_), Some(_)) => "flat",
            _ => "unavailable",
        }
    }
}

/// Risk statistics of a daily series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskSnapshot {
    /// Most recent close
    pub last_close: f64,
    /// Annualised volatility of daily log returns
    pub annualized_volatility: Option<f64>,
    /// Largest peak-to-trough decline as a fraction
    pub max_drawdown: f64,
}

impl RiskSnapshot {
    /// Compute from bars ordered oldest first
    pub fn from_bars(bars: &[Bar]) -> Option<Self> {
        let closes = closes(bars);
        let last_close = *closes.last()?;
        Some(Self {
            last_close,
            annualized_volatility: annualized_volatility(&closes),
            max_drawdown: max_drawdown(&closes),
        })
    }
}

fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .map(|b| b.close)
        .filter(|c| c.is_finite() && *c > 0.0)
        .collect()
}

/// Latest RSI, once `period + 1` closes are available
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() <= period {
        return None;
    }
    let mut indicator = RelativeStrengthIndex::new(period).ok()?;
    closes.iter().map(|&c| indicator.next(c)).last()
}

/// Latest simple moving average, once `period` closes are available
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period {
        return None;
    }
    let mut indicator = SimpleMovingAverage::new(period).ok()?;
    closes.iter().map(|&c| indicator.next(c)).last()
}

/// Fractional change over the last `lookback` sessions
pub fn momentum(closes: &[f64], lookback: usize) -> Option<f64> {
    let last = *closes.last()?;
    let base = *closes.iter().rev().nth(lookback)?;
    Some(last / base - 1.0)
}

/// Annualised standard deviation of daily log returns
pub fn annualized_volatility(closes: &[f64]) -> Option<f64> {
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt() * TRADING_DAYS.sqrt())
}

/// Largest peak-to-trough decline, as a positive fraction
pub fn max_drawdown(closes: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;
    for &close in closes {
        peak = peak.max(close);
        worst = worst.max((peak - close) / peak);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn test_sma_needs_full_window() {
        let closes: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(sma(&closes, 20), Some(10.5));
        assert_eq!(sma(&closes[..19], 20), None);
    }

    #[test]
    fn test_rsi_of_rising_series_is_high() {
        let closes: Vec<f64> = (1..=30).map(f64::from).collect();
        let value = rsi(&closes, 14).unwrap();
        assert!(value > 70.0, "rsi was {value}");
        assert_eq!(rsi(&closes[..14], 14), None);
    }

    #[test]
    fn test_momentum() {
        let closes = [100.0, 90.0, 110.0];
        let m = momentum(&closes, 2).unwrap();
        assert!((m - 0.10).abs() < 1e-12);
        assert_eq!(momentum(&closes, 3), None);
    }

    #[test]
    fn test_max_drawdown() {
        let dd = max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]);
        assert!((dd - 0.25).abs() < 1e-12);
        assert!(max_drawdown(&[1.0, 2.0, 3.0]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_volatility_of_flat_series_is_zero() {
        let vol = annualized_volatility(&[50.0; 10]).unwrap();
        assert!(vol.abs() < 1e-12);
        assert_eq!(annualized_volatility(&[50.0, 51.0]), None);
    }

    #[test]
    fn test_snapshots() {
        let rising: Vec<f64> = (1..=60).map(f64::from).collect();
        let tech = TechnicalSnapshot::from_bars(&bars(&rising)).unwrap();
        assert_eq!(tech.last_close, 60.0);
        assert_eq!(tech.trend(), "uptrend");
        assert_eq!(tech.rsi_band(), "overbought");

        let risk = RiskSnapshot::from_bars(&bars(&rising)).unwrap();
        assert!(risk.max_drawdown.abs() < f64::EPSILON);
        assert!(TechnicalSnapshot::from_bars(&[]).is_none());
    }
}
