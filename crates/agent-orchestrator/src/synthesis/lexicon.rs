//! Lexical markers used to read direction, risk and actionability from
//! free-text insights

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Words within this many tokens after a negation are flipped
const NEGATION_WINDOW: usize = 3;

const BULLISH_WORDS: &[&str] = &[
    "bullish", "rally", "surge", "gain", "gains", "growth", "beat", "upgrade", "upgraded",
    "outperform", "strong", "strength", "positive", "rise", "rising", "uptrend", "breakout",
    "momentum", "buy", "accumulate", "optimistic", "upside", "recovery", "rebound", "expansion",
    "robust", "accelerating", "overweight", "undervalued", "tailwind", "oversold",
];

const BEARISH_WORDS: &[&str] = &[
    "bearish", "decline", "declining", "loss", "losses", "fall", "falling", "plunge", "crash",
    "miss", "downgrade", "downgraded", "underperform", "weak", "weakness", "negative", "drop",
    "downtrend", "breakdown", "sell", "pessimistic", "slump", "headwind", "downside",
    "overvalued", "bubble", "underweight", "overbought", "deteriorating", "reduce",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "without", "isn't", "aren't", "hardly"];

const ACTION_WORDS: &[&str] = &[
    "buy", "sell", "hold", "reduce", "trim", "accumulate", "add", "exit", "hedge", "avoid",
];

const DOMAIN_WORDS: &[&str] = &[
    "earnings", "revenue", "margin", "margins", "valuation", "sector", "guidance", "rsi",
    "average", "support", "resistance", "volume", "volatility", "drawdown", "sentiment",
    "analysts", "price", "shares", "stock", "dividend", "cash", "debt",
];

static HIGH_RISK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(high|elevated|extreme|significant|substantial|severe|heightened)\s+(risk|volatility|downside|uncertainty)\b|\b(highly|very|extremely)\s+volatile\b|\brisk\s+is\s+(high|elevated)\b|\b(bankruptcy|insolvency|default|delisting)\b|\bliquidity\s+crisis\b",
    )
    .ok()
});

/// Bullish and bearish hits found in one text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexicalSignal {
    /// Bullish markers (after negation)
    pub bullish: usize,
    /// Bearish markers (after negation)
    pub bearish: usize,
}

impl LexicalSignal {
    /// Net direction in [-1, 1], zero when nothing directional was found
    pub fn score(&self) -> f64 {
        let total = self.bullish + self.bearish;
        if total == 0 {
            return 0.0;
        }
        (self.bullish as f64 - self.bearish as f64) / total as f64
    }

    /// Whether any directional marker was found
    pub fn is_directional(&self) -> bool {
        self.bullish + self.bearish > 0
    }
}

/// Lower-cased word tokens of `text`
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Count directional markers, flipping those shortly after a negation
pub fn signal(text: &str) -> LexicalSignal {
    let words = tokens(text);
    let mut signal = LexicalSignal::default();
    let mut last_negation: Option<usize> = None;

    for (i, word) in words.iter().enumerate() {
        let word = word.as_str();
        if NEGATIONS.contains(&word) {
            last_negation = Some(i);
            continue;
        }
        let bullish = BULLISH_WORDS.contains(&word);
        let bearish = BEARISH_WORDS.contains(&word);
        if !bullish && !bearish {
            continue;
        }
        let negated = last_negation.is_some_and(|n| i - n <= NEGATION_WINDOW);
        if bullish != negated {
            signal.bullish += 1;
        } else {
            signal.bearish += 1;
        }
    }
    signal
}

/// Whether the text names a concrete action
pub fn mentions_action(text: &str) -> bool {
    tokens(text).iter().any(|w| ACTION_WORDS.contains(&w.as_str()))
}

/// Whether the text uses market vocabulary
pub fn mentions_domain(text: &str) -> bool {
    tokens(text).iter().any(|w| DOMAIN_WORDS.contains(&w.as_str()))
}

/// Whether the text names `symbol` as a standalone word, ignoring case
///
/// Symbols may contain '.' or '-' (`BRK.B`), so this matches on
/// alphanumeric boundaries rather than on [`tokens`].
pub fn mentions_symbol(text: &str, symbol: &str) -> bool {
    if symbol.is_empty() {
        return false;
    }
    let pattern = format!(
        r"(?i)(?:^|[^[:alnum:]]){}(?:$|[^[:alnum:]])",
        regex::escape(symbol)
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(text))
}

/// Whether the text flags high risk
pub fn is_high_risk(text: &str) -> bool {
    HIGH_RISK.as_ref().is_some_and(|re| re.is_match(text))
}

/// Jaccard similarity of the word sets of two texts
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<String> = tokens(a).into_iter().collect();
    let b: HashSet<String> = tokens(b).into_iter().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}
