//! User message templates for the analysis agents

/// Technical analysis request
pub const TECHNICAL_USER: &str = r"Analyze the technical picture for {{ ticker }} ({{ depth }} analysis).

Last close: {{ snapshot.last_close | fixed }}
{% if snapshot.rsi_14 is not none %}RSI(14): {{ snapshot.rsi_14 | fixed }} ({{ rsi_band }})
{% endif %}{% if snapshot.sma_20 is not none %}SMA(20): {{ snapshot.sma_20 | fixed }}
{% endif %}{% if snapshot.sma_50 is not none %}SMA(50): {{ snapshot.sma_50 | fixed }}
{% endif %}Trend: {{ trend }}
{% if snapshot.momentum_20 is not none %}20-day momentum: {{ snapshot.momentum_20 | pct }}
{% endif %}{{ position_note }}";

/// Fundamental analysis request
pub const FUNDAMENTAL_USER: &str = r"Analyze the fundamentals of {{ ticker }} ({{ depth }} analysis).
{% if stats %}
Last close: {{ stats.last_close | fixed }}
Range over {{ stats.sessions }} sessions: {{ stats.low | fixed }} - {{ stats.high | fixed }}
Average daily volume: {{ stats.average_volume }}
{% else %}
No recent market statistics are available.
{% endif %}{{ position_note }}";

/// Sentiment analysis request
pub const SENTIMENT_USER: &str = r"Assess current market sentiment toward {{ ticker }} ({{ depth }} analysis).
{{ position_note }}";

/// Risk assessment request
pub const RISK_USER: &str = r"Assess the risk of holding {{ ticker }} ({{ depth }} analysis).
{% if snapshot %}
Last close: {{ snapshot.last_close | fixed }}
{% if snapshot.annualized_volatility is not none %}Annualized volatility: {{ snapshot.annualized_volatility | pct }}
{% endif %}Maximum drawdown: {{ snapshot.max_drawdown | pct }}
{% endif %}{% if findings %}
Findings from other analysts:
{% for finding in findings %}- {{ finding.agent }} (confidence {{ finding.confidence | fixed }}): {{ finding.insight }}
{% endfor %}{% endif %}{{ position_note }}";
