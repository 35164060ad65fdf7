//! Command-line front end for the analysis engine

use agent_core::{AgentStatus, AnalysisRequest, AnalysisType, PortfolioPosition};
use agent_llm::providers::AnthropicProvider;
use agent_orchestrator::{
    AgentCoordinator, AnalysisResponse, HealthReport, JsonlInsightStore, NotificationPolicy,
    Notifier, OrchestratorConfig, TracingNotifier, YahooFinanceProvider,
};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Table, presets::UTF8_FULL};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "agent-cli")]
#[command(about = "Multi-agent stock analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse one ticker
    Analyze {
        /// Stock symbol, e.g. AAPL
        ticker: String,
        /// Analysis depth
        #[arg(long = "type", value_enum, default_value_t = Depth::Comprehensive)]
        depth: Depth,
        /// Shares held, for position-aware prompts
        #[arg(long, requires = "cost_basis")]
        shares: Option<f64>,
        /// Average cost per share
        #[arg(long, requires = "shares")]
        cost_basis: Option<f64>,
        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Analyse each ticker in turn, then print engine health
    Health {
        /// Tickers to warm the monitor with
        tickers: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Depth {
    Quick,
    Comprehensive,
    Deep,
}

impl From<Depth> for AnalysisType {
    fn from(depth: Depth) -> Self {
        match depth {
            Depth::Quick => Self::Quick,
            Depth::Comprehensive => Self::Comprehensive,
            Depth::Deep => Self::Deep,
        }
    }
}

fn build_coordinator() -> anyhow::Result<AgentCoordinator> {
    let config = OrchestratorConfig::default()
        .with_env()
        .context("invalid engine configuration")?;
    let llm = AnthropicProvider::from_env().context("completion provider unavailable")?;
    let market_data = YahooFinanceProvider::new(config.market_data_rate_limit)
        .context("market data provider unavailable")?;

    let insight_log = config.insight_log.clone();
    let coordinator = AgentCoordinator::assemble(config, Arc::new(llm), Arc::new(market_data));
    Ok(match insight_log {
        Some(path) => {
            info!(path = %path.display(), "persisting insights");
            coordinator.with_store(Arc::new(JsonlInsightStore::new(path)))
        },
        None => coordinator,
    })
}

fn response_table(response: &AnalysisResponse) -> Table {
    let insight = &response.insight;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Agent", "Status", "Latency", "Cache", "Confidence", "Insight"]);

    for status in &response.agent_statuses {
        let result = insight
            .contributing_results
            .iter()
            .find(|r| r.agent == status.agent);
        table.add_row(vec![
            status.agent.to_string(),
            status_label(status.status).to_string(),
            format!("{:.2}s", status.latency.as_secs_f64()),
            if status.cache_hit { "hit" } else { "miss" }.to_string(),
            result.map_or_else(|| "-".to_string(), |r| format!("{:.2}", r.confidence)),
            result.map_or_else(
                || status.error.clone().unwrap_or_default(),
                |r| r.insight.clone(),
            ),
        ]);
    }
    table
}

fn status_label(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Pending => "pending",
        AgentStatus::Running => "running",
        AgentStatus::Done => "done",
        AgentStatus::Failed => "failed",
        AgentStatus::TimedOut => "timed out",
    }
}

fn print_response(response: &AnalysisResponse) {
    let insight = &response.insight;
    println!("{}", response_table(response));
    println!(
        "{} | sentiment {} | risk {} | action {} | consensus {:.0}%",
        insight.ticker,
        insight.overall_sentiment,
        insight.risk_level,
        insight.action_recommendation,
        insight.agent_consensus * 100.0
    );
    println!("{}", insight.synthesis_summary);
    for warning in &response.warnings {
        println!("warning: {} {:?}: {}", warning.agent, warning.kind, warning.message);
    }
    let metrics = &response.performance_metrics;
    println!(
        "took {:.2}s, cache hit rate {:.0}%, parallel efficiency {:.2}, success rate {:.0}%",
        response.execution_time.as_secs_f64(),
        metrics.cache_hit_rate * 100.0,
        metrics.parallel_efficiency,
        metrics.success_rate * 100.0
    );
}

fn health_table(report: &HealthReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Agent", "Tasks", "Success", "Timeouts", "p50", "p95"]);
    for (agent, stats) in &report.agents {
        table.add_row(vec![
            agent.to_string(),
            stats.requests.to_string(),
            format!("{:.0}%", stats.success_rate * 100.0),
            stats.timeouts.to_string(),
            format!("{:.2}s", stats.p50_latency.as_secs_f64()),
            format!("{:.2}s", stats.p95_latency.as_secs_f64()),
        ]);
    }
    table
}

fn print_health(report: &HealthReport) {
    println!("{}", health_table(report));
    for (service, state) in &report.breakers {
        println!("breaker {service}: {state}");
    }
    let cache = report
        .cache_hit_rate
        .map_or_else(|| "n/a".to_string(), |r| format!("{:.0}%", r * 100.0));
    println!(
        "overall {} | {} of {} requests succeeded | cache hit rate {cache}",
        report.overall_health, report.requests_succeeded, report.requests_completed
    );
}

async fn analyze(
    coordinator: &AgentCoordinator,
    request: AnalysisRequest,
    json: bool,
) -> anyhow::Result<()> {
    let response = coordinator.analyze(request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    if let Some(reason) = NotificationPolicy::default().should_notify(&response.insight) {
        if let Err(e) = TracingNotifier.notify(&response.insight, reason).await {
            warn!(error = %e, "notification failed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = agent_utils::Config::from_env()?;
    agent_utils::init_tracing_with(settings.log_format);

    let cli = Cli::parse();
    info!(app = %settings.app_name, environment = %settings.environment, "starting");
    let coordinator = build_coordinator()?;

    match cli.command {
        Commands::Analyze {
            ticker,
            depth,
            shares,
            cost_basis,
            json,
        } => {
            let mut request = AnalysisRequest::new(ticker, depth.into());
            if let (Some(shares), Some(cost_basis)) = (shares, cost_basis) {
                request = request.with_position(PortfolioPosition::new(shares, cost_basis));
            }
            analyze(&coordinator, request, json).await?;
        },
        Commands::Health { tickers } => {
            for ticker in tickers {
                let request = AnalysisRequest::new(ticker.clone(), AnalysisType::Quick);
                if let Err(e) = coordinator.analyze(request).await {
                    warn!(%ticker, error = %e, "analysis failed");
                }
            }
            coordinator.monitor().flush().await;
            print_health(&coordinator.monitor().snapshot());
        },
    }

    coordinator.flush().await;
    Ok(())
}
