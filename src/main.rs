use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod aggregate;
mod db;
mod forecast;
mod models;
mod probability;
mod report;
mod risk;
mod server;
mod watchlist;

use aggregate::TargetBook;
use models::{TargetConfig, TargetPair};
use probability::ProbabilityModel;

#[derive(Parser)]
#[command(name = "quality-early-warning")]
#[command(about = "Quality trend early warning for call-center QC evaluations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a realistic sample month
    Seed,
    /// Import evaluations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Forecast month-end quality and risk per dimension
    #[command(group(
        ArgGroup::new("scope")
            .args(["center", "agent"])
            .multiple(false)
    ))]
    Predict {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        center: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        /// Rank agents instead of group dimensions
        #[arg(long, default_value_t = false)]
        agents: bool,
        /// Probability formula: statistical | trend
        #[arg(long, default_value = "statistical")]
        strategy: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// JSON file overriding the per-center default targets
        #[arg(long)]
        targets: Option<PathBuf>,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("scope")
            .args(["center", "agent"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        center: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value = "statistical")]
        strategy: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        #[arg(long)]
        targets: Option<PathBuf>,
    },
    /// Serve the prediction API over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
        #[arg(long)]
        targets: Option<PathBuf>,
    },
}

fn load_target_config(path: Option<&Path>) -> anyhow::Result<TargetConfig> {
    let mut config = TargetConfig::default();
    if let Some(path) = path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read target overrides from {}", path.display()))?;
        let overrides: HashMap<String, TargetPair> =
            serde_json::from_str(&raw).context("target override file must map centers to rates")?;
        config.apply_overrides(overrides);
    }
    Ok(config)
}

fn parse_strategy(value: &str) -> anyhow::Result<ProbabilityModel> {
    ProbabilityModel::parse(value)
        .with_context(|| format!("unknown strategy '{value}', expected 'statistical' or 'trend'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the quality warehouse Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} evaluations from {}.", csv.display());
        }
        Commands::Predict {
            month,
            center,
            agent,
            agents,
            strategy,
            limit,
            targets,
        } => {
            let model = parse_strategy(&strategy)?;
            let config = load_target_config(targets.as_deref())?;
            let today = Utc::now().date_naive();
            let window = forecast::resolve_window(month.as_deref(), today)
                .context("could not derive a calendar month window")?;

            let target_rows = db::fetch_targets(&pool).await;
            let book = TargetBook::new(target_rows, &config);

            if agents || agent.is_some() {
                let rows = db::fetch_agent_day_rows(
                    &pool,
                    &window,
                    center.as_deref(),
                    agent.as_deref(),
                )
                .await;
                let top_errors = db::fetch_agent_top_errors(&pool, &window).await;
                let predictions =
                    aggregate::build_agent_predictions(&rows, &top_errors, &book, &window, model);

                if predictions.is_empty() {
                    println!("No evaluations found for {}.", window.label());
                    return Ok(());
                }

                println!(
                    "Top agents by risk for {} ({} model):",
                    window.label(),
                    model.label()
                );
                for prediction in predictions.iter().take(limit) {
                    println!(
                        "- {} ({}, {} {}) total {:.2}% risk {} across {} evaluations",
                        prediction.agent_name,
                        prediction.agent_id,
                        prediction.center,
                        prediction.group,
                        prediction.total_rate,
                        prediction.risk_level.label(),
                        prediction.evaluation_count
                    );
                    for reason in &prediction.watch_reasons {
                        println!("    {reason}");
                    }
                }
            } else {
                let rows =
                    db::fetch_group_day_rows(&pool, &window, center.as_deref()).await;
                let predictions = aggregate::build_group_predictions(&rows, &book, &window, model);

                if predictions.is_empty() {
                    println!("No evaluations found for {}.", window.label());
                    return Ok(());
                }

                let summary = aggregate::summarize_groups(&predictions);
                println!(
                    "Dimensions at risk for {} ({} model): {} of {}",
                    window.label(),
                    model.label(),
                    summary.at_risk_groups,
                    summary.total_groups
                );
                for prediction in predictions.iter().take(limit) {
                    let total = &prediction.total_prediction;
                    println!(
                        "- {}/{}/{} now {:.2}% -> {:.2}% (target {:.2}%, {}%) risk {} across {} evaluations",
                        prediction.center,
                        prediction.service,
                        prediction.channel,
                        total.current_rate,
                        total.predicted_rate,
                        total.target_rate,
                        total.achievement_probability,
                        prediction.overall_risk.label(),
                        prediction.evaluation_count
                    );
                    for reason in &prediction.watch_reasons {
                        println!("    {reason}");
                    }
                }
            }
        }
        Commands::Report {
            month,
            center,
            agent,
            strategy,
            out,
            targets,
        } => {
            let model = parse_strategy(&strategy)?;
            let config = load_target_config(targets.as_deref())?;
            let today = Utc::now().date_naive();
            let window = forecast::resolve_window(month.as_deref(), today)
                .context("could not derive a calendar month window")?;

            let target_rows = db::fetch_targets(&pool).await;
            let book = TargetBook::new(target_rows, &config);

            let group_rows =
                db::fetch_group_day_rows(&pool, &window, center.as_deref()).await;
            let groups = aggregate::build_group_predictions(&group_rows, &book, &window, model);

            let agent_rows = db::fetch_agent_day_rows(
                &pool,
                &window,
                center.as_deref(),
                agent.as_deref(),
            )
            .await;
            let top_errors = db::fetch_agent_top_errors(&pool, &window).await;
            let agents =
                aggregate::build_agent_predictions(&agent_rows, &top_errors, &book, &window, model);

            let scope = center.as_deref().or(agent.as_deref());
            let report = report::build_report(scope, &window.label(), &groups, &agents);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Serve { bind, targets } => {
            let config = load_target_config(targets.as_deref())?;
            let state = server::AppState {
                pool,
                targets: config,
            };
            server::serve(bind, state).await?;
        }
    }

    Ok(())
}
