use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use formflow_analytics::{AnalyticsOverview, AnalyticsService, FlowAnalytics};
use formflow_core::{
    AnalyticsStatus, ConfigManager, FormFlowError, FormId, Settings, SubmissionDraft,
};
use formflow_queue::{BufferConfig, BufferStatsSnapshot, IngestionBuffer};
use formflow_storage::SqliteStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "formflow")]
#[command(about = "FormFlow - submission ingestion and path analytics", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (pretty, json)
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// Directory holding default.toml, {env}.toml and local.toml
    #[arg(long, global = true, env = "FORMFLOW_CONFIG_DIR")]
    config: Option<PathBuf>,

    /// Configuration environment
    #[arg(long, global = true)]
    env: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a JSON array of submission drafts through the ingestion buffer
    Ingest {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Compute and print analytics for a form
    Analytics {
        /// Form ID
        form_id: FormId,

        /// Recompute node metrics instead of serving stored ones
        #[arg(long)]
        refresh: bool,

        /// Number of most common paths to show
        #[arg(long, default_value = "5")]
        top_paths: usize,
    },
}

#[derive(Serialize)]
struct IngestReport {
    file: String,
    read: usize,
    accepted: usize,
    rejected: usize,
    stats: BufferStatsSnapshot,
}

#[derive(Serialize)]
struct AnalyticsReport {
    overview: AnalyticsOverview,
    flow: FlowAnalytics,
    status: Option<AnalyticsStatus>,
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Visits")]
    visits: u64,
    #[tabled(rename = "Answered")]
    answered: u64,
    #[tabled(rename = "Skipped")]
    skipped: u64,
    #[tabled(rename = "Drop-offs")]
    drop_offs: u64,
    #[tabled(rename = "Avg time")]
    avg_time: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigManager::new(cli.config.clone(), cli.env.clone())
        .context("Failed to load configuration")?;
    init_tracing(&config.settings().logging.level, cli.verbose);
    info!(
        "Using configuration '{}' from {:?}",
        config.env(),
        config.config_dir()
    );

    match execute_command(&cli, config.settings()).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { level };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn execute_command(cli: &Cli, settings: &Settings) -> Result<()> {
    match &cli.command {
        Commands::Ingest { file } => execute_ingest(cli.output, settings, file).await,
        Commands::Analytics {
            form_id,
            refresh,
            top_paths,
        } => execute_analytics(cli.output, settings, *form_id, *refresh, *top_paths).await,
    }
}

fn open_store(settings: &Settings) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&settings.database.path)
        .with_context(|| format!("Failed to open database at {}", settings.database.path))?;
    Ok(Arc::new(store))
}

async fn execute_ingest(format: OutputFormat, settings: &Settings, file: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let drafts: Vec<SubmissionDraft> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of submissions", file.display()))?;

    let store = open_store(settings)?;
    let buffer = IngestionBuffer::new(store, BufferConfig::from(&settings.ingest))
        .context("Failed to start the ingestion buffer")?;

    let read = drafts.len();
    let mut accepted = 0;
    let mut rejected = 0;
    for (i, draft) in drafts.into_iter().enumerate() {
        match buffer.submit(draft).await {
            Ok(_) => accepted += 1,
            Err(e @ FormFlowError::InvalidSubmission(_)) => {
                warn!("Skipping submission #{}: {}", i + 1, e);
                rejected += 1;
            }
            Err(e) => {
                buffer.close().await;
                return Err(e).context(format!("Failed to ingest submission #{}", i + 1));
            }
        }
    }
    buffer.close().await;

    let report = IngestReport {
        file: file.display().to_string(),
        read,
        accepted,
        rejected,
        stats: buffer.stats(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Pretty => print_ingest(&report),
    }
    Ok(())
}

async fn execute_analytics(
    format: OutputFormat,
    settings: &Settings,
    form_id: FormId,
    refresh: bool,
    top_paths: usize,
) -> Result<()> {
    let store = open_store(settings)?;
    let service = AnalyticsService::new(store.clone(), store);

    let computed = async {
        if refresh {
            service.refresh(form_id).await?;
        }
        let overview = service.overview(form_id, top_paths).await?;
        let flow = service.flow(form_id).await?;
        let status = service.status(form_id).await?;
        Ok::<_, FormFlowError>(AnalyticsReport {
            overview,
            flow,
            status,
        })
    }
    .await;

    let report = match computed {
        Ok(report) => report,
        Err(FormFlowError::NoSubmissions(_)) => {
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "form_id": form_id, "total_submissions": 0 })
                ),
                OutputFormat::Pretty => println!(
                    "{} no submissions recorded for form {}",
                    "Nothing to analyze:".yellow().bold(),
                    form_id
                ),
            }
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to compute analytics"),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Pretty => print_analytics(&report),
    }
    Ok(())
}

fn print_ingest(report: &IngestReport) {
    println!("{} {}", "Ingested".green().bold(), report.file.cyan());
    println!("{}: {}", "read".cyan().bold(), report.read.to_string().yellow());
    println!(
        "{}: {}",
        "accepted".cyan().bold(),
        report.accepted.to_string().green()
    );
    if report.rejected > 0 {
        println!(
            "{}: {}",
            "rejected".cyan().bold(),
            report.rejected.to_string().red()
        );
    }

    let stats = &report.stats;
    println!(
        "{}: {} in {} batches",
        "flushed".cyan().bold(),
        stats.submissions_flushed.to_string().yellow(),
        stats.batches_flushed.to_string().yellow()
    );
    println!(
        "{}: {}",
        "written synchronously".cyan().bold(),
        stats.written_synchronously.to_string().yellow()
    );
    if stats.batches_failed > 0 {
        println!(
            "{}: {} submissions in {} batches",
            "dropped".red().bold(),
            stats.submissions_dropped,
            stats.batches_failed
        );
    }
}

fn print_analytics(report: &AnalyticsReport) {
    let overview = &report.overview;
    println!("{} {}", "Form".cyan().bold(), overview.form_id);
    println!(
        "{}: {}",
        "submissions".cyan().bold(),
        overview.total_submissions.to_string().yellow()
    );
    println!(
        "{}: {}",
        "avg completion time".cyan().bold(),
        format!("{:.1}", overview.avg_completion_time).yellow()
    );
    if let Some(status) = &report.status {
        let state = status.state.to_string();
        let calculated = status
            .calculated_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}: {} (calculated {})",
            "status".cyan().bold(),
            state.green(),
            calculated
        );
    }

    let rows: Vec<NodeRow> = overview
        .node_metrics
        .iter()
        .map(|m| NodeRow {
            node: m.node_id.clone(),
            visits: m.visit_count,
            answered: m.answer_count,
            skipped: m.skip_count,
            drop_offs: m.drop_off_count,
            avg_time: format!("{:.1}", m.avg_time_spent),
        })
        .collect();
    println!("\n{}", "Node metrics".cyan().bold());
    println!("{}", Table::new(rows).with(Style::rounded()));

    if !overview.top_paths.is_empty() {
        println!("\n{}", "Top paths".cyan().bold());
        for path in &overview.top_paths {
            println!(
                "  {} {} ({:.0}%, avg {:.1})",
                path.occurrence_count.to_string().yellow(),
                path.path.join(" → "),
                path.share * 100.0,
                path.avg_completion_time
            );
        }
    }

    println!("\n{}", "Transitions".cyan().bold());
    for t in &report.flow.transitions {
        let target = if t.target.is_drop_off() {
            t.target_label.red()
        } else {
            t.target_label.normal()
        };
        println!(
            "  {} → {}: {}",
            t.source_label,
            target,
            t.value.to_string().yellow()
        );
    }

    println!("\n{}", "Mermaid".cyan().bold());
    println!("```mermaid\n{}```", report.flow.mermaid);
}
