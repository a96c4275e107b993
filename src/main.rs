//! # parley CLI
//!
//! Thin command-line front end for the engine, useful for trying a prompt end to
//! end and for checking how much quota is left.
//!
//! - `ask`: run one request against Gemini (and Brave for web search) and print
//!   the delivery chunks
//! - `status`: print per-model capacity and the monthly search budget
//!
//! API keys come from `GEMINI_API_KEY` and `BRAVE_API_KEY`. Counters live in a
//! libSQL file so consecutive invocations share one budget.

mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parley::config::{ConfigHandle, Settings};
use parley::delivery::DeliveryStrategy;
use parley::model::{Attachment, GeminiBackend};
use parley::orchestrator::{GenerationRequest, Orchestrator};
use parley::quota::{ModelSelector, ModelStatus, RateLimitTracker, SearchQuotaGate};
use parley::search::BraveSearch;
use parley::store::LibsqlStore;
use parley::tools::BuiltinTools;
use tracing::instrument;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant in a group chat. Answer clearly and concisely.";

#[derive(Parser)]
#[command(author, version, about = "Quota-aware Gemini chat orchestration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a prompt and print the message chunks
    Ask(AskArgs),

    /// Show model capacity and the search budget
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Settings file (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Counter database path
    #[arg(long, default_value = "parley.db")]
    db: String,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// The user message
    #[arg(required = true)]
    prompt: String,

    /// Disable tool calling (enables the response cache)
    #[arg(long)]
    no_tools: bool,

    /// How to deliver answers longer than the message limit
    #[arg(short, long, value_enum, default_value_t = StrategyArg::Split)]
    strategy: StrategyArg,

    /// System prompt
    #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
    system: String,

    /// Attach a file (image or PDF) to the prompt
    #[arg(short, long)]
    attach: Vec<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Split,
    Compress,
}

impl From<StrategyArg> for DeliveryStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Split => DeliveryStrategy::Split,
            StrategyArg::Compress => DeliveryStrategy::Compress,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _otel = telemetry::init_tracing_subscriber()?;

    match cli.command {
        Commands::Ask(args) => ask_command(args).await,
        Commands::Status(args) => status_command(args).await,
    }
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<ConfigHandle> {
    let handle = match path {
        Some(path) => ConfigHandle::from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigHandle::new(Settings::default())?,
    };
    Ok(handle)
}

fn env_key(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow!("{name} environment variable must be set"))
}

fn mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt" | "md") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[instrument(skip(args), fields(strategy = ?args.strategy, tools = !args.no_tools))]
async fn ask_command(args: AskArgs) -> anyhow::Result<()> {
    let config = load_config(args.common.config.as_deref()).await?;
    let store = Arc::new(LibsqlStore::open(&args.common.db).await?);
    let backend = Arc::new(GeminiBackend::new(env_key("GEMINI_API_KEY")?)?);
    let search = Arc::new(BraveSearch::new(env_key("BRAVE_API_KEY")?)?);
    let tools = Arc::new(BuiltinTools::new(
        search,
        SearchQuotaGate::new(Arc::clone(&store), config.clone()),
        config.clone(),
    ));
    let orchestrator = Orchestrator::new(backend, tools, store, config);

    let mut request = GenerationRequest::new(args.system, args.prompt).with_tools(!args.no_tools);
    for path in &args.attach {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        request = request.with_attachment(Attachment::new(mime_type(path), data));
    }

    let (answer, plan) = orchestrator
        .respond(&request, args.strategy.into())
        .await
        .map_err(|e| {
            let message = e.user_message();
            anyhow::Error::new(e).context(message)
        })?;

    let count = plan.chunks.len();
    for (i, chunk) in plan.chunks.iter().enumerate() {
        if count > 1 {
            println!("--- {}/{} ---", i + 1, count);
        }
        println!("{}", chunk);
    }
    eprintln!(
        "[{}{}, {} tokens, {} tool calls, delivered as {}{}]",
        answer.model,
        if answer.from_cache { ", cached" } else { "" },
        answer.usage.total_tokens,
        answer.tool_calls,
        plan.strategy,
        if plan.compressed { ", compressed" } else { "" },
    );
    Ok(())
}

#[instrument(skip(args))]
async fn status_command(args: StatusArgs) -> anyhow::Result<()> {
    let config = load_config(args.common.config.as_deref()).await?;
    let store = Arc::new(LibsqlStore::open(&args.common.db).await?);
    let selector = ModelSelector::new(RateLimitTracker::new(Arc::clone(&store), config.clone()));
    let gate = SearchQuotaGate::new(store, config.clone());

    let statuses = selector.status(&config.current().priority_list()).await;
    let budget = gate.budget().await?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "models": statuses,
                "search": budget,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for status in &statuses {
                print_status(status);
            }
            println!(
                "search   {}: {}/{} used, {} remaining",
                budget.month, budget.used, budget.free_quota, budget.remaining
            );
        }
    }
    Ok(())
}

fn print_status(status: &ModelStatus) {
    let label = match status {
        ModelStatus::Available(_) => "available",
        ModelStatus::Exhausted(_) => "exhausted",
        ModelStatus::Unknown { reason, .. } => {
            println!("{}: unknown ({})", status.model(), reason);
            return;
        }
    };
    let Some(snapshot) = status.snapshot() else {
        return;
    };
    println!(
        "{}: {} ({:.0}% used, bottleneck {})",
        snapshot.model,
        label,
        snapshot.overall_percentage * 100.0,
        snapshot.bottleneck()
    );
    for usage in [&snapshot.rpm, &snapshot.tpm, &snapshot.rpd] {
        println!(
            "  {:<4} {:>8}/{:<8} effective {:>10.1}  remaining {}",
            usage.metric, usage.used, usage.limit, usage.effective_limit, usage.remaining
        );
    }
}
