//! CLI command definitions, routing, and tracing setup.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use draftsmith_core::{
    EditRequest, HealthReport, HealthStatus, Orchestrator, PipelineRun, ProgressReporter,
    ResearchMode, TopicOutcome, TopicRequest, seed,
};
use draftsmith_generator::{ContentGenerator, GeminiGenerator, GeneratedText};
use draftsmith_knowledge::WikipediaSource;
use draftsmith_shared::{
    AppConfig, CallPolicy, ContentItem, ContentItemId, DraftsmithError, ResearchBundle,
    init_config, load_config, resolve_api_key,
};
use draftsmith_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Draftsmith: research a topic, draft it, edit it, publish it.
#[derive(Parser)]
#[command(
    name = "draftsmith",
    version,
    about = "Research-backed blog drafting pipeline.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve the pipeline over HTTP.
    Serve {
        /// Override `[server] host`.
        #[arg(long)]
        host: Option<String>,

        /// Override `[server] port`.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Suggest topics from an intent, or select a topic for a content item.
    Topic {
        /// Topic to select.
        topic: Option<String>,

        /// Free-form intent to expand into topic ideas.
        #[arg(long, conflicts_with = "topic")]
        intent: Option<String>,

        /// Existing content item to attach the topic to.
        #[arg(long)]
        id: Option<String>,
    },

    /// Gather research for a content item's topic.
    Research {
        /// Content item ID.
        id: String,

        /// Reuse stored research instead of querying the knowledge source.
        #[arg(long)]
        use_existing: bool,
    },

    /// Write a draft from the stored research.
    Write {
        /// Content item ID.
        id: String,
    },

    /// Ask the editor for a revision of a draft.
    Edit {
        /// Content item ID.
        id: String,

        /// Editing instructions.
        #[arg(short, long)]
        instructions: String,

        /// Draft to edit (defaults to the stored draft).
        #[arg(long)]
        draft: Option<String>,

        /// Tone to adopt.
        #[arg(long)]
        style: Option<String>,

        /// Store the suggestion as the new draft.
        #[arg(long)]
        apply: bool,
    },

    /// Publish a content item.
    Publish {
        /// Content item ID.
        id: String,
    },

    /// Select, research, and draft a topic in one go.
    Run {
        /// Topic to draft.
        topic: String,
    },

    /// Show a content item and its research.
    Show {
        /// Content item ID.
        id: String,
    },

    /// List content items, newest first.
    List,

    /// Probe the generator, knowledge source, and database.
    Health {
        /// Probe the database only.
        #[arg(long)]
        quick: bool,

        /// Append the report as one JSON line to this file.
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Sample data and database inspection.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Database subcommands.
#[derive(Subcommand)]
pub(crate) enum DbAction {
    /// Insert sample content items with research.
    Seed,
    /// Delete every record, then seed.
    Reset,
    /// Print record counts and previews.
    Check,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "draftsmith=info",
        1 => "draftsmith=debug",
        _ => "draftsmith=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { host, port } => cmd_serve(host, port).await,
        Command::Topic { topic, intent, id } => cmd_topic(topic, intent, id.as_deref()).await,
        Command::Research { id, use_existing } => cmd_research(&id, use_existing).await,
        Command::Write { id } => cmd_write(&id).await,
        Command::Edit {
            id,
            instructions,
            draft,
            style,
            apply,
        } => cmd_edit(&id, instructions, draft, style, apply).await,
        Command::Publish { id } => cmd_publish(&id).await,
        Command::Run { topic } => cmd_run(&topic).await,
        Command::Show { id } => cmd_show(&id).await,
        Command::List => cmd_list().await,
        Command::Health { quick, log } => cmd_health(quick, log.as_deref()).await,
        Command::Db { action } => match action {
            DbAction::Seed => cmd_db_seed().await,
            DbAction::Reset => cmd_db_reset().await,
            DbAction::Check => cmd_db_check().await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = config.storage.resolved_db_path()?;
    Ok(Arc::new(Storage::open(&path).await?))
}

/// Open the database for inspection only. Never creates or migrates it.
async fn open_inspection(config: &AppConfig) -> Result<Storage> {
    let path = config.storage.resolved_db_path()?;
    if !path.exists() {
        return Err(eyre!(
            "no database at {}. Run `draftsmith db seed` or start a pipeline first.",
            path.display()
        ));
    }
    Ok(Storage::open_readonly(&path).await?)
}

/// Build the orchestrator from config. A missing API key only fails the
/// commands that actually generate text.
async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let storage = open_storage(config).await?;
    let policy = CallPolicy::from(&config.resilience);
    let knowledge = Arc::new(WikipediaSource::new(&config.knowledge, policy)?);

    let generator: Arc<dyn ContentGenerator> = match resolve_api_key(config) {
        Ok(key) => Arc::new(GeminiGenerator::new(&config.generator, key, policy)?),
        Err(e) => {
            warn!("{e}");
            Arc::new(Unconfigured(e.to_string()))
        }
    };

    Ok(Orchestrator::new(storage, knowledge, generator, config))
}

/// Stand-in generator used when no API key is set.
struct Unconfigured(String);

#[async_trait]
impl ContentGenerator for Unconfigured {
    async fn generate(&self, _prompt: &str) -> draftsmith_shared::Result<GeneratedText> {
        Err(DraftsmithError::config(self.0.clone()))
    }
}

fn parse_id(raw: &str) -> Result<ContentItemId> {
    Ok(raw.parse()?)
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let orchestrator = build_orchestrator(&config).await?;
    println!(
        "Serving on http://{}:{} (Ctrl+C to stop)",
        config.server.host, config.server.port
    );
    draftsmith_server::serve(&config.server, orchestrator).await?;
    Ok(())
}

async fn cmd_topic(topic: Option<String>, intent: Option<String>, id: Option<&str>) -> Result<()> {
    if topic.is_none() && intent.is_none() {
        return Err(eyre!("pass a topic to select or --intent to get suggestions"));
    }

    let config = load_config()?;
    let orchestrator = build_orchestrator(&config).await?;
    let request = TopicRequest {
        user_input: intent,
        selected_topic: topic,
        content_item_id: id.map(parse_id).transpose()?,
    };

    match orchestrator.select_topic(request).await?.payload {
        TopicOutcome::Suggestions(topics) => {
            println!();
            println!("  Topic ideas:");
            for (n, topic) in topics.iter().enumerate() {
                println!("  {}. {topic}", n + 1);
            }
            println!();
        }
        TopicOutcome::Selected(item) => {
            println!();
            println!("  Topic selected.");
            print_item_header(&item);
            println!();
        }
    }
    Ok(())
}

async fn cmd_research(id: &str, use_existing: bool) -> Result<()> {
    let id = parse_id(id)?;
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config).await?;
    let mode = if use_existing {
        ResearchMode::UseExisting
    } else {
        ResearchMode::FetchNew
    };

    let spinner = CliProgress::new();
    spinner.phase("Researching");
    let result = orchestrator.research(&id, mode).await;
    spinner.finish();

    print_research(&result?.payload);
    Ok(())
}

async fn cmd_write(id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config).await?;

    let spinner = CliProgress::new();
    spinner.phase("Writing draft");
    let result = orchestrator.write(&id).await;
    spinner.finish();

    let item = result?.payload;
    println!();
    println!("{}", item.content.as_deref().unwrap_or_default());
    println!();
    Ok(())
}

async fn cmd_edit(
    id: &str,
    instructions: String,
    draft: Option<String>,
    style: Option<String>,
    apply: bool,
) -> Result<()> {
    let id = parse_id(id)?;
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config).await?;

    let draft = match draft {
        Some(draft) => draft,
        None => orchestrator
            .storage()
            .require_content_item(&id)
            .await?
            .content
            .unwrap_or_default(),
    };

    let spinner = CliProgress::new();
    spinner.phase("Editing");
    let result = orchestrator
        .edit(
            &id,
            EditRequest {
                draft,
                instructions,
                style,
            },
        )
        .await;
    spinner.finish();

    let suggestion = result?.payload;
    println!();
    println!("{suggestion}");
    println!();

    if apply {
        orchestrator.apply_edit(&id, &suggestion).await?;
        info!(%id, "edit applied");
        println!("  Stored as the current draft.");
    }
    Ok(())
}

async fn cmd_publish(id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config).await?;

    let item = orchestrator.publish(&id).await?.payload;
    println!();
    println!("  Published.");
    print_item_header(&item);
    println!();
    Ok(())
}

async fn cmd_run(topic: &str) -> Result<()> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config).await?;

    info!(topic, "running pipeline");
    let reporter = CliProgress::new();
    let result = orchestrator.run_pipeline(topic, &reporter).await;
    reporter.finish();
    let run = result?;

    println!();
    println!("  Draft ready!");
    print_item_header(&run.item);
    println!("  Related: {}", run.research.related_topics.len());
    println!("  Time:    {:.1}s", run.elapsed.as_secs_f64());
    println!();
    println!("{}", run.item.content.as_deref().unwrap_or_default());
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Inspection commands
// ---------------------------------------------------------------------------

async fn cmd_show(id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let config = load_config()?;
    let storage = open_inspection(&config).await?;

    let item = storage.require_content_item(&id).await?;
    println!();
    print_item_header(&item);
    println!("  Created: {}", item.created_at.to_rfc3339());
    println!("  Updated: {}", item.updated_at.to_rfc3339());
    if let Some(content) = item.content.as_deref() {
        println!();
        println!("{content}");
    }

    match storage.get_research(&id).await? {
        Some(record) => print_research(&record.content),
        None => println!("\n  No research stored.\n"),
    }
    Ok(())
}

async fn cmd_list() -> Result<()> {
    let config = load_config()?;
    let storage = open_inspection(&config).await?;
    let items = storage.list_content_items().await?;

    if items.is_empty() {
        println!("No content items yet. Start with `draftsmith topic <TOPIC>`.");
        return Ok(());
    }

    for item in &items {
        println!(
            "{}  {:<9}  {:<14}  {}",
            item.id,
            item.status.as_str(),
            item.stage.as_str(),
            item.topic().unwrap_or("(no topic)")
        );
    }
    Ok(())
}

async fn cmd_health(quick: bool, log: Option<&Path>) -> Result<()> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config).await?;
    let report = orchestrator.health(quick).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(path) = log {
        append_health_log(path, &report)?;
        info!(path = %path.display(), "health report logged");
    }

    if report.status == HealthStatus::Unhealthy {
        std::process::exit(1);
    }
    Ok(())
}

/// Append `report` to `path` as a single JSON line.
fn append_health_log(path: &Path, report: &HealthReport) -> Result<()> {
    let line = serde_json::to_string(report)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| eyre!("cannot open health log {}: {e}", path.display()))?;
    writeln!(file, "{line}")?;
    Ok(())
}

async fn cmd_db_seed() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let count = seed::seed(&storage).await?;
    println!("Inserted {count} sample content items.");
    Ok(())
}

async fn cmd_db_reset() -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let count = seed::reset(&storage).await?;
    println!("Database reset with {count} sample content items.");
    Ok(())
}

async fn cmd_db_check() -> Result<()> {
    let config = load_config()?;
    let storage = open_inspection(&config).await?;
    let stats = storage.stats().await?;

    println!();
    println!("  Content items:    {}", stats.content_items);
    println!("  Research records: {}", stats.research_records);
    println!();

    for item in storage.list_content_items().await? {
        let research = storage.get_research(&item.id).await?;
        println!(
            "  {}  {}",
            item.topic().unwrap_or("(no topic)"),
            preview(item.content.as_deref().unwrap_or_default(), 60)
        );
        if let Some(record) = research {
            println!("      research: {} ({} points)", record.source, record.content.main_topic.summary.len());
        }
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_item_header(item: &ContentItem) {
    println!("  ID:      {}", item.id);
    println!("  Topic:   {}", item.topic().unwrap_or("(none)"));
    println!("  Status:  {}", item.status.as_str());
    println!("  Stage:   {}", item.stage.as_str());
}

fn print_research(bundle: &ResearchBundle) {
    println!();
    println!("  {} ({})", bundle.main_topic.title, bundle.source);
    if !bundle.main_topic.description.is_empty() {
        println!("  {}", bundle.main_topic.description);
    }
    for point in &bundle.main_topic.summary {
        println!("    - {point}");
    }
    for related in &bundle.related_topics {
        println!();
        println!("  Related: {}", related.title);
        for point in &related.summary {
            println!("    - {point}");
        }
    }
    println!();
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _run: &PipelineRun) {
        self.spinner.finish_and_clear();
    }
}
