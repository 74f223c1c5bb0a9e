//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use mdenrich_core::pipeline::{
    EnrichRequest, EnrichResult, ProgressReporter, enrich, journal_path, shortlist_article,
};
use mdenrich_shared::{AppConfig, QaMode, init_config, load_config};
use mdenrich_storage::Journal;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// mdenrich: place media and inline links into Markdown articles.
#[derive(Parser)]
#[command(
    name = "mdenrich",
    version,
    about = "Enrich Markdown articles with a hero image, context media and two inline links.",
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
    /// Enrich an article and write the result.
    Enrich {
        /// Markdown article to enrich.
        #[arg(long)]
        article: PathBuf,

        /// Keywords file, one keyword per line.
        #[arg(long)]
        keywords: PathBuf,

        /// Output path (defaults to <output_dir>/enriched_<name>).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// OpenRouter model id (defaults to the configured model).
        #[arg(long)]
        model: Option<String>,

        /// Use the deterministic selector and skip the reviewer.
        #[arg(long)]
        offline: bool,

        /// Quality mode: auto, ai or fallback.
        #[arg(long)]
        qa_mode: Option<QaMode>,

        /// Attempts before giving up.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_attempts: Option<u32>,

        /// Skip the availability check of candidate URLs.
        #[arg(long)]
        no_probe: bool,
    },

    /// Print the candidate shortlist for an article as JSON.
    Shortlist {
        #[arg(long)]
        article: PathBuf,

        #[arg(long)]
        keywords: PathBuf,

        /// Drop unreachable candidates first.
        #[arg(long)]
        probe: bool,
    },

    /// Inspect the run journal.
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Journal subcommands.
#[derive(Subcommand)]
pub(crate) enum RunsAction {
    /// List recent runs.
    List {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Show a run and its recorded steps as JSON.
    Show { run_id: String },
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
        0 => "mdenrich=info",
        1 => "mdenrich=debug",
        _ => "mdenrich=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
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
        Command::Enrich {
            article,
            keywords,
            out,
            model,
            offline,
            qa_mode,
            max_attempts,
            no_probe,
        } => {
            let request = EnrichRequest {
                article_path: article,
                keywords_path: keywords,
                out_path: out,
                model,
                offline,
                qa_mode,
                max_attempts,
                no_probe,
            };
            cmd_enrich(&request).await
        }
        Command::Shortlist {
            article,
            keywords,
            probe,
        } => cmd_shortlist(&article, &keywords, probe).await,
        Command::Runs { action } => match action {
            RunsAction::List { limit } => cmd_runs_list(limit).await,
            RunsAction::Show { run_id } => cmd_runs_show(&run_id).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_enrich(request: &EnrichRequest) -> Result<()> {
    let config = load_config()?;

    info!(
        article = %request.article_path.display(),
        offline = request.offline,
        "enriching article"
    );

    let reporter = CliProgress::new();
    let result = match enrich(&config, request, &reporter).await {
        Ok(result) => result,
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    println!();
    println!("  Article enriched!");
    println!("  Output:   {}", result.output_path.display());
    println!("  Attempts: {}", result.attempts);
    println!("  Cost:     ${:.4}", result.cost);
    if let Some(run_id) = &result.run_id {
        println!("  Run:      {run_id}");
    }
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _result: &EnrichResult) {
        self.spinner.finish_and_clear();
    }
}

async fn cmd_shortlist(article: &Path, keywords: &Path, probe: bool) -> Result<()> {
    let config = load_config()?;
    let bucket = shortlist_article(&config, article, keywords, probe).await?;
    println!("{}", serde_json::to_string_pretty(&bucket)?);
    Ok(())
}

async fn open_journal(config: &AppConfig) -> Result<Journal> {
    let path = journal_path(config)?;
    if !path.exists() {
        return Err(eyre!(
            "no journal at '{}'; enable [journal] in the config to record runs",
            path.display()
        ));
    }
    Ok(Journal::open(&path).await?)
}

async fn cmd_runs_list(limit: u32) -> Result<()> {
    let config = load_config()?;
    let journal = open_journal(&config).await?;
    let runs = journal.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {:<8}  {}  {}",
            run.id,
            run.status.as_str(),
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.article_path
        );
    }
    Ok(())
}

async fn cmd_runs_show(run_id: &str) -> Result<()> {
    let config = load_config()?;
    let journal = open_journal(&config).await?;
    let run = journal
        .get_run(run_id)
        .await?
        .ok_or_else(|| eyre!("run '{run_id}' not found"))?;
    let steps = journal.list_steps(run_id).await?;
    let report = serde_json::json!({ "run": run, "steps": steps });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

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
