//! Onion Monitor CLI
//!
//! Leak monitoring over dark web and surface web sources.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use onion_collector::{Collector, MonitorConfig};
use onion_core::{
    AuditPeriod, FindingFilter, FindingWithValidation, NewSource, SourceCategory, SourceId, Store,
};
use onion_store::SqliteStore;
use onion_tor::{check_tor_connection, HttpFetcher, TorStatus, Transport};

#[derive(Parser)]
#[command(name = "onion-monitor")]
#[command(author, version, about = "Onion Monitor: leak monitoring for dark web sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML)
    #[arg(short, long, global = true, env = "ONION_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, global = true, env = "ONION_MONITOR_DB")]
    db: Option<PathBuf>,

    /// Route requests through the local Tor proxy
    #[arg(long, global = true)]
    tor: bool,

    /// SOCKS proxy URL, e.g. socks5h://127.0.0.1:9150
    #[arg(long, global = true, env = "ONION_MONITOR_PROXY")]
    proxy: Option<String>,

    /// Verbosity level (0-3)
    #[arg(short, long, global = true, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the default sources if none exist
    Init,

    /// Search all active sources for a term
    Search {
        term: String,

        /// Only print findings scored as valid
        #[arg(long)]
        valid_only: bool,
    },

    /// Search every term in a file, one per line
    Batch { file: PathBuf },

    /// Check one source's reachability
    CheckSource { id: SourceId },

    /// Check every registered source
    CheckAll,

    /// Score a link without recording it
    Validate {
        link: String,

        #[arg(long, default_value = "")]
        title: String,

        #[arg(long, default_value = "")]
        snippet: String,
    },

    /// Confirm a finding manually
    Confirm { finding_id: i64 },

    /// Check whether a term literally appears on pages
    Context {
        term: String,

        #[arg(required = true)]
        urls: Vec<String>,

        /// Source to attribute findings to
        #[arg(long)]
        source: Option<SourceId>,
    },

    /// Manage sources
    Sources {
        #[command(subcommand)]
        command: SourceCommands,
    },

    /// List recorded findings
    Findings {
        /// Filter by search term substring
        #[arg(short, long)]
        term: Option<String>,

        #[arg(long)]
        valid_only: bool,

        /// First day to include (YYYY-MM-DD, UTC)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD, UTC)
        #[arg(long)]
        until: Option<NaiveDate>,

        /// Only findings from this source
        #[arg(long)]
        source: Option<SourceId>,

        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show validation statistics
    Stats,

    /// Show the most recent audit events
    Audit {
        /// today, week, month or total
        #[arg(short, long, default_value = "total")]
        period: AuditPeriod,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Count audit events per action over a period
    AuditReport {
        /// today, week, month or total
        #[arg(short, long, default_value = "today")]
        period: AuditPeriod,
    },

    /// Check Tor connection status
    Status,
}

#[derive(Subcommand)]
enum SourceCommands {
    /// List sources
    List {
        #[arg(long)]
        active_only: bool,
    },

    /// Register a source
    Add {
        name: String,
        base_url: String,

        /// surface or link_list
        #[arg(long, default_value = "surface")]
        category: SourceCategory,

        /// Search URL template containing {query}
        #[arg(long)]
        search_url: Option<String>,
    },

    /// Stop searching a source
    Deactivate { id: SourceId },

    /// Resume searching a source
    Activate { id: SourceId },

    /// Status check history of a source
    History {
        id: SourceId,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

/// Store, fetcher and pipeline built from the resolved configuration
struct App {
    store: Arc<SqliteStore>,
    fetcher: Arc<HttpFetcher>,
    collector: Collector,
}

impl App {
    fn open(config: &MonitorConfig) -> Result<Self> {
        let store = Arc::new(
            SqliteStore::open(&config.database.path)
                .with_context(|| format!("opening {}", config.database.path.display()))?,
        );
        let fetcher = Arc::new(HttpFetcher::new(&config.fetch_config())?);
        let collector = Collector::new(config, fetcher.clone(), store.clone(), store.clone());

        Ok(Self {
            store,
            fetcher,
            collector,
        })
    }
}

fn load_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    if let Some(db) = &cli.db {
        config.database.path = db.clone();
    }
    if let Some(proxy) = &cli.proxy {
        config.transport = Transport::Socks {
            proxy: proxy.clone(),
        };
    } else if cli.tor {
        config.transport = Transport::tor();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = load_config(&cli)?;
    info!(
        "Database: {} | Transport: {}",
        config.database.path.display(),
        config.transport.describe()
    );
    let app = App::open(&config)?;

    match cli.command {
        Commands::Init => {
            let inserted = app.store.seed_default_sources()?;
            if inserted == 0 {
                println!("Sources already registered, nothing to seed.");
            } else {
                println!("✅ Registered {} default sources", inserted);
            }
        }
        Commands::Search { term, valid_only } => run_search(&app, &term, valid_only).await?,
        Commands::Batch { file } => run_batch(&app, &file).await?,
        Commands::CheckSource { id } => {
            let report = app.collector.check_source(id).await?;
            println!("Source {}: {} ({})", report.source_id, report.status, report.details);
        }
        Commands::CheckAll => {
            let summary = app.collector.check_all_sources().await?;
            for report in &summary.reports {
                println!("  [{}] {} - {}", report.source_id, report.status, report.details);
            }
            println!(
                "\n📊 {} active, {} inactive, {} error",
                summary.active, summary.inactive, summary.error
            );
        }
        Commands::Validate {
            link,
            title,
            snippet,
        } => {
            let verdict = app.collector.validate_link(&link, &title, &snippet);
            println!(
                "{} score {} ({})",
                if verdict.is_valid { "✅ Valid," } else { "❌ Not valid," },
                verdict.score,
                verdict.method
            );
            for reason in &verdict.rationale {
                println!("   - {}", reason);
            }
        }
        Commands::Confirm { finding_id } => {
            let validation = app.collector.confirm_finding(finding_id)?;
            println!(
                "✅ Finding {} confirmed (score {})",
                finding_id, validation.verdict.score
            );
        }
        Commands::Context { term, urls, source } => {
            let results = app
                .collector
                .validate_links_in_context(&term, &urls, source)
                .await;
            for result in &results {
                match &result.context_snippet {
                    Some(context) => println!("✅ {}\n   ...{}...", result.url, context),
                    None => println!(
                        "❌ {} (status: {})",
                        result.url,
                        result
                            .http_status
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "unreachable".to_string())
                    ),
                }
            }
        }
        Commands::Sources { command } => run_sources(&app, command)?,
        Commands::Findings {
            term,
            valid_only,
            since,
            until,
            source,
            limit,
        } => {
            let findings = app.store.list_findings(&FindingFilter {
                term,
                only_valid: valid_only,
                since: since.and_then(start_of_day),
                until: until.and_then(end_of_day),
                source_id: source,
                limit: Some(limit),
            })?;
            if findings.is_empty() {
                println!("No findings recorded.");
            }
            for finding in &findings {
                print_finding(finding);
            }
        }
        Commands::Stats => {
            let stats = app.store.validation_stats()?;
            println!("📊 Validation statistics");
            println!("   Valid: {}", stats.valid);
            println!("   Not valid: {}", stats.not_valid);
            println!("   Unvalidated: {}", stats.unvalidated);
            println!("   Average valid score: {}", stats.average_valid_score);
            for (method, count) in &stats.by_method {
                println!("   {}: {}", method, count);
            }
        }
        Commands::Audit { period, limit } => {
            let since = period.since(Utc::now());
            for event in app.store.audit_events(since, None, limit)? {
                println!(
                    "{} {:<28} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.action,
                    event.description
                );
            }
        }
        Commands::AuditReport { period } => {
            let report = app.store.audit_report(period.since(Utc::now()))?;
            println!("📋 Audit report ({})", period);
            println!("   Total events: {}", report.total);
            for (action, count) in &report.by_action {
                println!("   {:<28} {}", action, count);
            }
        }
        Commands::Status => check_status(&app).await,
    }

    Ok(())
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_micro_opt(23, 59, 59, 999_999)
        .map(|dt| dt.and_utc())
}

async fn run_search(app: &App, term: &str, valid_only: bool) -> Result<()> {
    println!("🔍 Searching for: {}\n", term);

    let results = app.collector.search(term).await?;
    let valid = results
        .iter()
        .filter(|r| r.validation.as_ref().is_some_and(|v| v.verdict.is_valid))
        .count();

    for result in &results {
        let is_valid = result
            .validation
            .as_ref()
            .is_some_and(|v| v.verdict.is_valid);
        if !valid_only || is_valid {
            print_finding(result);
        }
    }

    println!("\n✅ {} findings, {} scored as valid", results.len(), valid);
    Ok(())
}

async fn run_batch(app: &App, file: &Path) -> Result<()> {
    let content =
        fs::read_to_string(file).with_context(|| format!("reading terms from {}", file.display()))?;
    let terms: Vec<String> = content.lines().map(String::from).collect();

    let outcomes = app.collector.search_batch(&terms).await;
    for outcome in &outcomes {
        match &outcome.error {
            Some(e) => println!("❌ {}: {}", outcome.term, e),
            None => println!(
                "✅ {}: {} findings ({} valid)",
                outcome.term, outcome.findings, outcome.valid
            ),
        }
    }
    println!("\n📋 {} terms searched", outcomes.len());
    Ok(())
}

fn run_sources(app: &App, command: SourceCommands) -> Result<()> {
    match command {
        SourceCommands::List { active_only } => {
            for source in app.store.list_sources(active_only)? {
                println!(
                    "[{}] {} ({}) {} - {}{}",
                    source.id,
                    source.name,
                    source.category,
                    source.base_url,
                    source.health,
                    if source.active { "" } else { " [deactivated]" }
                );
            }
        }
        SourceCommands::Add {
            name,
            base_url,
            category,
            search_url,
        } => {
            let mut source = NewSource::new(&name, &base_url, category);
            if let Some(template) = &search_url {
                if !template.contains("{query}") {
                    anyhow::bail!("search URL template must contain {{query}}");
                }
                source = source.with_search_url(template);
            }
            let id = app.collector.add_source(&source)?;
            println!("✅ Source {} registered with id {}", name, id);
        }
        SourceCommands::Deactivate { id } => {
            app.collector.set_source_active(id, false)?;
            println!("Source {} deactivated", id);
        }
        SourceCommands::Activate { id } => {
            app.collector.set_source_active(id, true)?;
            println!("Source {} activated", id);
        }
        SourceCommands::History { id, limit } => {
            for record in app.store.status_history(id, limit)? {
                println!(
                    "{} {} - {}",
                    record.checked_at.format("%Y-%m-%d %H:%M:%S"),
                    record.status,
                    record.details
                );
            }
        }
    }
    Ok(())
}

fn print_finding(result: &FindingWithValidation) {
    let finding = &result.finding;
    let verdict = result.validation.as_ref().map(|v| &v.verdict);
    let marker = match verdict {
        Some(v) if v.is_valid => "✅",
        Some(_) => "❌",
        None => "❔",
    };

    println!(
        "{} [{}] {} ({})",
        marker,
        finding.id,
        finding.title,
        result.source_name.as_deref().unwrap_or("unknown source")
    );
    println!("   {}", finding.discovered_link);
    if let Some(v) = verdict {
        println!("   score {} via {}: {}", v.score, v.method, v.rationale_text());
    }
}

async fn check_status(app: &App) {
    println!("🔌 Checking Tor connection...\n");
    let transport = app.fetcher.transport().describe();

    match check_tor_connection(app.fetcher.as_ref()).await {
        TorStatus::Routed => {
            println!("✅ Requests are routed through Tor");
            println!("   Transport: {}", transport);
        }
        TorStatus::NotRouted => {
            println!("❌ Reachable, but requests are not routed through Tor");
            println!("   Transport: {}", transport);
            println!("   Use --tor or --proxy to route through a Tor SOCKS proxy");
        }
        TorStatus::Unreachable(e) => {
            println!("❌ Could not reach the Tor check page: {}", e);
            println!("\n   To install Tor:");
            println!("   - Linux: sudo apt install tor");
            println!("   - Mac: brew install tor");
            println!("   - Then start: sudo systemctl start tor (or brew services start tor)");
        }
    }
}
