mod bridge;
mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use dispatch::{Catalog, Dispatcher};
use journal::{InvocationRecord, Journal};
use serde_json::Value;
use session::{HostConfig, ScriptHost, Session, Status};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bridge::{ResolveTools, tool_definition};
use config::Config;
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "resolve-mcp")]
#[command(about = "MCP server exposing DaVinci Resolve's scripting API as tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to resolve-mcp.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (default)
    Serve,
    /// List the tools that would be served
    Tools {
        /// Print MCP tool definitions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Connect to Resolve and report what it is doing
    Check,
    /// Invoke a single tool and print its result
    Call {
        /// Tool name
        tool: String,
        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },
    /// Show recent invocations from the journal
    History {
        /// Show only the last N invocations
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only invocations of this tool
        #[arg(short, long)]
        tool: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::discover(cli.config.as_deref())?;
    init_tracing(&config.log.filter);

    match cli.command {
        Some(Commands::Serve) | None => cmd_serve(&config).await,
        Some(Commands::Tools { json }) => cmd_tools(&config, json),
        Some(Commands::Check) => cmd_check(&config).await,
        Some(Commands::Call { tool, args }) => cmd_call(&config, &tool, args.as_deref()).await,
        Some(Commands::History { limit, tool }) => cmd_history(&config, limit, tool.as_deref()),
    }
}

/// Logs go to stderr; stdout carries JSON-RPC.
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_tools(config: &Config) -> Result<ResolveTools<ScriptHost>> {
    let catalog = Catalog::without(&config.tools.disabled)?;
    let paths = config.resolve.binding_paths();
    info!(
        script_api = %paths.script_api.display(),
        script_lib = %paths.script_lib.display(),
        modules = %paths.modules.display(),
        "binding paths"
    );

    let host = ScriptHost::new(HostConfig::python(config.resolve.python.clone(), paths));
    let session = Session::new(host)
        .with_max_consecutive_timeouts(config.session.max_consecutive_timeouts);
    let dispatcher = Dispatcher::new(
        catalog,
        Arc::new(session),
        config.session.dispatch_options(),
    );
    Ok(ResolveTools::new(dispatcher, open_journal(config)))
}

/// The journal is best-effort: failing to open it never stops the bridge.
fn open_journal(config: &Config) -> Option<Journal> {
    if !config.journal.enabled {
        return None;
    }
    let path = config.journal.resolved_path();
    match Journal::open(&path) {
        Ok(journal) => {
            info!(path = %path.display(), "journal opened");
            Some(journal)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "journal unavailable, invocations will not be recorded");
            None
        }
    }
}

async fn cmd_serve(config: &Config) -> Result<()> {
    let tools = build_tools(config)?;
    let resolve = Arc::clone(tools.dispatcher().session());

    if let Err(e) = resolve.acquire().await {
        warn!(error = %e, "DaVinci Resolve is not reachable yet; serving with an unavailable session");
    }

    info!(server = bridge::SERVER_NAME, "serving MCP on stdio");
    let served = mcp::serve_stdio(tools).await;

    resolve.backend().shutdown().await;
    served?;
    Ok(())
}

fn cmd_tools(config: &Config, json: bool) -> Result<()> {
    let catalog = Catalog::without(&config.tools.disabled)?;

    if json {
        let tools: Vec<_> = catalog.tools().iter().map(tool_definition).collect();
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    println!("{:<22}  {:<8}  DESCRIPTION", "TOOL", "MUTATES");
    println!("{}", "-".repeat(80));
    for spec in catalog.tools() {
        let mutates = if spec.mutating { "yes" } else { "no" };
        println!("{:<22}  {mutates:<8}  {}", spec.name, spec.description);
    }
    Ok(())
}

async fn cmd_check(config: &Config) -> Result<()> {
    let tools = build_tools(config)?;
    let resolve = tools.dispatcher().session();

    let acquired = resolve.acquire().await;
    if let Err(e) = acquired {
        if let session::Error::Unavailable(reason) = &e {
            eprintln!("Hint: {}", reason.hint());
        }
        resolve.backend().shutdown().await;
        return Err(e.into());
    }

    if let Status::Connected { product, .. } = resolve.status().await {
        println!("Connected: {} {}", product.product, product.version);
    }
    for (label, tool, field) in [
        ("Page", "get_current_page", "page"),
        ("Project", "get_current_project", "name"),
        ("Timeline", "get_current_timeline", "name"),
    ] {
        let shown = match tools.dispatcher().invoke(tool, None).await {
            Ok(value) => match &value[field] {
                Value::String(s) => s.clone(),
                Value::Null => "(none)".to_string(),
                other => other.to_string(),
            },
            Err(e) => format!("unavailable ({e})"),
        };
        println!("{label}: {shown}");
    }

    resolve.backend().shutdown().await;
    Ok(())
}

async fn cmd_call(config: &Config, tool: &str, args: Option<&str>) -> Result<()> {
    let args = args
        .map(|raw| {
            let value: Value =
                serde_json::from_str(raw).map_err(|e| Error::InvalidArgs(e.to_string()))?;
            if value.is_object() {
                Ok(value)
            } else {
                Err(Error::InvalidArgs("expected a JSON object".to_string()))
            }
        })
        .transpose()?;

    let tools = build_tools(config)?;
    let resolve = Arc::clone(tools.dispatcher().session());
    if tool != "reconnect" {
        if let Err(e) = resolve.acquire().await {
            warn!(error = %e, "DaVinci Resolve is not reachable");
        }
    }

    let result = tools.invoke(tool, args.as_ref()).await;
    resolve.backend().shutdown().await;

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(source) => {
            println!("{}", serde_json::to_string_pretty(&source)?);
            Err(Error::Tool {
                tool: tool.to_string(),
                source,
            })
        }
    }
}

fn cmd_history(config: &Config, limit: usize, tool: Option<&str>) -> Result<()> {
    if !config.journal.enabled {
        return Err(Error::JournalDisabled);
    }
    let path = config.journal.resolved_path();
    if !path.exists() {
        return Err(Error::JournalNotFound { path });
    }

    let journal = Journal::open(&path)?;
    let records = journal.recent(limit, tool)?;
    if records.is_empty() {
        println!("No invocations recorded.");
        return Ok(());
    }

    println!(
        "{:<19}  {:<22}  {:<24}  {:>7}  ARGUMENTS",
        "TIME", "TOOL", "OUTCOME", "MS"
    );
    println!("{}", "-".repeat(100));
    for record in records.iter().rev() {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &InvocationRecord) {
    let time = Local
        .from_utc_datetime(&record.timestamp.naive_utc())
        .format("%Y-%m-%d %H:%M:%S");
    let arguments = match &record.arguments {
        Value::Null => String::new(),
        other => other.to_string(),
    };
    println!(
        "{time:<19}  {:<22}  {:<24}  {:>7}  {arguments}",
        record.tool,
        record.outcome.label(),
        record.elapsed_ms
    );
    if let Some(message) = record.outcome.message() {
        println!("{:<19}  {message}", "");
    }
}
