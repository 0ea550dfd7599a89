//! Headerhook CLI

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use headerhook_config::load_config;
use headerhook_core::{
    FilterChain, FilterStatus, HeaderFilter, HttpRequest, Method, Next, StatusCode, Uri,
};
use headerhook_scripting::{CapabilityTable, HookRuntime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "headerhook")]
#[command(about = "Scriptable response header filters", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info", env = "HEADERHOOK_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and compile its static handlers
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "headerhook.yaml")]
        config: PathBuf,
    },

    /// Run one simulated request through the header filter chain
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "headerhook.yaml")]
        config: PathBuf,

        /// Request URI
        #[arg(long, default_value = "/")]
        uri: String,

        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request header as "Name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Declared request variable as "name=value" (repeatable)
        #[arg(long = "var")]
        vars: Vec<String>,

        /// Response status before the filter runs
        #[arg(short, long, default_value_t = 200)]
        status: u16,
    },

    /// List the capabilities scripts can use
    Capabilities,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            init_tracing(&cli.log_level, cli.json_logs)?;
            validate(config).await
        }

        Commands::Run {
            config,
            uri,
            method,
            headers,
            vars,
            status,
        } => {
            init_tracing(&cli.log_level, cli.json_logs)?;
            let request = build_request(&uri, &method, &headers, &vars, status)?;
            let report = run(config, request).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        Commands::Capabilities => {
            for capability in CapabilityTable::standard().iter() {
                let name = capability.qualified_name();
                if capability.deprecated {
                    println!("{name} (deprecated)");
                } else {
                    println!("{name}");
                }
            }
            Ok(())
        }

        Commands::Version => {
            println!("headerhook");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

async fn validate(path: PathBuf) -> Result<()> {
    tracing::info!("Validating configuration: {}", path.display());

    let config = load_config(&path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    let runtime = HookRuntime::from_config(&config)?;

    let mut failed = 0;
    for report in runtime.precompile().await {
        let scope = if report.scope.is_empty() {
            "server"
        } else {
            report.scope.as_str()
        };
        match &report.result {
            Ok(()) => tracing::info!("✓ {scope}: {}", report.handler),
            Err(e) => {
                failed += 1;
                tracing::error!("✗ {scope}: {e}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} header filter script(s) failed to compile");
    }

    tracing::info!("✓ Configuration is valid");
    tracing::info!("  Locations: {}", config.locations.len());
    tracing::info!("  Globals: {}", runtime.engine().globals().variables().len());
    tracing::info!("  Code cache: {}", config.code_cache);
    Ok(())
}

fn build_request(
    uri: &str,
    method: &str,
    headers: &[String],
    vars: &[String],
    status: u16,
) -> Result<HttpRequest> {
    let method = Method::from_str(&method.to_uppercase())
        .with_context(|| format!("invalid method '{method}'"))?;
    let uri = Uri::from_str(uri).with_context(|| format!("invalid URI '{uri}'"))?;
    let status = StatusCode::from_u16(status).with_context(|| format!("invalid status {status}"))?;

    let mut req = HttpRequest::new(method, uri).with_status(status);
    for header in headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("header '{header}' must look like 'Name: value'");
        };
        req = req.with_header(name.trim(), value.trim())?;
    }
    for var in vars {
        let Some((name, value)) = var.split_once('=') else {
            bail!("variable '{var}' must look like 'name=value'");
        };
        req.declare_variable(name, Some(value.to_string()))?;
    }
    Ok(req)
}

/// Terminal stage standing in for the rest of the host chain
#[derive(Debug, Default)]
struct Recorder {
    reached: AtomicBool,
}

#[async_trait]
impl HeaderFilter for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn filter(&self, req: &mut HttpRequest, next: Next) -> FilterStatus {
        self.reached.store(true, Ordering::SeqCst);
        next.run(req).await
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    request_id: String,
    outcome: &'static str,
    status: u16,
    next_stage_reached: bool,
    headers: BTreeMap<String, Vec<String>>,
}

async fn run(path: PathBuf, mut req: HttpRequest) -> Result<RunReport> {
    let config = load_config(&path)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    let runtime = HookRuntime::from_config(&config)?;

    let recorder = Arc::new(Recorder::default());
    let chain = runtime
        .install(FilterChain::builder().install(recorder.clone())?)?
        .build();
    tracing::debug!(stages = ?chain.stage_names(), "Filter chain built");

    let (outcome, status) = match chain.run(&mut req).await {
        FilterStatus::Continue => ("continue", req.status),
        FilterStatus::Abort(status) => ("abort", status),
    };

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &req.headers_out {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }

    Ok(RunReport {
        request_id: req.request_id.clone(),
        outcome,
        status: status.as_u16(),
        next_stage_reached: recorder.reached.load(Ordering::SeqCst),
        headers,
    })
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(filter.into());

    // Logs go to stderr so `run` output stays parseable
    if json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }

    Ok(())
}
