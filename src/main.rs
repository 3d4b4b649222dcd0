#![forbid(unsafe_code)]

//! `moodle-agent-bridge` — tool-server client binary.
//!
//! Lists the operation contracts, or loads configuration, connects to the
//! worker, and dispatches one named operation. Tool output goes to stdout;
//! logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use moodle_agent_bridge::dispatch::{CallContext, Dispatcher, ToolOutput};
use moodle_agent_bridge::events::JsonlEventWriter;
use moodle_agent_bridge::rpc::RpcClient;
use moodle_agent_bridge::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "moodle-agent-bridge", about = "Moodle tool-server client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Directory for JSONL call-event files; events are not recorded if unset.
    #[arg(long, global = true)]
    events_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every operation contract as JSON.
    Tools,
    /// Dispatch one operation and print its output.
    Call {
        /// Operation name (see `tools`).
        operation: String,
        /// Arguments as a JSON object.
        #[arg(long = "args", default_value = "{}")]
        json_args: String,
        /// Default course for activity lookups, overriding configuration.
        #[arg(long)]
        course_id: Option<u64>,
    },
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    match &args.command {
        Command::Tools => {
            let contracts = serde_json::to_string_pretty(&Dispatcher::contracts())?;
            println!("{contracts}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Call {
            operation,
            json_args,
            course_id,
        } => {
            let config_path = args
                .config
                .clone()
                .ok_or_else(|| AppError::Config("--config is required for `call`".into()))?;
            let call_args: Value = serde_json::from_str(json_args)
                .map_err(|err| AppError::Validation(format!("--args is not valid JSON: {err}")))?;
            call(&args, config_path, operation, call_args, *course_id).await
        }
    }
}

async fn call(
    cli: &Cli,
    config_path: PathBuf,
    operation: &str,
    call_args: Value,
    course_id: Option<u64>,
) -> Result<ExitCode> {
    let mut config = GlobalConfig::load_from_path(&config_path)?;
    config.load_credentials().await?;
    info!(config = %config_path.display(), "configuration loaded");

    let mut client = RpcClient::from_config(&config);
    if let Some(dir) = &cli.events_dir {
        client = client.with_event_sink(Arc::new(JsonlEventWriter::new(dir.clone())?));
    }
    let dispatcher = Dispatcher::new(Arc::new(client));

    let mut ctx = CallContext::from_config(&config.context);
    if course_id.is_some() {
        ctx.default_course_id = course_id;
    }

    let output = tokio::select! {
        output = dispatcher.dispatch(operation, call_args, &ctx) => Some(output),
        () = shutdown_signal() => {
            warn!("interrupted, shutting down worker");
            None
        }
    };

    dispatcher.client().shutdown().await;

    match output {
        Some(ToolOutput { text, is_error: false }) => {
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        Some(ToolOutput { text, is_error: true }) => {
            eprintln!("{text}");
            Ok(ExitCode::FAILURE)
        }
        None => Ok(ExitCode::from(130)),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
