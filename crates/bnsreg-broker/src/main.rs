use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bnsreg_bridge::{BridgeArgs, Callback, Dispatcher, HttpTransport, Outcome};
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SUBJECT_PREFIX: &str = "broker.";

#[derive(Parser)]
#[command(name = "bnsreg-broker")]
#[command(about = "Forwards instance lifecycle events to the naming bridge", long_about = None)]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,

    #[arg(long, env = "BNSREG_LOG_LEVEL", value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Append logs to this file instead of stdout
    #[arg(long, env = "BNSREG_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "BNSREG_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Seconds to wait for in-flight requests on shutdown
    #[arg(long, env = "BNSREG_DRAIN_TIMEOUT", default_value_t = 30)]
    drain_timeout: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
        }
    }
}

/// One line on stdin. `subject` follows the `broker.<action>` convention;
/// `action` names the action directly.
#[derive(Debug, Deserialize)]
struct LifecycleEvent {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    action: Option<String>,
    instance: Value,
}

impl LifecycleEvent {
    fn action_name(&self) -> Option<&str> {
        match (&self.subject, &self.action) {
            (Some(subject), _) => Some(subject.strip_prefix(SUBJECT_PREFIX).unwrap_or(subject.as_str())),
            (None, Some(action)) => Some(action.as_str()),
            (None, None) => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = init_logging(cli.log_level.into(), cli.log_file.as_deref())?;

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("metrics listening on {}", addr);
    }

    let config = cli.bridge.into_config()?;
    let transport = HttpTransport::new(&config)?;
    info!("Register broker started, bridge is {}", config.bridge_base_url);
    let dispatcher = Dispatcher::new(config, Arc::new(transport));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => match line? {
                Some(line) => handle_line(&dispatcher, &line),
                None => {
                    info!("event stream closed");
                    break;
                }
            },
        }
    }

    drain(&dispatcher, Duration::from_secs(cli.drain_timeout)).await;
    info!("EXITING broker");
    Ok(())
}

fn init_logging(level: LevelFilter, file: Option<&Path>) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let Some(path) = file else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(level)
            .init();
        return Ok(None);
    };

    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path.file_name().ok_or("log file path has no file name")?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .with(level)
        .init();
    Ok(Some(guard))
}

fn handle_line(dispatcher: &Arc<Dispatcher>, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let event: LifecycleEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!("skipping unparseable event: {}", e);
            return;
        }
    };
    let Some(action) = event.action_name() else {
        warn!("event has neither subject nor action, skip");
        return;
    };
    debug!("received {} message {}", action, event.instance);

    let label = format!("{} {}", action, instance_label(&event.instance));
    let callback: Callback = Arc::new(move |outcome: Outcome| match outcome {
        Outcome::Succ => debug!("{} finished: {}", label, outcome),
        Outcome::Failed => warn!("{} finished: {}", label, outcome),
    });
    dispatcher.dispatch_named(&event.instance, action, callback);
}

fn instance_label(instance: &Value) -> String {
    let field = |name: &str| instance.get(name).and_then(Value::as_str).unwrap_or("?").to_string();
    format!("{}_{}", field("app_id"), field("instance_index"))
}

/// Waits for every chain, including cascade re-issues still sitting out their delay.
async fn drain(dispatcher: &Dispatcher, grace: Duration) {
    dispatcher.close();
    let pending = dispatcher.pending_chains();
    if pending == 0 {
        return;
    }
    info!("waiting up to {:?} for {} in-flight requests", grace, pending);

    if tokio::time::timeout(grace, dispatcher.wait()).await.is_err() {
        warn!("drain timed out, abandoning in-flight requests");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, shutting down broker");
}
