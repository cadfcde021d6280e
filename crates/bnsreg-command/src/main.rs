use bnsreg_bridge::{BridgeArgs, Callback, Dispatcher, HttpTransport, Outcome};
use bnsreg_core::{Action, RequestOptions, Translator};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bnsreg")]
#[command(about = "Naming bridge register CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log dispatcher activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bridge request an instance translates to
    Translate {
        #[arg(long)]
        action: Action,
        /// Instance descriptor as JSON
        #[arg(long)]
        file: PathBuf,
        #[arg(long, env = "BNSREG_CLUSTER", default_value = "default")]
        cluster: String,
    },
    /// Send one action for an instance to the bridge and report the outcome
    Send {
        #[arg(long)]
        action: Action,
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        bridge: BridgeArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(level)
        .init();

    match cli.command {
        Commands::Translate { action, file, cluster } => {
            let raw = read_instance(&file)?;
            let instance = bnsreg_core::validate(&raw)?;
            let payload = Translator::new(cluster).translate(&instance, action);
            let (path, method) = action.route();

            println!("{:<8} {}", format!("{:?}", method).to_uppercase(), path);
            if payload.is_empty() {
                println!("(no bns port, {} is a no-op)", action);
            } else {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            }
        }
        Commands::Send { action, file, bridge } => {
            let raw = read_instance(&file)?;
            bnsreg_core::validate(&raw)?;

            let config = bridge.into_config()?;
            let transport = HttpTransport::new(&config)?;
            let dispatcher = Dispatcher::new(config, Arc::new(transport));

            let (tx, mut rx) = mpsc::unbounded_channel();
            let callback: Callback = Arc::new(move |outcome: Outcome| {
                let _ = tx.send(outcome);
            });
            dispatcher.dispatch(&raw, RequestOptions::new(action), callback);

            // The channel closes once every chain, cascades included, has dropped the callback.
            let mut failed = false;
            while let Some(outcome) = rx.recv().await {
                println!("{}", outcome);
                failed |= outcome == Outcome::Failed;
            }
            if failed {
                return Err(format!("{} did not succeed", action).into());
            }
        }
    }

    Ok(())
}

fn read_instance(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
