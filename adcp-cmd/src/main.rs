mod acquire;
mod decode;
mod info;

use std::io::stderr;
use std::path::PathBuf;
use std::time::Duration;

use adcp::config::{Endpoint, GatewayConfig, SourceConfig};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire ensembles from one or more instruments.
    ///
    /// Sources are read from a JSON configuration file with --config, or a single TCP
    /// source may be given with --host and --port. Decoded ensembles are written as JSON
    /// lines to stdout, or to --output. Connections that fail are retried after the
    /// configured delay until --duration elapses.
    Acquire {
        /// JSON gateway configuration.
        #[arg(short, long, value_name = "path", conflicts_with_all = ["host", "port"])]
        config: Option<PathBuf>,

        /// Instrument host for a single TCP source.
        #[arg(long, requires = "port")]
        host: Option<String>,

        /// Instrument port for a single TCP source.
        #[arg(short, long, requires = "host")]
        port: Option<u16>,

        /// Source name for a single TCP source.
        #[arg(short, long, default_value = "adcp")]
        name: String,

        /// Sink channel for a single TCP source.
        #[arg(long, default_value = SourceConfig::DEFAULT_CHANNEL)]
        channel: String,

        /// Write to this file rather than stdout.
        #[arg(short, long, value_name = "path")]
        output: Option<PathBuf>,

        /// Write raw PD0 ensembles rather than JSON. Requires --output.
        #[arg(long, action)]
        raw: bool,

        /// Stop after this many seconds.
        #[arg(short, long, value_name = "seconds")]
        duration: Option<u64>,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,
    },
    /// Decode ensembles from a PD0 file.
    Decode {
        /// Input PD0 file.
        input: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Number of decode threads. Defaults to the number of CPUs.
        #[arg(short, long)]
        threads: Option<usize>,
    },
    /// Show information about a PD0 file.
    Info {
        /// Input PD0 file
        input: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("ADCP_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Acquire {
            config,
            host,
            port,
            name,
            channel,
            output,
            raw,
            duration,
            clobber,
        } => {
            if let Some(output) = output {
                if !clobber && output.exists() {
                    bail!("{output:?} exists; use --clobber");
                }
            }
            let config = match (config, host, port) {
                (Some(path), _, _) => GatewayConfig::from_path(path)
                    .with_context(|| format!("loading config {path:?}"))?,
                (None, Some(host), Some(port)) => GatewayConfig {
                    sources: vec![SourceConfig::builder()
                        .name(name.as_str())
                        .channel(channel.as_str())
                        .endpoint(Endpoint::Tcp {
                            host: host.clone(),
                            port: *port,
                        })
                        .build()],
                },
                _ => bail!("either --config or --host and --port are required"),
            };
            acquire::acquire(
                config,
                output.as_deref(),
                *raw,
                duration.map(Duration::from_secs),
            )
        }
        Commands::Decode {
            input,
            format,
            threads,
        } => decode::decode(input, format, *threads),
        Commands::Info { input, format } => info::info(input, format),
    }
}
