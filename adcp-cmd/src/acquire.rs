use std::fs::File;
use std::io::{stdout, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use adcp::acquire::{Gateway, Shutdown};
use adcp::config::GatewayConfig;
use adcp::sink::{JsonLinesSink, RawFileSink, Sink};
use anyhow::{bail, Context, Result};
use tracing::{error, info};

fn create_sink(output: Option<&Path>, raw: bool) -> Result<Arc<dyn Sink>> {
    let sink: Arc<dyn Sink> = match (output, raw) {
        (Some(path), true) => {
            let file = File::create(path).with_context(|| format!("creating {path:?}"))?;
            Arc::new(RawFileSink::new(BufWriter::new(file)))
        }
        (Some(path), false) => {
            let file = File::create(path).with_context(|| format!("creating {path:?}"))?;
            Arc::new(JsonLinesSink::new(BufWriter::new(file)))
        }
        (None, true) => bail!("raw output requires --output"),
        (None, false) => Arc::new(JsonLinesSink::new(stdout())),
    };
    Ok(sink)
}

/// Run acquisition for every configured source until `duration` elapses, or until each
/// source finishes if no duration is given.
pub fn acquire(
    config: GatewayConfig,
    output: Option<&Path>,
    raw: bool,
    duration: Option<Duration>,
) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let sink = create_sink(output, raw)?;
    let shutdown = Shutdown::new();

    if let Some(duration) = duration {
        let shutdown = shutdown.clone();
        thread::Builder::new()
            .name("acquire_timer".into())
            .spawn(move || {
                if !shutdown.wait(duration) {
                    info!("{duration:?} elapsed; shutting down");
                    shutdown.trigger();
                }
            })
            .context("starting timer")?;
    }

    let names: Vec<String> = config.sources.iter().map(|s| s.name.clone()).collect();
    info!("acquiring from {names:?}");

    let mut failed = 0;
    for (name, zult) in Gateway::new(config, sink, shutdown.clone()).run()? {
        match zult {
            Ok(stats) => info!(
                source = %name,
                ensembles = stats.ensembles,
                failures = stats.failures,
                checksum_failures = stats.sync.checksum_failures,
                "finished"
            ),
            Err(err) => {
                error!(source = %name, "{err}");
                failed += 1;
            }
        }
    }
    shutdown.trigger();

    if failed > 0 {
        bail!("{failed} source(s) failed");
    }
    Ok(())
}
