use std::fs::File;
use std::io::{stdout, BufWriter, Write};
use std::path::Path;

use adcp::ensemble::{Ensemble, EnsembleDecoder};
use adcp::framing::{read_ensemble_frames, SyncConfig};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::info::Format;

fn text_line(ensemble: &Ensemble) -> String {
    let number = ensemble
        .ensemble_number()
        .map_or_else(|| "-".to_string(), |n| n.to_string());
    let time = ensemble
        .instrument_time()
        .map_or_else(|| "-".to_string(), |t| t.to_string());
    let fl = &ensemble.fixed_leader;
    let types: Vec<String> = ensemble
        .data_types()
        .iter()
        .map(ToString::to_string)
        .collect();
    format!(
        "{number:>8}  {time:<23}  {}x{}  {}",
        fl.number_of_cells,
        fl.number_of_beams,
        types.join(", ")
    )
}

/// Synchronize and decode all ensembles in `input`, writing one line per ensemble to stdout.
pub fn decode(input: &Path, format: &Format, threads: Option<usize>) -> Result<()> {
    let reader = File::open(input).with_context(|| format!("opening {input:?}"))?;
    let frames = read_ensemble_frames(reader, SyncConfig::default(), 8192).filter_map(|zult| {
        zult.map_err(|err| warn!("failed to read input: {err}"))
            .ok()
    });

    let mut decoder = EnsembleDecoder::new();
    if let Some(num) = threads {
        decoder = decoder.with_threads(num);
    }

    let mut out = BufWriter::new(stdout().lock());
    let (mut count, mut failures) = (0usize, 0usize);
    for zult in decoder.decode(frames).context("starting decoder")? {
        let ensemble = match zult {
            Ok(ensemble) => ensemble,
            Err(err) => {
                warn!("failed to decode ensemble: {err}");
                failures += 1;
                continue;
            }
        };
        count += 1;
        match format {
            Format::Json => {
                serde_json::to_writer(&mut out, &ensemble).context("serializing to json")?;
                writeln!(out)?;
            }
            Format::Text => writeln!(out, "{}", text_line(&ensemble))?,
        }
    }
    out.flush().context("writing to stdout")?;

    info!("decoded {count} ensembles; {failures} failed");
    Ok(())
}
