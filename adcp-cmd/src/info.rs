use adcp::ensemble::{DataType, Ensemble};
use adcp::framing::{read_ensemble_frames, SyncConfig, SyncStats};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use handlebars::handlebars_helper;
use serde::Serialize;
use std::{
    cmp,
    collections::{BTreeMap, BTreeSet},
    io::{stdout, Write},
    path::Path,
};
use tracing::debug;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Default, Debug, Clone, Serialize)]
struct Instrument {
    serial_number: u32,
    frequency_khz: Option<u32>,
    firmware: String,
    beams: u8,
    cells: u8,
}

#[derive(Default, Debug, Clone, Serialize)]
struct Summary {
    total_ensembles: usize,
    decode_failures: usize,
    first_ensemble: Option<u32>,
    last_ensemble: Option<u32>,
    first_time: Option<NaiveDateTime>,
    last_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    instrument: Option<Instrument>,
    summary: Summary,
    framing: SyncStats,
    data_types: BTreeMap<String, usize>,
    unknown_ids: BTreeSet<u16>,
}

fn instrument(ensemble: &Ensemble) -> Instrument {
    let fl = &ensemble.fixed_leader;
    Instrument {
        serial_number: fl.serial_number,
        frequency_khz: fl.system_config().frequency_khz,
        firmware: format!("{}.{:02}", fl.cpu_firmware_version, fl.cpu_firmware_revision),
        beams: fl.number_of_beams,
        cells: fl.number_of_cells,
    }
}

fn summarize(fpath: &Path) -> Result<Info> {
    let reader = std::fs::File::open(fpath).context("opening input")?;
    let mut frames = read_ensemble_frames(reader, SyncConfig::default(), 8192);

    let mut summary = Summary::default();
    let mut instrument_info = None;
    let mut data_types: BTreeMap<String, usize> = BTreeMap::default();
    let mut unknown_ids = BTreeSet::default();

    for frame in frames.by_ref() {
        let frame = frame.context("reading input")?;
        let ensemble = match Ensemble::decode(&frame.data) {
            Ok(ensemble) => ensemble,
            Err(err) => {
                debug!("failed to decode ensemble: {err}");
                summary.decode_failures += 1;
                continue;
            }
        };
        summary.total_ensembles += 1;
        if instrument_info.is_none() {
            instrument_info = Some(instrument(&ensemble));
        }

        for data_type in ensemble.data_types() {
            *data_types.entry(data_type.to_string()).or_default() += 1;
        }
        unknown_ids.extend(ensemble.unknown_ids.iter().copied());

        if let Some(number) = ensemble.ensemble_number() {
            if summary.first_ensemble.is_none() {
                summary.first_ensemble = Some(number);
            }
            summary.last_ensemble = Some(number);
        }
        if let Some(time) = ensemble.instrument_time() {
            summary.first_time = summary
                .first_time
                .map_or(Some(time), |cur| Some(cmp::min(time, cur)));
            summary.last_time = summary
                .last_time
                .map_or(Some(time), |cur| Some(cmp::max(time, cur)));
        } else if ensemble.has(DataType::VariableLeader) {
            debug!("invalid instrument time in ensemble {:?}", ensemble.ensemble_number());
        }
    }

    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        instrument: instrument_info,
        summary,
        framing: frames.stats(),
        data_types,
        unknown_ids,
    })
}

pub fn info(fpath: &Path, format: &Format) -> Result<()> {
    let info = summarize(fpath)?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")
        }
        Format::Text => {
            let data = render_text(&info).context("serializing info")?;
            stdout()
                .write_all(str::as_bytes(&data))
                .context("writing to stdout")
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let num = usize::try_from(num).unwrap_or_default().max(v.len());
        format!("{v:>num$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("compiling template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
===============================================================================
Serial:     {{ instrument.serial_number }}
Frequency:  {{ instrument.frequency_khz }} kHz
Firmware:   {{ instrument.firmware }}
Layout:     {{ instrument.beams }} beams x {{ instrument.cells }} cells
First:      {{ summary.first_ensemble }} {{ summary.first_time }}
Last:       {{ summary.last_ensemble }} {{ summary.last_time }}
Ensembles:  {{ summary.total_ensembles }}
Undecoded:  {{ summary.decode_failures }}
Unknown:    {{ #each unknown_ids }}{{ this }}{{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
-------------------------------------------------------------------------------
Bytes       False starts   Checksum failures   Overruns
{{ lpad 10 framing.bytes }}  {{ lpad 12 framing.false_starts }}   {{ lpad 17 framing.checksum_failures }}   {{ lpad 8 framing.overruns }}
-------------------------------------------------------------------------------
Data type                 Count
-------------------------------------------------------------------------------
{{ #each data_types }}{{ lpad 24 @key }}  {{ lpad 6 this }}
{{/each }}
";
