//! PD0 ensemble decoding.
//!
//! An ensemble is self describing: the header carries an offset table with one entry per
//! data type, and each data type starts with a 2-byte ID. The fixed leader is always first
//! and provides the number of beams and cells needed to size the profiles that follow. Other
//! data types are discovered from the table in whatever order and combination the instrument
//! was configured to output.
//!
//! ```text
//! [7f][7f][len:2][spare][N][offsets:2N][fixed leader][data types...][reserved:2][checksum:2]
//! ```
pub mod bits;
mod bottom_track;
mod fixed_leader;
mod header;
mod pipeline;
mod profile;
mod variable_leader;

pub use bottom_track::BottomTrack;
pub use fixed_leader::{FixedLeader, PingInterval};
pub use header::Header;
pub use pipeline::{decode_frames, EnsembleDecoder, EnsembleIter};
pub use profile::{Profile, BAD_VELOCITY};
pub use variable_leader::{Rtc, VariableLeader, Y2kClock};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::framing::{byte_sum, Frame, CHECKSUM_LEN};
use crate::prelude::*;
use bits::u16_le;

/// Data types that may appear in an ensemble, identified by the 2-byte ID at the start of
/// each.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    FixedLeader,
    VariableLeader,
    Velocity,
    Correlation,
    EchoIntensity,
    PercentGood,
    Status,
    BottomTrack,
    AuxiliarySensor,
}

impl DataType {
    pub const ALL: [DataType; 9] = [
        DataType::FixedLeader,
        DataType::VariableLeader,
        DataType::Velocity,
        DataType::Correlation,
        DataType::EchoIntensity,
        DataType::PercentGood,
        DataType::Status,
        DataType::BottomTrack,
        DataType::AuxiliarySensor,
    ];

    /// Look up the data type for a little-endian ID value.
    #[must_use]
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|dt| dt.id() == id)
    }

    #[must_use]
    pub fn id(self) -> u16 {
        match self {
            DataType::FixedLeader => 0x0000,
            DataType::VariableLeader => 0x0080,
            DataType::Velocity => 0x0100,
            DataType::Correlation => 0x0200,
            DataType::EchoIntensity => 0x0300,
            DataType::PercentGood => 0x0400,
            DataType::Status => 0x0500,
            DataType::BottomTrack => 0x0600,
            DataType::AuxiliarySensor => 0x0800,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DataType::FixedLeader => "fixed leader",
            DataType::VariableLeader => "variable leader",
            DataType::Velocity => "velocity",
            DataType::Correlation => "correlation",
            DataType::EchoIntensity => "echo intensity",
            DataType::PercentGood => "percent good",
            DataType::Status => "status",
            DataType::BottomTrack => "bottom track",
            DataType::AuxiliarySensor => "auxiliary sensor",
        }
    }

    /// Bytes per beam per cell for profile data types, `None` for everything else.
    #[must_use]
    pub fn bytes_per_cell(self) -> Option<usize> {
        match self {
            DataType::Velocity => Some(2),
            DataType::Correlation
            | DataType::EchoIntensity
            | DataType::PercentGood
            | DataType::Status => Some(1),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A decoded data type other than the fixed leader.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Section {
    VariableLeader(VariableLeader),
    Velocity(Profile<i16>),
    Correlation(Profile<u8>),
    EchoIntensity(Profile<u8>),
    PercentGood(Profile<u8>),
    Status(Profile<u8>),
    BottomTrack(BottomTrack),
    /// Undecoded bytes following the ID, up to the next data type.
    AuxiliarySensor(Vec<u8>),
}

impl Section {
    /// Decode the data type `data_type` from `dat`, the bytes spanning the section starting
    /// at its ID. Profiles are sized using `cells` and `beams` from the fixed leader.
    ///
    /// # Errors
    /// If `dat` is too short for the data type, or `data_type` is the fixed leader, which is
    /// never a [Section].
    pub fn decode(data_type: DataType, dat: &[u8], cells: usize, beams: usize) -> Result<Self> {
        Ok(match data_type {
            DataType::FixedLeader => {
                return Err(Error::Decode(
                    "fixed leader is not a section".to_string(),
                ))
            }
            DataType::VariableLeader => Section::VariableLeader(VariableLeader::decode(dat)?),
            DataType::Velocity => Section::Velocity(Profile::decode_velocity(dat, cells, beams)?),
            DataType::Correlation => {
                Section::Correlation(Profile::decode_bytes(data_type, dat, cells, beams)?)
            }
            DataType::EchoIntensity => {
                Section::EchoIntensity(Profile::decode_bytes(data_type, dat, cells, beams)?)
            }
            DataType::PercentGood => {
                Section::PercentGood(Profile::decode_bytes(data_type, dat, cells, beams)?)
            }
            DataType::Status => {
                Section::Status(Profile::decode_bytes(data_type, dat, cells, beams)?)
            }
            DataType::BottomTrack => Section::BottomTrack(BottomTrack::decode(dat)?),
            DataType::AuxiliarySensor => {
                Section::AuxiliarySensor(dat.get(2..).unwrap_or_default().to_vec())
            }
        })
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Section::VariableLeader(_) => DataType::VariableLeader,
            Section::Velocity(_) => DataType::Velocity,
            Section::Correlation(_) => DataType::Correlation,
            Section::EchoIntensity(_) => DataType::EchoIntensity,
            Section::PercentGood(_) => DataType::PercentGood,
            Section::Status(_) => DataType::Status,
            Section::BottomTrack(_) => DataType::BottomTrack,
            Section::AuxiliarySensor(_) => DataType::AuxiliarySensor,
        }
    }
}

/// A fully decoded ensemble.
///
/// # Example
/// ```no_run
/// use adcp::ensemble::Ensemble;
///
/// let dat = std::fs::read("ensemble.pd0").unwrap();
/// let ensemble = Ensemble::decode(&dat).unwrap();
/// if let Some(velocity) = ensemble.velocity() {
///     println!("cell 0: {}", velocity.cell(0));
/// }
/// ```
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Ensemble {
    pub header: Header,
    pub fixed_leader: FixedLeader,
    /// Data types following the fixed leader, in offset table order.
    pub sections: Vec<Section>,
    /// IDs found in the offset table that are not a known [DataType].
    pub unknown_ids: Vec<u16>,
    pub reserved: u16,
    /// Declared checksum.
    pub checksum: u16,
    /// Byte sum of the header through the reserved field.
    pub sum: u32,
    /// The complete ensemble bytes, header through checksum.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Ensemble {
    /// Decode a complete ensemble, header through checksum. Bytes beyond the declared length
    /// and checksum are ignored.
    ///
    /// Unknown data type IDs are skipped and recorded in [Ensemble::unknown_ids]. The
    /// checksum is not verified; see [Ensemble::is_valid].
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `data` is shorter than the declared length plus checksum,
    /// [Error::InvalidHeader] if the header or an offset is inconsistent with the declared
    /// length, or the error decoding a data type.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = Header::decode(data)?;
        let num_bytes = usize::from(header.num_bytes);
        let total = num_bytes + CHECKSUM_LEN;
        if data.len() < total {
            return Err(Error::NotEnoughData {
                actual: data.len(),
                minimum: total,
            });
        }
        let reserved_offset = header.reserved_offset();
        if reserved_offset < header.len() {
            return Err(Error::InvalidHeader(format!(
                "declared length {num_bytes} is shorter than the header"
            )));
        }
        for offset in header.offsets.iter().map(|o| usize::from(*o)) {
            if offset < header.len() || offset + 2 > reserved_offset {
                return Err(Error::InvalidHeader(format!(
                    "data type offset {offset} is outside the ensemble body"
                )));
            }
        }

        let span = |idx: usize| header.span(idx).map(|r| &data[r]).unwrap_or_default();

        let fixed_leader = FixedLeader::decode(span(0))?;
        let cells = usize::from(fixed_leader.number_of_cells);
        let beams = usize::from(fixed_leader.number_of_beams);

        let mut sections = Vec::with_capacity(header.num_data_types() - 1);
        let mut unknown_ids = Vec::default();
        for idx in 1..header.num_data_types() {
            let dat = span(idx);
            if dat.len() < 2 {
                return Err(Error::InvalidHeader(format!(
                    "data type offset {} leaves no room for an id",
                    header.offsets[idx]
                )));
            }
            let id = u16_le(dat, 0);
            match DataType::from_id(id) {
                None => {
                    debug!(id, offset = header.offsets[idx], "skipping unknown data type");
                    unknown_ids.push(id);
                }
                Some(DataType::FixedLeader) => {
                    debug!(offset = header.offsets[idx], "skipping repeated fixed leader");
                }
                Some(data_type) => sections.push(Section::decode(data_type, dat, cells, beams)?),
            }
        }

        Ok(Ensemble {
            fixed_leader,
            sections,
            unknown_ids,
            reserved: u16_le(data, reserved_offset),
            checksum: u16_le(data, num_bytes),
            sum: byte_sum(&data[..num_bytes]),
            data: data[..total].to_vec(),
            header,
        })
    }

    /// True if the byte sum modulo 65535 equals the declared checksum.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.sum % 65535 == u32::from(self.checksum)
    }

    /// Data types present, in offset table order, excluding unknown IDs.
    #[must_use]
    pub fn data_types(&self) -> Vec<DataType> {
        std::iter::once(DataType::FixedLeader)
            .chain(self.sections.iter().map(Section::data_type))
            .collect()
    }

    #[must_use]
    pub fn has(&self, data_type: DataType) -> bool {
        data_type == DataType::FixedLeader
            || self.sections.iter().any(|s| s.data_type() == data_type)
    }

    #[must_use]
    pub fn variable_leader(&self) -> Option<&VariableLeader> {
        self.sections.iter().find_map(|s| match s {
            Section::VariableLeader(v) => Some(v),
            _ => None,
        })
    }

    #[must_use]
    pub fn velocity(&self) -> Option<&Profile<i16>> {
        self.sections.iter().find_map(|s| match s {
            Section::Velocity(p) => Some(p),
            _ => None,
        })
    }

    #[must_use]
    pub fn correlation(&self) -> Option<&Profile<u8>> {
        self.sections.iter().find_map(|s| match s {
            Section::Correlation(p) => Some(p),
            _ => None,
        })
    }

    #[must_use]
    pub fn echo_intensity(&self) -> Option<&Profile<u8>> {
        self.sections.iter().find_map(|s| match s {
            Section::EchoIntensity(p) => Some(p),
            _ => None,
        })
    }

    #[must_use]
    pub fn percent_good(&self) -> Option<&Profile<u8>> {
        self.sections.iter().find_map(|s| match s {
            Section::PercentGood(p) => Some(p),
            _ => None,
        })
    }

    #[must_use]
    pub fn status(&self) -> Option<&Profile<u8>> {
        self.sections.iter().find_map(|s| match s {
            Section::Status(p) => Some(p),
            _ => None,
        })
    }

    #[must_use]
    pub fn bottom_track(&self) -> Option<&BottomTrack> {
        self.sections.iter().find_map(|s| match s {
            Section::BottomTrack(b) => Some(b),
            _ => None,
        })
    }

    #[must_use]
    pub fn auxiliary_sensor(&self) -> Option<&[u8]> {
        self.sections.iter().find_map(|s| match s {
            Section::AuxiliarySensor(b) => Some(b.as_slice()),
            _ => None,
        })
    }

    /// Ensemble number from the variable leader, if present.
    #[must_use]
    pub fn ensemble_number(&self) -> Option<u32> {
        self.variable_leader().map(VariableLeader::ensemble_number)
    }

    /// Instrument clock time from the variable leader, if present and valid.
    #[must_use]
    pub fn instrument_time(&self) -> Option<NaiveDateTime> {
        self.variable_leader()
            .and_then(VariableLeader::instrument_time)
    }
}

impl TryFrom<&Frame> for Ensemble {
    type Error = Error;

    fn try_from(frame: &Frame) -> Result<Self> {
        Ensemble::decode(&frame.data)
    }
}
