use ndarray::{Array2, ArrayView1};
use serde::Serialize;

use super::bits::i16_le;
use super::DataType;
use crate::prelude::*;

/// Velocity value marking a bad or missing measurement.
pub const BAD_VELOCITY: i16 = i16::MIN;

/// Per-cell, per-beam profile data.
///
/// Values are indexed `[cell, beam]`, following the on-the-wire order where all beams for a
/// cell are adjacent.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Profile<T> {
    pub data_type: DataType,
    pub values: Array2<T>,
}

impl<T> Profile<T> {
    #[must_use]
    pub fn number_of_cells(&self) -> usize {
        self.values.nrows()
    }

    #[must_use]
    pub fn number_of_beams(&self) -> usize {
        self.values.ncols()
    }

    /// All beam values for the 0-based `cell`.
    ///
    /// # Panics
    /// If `cell` is out of bounds.
    #[must_use]
    pub fn cell(&self, cell: usize) -> ArrayView1<'_, T> {
        self.values.row(cell)
    }

    /// All cell values for the 0-based `beam`.
    ///
    /// # Panics
    /// If `beam` is out of bounds.
    #[must_use]
    pub fn beam(&self, beam: usize) -> ArrayView1<'_, T> {
        self.values.column(beam)
    }
}

fn check_len(data_type: DataType, dat: &[u8], minimum: usize) -> Result<()> {
    if dat.len() < minimum {
        return Err(Error::TooShort {
            section: data_type.name(),
            actual: dat.len(),
            minimum,
        });
    }
    Ok(())
}

impl Profile<i16> {
    /// Decode a velocity profile from the bytes spanning the section, starting at its ID.
    ///
    /// # Errors
    /// [Error::TooShort] if `dat` cannot hold `cells` x `beams` 2-byte values.
    pub fn decode_velocity(dat: &[u8], cells: usize, beams: usize) -> Result<Self> {
        let data_type = DataType::Velocity;
        let n = cells * beams;
        check_len(data_type, dat, 2 + 2 * n)?;

        let values: Vec<i16> = (0..n).map(|i| i16_le(dat, 2 + 2 * i)).collect();
        Ok(Profile {
            data_type,
            values: Array2::from_shape_vec((cells, beams), values)?,
        })
    }

    /// Number of values that are not [BAD_VELOCITY].
    #[must_use]
    pub fn num_good(&self) -> usize {
        self.values.iter().filter(|v| **v != BAD_VELOCITY).count()
    }
}

impl Profile<u8> {
    /// Decode a profile with 1 byte per value, e.g., correlation or echo intensity, from the
    /// bytes spanning the section, starting at its ID.
    ///
    /// # Errors
    /// [Error::TooShort] if `dat` cannot hold `cells` x `beams` values.
    pub fn decode_bytes(
        data_type: DataType,
        dat: &[u8],
        cells: usize,
        beams: usize,
    ) -> Result<Self> {
        let n = cells * beams;
        check_len(data_type, dat, 2 + n)?;

        Ok(Profile {
            data_type,
            values: Array2::from_shape_vec((cells, beams), dat[2..2 + n].to_vec())?,
        })
    }
}
