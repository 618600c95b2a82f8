use serde::{Deserialize, Serialize};

use super::bits::{i16_le, u16_le};
use super::DataType;
use crate::prelude::*;

const BEAMS: usize = 4;

fn u16s(dat: &[u8], offset: usize) -> [u16; BEAMS] {
    std::array::from_fn(|i| u16_le(dat, offset + 2 * i))
}

fn i16s(dat: &[u8], offset: usize) -> [i16; BEAMS] {
    std::array::from_fn(|i| i16_le(dat, offset + 2 * i))
}

fn u8s(dat: &[u8], offset: usize) -> [u8; BEAMS] {
    std::array::from_fn(|i| dat[offset + i])
}

/// Bottom track data, one value per beam for a 4 beam system.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BottomTrack {
    pub pings_per_ensemble: u16,
    pub delay_before_reacquire: u16,
    pub correlation_magnitude_min: u8,
    pub evaluation_amplitude_min: u8,
    pub percent_good_min: u8,
    pub mode: u8,
    /// mm/s.
    pub error_velocity_max: u16,
    /// Low 16 bits of the range to bottom, centimeters. See [BottomTrack::range].
    pub range_lsb: [u16; BEAMS],
    /// mm/s.
    pub velocity: [i16; BEAMS],
    pub correlation: [u8; BEAMS],
    pub evaluation_amplitude: [u8; BEAMS],
    pub percent_good: [u8; BEAMS],
    /// Decimeters.
    pub reference_layer_min: u16,
    pub reference_layer_near: u16,
    pub reference_layer_far: u16,
    pub reference_velocity: [i16; BEAMS],
    pub reference_correlation: [u8; BEAMS],
    pub reference_intensity: [u8; BEAMS],
    pub reference_percent_good: [u8; BEAMS],
    /// Decimeters.
    pub max_depth: u16,
    pub rssi_amplitude: [u8; BEAMS],
    pub gain: u8,
    pub range_msb: [u8; BEAMS],
}

impl BottomTrack {
    pub const LEN: usize = 81;

    /// Decode from the bytes spanning the section, starting at its ID.
    ///
    /// # Errors
    /// [Error::TooShort] if `dat` is shorter than [BottomTrack::LEN], or
    /// [Error::UnexpectedId] if it does not start with the bottom track ID.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::TooShort {
                section: "bottom track",
                actual: dat.len(),
                minimum: Self::LEN,
            });
        }
        let id = u16_le(dat, 0);
        if id != DataType::BottomTrack.id() {
            return Err(Error::UnexpectedId {
                expected: DataType::BottomTrack.id(),
                actual: id,
            });
        }

        Ok(BottomTrack {
            pings_per_ensemble: u16_le(dat, 2),
            delay_before_reacquire: u16_le(dat, 4),
            correlation_magnitude_min: dat[6],
            evaluation_amplitude_min: dat[7],
            percent_good_min: dat[8],
            mode: dat[9],
            error_velocity_max: u16_le(dat, 10),
            range_lsb: u16s(dat, 16),
            velocity: i16s(dat, 24),
            correlation: u8s(dat, 32),
            evaluation_amplitude: u8s(dat, 36),
            percent_good: u8s(dat, 40),
            reference_layer_min: u16_le(dat, 44),
            reference_layer_near: u16_le(dat, 46),
            reference_layer_far: u16_le(dat, 48),
            reference_velocity: i16s(dat, 50),
            reference_correlation: u8s(dat, 58),
            reference_intensity: u8s(dat, 62),
            reference_percent_good: u8s(dat, 66),
            max_depth: u16_le(dat, 70),
            rssi_amplitude: u8s(dat, 72),
            gain: dat[76],
            range_msb: u8s(dat, 77),
        })
    }

    /// Full 24-bit range to bottom for each beam, centimeters. Zero means no detection.
    #[must_use]
    pub fn range(&self) -> [u32; BEAMS] {
        std::array::from_fn(|i| (u32::from(self.range_msb[i]) << 16) | u32::from(self.range_lsb[i]))
    }
}
