//! Byte and bit extraction helpers.
//!
//! All multi-byte values in PD0 are little-endian. Bit numbers are 0-based from the least
//! significant bit. Nothing here consumes bytes or carries state; callers are responsible for
//! bounds checking the slices they pass in.
use serde::{Deserialize, Serialize};

#[inline]
#[must_use]
pub fn u16_le(dat: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([dat[offset], dat[offset + 1]])
}

#[inline]
#[must_use]
pub fn i16_le(dat: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([dat[offset], dat[offset + 1]])
}

/// 3-byte little-endian unsigned value.
#[inline]
#[must_use]
pub fn u24_le(dat: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([dat[offset], dat[offset + 1], dat[offset + 2], 0])
}

#[inline]
#[must_use]
pub fn u32_le(dat: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        dat[offset],
        dat[offset + 1],
        dat[offset + 2],
        dat[offset + 3],
    ])
}

#[inline]
#[must_use]
pub fn bit(byte: u8, n: u8) -> bool {
    (byte >> n) & 1 == 1
}

/// `width` bits starting at bit `lo`.
#[inline]
#[must_use]
pub fn field(byte: u8, lo: u8, width: u8) -> u8 {
    (byte >> lo) & ((1u16 << width) - 1) as u8
}

/// Coordinate system of velocity data, bits 3-4 of the coordinate transform byte.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateTransform {
    Beam,
    Instrument,
    Ship,
    Earth,
}

impl CoordinateTransform {
    #[must_use]
    pub fn from_ex(ex: u8) -> Self {
        match field(ex, 3, 2) {
            0 => Self::Beam,
            1 => Self::Instrument,
            2 => Self::Ship,
            _ => Self::Earth,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamPattern {
    Concave,
    Convex,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamDirection {
    Down,
    Up,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamAngle {
    Deg15,
    Deg20,
    Deg30,
    Other,
}

impl BeamAngle {
    /// Angle in degrees, if one of the standard angles.
    #[must_use]
    pub fn degrees(self) -> Option<u8> {
        match self {
            Self::Deg15 => Some(15),
            Self::Deg20 => Some(20),
            Self::Deg30 => Some(30),
            Self::Other => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamConfig {
    FourBeamJanus,
    FiveBeamJanusDemod,
    FiveBeamJanus2Demod,
    Other(u8),
}

/// System configuration word, decoded.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConfig {
    /// Transmit frequency in kHz. `None` for an unrecognized frequency code.
    pub frequency_khz: Option<u32>,
    pub beam_pattern: BeamPattern,
    /// Sensor configuration number, 1 to 4.
    pub sensor_config: u8,
    pub transducer_attached: bool,
    pub beam_direction: BeamDirection,
    pub beam_angle: BeamAngle,
    pub beam_config: BeamConfig,
}

impl SystemConfig {
    pub const FREQUENCIES_KHZ: [u32; 6] = [75, 150, 300, 600, 1200, 2400];

    #[must_use]
    pub fn from_word(word: u16) -> Self {
        let [lsb, msb] = word.to_le_bytes();
        SystemConfig {
            frequency_khz: Self::FREQUENCIES_KHZ
                .get(usize::from(field(lsb, 0, 3)))
                .copied(),
            beam_pattern: if bit(lsb, 3) {
                BeamPattern::Convex
            } else {
                BeamPattern::Concave
            },
            sensor_config: field(lsb, 4, 2) + 1,
            transducer_attached: bit(lsb, 6),
            beam_direction: if bit(lsb, 7) {
                BeamDirection::Up
            } else {
                BeamDirection::Down
            },
            beam_angle: match field(msb, 0, 2) {
                0 => BeamAngle::Deg15,
                1 => BeamAngle::Deg20,
                2 => BeamAngle::Deg30,
                _ => BeamAngle::Other,
            },
            beam_config: match field(msb, 4, 4) {
                0b0100 => BeamConfig::FourBeamJanus,
                0b0101 => BeamConfig::FiveBeamJanusDemod,
                0b1111 => BeamConfig::FiveBeamJanus2Demod,
                other => BeamConfig::Other(other),
            },
        }
    }
}

/// Sensor flags as used by both the sensor source and sensors available bytes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sensors {
    /// Speed of sound is calculated from depth, salinity and temperature.
    pub speed_of_sound: bool,
    pub depth: bool,
    pub heading: bool,
    pub pitch: bool,
    pub roll: bool,
    pub salinity: bool,
    pub temperature: bool,
}

impl Sensors {
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Sensors {
            speed_of_sound: bit(byte, 6),
            depth: bit(byte, 5),
            heading: bit(byte, 4),
            pitch: bit(byte, 3),
            roll: bit(byte, 2),
            salinity: bit(byte, 1),
            temperature: bit(byte, 0),
        }
    }
}
