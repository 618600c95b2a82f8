use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::bits::{bit, i16_le, u16_le, u32_le, CoordinateTransform, Sensors, SystemConfig};
use super::DataType;
use crate::prelude::*;

/// Minutes, seconds and hundredths of a second.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingInterval {
    pub minutes: u8,
    pub seconds: u8,
    pub hundredths: u8,
}

impl PingInterval {
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(
            u64::from(self.minutes) * 60_000
                + u64::from(self.seconds) * 1000
                + u64::from(self.hundredths) * 10,
        )
    }
}

/// Instrument configuration. Present in every ensemble, always as the first data type.
///
/// Values are raw counts in instrument units; see the instrument's command and output
/// reference for scaling.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FixedLeader {
    pub cpu_firmware_version: u8,
    pub cpu_firmware_revision: u8,
    pub system_configuration: u16,
    /// Non-zero when the data was produced by a simulator.
    pub real_sim_flag: u8,
    pub lag_length: u8,
    pub number_of_beams: u8,
    pub number_of_cells: u8,
    pub pings_per_ensemble: u16,
    /// Centimeters.
    pub depth_cell_length: u16,
    /// Centimeters.
    pub blank_after_transmit: u16,
    pub profiling_mode: u8,
    pub low_correlation_threshold: u8,
    pub code_repetitions: u8,
    pub percent_good_minimum: u8,
    /// mm/s.
    pub error_velocity_threshold: u16,
    pub time_between_pings: PingInterval,
    /// Raw coordinate transform byte. See [FixedLeader::coordinate_transform] and friends.
    pub coordinate_transform_byte: u8,
    /// Hundredths of a degree.
    pub heading_alignment: i16,
    /// Hundredths of a degree.
    pub heading_bias: i16,
    pub sensor_source_byte: u8,
    pub sensors_available_byte: u8,
    /// Centimeters.
    pub bin_1_distance: u16,
    /// Centimeters.
    pub transmit_pulse_length: u16,
    pub reference_layer_start: u8,
    pub reference_layer_end: u8,
    pub false_target_threshold: u8,
    pub spare: u8,
    /// Centimeters.
    pub transmit_lag_distance: u16,
    pub cpu_board_serial_number: [u8; 8],
    pub system_bandwidth: u16,
    pub system_power: u8,
    pub base_frequency_index: u8,
    pub serial_number: u32,
    pub beam_angle: u8,
}

impl FixedLeader {
    pub const LEN: usize = 59;

    /// Decode from the bytes starting at the fixed leader ID.
    ///
    /// # Errors
    /// [Error::TooShort] if `dat` is shorter than [FixedLeader::LEN], or
    /// [Error::UnexpectedId] if it does not start with the fixed leader ID.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::TooShort {
                section: "fixed leader",
                actual: dat.len(),
                minimum: Self::LEN,
            });
        }
        let id = u16_le(dat, 0);
        if id != DataType::FixedLeader.id() {
            return Err(Error::UnexpectedId {
                expected: DataType::FixedLeader.id(),
                actual: id,
            });
        }

        let mut cpu_board_serial_number = [0u8; 8];
        cpu_board_serial_number.copy_from_slice(&dat[42..50]);

        Ok(FixedLeader {
            cpu_firmware_version: dat[2],
            cpu_firmware_revision: dat[3],
            system_configuration: u16_le(dat, 4),
            real_sim_flag: dat[6],
            lag_length: dat[7],
            number_of_beams: dat[8],
            number_of_cells: dat[9],
            pings_per_ensemble: u16_le(dat, 10),
            depth_cell_length: u16_le(dat, 12),
            blank_after_transmit: u16_le(dat, 14),
            profiling_mode: dat[16],
            low_correlation_threshold: dat[17],
            code_repetitions: dat[18],
            percent_good_minimum: dat[19],
            error_velocity_threshold: u16_le(dat, 20),
            time_between_pings: PingInterval {
                minutes: dat[22],
                seconds: dat[23],
                hundredths: dat[24],
            },
            coordinate_transform_byte: dat[25],
            heading_alignment: i16_le(dat, 26),
            heading_bias: i16_le(dat, 28),
            sensor_source_byte: dat[30],
            sensors_available_byte: dat[31],
            bin_1_distance: u16_le(dat, 32),
            transmit_pulse_length: u16_le(dat, 34),
            reference_layer_start: dat[36],
            reference_layer_end: dat[37],
            false_target_threshold: dat[38],
            spare: dat[39],
            transmit_lag_distance: u16_le(dat, 40),
            cpu_board_serial_number,
            system_bandwidth: u16_le(dat, 50),
            system_power: dat[52],
            base_frequency_index: dat[53],
            serial_number: u32_le(dat, 54),
            beam_angle: dat[58],
        })
    }

    #[must_use]
    pub fn system_config(&self) -> SystemConfig {
        SystemConfig::from_word(self.system_configuration)
    }

    #[must_use]
    pub fn coordinate_transform(&self) -> CoordinateTransform {
        CoordinateTransform::from_ex(self.coordinate_transform_byte)
    }

    #[must_use]
    pub fn tilts_used(&self) -> bool {
        bit(self.coordinate_transform_byte, 2)
    }

    #[must_use]
    pub fn three_beam_solution(&self) -> bool {
        bit(self.coordinate_transform_byte, 1)
    }

    #[must_use]
    pub fn bin_mapping(&self) -> bool {
        bit(self.coordinate_transform_byte, 0)
    }

    /// Sensors used to compute the ensemble's environmental values.
    #[must_use]
    pub fn sensor_source(&self) -> Sensors {
        Sensors::from_byte(self.sensor_source_byte)
    }

    #[must_use]
    pub fn sensors_available(&self) -> Sensors {
        Sensors::from_byte(self.sensors_available_byte)
    }

    #[must_use]
    pub fn is_simulated(&self) -> bool {
        self.real_sim_flag != 0
    }

    /// Number of cells in each profile, i.e., beams x cells.
    #[must_use]
    pub fn profile_len(&self) -> usize {
        usize::from(self.number_of_beams) * usize::from(self.number_of_cells)
    }
}
