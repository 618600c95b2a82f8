use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::bits::{i16_le, u16_le, u32_le};
use super::fixed_leader::PingInterval;
use super::DataType;
use crate::prelude::*;

/// Real time clock with a 2-digit year.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rtc {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

/// Y2K compliant real time clock.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Y2kClock {
    pub century: u8,
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

fn datetime(year: i32, clock: [u8; 6]) -> Option<NaiveDateTime> {
    let [month, day, hour, minute, second, hundredths] = clock.map(u32::from);
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_milli_opt(
        hour,
        minute,
        second,
        hundredths * 10,
    )
}

impl Rtc {
    /// Years 80 and later are taken to be 1900s.
    #[must_use]
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        let century = if self.year >= 80 { 1900 } else { 2000 };
        datetime(
            century + i32::from(self.year),
            [
                self.month,
                self.day,
                self.hour,
                self.minute,
                self.second,
                self.hundredths,
            ],
        )
    }
}

impl Y2kClock {
    #[must_use]
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        datetime(
            i32::from(self.century) * 100 + i32::from(self.year),
            [
                self.month,
                self.day,
                self.hour,
                self.minute,
                self.second,
                self.hundredths,
            ],
        )
    }
}

/// Per-ensemble dynamic values: time, attitude and environment.
///
/// Newer firmware appends pressure and a Y2K clock; those are `None` when the section is
/// too short to contain them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VariableLeader {
    /// Low 16 bits of the ensemble number. See [VariableLeader::ensemble_number].
    pub ensemble_number_lsb: u16,
    pub rtc: Rtc,
    /// Incremented each time the 16-bit ensemble number rolls over.
    pub ensemble_number_msb: u8,
    pub bit_result: u16,
    /// m/s.
    pub speed_of_sound: u16,
    /// Decimeters.
    pub depth_of_transducer: u16,
    /// Hundredths of a degree.
    pub heading: u16,
    /// Hundredths of a degree.
    pub pitch: i16,
    /// Hundredths of a degree.
    pub roll: i16,
    /// Parts per thousand.
    pub salinity: u16,
    /// Hundredths of a degree Celsius.
    pub temperature: i16,
    pub min_pre_ping_wait: PingInterval,
    pub heading_std_dev: u8,
    pub pitch_std_dev: u8,
    pub roll_std_dev: u8,
    pub adc_channels: [u8; 8],
    pub error_status_word: u32,
    /// Decapascals.
    pub pressure: Option<u32>,
    pub pressure_variance: Option<u32>,
    pub y2k_clock: Option<Y2kClock>,
}

impl VariableLeader {
    /// Minimum length; everything through the error status word.
    pub const MIN_LEN: usize = 46;
    const PRESSURE_END: usize = 56;
    const Y2K_END: usize = 65;

    /// Decode from the bytes spanning the section, starting at its ID.
    ///
    /// # Errors
    /// [Error::TooShort] if `dat` is shorter than [VariableLeader::MIN_LEN], or
    /// [Error::UnexpectedId] if it does not start with the variable leader ID.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::MIN_LEN {
            return Err(Error::TooShort {
                section: "variable leader",
                actual: dat.len(),
                minimum: Self::MIN_LEN,
            });
        }
        let id = u16_le(dat, 0);
        if id != DataType::VariableLeader.id() {
            return Err(Error::UnexpectedId {
                expected: DataType::VariableLeader.id(),
                actual: id,
            });
        }

        let mut adc_channels = [0u8; 8];
        adc_channels.copy_from_slice(&dat[34..42]);

        let (pressure, pressure_variance) = if dat.len() >= Self::PRESSURE_END {
            (Some(u32_le(dat, 48)), Some(u32_le(dat, 52)))
        } else {
            (None, None)
        };
        let y2k_clock = (dat.len() >= Self::Y2K_END).then(|| Y2kClock {
            century: dat[57],
            year: dat[58],
            month: dat[59],
            day: dat[60],
            hour: dat[61],
            minute: dat[62],
            second: dat[63],
            hundredths: dat[64],
        });

        Ok(VariableLeader {
            ensemble_number_lsb: u16_le(dat, 2),
            rtc: Rtc {
                year: dat[4],
                month: dat[5],
                day: dat[6],
                hour: dat[7],
                minute: dat[8],
                second: dat[9],
                hundredths: dat[10],
            },
            ensemble_number_msb: dat[11],
            bit_result: u16_le(dat, 12),
            speed_of_sound: u16_le(dat, 14),
            depth_of_transducer: u16_le(dat, 16),
            heading: u16_le(dat, 18),
            pitch: i16_le(dat, 20),
            roll: i16_le(dat, 22),
            salinity: u16_le(dat, 24),
            temperature: i16_le(dat, 26),
            min_pre_ping_wait: PingInterval {
                minutes: dat[28],
                seconds: dat[29],
                hundredths: dat[30],
            },
            heading_std_dev: dat[31],
            pitch_std_dev: dat[32],
            roll_std_dev: dat[33],
            adc_channels,
            error_status_word: u32_le(dat, 42),
            pressure,
            pressure_variance,
            y2k_clock,
        })
    }

    /// Full ensemble number including rollovers.
    #[must_use]
    pub fn ensemble_number(&self) -> u32 {
        (u32::from(self.ensemble_number_msb) << 16) | u32::from(self.ensemble_number_lsb)
    }

    /// Ensemble time from the Y2K clock if present, otherwise from the 2-digit RTC. `None`
    /// if the clock fields do not form a valid date and time.
    #[must_use]
    pub fn instrument_time(&self) -> Option<NaiveDateTime> {
        match self.y2k_clock {
            Some(clock) => clock.datetime(),
            None => self.rtc.datetime(),
        }
    }
}
