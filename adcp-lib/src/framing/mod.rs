//! Ensemble framing.
//!
//! Locates PD0 ensembles in a byte stream delivered in arbitrarily sized chunks. Chunk
//! boundaries need not line up with ensemble boundaries, and the start signature
//! ([`PD0_SIGNATURE`]) regularly occurs by chance inside ensemble data, so a candidate is
//! only emitted after its header, declared length and running checksum have been verified.
//!
//! [`DelimitedSynchronizer`] implements the same contract for line oriented ASCII
//! instruments where records are separated by a terminator and carry no length or checksum.
mod bytes;
mod delimited;
mod integrity;
mod synchronizer;

pub use delimited::*;
pub use integrity::*;
pub use synchronizer::*;

use serde::{Deserialize, Serialize};

/// PD0 header ID followed by the data source ID.
pub const PD0_SIGNATURE: [u8; 2] = [0x7f, 0x7f];

/// Number of trailing checksum bytes not included in an ensemble's declared length.
pub const CHECKSUM_LEN: usize = 2;

/// A validated ensemble as emitted by the [Synchronizer].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// All ensemble bytes, header through checksum.
    pub data: Vec<u8>,
    /// Running byte sum of everything before the checksum.
    pub sum: u32,
    /// Checksum as declared by the trailing two bytes.
    pub checksum: u16,
    pub integrity: Integrity,
}

impl Frame {
    /// Declared number of bytes in the ensemble, excluding the checksum. `None` if `data`
    /// is too short to hold the length field.
    #[must_use]
    pub fn declared_len(&self) -> Option<usize> {
        let len = self.data.get(2..4)?;
        Some(usize::from(u16::from_le_bytes([len[0], len[1]])))
    }

    #[must_use]
    pub fn num_data_types(&self) -> Option<u8> {
        self.data.get(5).copied()
    }

    /// True when the running sum modulo 65535 equals the declared checksum exactly, i.e.,
    /// without relying on the off-by-one tolerance.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.sum % 65535 == u32::from(self.checksum)
    }
}
