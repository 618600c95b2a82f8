use serde::{Deserialize, Serialize};

use super::bits::u16_le;
use crate::framing::PD0_SIGNATURE;
use crate::prelude::*;

/// Ensemble header: signature, declared length, spare byte and the data type offset table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Number of bytes in the ensemble excluding the 2-byte checksum.
    pub num_bytes: u16,
    pub spare: u8,
    /// Offset of each data type from the start of the ensemble, in ensemble order. The first
    /// is always the fixed leader.
    pub offsets: Vec<u16>,
}

impl Header {
    /// Size of the fixed part of the header, before the offset table.
    pub const LEN: usize = 6;

    /// Decode the header from the start of an ensemble.
    ///
    /// # Errors
    /// [Error::NotEnoughData] if `dat` is shorter than the header and its offset table, or
    /// [Error::InvalidHeader] if the signature is wrong or there are no data types.
    pub fn decode(dat: &[u8]) -> Result<Self> {
        if dat.len() < Self::LEN {
            return Err(Error::NotEnoughData {
                actual: dat.len(),
                minimum: Self::LEN,
            });
        }
        if dat[..2] != PD0_SIGNATURE {
            return Err(Error::InvalidHeader(format!(
                "bad signature {:02x}{:02x}",
                dat[0], dat[1]
            )));
        }
        let num_types = usize::from(dat[5]);
        if num_types == 0 {
            return Err(Error::InvalidHeader("no data types".to_string()));
        }
        let len = Self::LEN + 2 * num_types;
        if dat.len() < len {
            return Err(Error::NotEnoughData {
                actual: dat.len(),
                minimum: len,
            });
        }

        Ok(Header {
            num_bytes: u16_le(dat, 2),
            spare: dat[4],
            offsets: (0..num_types)
                .map(|i| u16_le(dat, Self::LEN + 2 * i))
                .collect(),
        })
    }

    #[must_use]
    pub fn num_data_types(&self) -> usize {
        self.offsets.len()
    }

    /// Number of header bytes including the offset table.
    #[must_use]
    pub fn len(&self) -> usize {
        Self::LEN + 2 * self.offsets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offset of the reserved field that precedes the checksum.
    #[must_use]
    pub fn reserved_offset(&self) -> usize {
        usize::from(self.num_bytes).saturating_sub(2)
    }

    /// Byte range of the data type at `idx`: from its offset up to the next larger offset in
    /// the table, or the reserved field when it is the last.
    #[must_use]
    pub fn span(&self, idx: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::from(*self.offsets.get(idx)?);
        let end = self
            .offsets
            .iter()
            .map(|o| usize::from(*o))
            .filter(|o| *o > start)
            .min()
            .unwrap_or_else(|| self.reserved_offset());
        Some(start..end.max(start))
    }
}
