use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Outcome of checking a frame's running sum against its declared checksum.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Integrity {
    /// Sum matched the declared checksum.
    Ok,
    /// Sum was within the rule's tolerance, but not equal.
    Tolerated,
    Failed,
}

impl Integrity {
    #[must_use]
    pub fn is_accepted(self) -> bool {
        !matches!(self, Integrity::Failed)
    }
}

/// Decides whether a running byte sum agrees with a declared checksum.
pub trait ChecksumRule: Send + Sync + Debug {
    fn check(&self, sum: u32, declared: u16) -> Integrity;
}

/// Byte sum reduced modulo `modulus`, accepting values within `tolerance` of the declared
/// checksum on either side (wrapping at the modulus).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModularSum {
    pub modulus: u32,
    pub tolerance: u32,
}

impl ModularSum {
    /// Rule used for PD0 ensembles.
    ///
    /// Captured instrument data has been observed to disagree with its checksum by one, so
    /// the declared value +/-1 is accepted.
    pub const PD0: ModularSum = ModularSum {
        modulus: 65535,
        tolerance: 1,
    };

    #[must_use]
    pub fn strict(modulus: u32) -> Self {
        ModularSum {
            modulus,
            tolerance: 0,
        }
    }
}

impl ChecksumRule for ModularSum {
    fn check(&self, sum: u32, declared: u16) -> Integrity {
        let m = self.modulus;
        let declared = u32::from(declared);
        let computed = sum % m;
        if computed == declared {
            return Integrity::Ok;
        }
        for k in 1..=self.tolerance.min(m / 2) {
            let above = (computed + k) % m;
            let below = (computed + m - k) % m;
            if above == declared || below == declared {
                return Integrity::Tolerated;
            }
        }
        Integrity::Failed
    }
}

/// Unsigned sum of all bytes in `dat`.
#[must_use]
pub fn byte_sum(dat: &[u8]) -> u32 {
    dat.iter().map(|b| u32::from(*b)).sum()
}
