//! Single-bit flag masks.
//!
//! Masks are stored as they appear in the metadata (a JSON integer), but bit
//! tests use the single bit the mask selects. The signed 32-bit sign-bit mask
//! (`-2147483648`) therefore tests bit 31 only, whether the pixel came from
//! `int32` storage (sign-extended or not) or from `uint32` storage.

use serde::{Deserialize, Serialize};

use crate::error::{FlagError, Result};

/// The only non-positive mask accepted: bit 31 on signed 32-bit storage.
pub const SIGN_BIT_MASK_I32: i64 = i32::MIN as i64;

/// A validated flag bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct FlagMask(i64);

impl FlagMask {
    /// Create a mask from its raw metadata value.
    pub fn new(value: i64) -> Result<Self> {
        if value == SIGN_BIT_MASK_I32 || (value > 0 && value.count_ones() == 1) {
            Ok(Self(value))
        } else {
            Err(FlagError::InvalidMask(value))
        }
    }

    /// Create the mask for a bit index.
    pub fn from_bit(bit: u32) -> Result<Self> {
        if bit >= 63 {
            return Err(FlagError::InvalidMask(i64::MIN));
        }
        Self::new(1i64 << bit)
    }

    /// The raw value as written in the metadata.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Zero-based index of the bit this mask selects.
    pub fn bit(&self) -> u32 {
        if self.is_sign_bit() {
            31
        } else {
            self.0.trailing_zeros()
        }
    }

    /// Whether this is the signed 32-bit sign-bit mask.
    pub fn is_sign_bit(&self) -> bool {
        self.0 == SIGN_BIT_MASK_I32
    }

    /// Test whether the flag is set in a pixel value.
    pub fn matches(&self, value: i64) -> bool {
        (value as u64) & self.bits() != 0
    }

    /// The single-bit pattern with the bit at [`FlagMask::bit`] set.
    pub fn bits(&self) -> u64 {
        1u64 << self.bit()
    }
}

impl TryFrom<i64> for FlagMask {
    type Error = FlagError;

    fn try_from(value: i64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FlagMask> for i64 {
    fn from(mask: FlagMask) -> Self {
        mask.0
    }
}

impl std::fmt::Display for FlagMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bit_masks_accepted() {
        for bit in 0..31 {
            let mask = FlagMask::new(1 << bit).unwrap();
            assert_eq!(mask.bit(), bit);
            assert!(!mask.is_sign_bit());
        }
    }

    #[test]
    fn test_sign_bit_mask() {
        let mask = FlagMask::new(-2147483648).unwrap();
        assert!(mask.is_sign_bit());
        assert_eq!(mask.bit(), 31);
        assert_eq!(mask.bits(), 0x8000_0000);
    }

    #[test]
    fn test_invalid_masks_rejected() {
        for value in [0, 3, 6, -1, -2, 12, -4294967296] {
            assert!(matches!(
                FlagMask::new(value),
                Err(FlagError::InvalidMask(v)) if v == value
            ));
        }
    }

    #[test]
    fn test_sign_bit_matches_twos_complement_values() {
        let mask = FlagMask::new(SIGN_BIT_MASK_I32).unwrap();
        // int32 storage, sign-extended
        assert!(mask.matches(i32::MIN as i64));
        assert!(mask.matches(-1));
        // uint32 storage
        assert!(mask.matches(0x8000_0000));
        assert!(!mask.matches(0x7FFF_FFFF));
        assert!(!mask.matches(0));
    }

    #[test]
    fn test_sign_bit_ignores_high_bits() {
        let mask = FlagMask::new(SIGN_BIT_MASK_I32).unwrap();
        assert!(!mask.matches(1 << 32));
        assert!(!mask.matches(1 << 40));
        assert!(!mask.matches(i64::MIN));
        assert!(mask.matches((1 << 40) | 0x8000_0000));
    }

    #[test]
    fn test_wide_masks() {
        let mask = FlagMask::from_bit(40).unwrap();
        assert!(mask.matches(1 << 40));
        assert!(!mask.matches(1 << 32));
        assert!(!mask.matches(i32::MIN as i64 & 0xFFFF_FFFF));
    }

    #[test]
    fn test_low_bits_do_not_match_sign_bit_value() {
        for bit in 0..31 {
            let mask = FlagMask::from_bit(bit).unwrap();
            assert!(!mask.matches(i32::MIN as i64), "bit {bit}");
        }
    }

    #[test]
    fn test_serde_roundtrip_rejects_invalid() {
        let mask: FlagMask = serde_json::from_str("1024").unwrap();
        assert_eq!(mask.bit(), 10);
        assert!(serde_json::from_str::<FlagMask>("5").is_err());
    }
}
