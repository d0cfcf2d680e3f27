//! 24-bit BidCoS radio addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest value representable by a radio address.
pub const ADDRESS_MASK: u32 = 0x00FF_FFFF;

/// A 24-bit radio address as carried in the packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(u32);

impl Address {
    /// Create an address, discarding bits above the 24-bit range.
    pub const fn new(value: u32) -> Self {
        Self(value & ADDRESS_MASK)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Big-endian byte representation used on the wire.
    pub fn to_bytes(self) -> [u8; 3] {
        [(self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8]
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | bytes[2] as u32)
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_masks_to_24_bits() {
        assert_eq!(Address::new(0xFF12_3456).value(), 0x12_3456);
    }

    #[test]
    fn test_address_bytes() {
        let address = Address::new(0x1A2B3C);
        assert_eq!(address.to_bytes(), [0x1A, 0x2B, 0x3C]);
        assert_eq!(Address::from_bytes([0x1A, 0x2B, 0x3C]), address);
        assert_eq!(address.to_string(), "0x1A2B3C");
    }
}
