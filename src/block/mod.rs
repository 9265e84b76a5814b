//! Content addressing
//!
//! A block's address is the BLAKE3 digest of its payload: a pure function
//! of the content, so identical payloads always map to the same address.

pub mod store;

pub use store::BlockStore;

use std::fmt;

/// Content address of a block (BLAKE3-256)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockAddress([u8; 32]);

impl BlockAddress {
    /// Compute the address of a payload
    pub fn from_data(data: &[u8]) -> Self {
        BlockAddress(blake3::hash(data).into())
    }

    /// Create an address from raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        BlockAddress(bytes)
    }

    /// Lowercase hex form, the canonical string representation
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex; must be exactly 64 hex characters
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(BlockAddress(arr))
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockAddress({})", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_deterministic() {
        let a = BlockAddress::from_data(b"some test data");
        let b = BlockAddress::from_data(b"some test data");
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), b.to_hex());
    }

    #[test]
    fn test_distinct_payloads_distinct_addresses() {
        let a = BlockAddress::from_data(b"payload one");
        let b = BlockAddress::from_data(b"payload two");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_round_trip() {
        let addr = BlockAddress::from_data(b"round trip");
        let hex = addr.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(BlockAddress::from_hex(&hex).unwrap(), addr);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(BlockAddress::from_hex("deadbeef").is_err());
        assert!(BlockAddress::from_hex("not hex at all").is_err());
        let long = "ab".repeat(40);
        assert!(BlockAddress::from_hex(&long).is_err());
    }
}
