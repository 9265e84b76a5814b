//! In-memory block storage
//!
//! Maps content addresses to payloads. Entries are immutable once inserted
//! and shared by every peer session on the node.

use super::BlockAddress;
use std::collections::HashMap;
use std::sync::RwLock;

/// Concurrent address -> payload map
pub struct BlockStore {
    blocks: RwLock<HashMap<BlockAddress, Vec<u8>>>,
}

impl BlockStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// Store a payload and return its address.
    ///
    /// The address is always recomputed from the bytes, never supplied by
    /// the caller. Re-inserting an existing payload is a no-op.
    pub fn put(&self, payload: &[u8]) -> BlockAddress {
        let address = BlockAddress::from_data(payload);
        {
            let mut blocks = self.blocks.write().unwrap();
            blocks.entry(address).or_insert_with(|| payload.to_vec());
        }
        log::info!("Stored block {}", address);
        address
    }

    /// Fetch a payload by address; absence is not an error
    pub fn get(&self, address: &BlockAddress) -> Option<Vec<u8>> {
        self.blocks.read().unwrap().get(address).cloned()
    }

    /// Check whether an address is present
    pub fn contains(&self, address: &BlockAddress) -> bool {
        self.blocks.read().unwrap().contains_key(address)
    }

    /// Number of stored blocks
    pub fn len(&self) -> usize {
        self.blocks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}
