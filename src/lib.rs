//! Peer-to-peer content-addressed block exchange
//!
//! Nodes store opaque payloads under the BLAKE3 digest of their content,
//! gossip a shared key-value directory when a link is established, and serve
//! block requests from peers over a framed TCP protocol.

pub mod block;
pub mod config;
pub mod directory;
pub mod peer;

pub use block::{BlockAddress, BlockStore};
pub use config::{ConfigError, NodeConfig};
pub use directory::DirectoryTable;
pub use peer::{PeerError, PeerNode, RequestOutcome};
