//! Peer node
//!
//! Owns the listening endpoint, the outbound dial path, the registry of
//! active peer links, and the shared block store and directory. Every new
//! link, accepted or dialed, goes through the same directory handshake
//! before its serve loop starts.

pub mod protocol;
pub mod session;

use crate::block::{BlockAddress, BlockStore};
use crate::config::NodeConfig;
use crate::directory::DirectoryTable;
use protocol::{decode_directory, encode_directory, read_frame, write_frame, PeerCommand};
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Peer networking errors
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Result of a block request against a connected peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Block received and stored locally under the recomputed address
    Received(BlockAddress),
    /// The peer does not have the block
    NotFound,
    /// No reply within the request timeout
    TimedOut,
    /// No registered connection for the peer key
    NoConnection,
    /// The reply was not part of the block protocol
    Unexpected(String),
}

type ReplyFrame = (PeerCommand, Vec<u8>);
type SessionRegistry = Arc<Mutex<HashMap<String, Arc<PeerLink>>>>;

/// A live connection to one peer.
///
/// The session thread owns the read half; every writer (session replies and
/// outgoing requests) goes through the shared write handle. At most one
/// block request is outstanding per link; its reply slot lives here.
pub(crate) struct PeerLink {
    remote: SocketAddr,
    writer: Mutex<TcpStream>,
    pending: Mutex<Option<SyncSender<ReplyFrame>>>,
}

impl PeerLink {
    fn new(remote: SocketAddr, writer: TcpStream) -> Self {
        Self {
            remote,
            writer: Mutex::new(writer),
            pending: Mutex::new(None),
        }
    }

    pub(crate) fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Send one frame, serialized against other writers on this link
    pub(crate) fn send(&self, command: PeerCommand, data: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap();
        write_frame(&mut *writer, command, data)
    }

    /// Route an inbound frame to the outstanding request. Hands the frame
    /// back when no request is waiting.
    pub(crate) fn deliver_reply(&self, command: PeerCommand, data: Vec<u8>) -> Option<Vec<u8>> {
        let mut pending = self.pending.lock().unwrap();
        match pending.take() {
            Some(tx) => {
                // A dropped receiver means the requester already gave up
                let _ = tx.send((command, data));
                None
            }
            None => Some(data),
        }
    }

    /// Install the reply slot for a new request; refused while another
    /// request is still outstanding
    fn arm_reply_slot(&self) -> Option<Receiver<ReplyFrame>> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_some() {
            return None;
        }
        let (tx, rx) = mpsc::sync_channel(1);
        *pending = Some(tx);
        Some(rx)
    }

    pub(crate) fn disarm_reply_slot(&self) {
        self.pending.lock().unwrap().take();
    }

    fn close(&self) {
        let writer = self.writer.lock().unwrap();
        let _ = writer.shutdown(Shutdown::Both);
    }
}

/// A peer in the block exchange network: listener, dialer, and owner of the
/// node's shared state
pub struct PeerNode {
    node_id: String,
    bind_addr: String,
    request_timeout: Duration,
    blocks: Arc<BlockStore>,
    directory: Arc<DirectoryTable>,
    peers: SessionRegistry,
    shutdown: Arc<AtomicBool>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl PeerNode {
    /// Create a node from configuration; nothing is bound until `start`
    pub fn new(config: &NodeConfig) -> Self {
        let node_id = config.node_id.clone().unwrap_or_else(random_node_id);
        Self {
            node_id,
            bind_addr: config.bind_addr.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            blocks: Arc::new(BlockStore::new()),
            directory: Arc::new(DirectoryTable::new()),
            peers: Arc::new(Mutex::new(HashMap::new())),
            shutdown: Arc::new(AtomicBool::new(false)),
            local_addr: Mutex::new(None),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    pub fn directory(&self) -> &DirectoryTable {
        &self.directory
    }

    /// Keys of the currently registered peer links
    pub fn connected_peers(&self) -> Vec<String> {
        self.peers.lock().unwrap().keys().cloned().collect()
    }

    /// Bind the listen address and start accepting peers.
    ///
    /// Returns the bound address (useful when the configured port is 0).
    pub fn start(&self) -> Result<SocketAddr, PeerError> {
        let listener = TcpListener::bind(&self.bind_addr)?;
        let local = listener.local_addr()?;
        *self.local_addr.lock().unwrap() = Some(local);
        log::info!("Node {} listening on {}", self.node_id, local);

        let blocks = Arc::clone(&self.blocks);
        let directory = Arc::clone(&self.directory);
        let peers = Arc::clone(&self.peers);
        let shutdown = Arc::clone(&self.shutdown);
        thread::spawn(move || {
            accept_loop(listener, blocks, directory, peers, shutdown);
        });

        Ok(local)
    }

    /// Dial a peer, perform the handshake, and start serving the link.
    ///
    /// On any failure the registry is left without an entry; nothing
    /// retries.
    pub fn connect(&self, host: &str, port: u16) -> Result<(), PeerError> {
        match self.try_connect(host, port) {
            Ok(()) => {
                log::info!("Connected to peer at {}:{}", host, port);
                Ok(())
            }
            Err(e) => {
                log::warn!("Unable to connect to peer at {}:{}: {}", host, port, e);
                Err(e)
            }
        }
    }

    fn try_connect(&self, host: &str, port: u16) -> Result<(), PeerError> {
        let mut stream = TcpStream::connect((host, port))?;
        let remote = stream.peer_addr()?;
        exchange_directory(&mut stream, &self.directory)?;
        register_and_spawn(
            host.to_string(),
            stream,
            remote,
            Arc::clone(&self.blocks),
            Arc::clone(&self.directory),
            Arc::clone(&self.peers),
        )
    }

    /// Store a payload locally and return its content address
    pub fn store_block(&self, payload: &[u8]) -> BlockAddress {
        self.blocks.put(payload)
    }

    /// Ask a connected peer for a block by address.
    ///
    /// Received payloads are stored under the address recomputed from the
    /// bytes; the wire never supplies the stored key.
    pub fn request_block(
        &self,
        peer_key: &str,
        address: &BlockAddress,
    ) -> Result<RequestOutcome, PeerError> {
        let link = {
            let peers = self.peers.lock().unwrap();
            match peers.get(peer_key) {
                Some(link) => Arc::clone(link),
                None => {
                    log::warn!("No connection to peer: {}", peer_key);
                    return Ok(RequestOutcome::NoConnection);
                }
            }
        };

        let replies = match link.arm_reply_slot() {
            Some(rx) => rx,
            None => {
                return Ok(RequestOutcome::Unexpected(
                    "a request is already in flight on this link".to_string(),
                ))
            }
        };

        if let Err(e) = link.send(PeerCommand::RequestBlock, address.to_hex().as_bytes()) {
            link.disarm_reply_slot();
            return Err(e.into());
        }
        log::debug!("Requested block {} from {}", address, peer_key);

        match replies.recv_timeout(self.request_timeout) {
            Ok((PeerCommand::BlockData, payload)) => {
                let stored = self.blocks.put(&payload);
                if stored != *address {
                    log::warn!(
                        "Peer {} returned different content for {}; stored as {}",
                        peer_key,
                        address,
                        stored
                    );
                }
                Ok(RequestOutcome::Received(stored))
            }
            Ok((PeerCommand::BlockNotFound, _)) => {
                log::info!("Block {} not found at peer {}", address, peer_key);
                Ok(RequestOutcome::NotFound)
            }
            Ok((command, _)) => Ok(RequestOutcome::Unexpected(format!(
                "unexpected reply: {:?}",
                command
            ))),
            Err(RecvTimeoutError::Timeout) => {
                // Clear the slot so a late reply is logged as unsolicited
                // instead of answering the next request
                link.disarm_reply_slot();
                log::warn!("Request to {} timed out", peer_key);
                Ok(RequestOutcome::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => Ok(RequestOutcome::Unexpected(
                "connection closed before reply".to_string(),
            )),
        }
    }

    /// Best-effort shutdown: stop accepting, close every link
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let links: Vec<Arc<PeerLink>> = {
            let mut peers = self.peers.lock().unwrap();
            peers.drain().map(|(_, link)| link).collect()
        };
        for link in links {
            link.close();
        }

        // Poke the listener so the accept loop observes the flag
        if let Some(addr) = *self.local_addr.lock().unwrap() {
            let _ = TcpStream::connect(addr);
        }
        log::info!("Node {} stopped", self.node_id);
    }
}

fn random_node_id() -> String {
    format!("peer-{:08x}", rand::random::<u32>())
}

/// Accept inbound peers until shutdown
fn accept_loop(
    listener: TcpListener,
    blocks: Arc<BlockStore>,
    directory: Arc<DirectoryTable>,
    peers: SessionRegistry,
    shutdown: Arc<AtomicBool>,
) {
    for stream in listener.incoming() {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => {
                let blocks = Arc::clone(&blocks);
                let directory = Arc::clone(&directory);
                let peers = Arc::clone(&peers);
                if let Err(e) = admit_peer(stream, blocks, directory, peers) {
                    log::warn!("Failed to admit peer: {}", e);
                }
            }
            Err(e) => log::error!("Accept error: {}", e),
        }
    }
    log::info!("Accept loop stopped");
}

/// Handshake an accepted connection and hand it to a session
fn admit_peer(
    mut stream: TcpStream,
    blocks: Arc<BlockStore>,
    directory: Arc<DirectoryTable>,
    peers: SessionRegistry,
) -> Result<(), PeerError> {
    let remote = stream.peer_addr()?;
    log::info!("Peer connected from {}", remote);

    exchange_directory(&mut stream, &directory)?;

    // Full address, not bare IP: several peers may dial from one host
    let peer_key = remote.to_string();
    register_and_spawn(peer_key, stream, remote, blocks, directory, peers)
}

/// One-time bidirectional snapshot exchange on a fresh connection.
///
/// Both ends send their snapshot first and then read the remote one, so the
/// exchange cannot deadlock. Runs on the bare stream before any buffered
/// reader exists.
fn exchange_directory(stream: &mut TcpStream, directory: &DirectoryTable) -> Result<(), PeerError> {
    let snapshot = encode_directory(&directory.snapshot())?;
    write_frame(stream, PeerCommand::Directory, &snapshot)?;

    let (command, data) = read_frame(stream)?;
    if command != PeerCommand::Directory {
        return Err(PeerError::Handshake(format!(
            "expected directory snapshot, got {:?}",
            command
        )));
    }
    let remote = decode_directory(&data)?;
    log::debug!("Handshake received {} directory entries", remote.len());
    directory.merge(remote);
    Ok(())
}

/// Register a handshaken link and spawn its session thread
fn register_and_spawn(
    peer_key: String,
    stream: TcpStream,
    remote: SocketAddr,
    blocks: Arc<BlockStore>,
    directory: Arc<DirectoryTable>,
    peers: SessionRegistry,
) -> Result<(), PeerError> {
    let writer = stream.try_clone()?;
    let link = Arc::new(PeerLink::new(remote, writer));

    let previous = peers
        .lock()
        .unwrap()
        .insert(peer_key.clone(), Arc::clone(&link));
    if let Some(previous) = previous {
        log::warn!("Replacing existing link for {}", peer_key);
        previous.close();
    }

    thread::spawn(move || {
        if let Err(e) = session::serve_peer(stream, &link, &blocks, &directory) {
            log::warn!("Session error for {}: {}", remote, e);
        }

        // Wake any requester still waiting on this link
        link.disarm_reply_slot();

        // Deregister, unless a newer link already took the key
        let mut peers = peers.lock().unwrap();
        if let Some(current) = peers.get(&peer_key) {
            if Arc::ptr_eq(current, &link) {
                peers.remove(&peer_key);
            }
        }
    });
    Ok(())
}
