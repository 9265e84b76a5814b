//! Peer session serve loop
//!
//! One session per live connection, and the session thread is the only
//! reader on its socket: it serves inbound block and directory requests and
//! routes reply frames to the link's outstanding request. A fault here ends
//! this session and nothing else.

use super::protocol::{decode_directory, encode_directory, read_frame, PeerCommand};
use super::PeerLink;
use crate::block::{BlockAddress, BlockStore};
use crate::directory::DirectoryTable;
use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpStream};

/// Serve one peer link until EOF, I/O failure, or malformed input
pub(crate) fn serve_peer(
    stream: TcpStream,
    link: &PeerLink,
    blocks: &BlockStore,
    directory: &DirectoryTable,
) -> io::Result<()> {
    let remote = link.remote();
    let mut reader = BufReader::new(stream);

    loop {
        let (command, data) = match read_frame(&mut reader) {
            Ok(frame) => frame,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                log::info!("Peer {} disconnected", remote);
                return Ok(());
            }
            Err(e) => {
                log::warn!("Error reading frame from {}: {}", remote, e);
                return Err(e);
            }
        };

        match command {
            PeerCommand::RequestBlock => {
                handle_block_request(&data, link, blocks, remote)?;
            }
            PeerCommand::RequestDirectory => {
                let snapshot = encode_directory(&directory.snapshot())?;
                link.send(PeerCommand::Directory, &snapshot)?;
                log::info!("Sent directory snapshot to {}", remote);
            }
            PeerCommand::BlockData | PeerCommand::BlockNotFound => {
                if link.deliver_reply(command, data).is_some() {
                    log::warn!("Unsolicited {:?} from {}, dropping", command, remote);
                }
            }
            PeerCommand::Directory => {
                // A reply if a request is outstanding, gossip otherwise
                if let Some(data) = link.deliver_reply(command, data) {
                    let remote_entries = decode_directory(&data)?;
                    log::info!(
                        "Merging directory snapshot from {} ({} entries)",
                        remote,
                        remote_entries.len()
                    );
                    directory.merge(remote_entries);
                }
            }
            PeerCommand::Text => {
                let text = std::str::from_utf8(&data)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                log::info!("Message from {}: {}", remote, text);
            }
        }
    }
}

/// Answer a block request from the shared store
fn handle_block_request(
    data: &[u8],
    link: &PeerLink,
    blocks: &BlockStore,
    remote: SocketAddr,
) -> io::Result<()> {
    // An unparseable address is simply not a stored block
    let requested = std::str::from_utf8(data)
        .ok()
        .and_then(|hex| BlockAddress::from_hex(hex.trim()).ok());

    match requested.and_then(|address| blocks.get(&address).map(|payload| (address, payload))) {
        Some((address, payload)) => {
            link.send(PeerCommand::BlockData, &payload)?;
            log::info!("Sent block {} to {}", address, remote);
        }
        None => {
            link.send(PeerCommand::BlockNotFound, &[])?;
            log::info!(
                "Block not found: {}",
                String::from_utf8_lossy(data)
            );
        }
    }
    Ok(())
}
