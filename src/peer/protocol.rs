//! Peer wire protocol
//!
//! Every message on a peer link uses one framing:
//! [1 byte: command] [4 bytes: length, little-endian] [payload...]
//!
//! Block requests, directory snapshots and free-text messages all share
//! this layout, so a single reader per link never has to switch framing
//! disciplines mid-stream.

use std::collections::HashMap;
use std::io::{self, Read, Write};

/// Upper bound on a frame payload; anything larger is malformed input
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Protocol commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerCommand {
    /// Ask for a block by hex address
    RequestBlock = 0x01,
    /// Block payload reply
    BlockData = 0x02,
    /// Negative block reply
    BlockNotFound = 0x03,
    /// Ask for a directory snapshot
    RequestDirectory = 0x04,
    /// Directory snapshot (JSON string map)
    Directory = 0x05,
    /// Opaque free-text message
    Text = 0x06,
}

impl TryFrom<u8> for PeerCommand {
    type Error = io::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PeerCommand::RequestBlock),
            0x02 => Ok(PeerCommand::BlockData),
            0x03 => Ok(PeerCommand::BlockNotFound),
            0x04 => Ok(PeerCommand::RequestDirectory),
            0x05 => Ok(PeerCommand::Directory),
            0x06 => Ok(PeerCommand::Text),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown command: {}", value),
            )),
        }
    }
}

/// Read a frame from the stream
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<(PeerCommand, Vec<u8>)> {
    // Read command byte
    let mut cmd_buf = [0u8; 1];
    reader.read_exact(&mut cmd_buf)?;
    let command = PeerCommand::try_from(cmd_buf[0])?;

    // Read length (4 bytes, little-endian)
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let length = u32::from_le_bytes(len_buf) as usize;
    if length > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes", length),
        ));
    }

    // Read payload
    let mut data = vec![0u8; length];
    if length > 0 {
        reader.read_exact(&mut data)?;
    }

    Ok((command, data))
}

/// Write a frame to the stream
pub fn write_frame<W: Write>(
    writer: &mut W,
    command: PeerCommand,
    data: &[u8],
) -> io::Result<()> {
    writer.write_all(&[command as u8])?;

    let length = data.len() as u32;
    writer.write_all(&length.to_le_bytes())?;

    if !data.is_empty() {
        writer.write_all(data)?;
    }

    writer.flush()
}

/// Serialize a directory snapshot for a Directory frame
pub fn encode_directory(entries: &HashMap<String, String>) -> io::Result<Vec<u8>> {
    serde_json::to_vec(entries).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Decode a Directory frame payload
pub fn decode_directory(data: &[u8]) -> io::Result<HashMap<String, String>> {
    serde_json::from_slice(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, PeerCommand::BlockData, b"payload bytes").unwrap();

        let (command, data) = read_frame(&mut buf.as_slice()).unwrap();
        assert_eq!(command, PeerCommand::BlockData);
        assert_eq!(data, b"payload bytes");
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, PeerCommand::BlockNotFound, &[]).unwrap();
        write_frame(&mut buf, PeerCommand::RequestDirectory, &[]).unwrap();

        let mut reader = buf.as_slice();
        let (command, data) = read_frame(&mut reader).unwrap();
        assert_eq!(command, PeerCommand::BlockNotFound);
        assert!(data.is_empty());
        let (command, data) = read_frame(&mut reader).unwrap();
        assert_eq!(command, PeerCommand::RequestDirectory);
        assert!(data.is_empty());
    }

    #[test]
    fn test_unknown_command_rejected() {
        let buf = [0x7Fu8, 0, 0, 0, 0];
        let err = read_frame(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = vec![PeerCommand::BlockData as u8];
        buf.extend_from_slice(&(u32::MAX).to_le_bytes());
        let err = read_frame(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_frame_is_eof() {
        let mut buf = Vec::new();
        write_frame(&mut buf, PeerCommand::BlockData, b"full payload").unwrap();
        buf.truncate(buf.len() - 4);

        let err = read_frame(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_directory_payload_round_trip() {
        let mut entries = HashMap::new();
        entries.insert("node-a".to_string(), "127.0.0.1:9400".to_string());
        entries.insert("node-b".to_string(), "127.0.0.1:9401".to_string());

        let encoded = encode_directory(&entries).unwrap();
        let decoded = decode_directory(&encoded).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn test_directory_payload_rejects_garbage() {
        assert!(decode_directory(b"not json").is_err());
        assert!(decode_directory(b"[1, 2, 3]").is_err());
    }
}
