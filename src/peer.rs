//! Peer wire protocol
//!
//! Message framing for the BitTorrent peer protocol v1 (BEP 3): the 68-byte
//! handshake and length-prefixed messages with ids 0 through 8.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ClientError, Result};
use crate::metainfo::Sha1Hash;

/// Protocol string for BitTorrent
const PROTOCOL_STRING: &[u8] = b"BitTorrent protocol";

/// Size of the handshake message
pub const HANDSHAKE_SIZE: usize = 68; // 1 + 19 + 8 + 20 + 20

/// Maximum message size (16 KiB block + overhead)
const MAX_MESSAGE_SIZE: usize = 32 * 1024;

/// Block request size (16 KiB); the last block of a piece may be shorter.
pub const REQUEST_SIZE: u32 = 16384;

/// The 68-byte connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// Info hash of the torrent being exchanged
    pub info_hash: Sha1Hash,
    /// Peer id of the sender
    pub peer_id: [u8; 20],
}

impl Handshake {
    /// Create a handshake for the given torrent.
    pub fn new(info_hash: Sha1Hash, peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    /// Encode to the 68-byte wire form. Reserved bytes are zero; this
    /// client advertises no extensions.
    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut buf = [0u8; HANDSHAKE_SIZE];
        buf[0] = PROTOCOL_STRING.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL_STRING);
        // buf[20..28] reserved, left zero
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    /// Decode and validate a received handshake. The caller still has to
    /// compare the info-hash against its own.
    pub fn decode(buf: &[u8; HANDSHAKE_SIZE]) -> Result<Self> {
        let pstrlen = buf[0] as usize;
        if pstrlen != PROTOCOL_STRING.len() {
            return Err(ClientError::peer(format!(
                "invalid protocol string length: {}",
                pstrlen
            )));
        }
        if &buf[1..20] != PROTOCOL_STRING {
            return Err(ClientError::peer("invalid protocol string"));
        }

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);

        Ok(Self { info_hash, peer_id })
    }
}

/// Peer wire protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Keep the connection alive (zero-length frame)
    KeepAlive,
    /// Stop serving the peer's requests
    Choke,
    /// Resume serving the peer's requests
    Unchoke,
    /// We want data from the peer
    Interested,
    /// We no longer want data from the peer
    NotInterested,
    /// The sender verified a piece
    Have { index: u32 },
    /// The sender's complete piece map
    Bitfield { bitfield: Vec<u8> },
    /// Ask for a block
    Request { index: u32, begin: u32, length: u32 },
    /// A block of piece data
    Piece {
        index: u32,
        begin: u32,
        block: Vec<u8>,
    },
    /// Withdraw an earlier request
    Cancel { index: u32, begin: u32, length: u32 },
    /// Message id outside the v1 set; tolerated and ignored
    Unknown { id: u8 },
}

impl Message {
    /// Encode the message with its length prefix.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::KeepAlive => vec![0, 0, 0, 0],
            Self::Choke => vec![0, 0, 0, 1, 0],
            Self::Unchoke => vec![0, 0, 0, 1, 1],
            Self::Interested => vec![0, 0, 0, 1, 2],
            Self::NotInterested => vec![0, 0, 0, 1, 3],

            Self::Have { index } => {
                let mut buf = vec![0, 0, 0, 5, 4];
                buf.extend_from_slice(&index.to_be_bytes());
                buf
            }

            Self::Bitfield { bitfield } => {
                let len = 1 + bitfield.len() as u32;
                let mut buf = Vec::with_capacity(4 + len as usize);
                buf.extend_from_slice(&len.to_be_bytes());
                buf.push(5);
                buf.extend_from_slice(bitfield);
                buf
            }

            Self::Request {
                index,
                begin,
                length,
            } => {
                let mut buf = vec![0, 0, 0, 13, 6];
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(&length.to_be_bytes());
                buf
            }

            Self::Piece {
                index,
                begin,
                block,
            } => {
                let len = 9 + block.len() as u32;
                let mut buf = Vec::with_capacity(4 + len as usize);
                buf.extend_from_slice(&len.to_be_bytes());
                buf.push(7);
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(block);
                buf
            }

            Self::Cancel {
                index,
                begin,
                length,
            } => {
                let mut buf = vec![0, 0, 0, 13, 8];
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(&length.to_be_bytes());
                buf
            }

            Self::Unknown { id } => vec![0, 0, 0, 1, *id],
        }
    }

    /// Decode a message body (without the length prefix).
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::KeepAlive);
        }

        let id = data[0];
        let payload = &data[1..];

        match id {
            0 => Ok(Self::Choke),
            1 => Ok(Self::Unchoke),
            2 => Ok(Self::Interested),
            3 => Ok(Self::NotInterested),

            4 => {
                if payload.len() < 4 {
                    return Err(ClientError::peer("have message too short"));
                }
                Ok(Self::Have {
                    index: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                })
            }

            5 => Ok(Self::Bitfield {
                bitfield: payload.to_vec(),
            }),

            6 => {
                if payload.len() < 12 {
                    return Err(ClientError::peer("request message too short"));
                }
                Ok(Self::Request {
                    index: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                    begin: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
                    length: u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]),
                })
            }

            7 => {
                if payload.len() < 8 {
                    return Err(ClientError::peer("piece message too short"));
                }
                Ok(Self::Piece {
                    index: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                    begin: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
                    block: payload[8..].to_vec(),
                })
            }

            8 => {
                if payload.len() < 12 {
                    return Err(ClientError::peer("cancel message too short"));
                }
                Ok(Self::Cancel {
                    index: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                    begin: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
                    length: u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]),
                })
            }

            _ => Ok(Self::Unknown { id }),
        }
    }
}

/// Read one length-prefixed message from the stream.
pub async fn read_message<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| ClientError::network(format!("receive failed: {}", e)))?;

    let len = u32::from_be_bytes(len_buf) as usize;

    if len == 0 {
        return Ok(Message::KeepAlive);
    }

    if len > MAX_MESSAGE_SIZE {
        return Err(ClientError::peer(format!("message too large: {} bytes", len)));
    }

    buf.resize(len, 0);
    reader
        .read_exact(buf)
        .await
        .map_err(|e| ClientError::network(format!("receive body failed: {}", e)))?;

    Message::decode(buf)
}

/// Write one message to the stream.
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&msg.encode())
        .await
        .map_err(|e| ClientError::network(format!("send failed: {}", e)))?;
    Ok(())
}
