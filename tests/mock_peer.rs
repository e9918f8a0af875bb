//! Mock BitTorrent seeder for testing
//!
//! A scriptable TCP peer that answers the handshake, announces its
//! bitfield, and serves blocks. Fault hooks cover the recovery paths:
//! corrupting the payload of chosen pieces and dropping the first request
//! for each block.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use minnow::peer::{read_message, write_message, Handshake, Message, HANDSHAKE_SIZE};
use minnow::Bitfield;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Mock peer configuration.
#[derive(Clone)]
pub struct MockPeerConfig {
    /// Info hash to accept connections for
    pub info_hash: [u8; 20],
    /// Our peer id
    pub peer_id: [u8; 20],
    /// Number of pieces in the torrent
    pub num_pieces: usize,
    /// Piece payloads to serve
    pub piece_data: HashMap<u32, Vec<u8>>,
    /// Unchoke immediately after the bitfield
    pub auto_unchoke: bool,
    /// Serve these pieces with flipped bytes so verification fails
    pub corrupt_pieces: HashSet<u32>,
    /// Never answer block requests
    pub ignore_requests: bool,
    /// Drop the first request for each block, serve repeats
    pub drop_first_requests: bool,
}

impl MockPeerConfig {
    /// Config for a well-behaved seeder with no pieces yet.
    pub fn new(info_hash: [u8; 20], num_pieces: usize) -> Self {
        let mut peer_id = [0u8; 20];
        peer_id[..8].copy_from_slice(b"-MO0001-");
        for byte in &mut peer_id[8..] {
            *byte = rand::random();
        }

        Self {
            info_hash,
            peer_id,
            num_pieces,
            piece_data: HashMap::new(),
            auto_unchoke: true,
            corrupt_pieces: HashSet::new(),
            ignore_requests: false,
            drop_first_requests: false,
        }
    }

    /// Serve `data` for piece `index`.
    pub fn with_piece(mut self, index: u32, data: Vec<u8>) -> Self {
        self.piece_data.insert(index, data);
        self
    }

    /// Serve every piece of `pieces`.
    pub fn with_all_pieces(mut self, pieces: &[Vec<u8>]) -> Self {
        for (index, data) in pieces.iter().enumerate() {
            self.piece_data.insert(index as u32, data.clone());
        }
        self
    }

    /// Corrupt the payload of piece `index`.
    pub fn corrupting(mut self, index: u32) -> Self {
        self.corrupt_pieces.insert(index);
        self
    }

    /// Never answer block requests.
    pub fn ignoring_requests(mut self) -> Self {
        self.ignore_requests = true;
        self
    }

    /// Drop the first request for each block, serve repeats.
    pub fn dropping_first_requests(mut self) -> Self {
        self.drop_first_requests = true;
        self
    }
}

/// A mock seeder listening on localhost.
pub struct MockPeer {
    config: MockPeerConfig,
    listener: TcpListener,
    served: Arc<Mutex<HashSet<(u32, u32)>>>,
}

impl MockPeer {
    /// Bind a listener on an ephemeral port.
    pub async fn new(config: MockPeerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self {
            config,
            listener,
            served: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    /// Address the peer listens on.
    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().unwrap()
    }

    /// Accept connections until dropped.
    pub fn start_accepting(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        let peer = Arc::clone(&self);
                        tokio::spawn(async move {
                            let _ = peer.handle_connection(stream).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        // Handshake exchange.
        let mut theirs = [0u8; HANDSHAKE_SIZE];
        stream.read_exact(&mut theirs).await?;
        let decoded = Handshake::decode(&theirs)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad handshake"))?;
        if decoded.info_hash != self.config.info_hash {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "info hash mismatch",
            ));
        }

        let ours = Handshake::new(self.config.info_hash, self.config.peer_id).encode();
        stream.write_all(&ours).await?;

        // Announce what we have.
        let mut bitfield = Bitfield::new(self.config.num_pieces);
        for index in self.config.piece_data.keys() {
            bitfield.set(*index);
        }
        self.write(&mut stream, &Message::Bitfield {
            bitfield: bitfield.to_bytes(),
        })
        .await?;

        if self.config.auto_unchoke {
            self.write(&mut stream, &Message::Unchoke).await?;
        }

        let mut buf = BytesMut::new();
        loop {
            let msg = match read_message(&mut stream, &mut buf).await {
                Ok(msg) => msg,
                Err(_) => return Ok(()), // client hung up
            };

            match msg {
                Message::Interested => {
                    if !self.config.auto_unchoke {
                        self.write(&mut stream, &Message::Unchoke).await?;
                    }
                }
                Message::Request {
                    index,
                    begin,
                    length,
                } => {
                    if self.config.ignore_requests {
                        continue;
                    }
                    if self.config.drop_first_requests
                        && self.served.lock().insert((index, begin))
                    {
                        // First sighting of this block: stay silent.
                        continue;
                    }

                    let Some(piece) = self.config.piece_data.get(&index) else {
                        continue;
                    };
                    let end = (begin + length) as usize;
                    if end > piece.len() {
                        continue;
                    }

                    let mut block = piece[begin as usize..end].to_vec();
                    if self.config.corrupt_pieces.contains(&index) {
                        for byte in &mut block {
                            *byte = !*byte;
                        }
                    }

                    self.write(&mut stream, &Message::Piece {
                        index,
                        begin,
                        block,
                    })
                    .await?;
                }
                _ => {}
            }
        }
    }

    async fn write(&self, stream: &mut TcpStream, msg: &Message) -> std::io::Result<()> {
        write_message(stream, msg)
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))
    }
}
