//! Peer session
//!
//! Per-remote connection lifecycle and state machine. A session owns its
//! socket epoch: a reader task that demultiplexes incoming frames and a
//! writer task that drains the outbound queue. The scheduler only ever
//! talks to a session through non-blocking enqueues and atomic state
//! reads, so no piece lock is ever held across socket I/O.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::bitfield::Bitfield;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::metainfo::Sha1Hash;
use crate::peer::{self, Handshake, Message, HANDSHAKE_SIZE};
use crate::piece::Block;

/// Connection status of a session.
///
/// `Pending → Establishing → Established → Killed`; a killed session may be
/// brought back to `Establishing` by the next keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionStatus {
    /// Created, never connected
    Pending = 0,
    /// TCP connect + handshake in progress
    Establishing = 1,
    /// Handshake verified, reader/writer running
    Established = 2,
    /// Connection dead; eligible for reconnect
    Killed = 3,
}

impl From<u8> for ConnectionStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Establishing,
            2 => Self::Established,
            _ => Self::Killed,
        }
    }
}

/// Per-peer session state.
pub struct PeerSession {
    /// Remote address
    pub addr: SocketAddr,
    num_pieces: usize,
    config: ClientConfig,

    remote_id: RwLock<Option<[u8; 20]>>,
    status: AtomicU8,

    /// We are choking the remote (always true; this client never serves)
    am_choking: AtomicBool,
    /// We are interested in the remote's pieces
    am_interested: AtomicBool,
    /// The remote is choking us; requests are pointless while set
    peer_choking: AtomicBool,
    /// The remote wants our pieces
    peer_interested: AtomicBool,

    /// What the remote claims to have. Starts all-zero and is updated by
    /// `bitfield` and `have` messages.
    bitfield: RwLock<Bitfield>,

    /// Sender side of the outbound queue of the current connection epoch.
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    /// Cancels the reader of the current connection epoch.
    epoch: Mutex<Option<CancellationToken>>,
}

impl PeerSession {
    /// Create a session in `Pending` state; no connection is attempted.
    pub fn new(addr: SocketAddr, num_pieces: usize, config: ClientConfig) -> Self {
        Self {
            addr,
            num_pieces,
            config,
            remote_id: RwLock::new(None),
            status: AtomicU8::new(ConnectionStatus::Pending as u8),
            am_choking: AtomicBool::new(true),
            am_interested: AtomicBool::new(false),
            peer_choking: AtomicBool::new(true),
            peer_interested: AtomicBool::new(false),
            bitfield: RwLock::new(Bitfield::new(num_pieces)),
            outbound: Mutex::new(None),
            epoch: Mutex::new(None),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.load(Ordering::Acquire).into()
    }

    /// The remote's peer id, once the handshake has completed.
    pub fn remote_id(&self) -> Option<[u8; 20]> {
        *self.remote_id.read()
    }

    /// Whether a request may be dispatched to this session right now:
    /// established, unchoked by the remote, and we declared interest.
    pub fn can_request(&self) -> bool {
        self.status() == ConnectionStatus::Established
            && !self.peer_choking.load(Ordering::Acquire)
            && self.am_interested.load(Ordering::Acquire)
    }

    /// Whether the remote claims to have `index`.
    pub fn has_piece(&self, index: u32) -> bool {
        self.bitfield.read().check(index)
    }

    /// Connect, handshake and spin up the reader/writer pair.
    ///
    /// On success the session is `Established` and the returned channel
    /// yields every block the remote sends; the caller owns draining it.
    pub async fn establish(
        self: Arc<Self>,
        info_hash: Sha1Hash,
        our_id: [u8; 20],
        our_bitfield: Bitfield,
    ) -> Result<mpsc::UnboundedReceiver<Block>> {
        self.set_status(ConnectionStatus::Establishing);

        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(self.addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.set_status(ConnectionStatus::Killed);
                return Err(ClientError::network(format!("failed to connect: {}", e)));
            }
            Err(_) => {
                self.set_status(ConnectionStatus::Killed);
                return Err(ClientError::network("peer connection timeout"));
            }
        };

        let mut stream = stream;
        if let Err(e) = self.handshake(&mut stream, info_hash, our_id).await {
            self.set_status(ConnectionStatus::Killed);
            return Err(e);
        }

        // Fresh connection: both sides choked, neither interested, and the
        // remote's piece map unknown until it announces one.
        self.am_choking.store(true, Ordering::Release);
        self.am_interested.store(false, Ordering::Release);
        self.peer_choking.store(true, Ordering::Release);
        self.peer_interested.store(false, Ordering::Release);
        *self.bitfield.write() = Bitfield::new(self.num_pieces);

        // A previous epoch may still be winding down after a kill.
        if let Some(old) = self.epoch.lock().take() {
            old.cancel();
        }

        let (read_half, write_half) = stream.into_split();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();
        let (block_tx, block_rx) = mpsc::unbounded_channel::<Block>();
        let epoch = CancellationToken::new();

        *self.outbound.lock() = Some(out_tx);
        *self.epoch.lock() = Some(epoch.clone());

        let writer_session = Arc::clone(&self);
        tokio::spawn(async move {
            writer_session.run_writer(write_half, out_rx).await;
        });

        let reader_session = Arc::clone(&self);
        tokio::spawn(async move {
            reader_session.run_reader(read_half, block_tx, epoch).await;
        });

        // Protocol courtesies: our bitfield first, then interest.
        let greeting = self
            .send(Message::Bitfield {
                bitfield: our_bitfield.to_bytes(),
            })
            .and_then(|_| self.send_interested());
        if let Err(e) = greeting {
            self.kill();
            return Err(e);
        }

        self.set_status(ConnectionStatus::Established);
        tracing::info!(peer = %self.addr, "peer session established");

        Ok(block_rx)
    }

    /// Exchange and verify the 68-byte handshake.
    async fn handshake(
        &self,
        stream: &mut TcpStream,
        info_hash: Sha1Hash,
        our_id: [u8; 20],
    ) -> Result<()> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let ours = Handshake::new(info_hash, our_id).encode();
        timeout(self.config.io_timeout, stream.write_all(&ours))
            .await
            .map_err(|_| ClientError::network("handshake send timeout"))?
            .map_err(|e| ClientError::network(format!("handshake send failed: {}", e)))?;

        let mut response = [0u8; HANDSHAKE_SIZE];
        timeout(self.config.io_timeout, stream.read_exact(&mut response))
            .await
            .map_err(|_| ClientError::network("handshake receive timeout"))?
            .map_err(|e| ClientError::network(format!("handshake receive failed: {}", e)))?;

        let theirs = Handshake::decode(&response)?;
        if theirs.info_hash != info_hash {
            return Err(ClientError::peer("info hash mismatch"));
        }

        *self.remote_id.write() = Some(theirs.peer_id);
        Ok(())
    }

    /// Drain the outbound queue into the socket; submission order is write
    /// order.
    async fn run_writer(
        self: Arc<Self>,
        mut write_half: tokio::net::tcp::OwnedWriteHalf,
        mut out_rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = out_rx.recv().await {
            let result = timeout(
                self.config.io_timeout,
                peer::write_message(&mut write_half, &msg),
            )
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(peer = %self.addr, err = %e, "peer write failed");
                    self.kill();
                    return;
                }
                Err(_) => {
                    tracing::debug!(peer = %self.addr, "peer write timeout");
                    self.kill();
                    return;
                }
            }
        }
    }

    /// Read frames until the connection dies, routing piece payloads to the
    /// receive dispatcher and folding everything else into session state.
    async fn run_reader(
        self: Arc<Self>,
        mut read_half: tokio::net::tcp::OwnedReadHalf,
        block_tx: mpsc::UnboundedSender<Block>,
        epoch: CancellationToken,
    ) {
        let mut buf = BytesMut::with_capacity(peer::REQUEST_SIZE as usize * 2);

        loop {
            let msg = tokio::select! {
                _ = epoch.cancelled() => return,
                msg = peer::read_message(&mut read_half, &mut buf) => msg,
            };

            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(peer = %self.addr, err = %e, "peer read failed");
                    self.kill();
                    return;
                }
            };

            tracing::trace!(peer = %self.addr, msg = ?msg_kind(&msg), "received message");

            match msg {
                Message::KeepAlive => {}
                Message::Choke => self.peer_choking.store(true, Ordering::Release),
                Message::Unchoke => self.peer_choking.store(false, Ordering::Release),
                Message::Interested => self.peer_interested.store(true, Ordering::Release),
                Message::NotInterested => self.peer_interested.store(false, Ordering::Release),
                Message::Have { index } => {
                    self.bitfield.write().set(index);
                }
                Message::Bitfield { bitfield } => {
                    match Bitfield::from_bytes(&bitfield, self.num_pieces) {
                        Ok(parsed) => *self.bitfield.write() = parsed,
                        Err(e) => {
                            tracing::warn!(peer = %self.addr, err = %e, "invalid bitfield, closing session");
                            self.kill();
                            return;
                        }
                    }
                }
                Message::Piece {
                    index,
                    begin,
                    block,
                } => {
                    if block_tx
                        .send(Block {
                            index,
                            begin,
                            data: block,
                        })
                        .is_err()
                    {
                        // Receive dispatcher is gone; the torrent is
                        // shutting down.
                        self.kill();
                        return;
                    }
                }
                // Leech-only: we never serve, so inbound requests are noise.
                Message::Request { index, .. } => {
                    tracing::debug!(peer = %self.addr, index, "ignoring request from peer");
                }
                Message::Cancel { .. } => {}
                Message::Unknown { id } => {
                    tracing::debug!(peer = %self.addr, id, "ignoring unknown message id");
                }
            }
        }
    }

    /// Enqueue a message for the writer. Fails when no connection epoch is
    /// live.
    pub fn send(&self, msg: Message) -> Result<()> {
        let outbound = self.outbound.lock();
        let sender = outbound
            .as_ref()
            .ok_or_else(|| ClientError::network("peer not connected"))?;
        sender
            .send(msg)
            .map_err(|_| ClientError::network("peer connection closed"))
    }

    /// Request a block.
    pub fn send_request(&self, index: u32, begin: u32, length: u32) -> Result<()> {
        self.send(Message::Request {
            index,
            begin,
            length,
        })
    }

    /// Withdraw a block request.
    pub fn send_cancel(&self, index: u32, begin: u32, length: u32) -> Result<()> {
        self.send(Message::Cancel {
            index,
            begin,
            length,
        })
    }

    /// Announce a freshly verified piece.
    pub fn send_have(&self, index: u32) -> Result<()> {
        self.send(Message::Have { index })
    }

    /// Declare interest in the remote's pieces.
    pub fn send_interested(&self) -> Result<()> {
        self.am_interested.store(true, Ordering::Release);
        self.send(Message::Interested)
    }

    /// Withdraw interest; used on graceful shutdown.
    pub fn send_not_interested(&self) -> Result<()> {
        self.am_interested.store(false, Ordering::Release);
        self.send(Message::NotInterested)
    }

    /// Keep the connection alive.
    pub fn send_keep_alive(&self) -> Result<()> {
        self.send(Message::KeepAlive)
    }

    /// Tear down the current connection epoch and mark the session killed.
    /// The keep-alive loop may establish a fresh epoch later.
    pub fn close(&self) {
        if let Some(epoch) = self.epoch.lock().take() {
            epoch.cancel();
        }
        self.outbound.lock().take();
        self.set_status(ConnectionStatus::Killed);
    }

    /// Mark the session dead after an I/O failure. The stale outbound
    /// sender is dropped so the writer task winds down.
    fn kill(&self) {
        self.outbound.lock().take();
        self.set_status(ConnectionStatus::Killed);
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

fn msg_kind(msg: &Message) -> &'static str {
    match msg {
        Message::KeepAlive => "keep-alive",
        Message::Choke => "choke",
        Message::Unchoke => "unchoke",
        Message::Interested => "interested",
        Message::NotInterested => "not-interested",
        Message::Have { .. } => "have",
        Message::Bitfield { .. } => "bitfield",
        Message::Request { .. } => "request",
        Message::Piece { .. } => "piece",
        Message::Cancel { .. } => "cancel",
        Message::Unknown { .. } => "unknown",
    }
}
