//! # minnow
//!
//! A minimal BitTorrent leecher. Given a `.torrent` file, minnow contacts
//! the HTTP tracker, discovers seeders, negotiates the peer wire protocol,
//! and downloads and verifies every piece of the content, writing the
//! result through a pluggable [`PieceStore`].
//!
//! The engine is leech-only: it never serves pieces beyond the protocol
//! courtesies needed to stay connected (keep-alives, HAVE broadcasts after
//! verification).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use minnow::{Client, ClientConfig, FileStore, Metainfo};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bytes = std::fs::read("debian.torrent")?;
//!     let metainfo = Metainfo::parse(&bytes)?;
//!
//!     let client = Client::new(ClientConfig::default())?;
//!     let store = Arc::new(FileStore::new("downloads", Arc::new(metainfo.clone())));
//!
//!     let id = client.work_on(metainfo, store).await?;
//!     client.wait_for(&id).await?;
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

// Modules
pub mod bencode;
pub mod bitfield;
pub mod client;
pub mod config;
pub mod error;
pub mod metainfo;
pub mod peer;
pub mod piece;
pub mod session;
pub mod store;
pub mod torrent;
pub mod tracker;

// Re-exports for convenience
pub use bitfield::Bitfield;
pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use metainfo::{FileEntry, Metainfo, Sha1Hash};
pub use peer::{Handshake, Message, REQUEST_SIZE};
pub use session::{ConnectionStatus, PeerSession};
pub use store::{FileStore, MemoryStore, PieceStore};
pub use torrent::Torrent;
pub use tracker::{
    generate_peer_id, AnnounceEvent, AnnounceRequest, AnnounceResponse, PeerAddr, TrackerClient,
};
