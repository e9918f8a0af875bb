//! Client lifecycle and the tracker announce loop
//!
//! A [`Client`] tracks any number of torrents. `work_on` registers a
//! torrent (idempotent on its info-hash) and spawns two workers for it:
//! the piece scheduler and the announce loop that feeds it peers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio_util::task::TaskTracker;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::metainfo::Metainfo;
use crate::store::PieceStore;
use crate::torrent::Torrent;
use crate::tracker::{generate_peer_id, AnnounceEvent, AnnounceRequest, TrackerClient};

/// A BitTorrent leecher tracking multiple torrents.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    peer_id: [u8; 20],
    config: ClientConfig,
    tracker: TrackerClient,
    torrents: RwLock<HashMap<String, Arc<Torrent>>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl Client {
    /// Create a client with a fresh random peer id.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let tracker = TrackerClient::new(config.tracker_timeout)?;
        Ok(Self {
            inner: Arc::new(Inner {
                peer_id: generate_peer_id(),
                config,
                tracker,
                torrents: RwLock::new(HashMap::new()),
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Our peer id, as announced to trackers and peers.
    pub fn peer_id(&self) -> [u8; 20] {
        self.inner.peer_id
    }

    /// Start downloading a torrent into `store`. Returns the torrent id
    /// (the hex info-hash). Errors if the same info-hash is already
    /// tracked.
    pub async fn work_on(
        &self,
        metainfo: Metainfo,
        store: Arc<dyn PieceStore>,
    ) -> Result<String> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ClientError::Shutdown);
        }

        let id = metainfo.info_hash_hex();
        if self.inner.torrents.read().contains_key(&id) {
            return Err(ClientError::AlreadyTracked(id));
        }

        // Resume from whatever the store already holds.
        let resume = match store.load_bitfield().await {
            Ok(bitfield) => Some(bitfield),
            Err(e) => {
                tracing::warn!(err = %e, "failed to load resume bitfield, starting fresh");
                None
            }
        };

        let torrent = Torrent::new(
            Arc::new(metainfo),
            store,
            self.inner.config.clone(),
            self.inner.peer_id,
            resume,
        );

        {
            let mut torrents = self.inner.torrents.write();
            if torrents.contains_key(&id) {
                return Err(ClientError::AlreadyTracked(id));
            }
            torrents.insert(id.clone(), Arc::clone(&torrent));
        }

        tracing::info!(torrent = %id, "working on torrent");

        Arc::clone(&torrent).start();
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(async move {
            announce_loop(inner, torrent).await;
        });

        Ok(id)
    }

    /// Wait until the torrent completes or the client shuts down.
    pub async fn wait_for(&self, id: &str) -> Result<()> {
        let torrent = self
            .inner
            .torrents
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;

        let completed = torrent.completed();
        tokio::select! {
            _ = completed.cancelled() => Ok(()),
            _ = self.inner.shutdown.cancelled() => Err(ClientError::Shutdown),
        }
    }

    /// Cancel every torrent and join all workers. Each announce loop sends
    /// its final `stopped` event on the way out.
    pub async fn close(&self) -> Result<()> {
        tracing::info!("client shutting down");
        self.inner.shutdown.cancel();

        let torrents: Vec<Arc<Torrent>> =
            self.inner.torrents.read().values().cloned().collect();
        for torrent in &torrents {
            torrent.cancel();
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        for torrent in &torrents {
            torrent.join().await;
        }

        Ok(())
    }
}

/// Build an announce request carrying the torrent's live counters.
fn announce_request(
    inner: &Inner,
    torrent: &Torrent,
    event: Option<AnnounceEvent>,
    tracker_id: Option<String>,
) -> AnnounceRequest {
    let mut request = AnnounceRequest::new(
        torrent.metainfo.info_hash,
        inner.peer_id,
        inner.config.port,
    );
    request.uploaded = torrent.uploaded();
    request.downloaded = torrent.downloaded();
    request.left = torrent.left();
    request.compact = Some(true);
    request.numwant = Some(inner.config.numwant as i64);
    request.event = event;
    request.tracker_id = tracker_id;
    request
}

/// The per-torrent announce control loop.
///
/// The first announce carries `event=started` and is retried with backoff
/// until the tracker answers; a response without an interval is fatal for
/// the loop (the download continues with whatever peers it has). After
/// that, re-announce on the tracker's interval, flag completion exactly
/// once, and send a best-effort `stopped` on cancellation.
async fn announce_loop(inner: Arc<Inner>, torrent: Arc<Torrent>) {
    let announce = torrent.metainfo.announce.clone();
    let id = torrent.id();
    let cancel = torrent.cancel_token();

    tracing::debug!(torrent = %id, url = %announce, "initiating communication with tracker");

    let started = loop {
        let request = announce_request(&inner, &torrent, Some(AnnounceEvent::Started), None);

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                torrent.stop();
                return;
            }
            response = inner.tracker.announce(&announce, &request) => response,
        };

        match response {
            Ok(response) => break response,
            Err(e) if e.is_retryable() => {
                tracing::error!(torrent = %id, err = %e, "failed to contact tracker");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        torrent.stop();
                        return;
                    }
                    _ = tokio::time::sleep(inner.config.announce_retry) => {}
                }
            }
            Err(e) => {
                // failure_reason or a malformed response: announcing again
                // will not help. The download keeps whatever peers it has.
                tracing::error!(torrent = %id, err = %e, "tracker refused announce, abandoning announce loop");
                return;
            }
        }
    };

    let Some(interval) = started.interval else {
        tracing::error!(torrent = %id, "tracker did not return an announce interval, aborting announce loop");
        return;
    };

    if let Some(ref warning) = started.warning_message {
        tracing::warn!(torrent = %id, warning = %warning, "tracker warning");
    }

    tracing::info!(
        torrent = %id,
        interval,
        peers = started.peers.len(),
        "tracker accepted started announce"
    );

    Arc::clone(&torrent).integrate_peers(started.peers.iter().filter_map(|p| p.to_socket_addr()));
    let tracker_id = started.tracker_id;

    let period = Duration::from_secs(interval.max(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Final announce runs outside the cancelled scope, best
                // effort with the counters as they stand.
                tracing::info!(torrent = %id, "sending stopped event to tracker");
                let request = announce_request(
                    &inner,
                    &torrent,
                    Some(AnnounceEvent::Stopped),
                    tracker_id.clone(),
                );
                if let Err(e) = inner.tracker.announce(&announce, &request).await {
                    tracing::error!(torrent = %id, err = %e, "failed to announce stop to tracker");
                }

                tracing::info!(torrent = %id, "closing peers");
                torrent.stop();
                return;
            }
            _ = ticker.tick() => {
                let completed = torrent.is_complete();
                let event = completed.then_some(AnnounceEvent::Completed);
                let request = announce_request(&inner, &torrent, event, tracker_id.clone());

                tracing::debug!(torrent = %id, completed, "sending regular update to tracker");
                match inner.tracker.announce(&announce, &request).await {
                    Ok(response) => {
                        if !completed {
                            Arc::clone(&torrent).integrate_peers(
                                response.peers.iter().filter_map(|p| p.to_socket_addr()),
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(torrent = %id, err = %e, "failed to announce regular update to tracker");
                    }
                }

                if completed {
                    tracing::info!(torrent = %id, "completed downloading torrent");
                    return;
                }
            }
        }
    }
}
