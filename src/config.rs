//! Client configuration

use std::time::Duration;

/// Configuration for the leecher.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Port announced to the tracker. The client never listens on it
    /// (leech-only), but trackers reject a zero port.
    pub port: u16,
    /// Number of pieces downloaded in parallel (scheduler slots).
    pub download_slots: usize,
    /// How long an in-flight block request may go unanswered before it is
    /// cancelled and re-queued.
    pub request_timeout: Duration,
    /// Keep-alive cadence per peer; also the reconnect cadence for dead
    /// connections.
    pub keep_alive_interval: Duration,
    /// Download-rate sampling interval.
    pub rate_tick: Duration,
    /// Scheduler loop cadence.
    pub scheduler_tick: Duration,
    /// Backoff between retries of the initial `started` announce.
    pub announce_retry: Duration,
    /// Number of peers requested from the tracker.
    pub numwant: u32,
    /// TCP connect timeout for peer connections.
    pub connect_timeout: Duration,
    /// Read/write timeout for individual peer socket operations.
    pub io_timeout: Duration,
    /// Timeout for tracker HTTP requests.
    pub tracker_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: 6881,
            download_slots: 10,
            request_timeout: Duration::from_secs(15),
            keep_alive_interval: Duration::from_secs(120),
            rate_tick: Duration::from_secs(1),
            scheduler_tick: Duration::from_millis(50),
            announce_retry: Duration::from_secs(10),
            numwant: 10,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            tracker_timeout: Duration::from_secs(15),
        }
    }
}
