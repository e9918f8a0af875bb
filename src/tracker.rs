//! Tracker client
//!
//! HTTP announce protocol (BEP 3): builds the announce GET from validated
//! request parameters, sends it, and decodes the bencoded response into
//! peers and announce intervals.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use rand::Rng;

use crate::bencode::Value;
use crate::error::{ClientError, Result};
use crate::metainfo::Sha1Hash;

/// Announce event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    /// Download has started; must accompany the first announce.
    Started,
    /// Client is shutting down gracefully.
    Stopped,
    /// Download has completed.
    Completed,
}

impl AnnounceEvent {
    fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
        }
    }
}

/// Announce request parameters.
///
/// The required fields mirror what every tracker insists on; the optional
/// ones are skipped from the query string when absent. `compact` and
/// `no_peer_id` are mutually exclusive.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    /// Info hash of the torrent (sent as 20 raw, percent-encoded bytes)
    pub info_hash: Sha1Hash,
    /// Our peer ID (sent as 20 raw, percent-encoded bytes)
    pub peer_id: [u8; 20],
    /// Port we claim to listen on (must be non-zero)
    pub port: u16,
    /// Bytes uploaded so far
    pub uploaded: u64,
    /// Bytes downloaded so far
    pub downloaded: u64,
    /// Bytes remaining
    pub left: u64,
    /// Request the compact peer list
    pub compact: Option<bool>,
    /// Omit peer ids from the dictionary peer list
    pub no_peer_id: Option<bool>,
    /// Event type, absent for regular interval announces
    pub event: Option<AnnounceEvent>,
    /// True IP of the client, for clients behind a proxy
    pub ip: Option<String>,
    /// Number of peers we would like to receive
    pub numwant: Option<i64>,
    /// Identification not shared with other peers
    pub key: Option<String>,
    /// Tracker id echoed from a previous response
    pub tracker_id: Option<String>,
}

impl AnnounceRequest {
    /// Create a request with the required fields; options start absent.
    pub fn new(info_hash: Sha1Hash, peer_id: [u8; 20], port: u16) -> Self {
        Self {
            info_hash,
            peer_id,
            port,
            uploaded: 0,
            downloaded: 0,
            left: 0,
            compact: None,
            no_peer_id: None,
            event: None,
            ip: None,
            numwant: None,
            key: None,
            tracker_id: None,
        }
    }

    /// Validate parameter interlocks before building the query.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ClientError::InvalidAnnounce {
                field: "port",
                message: "port specified but provided value 0".to_string(),
            });
        }
        if self.no_peer_id.is_some() && self.compact.is_some() {
            return Err(ClientError::InvalidAnnounce {
                field: "no_peer_id",
                message: "cannot have both no_peer_id and compact specified".to_string(),
            });
        }
        if let Some(ref ip) = self.ip {
            if ip.parse::<IpAddr>().is_err() {
                return Err(ClientError::InvalidAnnounce {
                    field: "ip",
                    message: format!("invalid ip {}", ip),
                });
            }
        }
        if let Some(numwant) = self.numwant {
            if numwant < 0 {
                return Err(ClientError::InvalidAnnounce {
                    field: "numwant",
                    message: format!("numwant {} cannot be negative", numwant),
                });
            }
        }
        Ok(())
    }

    /// Build the query string. Absent optional parameters are skipped;
    /// every value that is not provably plain ASCII goes through the same
    /// percent-encoding, including tracker-supplied ones like `trackerid`.
    pub fn query_string(&self) -> String {
        let mut query = String::new();

        query.push_str("info_hash=");
        query.push_str(&escape_query(&self.info_hash));
        query.push_str("&peer_id=");
        query.push_str(&escape_query(&self.peer_id));

        query.push_str(&format!("&port={}", self.port));
        query.push_str(&format!("&uploaded={}", self.uploaded));
        query.push_str(&format!("&downloaded={}", self.downloaded));
        query.push_str(&format!("&left={}", self.left));

        if let Some(compact) = self.compact {
            query.push_str(&format!("&compact={}", compact as u8));
        }
        if let Some(no_peer_id) = self.no_peer_id {
            query.push_str(&format!("&no_peer_id={}", no_peer_id as u8));
        }
        if let Some(event) = self.event {
            query.push_str(&format!("&event={}", event.as_str()));
        }
        if let Some(ref ip) = self.ip {
            query.push_str("&ip=");
            query.push_str(&escape_query(ip.as_bytes()));
        }
        if let Some(numwant) = self.numwant {
            query.push_str(&format!("&numwant={}", numwant));
        }
        if let Some(ref key) = self.key {
            query.push_str("&key=");
            query.push_str(&escape_query(key.as_bytes()));
        }
        if let Some(ref tracker_id) = self.tracker_id {
            query.push_str("&trackerid=");
            query.push_str(&escape_query(tracker_id.as_bytes()));
        }

        query
    }
}

/// Percent-encode a query value byte by byte. Only unreserved characters
/// pass through; everything else (including the raw info-hash and peer-id
/// bytes) becomes `%XX`.
fn escape_query(value: &[u8]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for &byte in value {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                escaped.push(byte as char);
            }
            _ => escaped.push_str(&format!("%{:02X}", byte)),
        }
    }
    escaped
}

/// Announce response from the tracker.
///
/// `interval` stays optional here; the controller decides whether a missing
/// interval is fatal.
#[derive(Debug, Clone, Default)]
pub struct AnnounceResponse {
    /// What went wrong; when present no other field is valid
    pub failure_reason: Option<String>,
    /// Non-fatal warning from the tracker
    pub warning_message: Option<String>,
    /// Seconds between regular announces
    pub interval: Option<u64>,
    /// Re-announce floor, if the tracker enforces one
    pub min_interval: Option<u64>,
    /// Tracker id to echo on subsequent announces
    pub tracker_id: Option<String>,
    /// Number of seeders
    pub complete: Option<u64>,
    /// Number of leechers
    pub incomplete: Option<u64>,
    /// Peers for the torrent
    pub peers: Vec<PeerAddr>,
}

/// Peer address from a tracker response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    /// IP address (textual)
    pub ip: String,
    /// Port
    pub port: u16,
    /// Peer ID, only present in the dictionary peer list
    pub peer_id: Option<[u8; 20]>,
}

impl PeerAddr {
    /// Convert to a socket address.
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.ip, self.port)
            .to_socket_addrs()
            .ok()?
            .next()
    }
}

/// Decode a bencoded announce response body.
pub fn decode_response(data: &[u8]) -> Result<AnnounceResponse> {
    let value = Value::parse_exact(data)
        .map_err(|e| ClientError::tracker_fatal(format!("invalid tracker response: {}", e)))?;
    let dict = value
        .as_dict()
        .ok_or_else(|| ClientError::tracker_fatal("tracker response must be a dictionary"))?;

    let mut response = AnnounceResponse::default();

    if let Some(failure) = dict.get(b"failure reason".as_slice()) {
        let reason = failure
            .as_str()
            .ok_or_else(|| ClientError::tracker_fatal("'failure reason' must be a string"))?;
        response.failure_reason = Some(reason.to_string());
        // No other field may be read.
        return Ok(response);
    }

    response.warning_message = dict
        .get(b"warning message".as_slice())
        .and_then(|v| v.as_str())
        .map(String::from);

    response.interval = dict.get(b"interval".as_slice()).and_then(|v| v.as_uint());
    response.min_interval = dict
        .get(b"min interval".as_slice())
        .and_then(|v| v.as_uint());

    response.tracker_id = dict
        .get(b"tracker id".as_slice())
        .and_then(|v| v.as_str())
        .map(String::from);

    response.complete = dict.get(b"complete".as_slice()).and_then(|v| v.as_uint());
    response.incomplete = dict.get(b"incomplete".as_slice()).and_then(|v| v.as_uint());

    response.peers = parse_peers(dict.get(b"peers".as_slice()))?;

    Ok(response)
}

/// Parse the peers field, either compact (6-byte records) or a list of
/// dictionaries.
fn parse_peers(value: Option<&Value>) -> Result<Vec<PeerAddr>> {
    let Some(value) = value else {
        // An empty peer list is a valid response.
        return Ok(Vec::new());
    };

    match value {
        // Compact format: 4 bytes IPv4 + 2 bytes big-endian port per peer.
        Value::Bytes(data) => {
            if data.len() % 6 != 0 {
                return Err(ClientError::tracker_fatal(format!(
                    "compact peers length {} is not a multiple of 6",
                    data.len()
                )));
            }

            Ok(data
                .chunks_exact(6)
                .map(|chunk| PeerAddr {
                    ip: format!("{}.{}.{}.{}", chunk[0], chunk[1], chunk[2], chunk[3]),
                    port: u16::from_be_bytes([chunk[4], chunk[5]]),
                    peer_id: None,
                })
                .collect())
        }

        // Dictionary format.
        Value::List(list) => {
            let mut peers = Vec::with_capacity(list.len());
            for item in list {
                let dict = item
                    .as_dict()
                    .ok_or_else(|| ClientError::tracker_fatal("peer entry must be a dictionary"))?;

                let ip = dict
                    .get(b"ip".as_slice())
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ClientError::tracker_fatal("peer missing 'ip'"))?
                    .to_string();

                let port = dict
                    .get(b"port".as_slice())
                    .and_then(|v| v.as_uint())
                    .ok_or_else(|| ClientError::tracker_fatal("peer missing 'port'"))?
                    as u16;

                let peer_id = dict.get(b"peer id".as_slice()).and_then(|v| {
                    v.as_bytes().and_then(|b| {
                        if b.len() == 20 {
                            let mut id = [0u8; 20];
                            id.copy_from_slice(b);
                            Some(id)
                        } else {
                            None
                        }
                    })
                });

                peers.push(PeerAddr { ip, port, peer_id });
            }
            Ok(peers)
        }

        _ => Err(ClientError::tracker_fatal(
            "peers were neither list nor bytestring",
        )),
    }
}

/// HTTP tracker client.
pub struct TrackerClient {
    http: reqwest::Client,
}

impl TrackerClient {
    /// Create a tracker client with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::tracker_fatal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    /// Validate and send an announce, returning the decoded response.
    ///
    /// A `failure reason` in the body is surfaced as an error; non-200
    /// statuses preserve the body for diagnosis.
    pub async fn announce(
        &self,
        announce_url: &str,
        request: &AnnounceRequest,
    ) -> Result<AnnounceResponse> {
        request.validate()?;

        let base: url::Url = announce_url.parse()?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(ClientError::tracker_fatal(format!(
                "unsupported tracker protocol: {}",
                base.scheme()
            )));
        }

        let mut url = announce_url.to_string();
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&request.query_string());

        tracing::debug!(url = %announce_url, event = ?request.event, "announcing to tracker");

        let response = self.http.get(&url).send().await?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::tracker_transient(format!("failed to read tracker response: {}", e)))?;

        if !status.is_success() {
            return Err(ClientError::tracker_transient(format!(
                "tracker returned status {}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        let decoded = decode_response(&body)?;
        if let Some(reason) = decoded.failure_reason {
            return Err(ClientError::TrackerFailure(reason));
        }

        Ok(decoded)
    }
}

/// Generate a random peer ID in Azureus style.
///
/// Format: `-MN0001-` followed by 12 random bytes.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    peer_id[..8].copy_from_slice(b"-MN0001-");
    rand::rng().fill(&mut peer_id[8..]);
    peer_id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnnounceRequest {
        AnnounceRequest::new([0xAA; 20], *b"-MN0001-abcdefghijkl", 6881)
    }

    #[test]
    fn test_generate_peer_id() {
        let peer_id = generate_peer_id();
        assert_eq!(&peer_id[0..8], b"-MN0001-");
    }

    #[test]
    fn test_validate_zero_port() {
        let mut req = request();
        req.port = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_compact_no_peer_id_exclusive() {
        let mut req = request();
        req.compact = Some(true);
        req.no_peer_id = Some(false);
        assert!(req.validate().is_err());

        req.compact = None;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_negative_numwant() {
        let mut req = request();
        req.numwant = Some(-1);
        assert!(req.validate().is_err());
        req.numwant = Some(0);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_malformed_ip() {
        let mut req = request();
        req.ip = Some("not-an-ip".to_string());
        assert!(req.validate().is_err());
        req.ip = Some("10.0.0.1".to_string());
        assert!(req.validate().is_ok());
        req.ip = Some("::1".to_string());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_query_string() {
        let mut req = request();
        req.downloaded = 1234;
        req.left = 5678;
        req.compact = Some(true);
        req.event = Some(AnnounceEvent::Started);

        let query = req.query_string();
        assert!(query.starts_with("info_hash=%AA%AA"));
        assert!(query.contains("&port=6881"));
        assert!(query.contains("&downloaded=1234"));
        assert!(query.contains("&left=5678"));
        assert!(query.contains("&compact=1"));
        assert!(query.contains("&event=started"));
        // Absent options are skipped.
        assert!(!query.contains("numwant"));
        assert!(!query.contains("trackerid"));
        assert!(!query.contains("no_peer_id"));
    }

    #[test]
    fn test_query_string_escapes_optional_fields() {
        // A hostile tracker id must not be able to smuggle extra
        // parameters into the next announce.
        let mut req = request();
        req.tracker_id = Some("id&left=0".to_string());
        req.key = Some("a b%".to_string());
        req.ip = Some("::1".to_string());

        let query = req.query_string();
        assert!(query.contains("&trackerid=id%26left%3D0"));
        assert!(query.contains("&key=a%20b%25"));
        assert!(query.contains("&ip=%3A%3A1"));
        assert!(!query.contains("id&left"));
    }

    #[test]
    fn test_decode_compact_peers() {
        // interval 1800, two compact peers: 1.2.3.4:6881 and 5.6.7.8:6882
        let mut body = Vec::new();
        body.extend_from_slice(b"d8:intervali1800e5:peers12:");
        body.extend_from_slice(&[1, 2, 3, 4, 0x1A, 0xE1, 5, 6, 7, 8, 0x1A, 0xE2]);
        body.extend_from_slice(b"e");

        let response = decode_response(&body).unwrap();
        assert_eq!(response.interval, Some(1800));
        assert_eq!(response.peers.len(), 2);
        assert_eq!(response.peers[0].ip, "1.2.3.4");
        assert_eq!(response.peers[0].port, 6881);
        assert!(response.peers[0].peer_id.is_none());
        assert_eq!(response.peers[1].ip, "5.6.7.8");
        assert_eq!(response.peers[1].port, 6882);
    }

    #[test]
    fn test_decode_compact_peers_bad_length() {
        let mut body = Vec::new();
        body.extend_from_slice(b"d8:intervali1800e5:peers5:");
        body.extend_from_slice(&[1, 2, 3, 4, 5]);
        body.extend_from_slice(b"e");
        assert!(decode_response(&body).is_err());
    }

    #[test]
    fn test_decode_dictionary_peers() {
        let body = b"d8:intervali60e5:peersld2:ip9:127.0.0.17:peer id20:01234567890123456789\
4:porti6881eeee";
        let response = decode_response(body).unwrap();
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].ip, "127.0.0.1");
        assert_eq!(response.peers[0].port, 6881);
        assert_eq!(response.peers[0].peer_id, Some(*b"01234567890123456789"));
    }

    #[test]
    fn test_decode_failure_reason() {
        let body = b"d14:failure reason15:torrent unknowne";
        let response = decode_response(body).unwrap();
        assert_eq!(response.failure_reason.as_deref(), Some("torrent unknown"));
        assert!(response.peers.is_empty());
        assert!(response.interval.is_none());
    }

    #[test]
    fn test_decode_empty_peer_list() {
        let body = b"d8:completei3e10:incompletei1e8:intervali900ee";
        let response = decode_response(body).unwrap();
        assert!(response.peers.is_empty());
        assert_eq!(response.interval, Some(900));
        assert_eq!(response.complete, Some(3));
        assert_eq!(response.incomplete, Some(1));
    }

    #[test]
    fn test_decode_missing_interval() {
        let body = b"d5:peers0:e";
        let response = decode_response(body).unwrap();
        assert!(response.interval.is_none());
    }

    #[test]
    fn test_response_roundtrip_subset() {
        // Encode the subset of fields the client consumes, then decode.
        use crate::bencode::Value;
        use std::collections::BTreeMap;

        let mut dict = BTreeMap::new();
        dict.insert(b"interval".to_vec(), Value::Integer(120));
        dict.insert(b"min interval".to_vec(), Value::Integer(60));
        dict.insert(b"tracker id".to_vec(), Value::Bytes(b"abc".to_vec()));
        dict.insert(
            b"peers".to_vec(),
            Value::Bytes(vec![10, 0, 0, 1, 0x1A, 0xE1]),
        );
        let body = Value::Dict(dict).encode();

        let response = decode_response(&body).unwrap();
        assert_eq!(response.interval, Some(120));
        assert_eq!(response.min_interval, Some(60));
        assert_eq!(response.tracker_id.as_deref(), Some("abc"));
        assert_eq!(response.peers[0].ip, "10.0.0.1");
        assert_eq!(response.peers[0].port, 6881);
    }

    #[tokio::test]
    async fn test_announce_rejects_non_http_tracker() {
        let client = TrackerClient::new(Duration::from_secs(1)).unwrap();
        let err = client
            .announce("udp://tracker.example.com:6969/announce", &request())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_peer_addr_to_socket() {
        let peer = PeerAddr {
            ip: "127.0.0.1".to_string(),
            port: 6881,
            peer_id: None,
        };
        let addr = peer.to_socket_addr().unwrap();
        assert_eq!(addr.port(), 6881);
    }
}
