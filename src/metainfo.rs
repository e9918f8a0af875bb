//! Torrent metainfo
//!
//! Parses `.torrent` files (BEP 3) into an immutable [`Metainfo`]: the
//! announce URL, the info-hash, and the piece table the scheduler works
//! from.

use std::path::PathBuf;

use sha1::{Digest, Sha1};

use crate::bencode::{info_dict_bytes, Value};
use crate::error::{ClientError, Result};

/// SHA-1 hash (20 bytes)
pub type Sha1Hash = [u8; 20];

/// Parsed torrent metainfo. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// SHA-1 hash of the bencoded info dictionary
    pub info_hash: Sha1Hash,
    /// Tracker announce URL
    pub announce: String,
    /// Suggested name for the file or directory
    pub name: String,
    /// Number of bytes per piece (except the last piece)
    pub piece_length: u64,
    /// SHA-1 hash of each piece
    pub pieces: Vec<Sha1Hash>,
    /// Files in this torrent (one entry for single-file torrents)
    pub files: Vec<FileEntry>,
    /// Total size of all files
    total_size: u64,
}

/// A single file within the torrent content.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path relative to the torrent name (just the name for single-file)
    pub path: PathBuf,
    /// File size in bytes
    pub length: u64,
}

impl Metainfo {
    /// Parse a `.torrent` file from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let root = Value::parse_exact(data)?;
        let dict = root
            .as_dict()
            .ok_or_else(|| ClientError::metainfo("root must be a dictionary"))?;

        // The info-hash is computed over the raw bytes of the info value.
        let info_bytes = info_dict_bytes(data)?;
        let info_hash: Sha1Hash = Sha1::digest(info_bytes).into();

        let announce = dict
            .get(b"announce".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::metainfo("missing 'announce'"))?
            .to_string();

        let info = dict
            .get(b"info".as_slice())
            .and_then(|v| v.as_dict())
            .ok_or_else(|| ClientError::metainfo("'info' must be a dictionary"))?;

        let name = info
            .get(b"name".as_slice())
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::metainfo("missing 'name' in info"))?
            .to_string();

        let piece_length = info
            .get(b"piece length".as_slice())
            .and_then(|v| v.as_uint())
            .ok_or_else(|| ClientError::metainfo("missing or invalid 'piece length'"))?;
        if piece_length == 0 {
            return Err(ClientError::metainfo(
                "invalid 'piece length': must be greater than zero",
            ));
        }

        let pieces_bytes = info
            .get(b"pieces".as_slice())
            .and_then(|v| v.as_bytes())
            .ok_or_else(|| ClientError::metainfo("missing 'pieces'"))?;
        if pieces_bytes.len() % 20 != 0 {
            return Err(ClientError::metainfo(format!(
                "invalid pieces length: {} (not a multiple of 20)",
                pieces_bytes.len()
            )));
        }

        let pieces: Vec<Sha1Hash> = pieces_bytes
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        // Single-file torrents carry 'length'; multi-file torrents a 'files'
        // list whose lengths sum to the content size.
        let files = if let Some(files_value) = info.get(b"files".as_slice()) {
            Self::parse_files(files_value)?
        } else {
            let length = info
                .get(b"length".as_slice())
                .and_then(|v| v.as_uint())
                .ok_or_else(|| {
                    ClientError::metainfo("missing 'length' for single-file torrent")
                })?;
            vec![FileEntry {
                path: PathBuf::from(&name),
                length,
            }]
        };
        let total_size: u64 = files.iter().map(|f| f.length).sum();

        let expected_pieces = total_size.div_ceil(piece_length);
        if pieces.len() as u64 != expected_pieces {
            return Err(ClientError::metainfo(format!(
                "piece count mismatch: have {}, expected {} for {} bytes with {} byte pieces",
                pieces.len(),
                expected_pieces,
                total_size,
                piece_length
            )));
        }

        Ok(Metainfo {
            info_hash,
            announce,
            name,
            piece_length,
            pieces,
            files,
            total_size,
        })
    }

    /// Parse the files list for multi-file torrents.
    fn parse_files(value: &Value) -> Result<Vec<FileEntry>> {
        let list = value
            .as_list()
            .ok_or_else(|| ClientError::metainfo("'files' must be a list"))?;

        let mut files = Vec::with_capacity(list.len());
        for file_value in list {
            let dict = file_value
                .as_dict()
                .ok_or_else(|| ClientError::metainfo("file entry must be a dictionary"))?;

            let length = dict
                .get(b"length".as_slice())
                .and_then(|v| v.as_uint())
                .ok_or_else(|| ClientError::metainfo("missing 'length' in file entry"))?;

            let path_list = dict
                .get(b"path".as_slice())
                .and_then(|v| v.as_list())
                .ok_or_else(|| ClientError::metainfo("'path' must be a list of strings"))?;

            let mut path = PathBuf::new();
            for component in path_list {
                let s = component
                    .as_str()
                    .ok_or_else(|| ClientError::metainfo("path component must be a string"))?;
                path.push(s);
            }

            files.push(FileEntry { path, length });
        }

        Ok(files)
    }

    /// Total number of bytes this torrent downloads.
    pub fn bytes_to_download(&self) -> u64 {
        self.total_size
    }

    /// Total number of pieces.
    pub fn num_pieces(&self) -> usize {
        self.pieces.len()
    }

    /// Get the expected hash for a piece.
    pub fn piece_hash(&self, index: u32) -> Option<&Sha1Hash> {
        self.pieces.get(index as usize)
    }

    /// Size of a piece in bytes; the last piece may be shorter.
    pub fn piece_size(&self, index: u32) -> Option<u64> {
        if index as usize >= self.pieces.len() {
            return None;
        }
        let start = index as u64 * self.piece_length;
        let end = (start + self.piece_length).min(self.total_size);
        Some(end - start)
    }

    /// Info-hash as a lowercase hex string (the torrent id).
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_torrent() -> Vec<u8> {
        // Single file "test.txt" of 100 bytes, one 32 KiB piece.
        let pieces = vec![0u8; 20];
        let pieces_str = format!("6:pieces{}:", pieces.len());

        let mut data = Vec::new();
        data.extend_from_slice(b"d");
        data.extend_from_slice(b"8:announce35:http://tracker.example.com/announce");
        data.extend_from_slice(b"4:infod");
        data.extend_from_slice(b"6:lengthi100e");
        data.extend_from_slice(b"4:name8:test.txt");
        data.extend_from_slice(b"12:piece lengthi32768e");
        data.extend_from_slice(pieces_str.as_bytes());
        data.extend_from_slice(&pieces);
        data.extend_from_slice(b"ee");

        data
    }

    #[test]
    fn test_parse_single_file_torrent() {
        let data = create_test_torrent();
        let metainfo = Metainfo::parse(&data).unwrap();

        assert_eq!(metainfo.name, "test.txt");
        assert_eq!(metainfo.piece_length, 32768);
        assert_eq!(metainfo.bytes_to_download(), 100);
        assert_eq!(metainfo.num_pieces(), 1);
        assert_eq!(metainfo.files.len(), 1);
        assert_eq!(metainfo.files[0].length, 100);
        assert_eq!(metainfo.announce, "http://tracker.example.com/announce");
    }

    #[test]
    fn test_info_hash_is_sha1_of_info_literal() {
        let data = create_test_torrent();
        let metainfo = Metainfo::parse(&data).unwrap();

        let info_literal = info_dict_bytes(&data).unwrap();
        let expected: Sha1Hash = Sha1::digest(info_literal).into();
        assert_eq!(metainfo.info_hash, expected);
        assert_eq!(metainfo.info_hash_hex().len(), 40);
    }

    #[test]
    fn test_piece_size() {
        let data = create_test_torrent();
        let metainfo = Metainfo::parse(&data).unwrap();

        // Last (only) piece is smaller than piece_length.
        assert_eq!(metainfo.piece_size(0), Some(100));
        assert_eq!(metainfo.piece_size(1), None);
    }

    #[test]
    fn test_invalid_torrent() {
        // Missing info dict
        let data = b"d8:announce10:http://fooe";
        assert!(Metainfo::parse(data).is_err());

        // Pieces length not a multiple of 20
        let data = b"d8:announce3:url4:infod6:lengthi100e4:name4:test12:piece lengthi1024e6:pieces5:12345ee";
        assert!(Metainfo::parse(data).is_err());

        // Zero piece length
        let mut data = Vec::new();
        data.extend_from_slice(b"d8:announce3:url4:infod6:lengthi0e4:name4:test12:piece lengthi0e6:pieces0:ee");
        assert!(Metainfo::parse(&data).is_err());
    }

    #[test]
    fn test_piece_count_mismatch() {
        // 100 bytes at 32 KiB pieces needs exactly one hash; provide two.
        let pieces = vec![0u8; 40];
        let pieces_str = format!("6:pieces{}:", pieces.len());

        let mut data = Vec::new();
        data.extend_from_slice(b"d8:announce3:url4:infod");
        data.extend_from_slice(b"6:lengthi100e");
        data.extend_from_slice(b"4:name8:test.txt");
        data.extend_from_slice(b"12:piece lengthi32768e");
        data.extend_from_slice(pieces_str.as_bytes());
        data.extend_from_slice(&pieces);
        data.extend_from_slice(b"ee");

        assert!(Metainfo::parse(&data).is_err());
    }

    #[test]
    fn test_multi_file_total() {
        // Two files of 60 and 40 bytes, one 32 KiB piece.
        let pieces = vec![0u8; 20];
        let mut data = Vec::new();
        data.extend_from_slice(b"d8:announce3:url4:infod");
        data.extend_from_slice(b"5:filesl");
        data.extend_from_slice(b"d6:lengthi60e4:pathl1:aee");
        data.extend_from_slice(b"d6:lengthi40e4:pathl3:sub1:bee");
        data.extend_from_slice(b"e");
        data.extend_from_slice(b"4:name4:test");
        data.extend_from_slice(b"12:piece lengthi32768e");
        data.extend_from_slice(format!("6:pieces{}:", pieces.len()).as_bytes());
        data.extend_from_slice(&pieces);
        data.extend_from_slice(b"ee");

        let metainfo = Metainfo::parse(&data).unwrap();
        assert_eq!(metainfo.bytes_to_download(), 100);
        assert_eq!(metainfo.files.len(), 2);
        assert_eq!(metainfo.files[1].path, PathBuf::from("sub/b"));
    }
}
