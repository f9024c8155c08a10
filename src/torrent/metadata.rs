use crate::bencode::decoder::{decode, root_value_span};
use crate::bencode::encoder::{encode_into, BencodeEncode};
use crate::bencode::value::Value;
use crate::core::error::MetadataError;
use sha1::{Digest, Sha1};
use std::ops::Range;

/// A decoded torrent file
///
/// Keeps the original raw bytes alongside the parsed tree. The infohash
/// is the SHA-1 of the `info` value's raw encoded bytes, so those bytes
/// are carried through every rewrite verbatim; only top-level fields
/// outside `info` are ever replaced.
pub struct TorrentMetadata {
    raw: Vec<u8>,
    root: Value,
    info_span: Range<usize>,
}

impl TorrentMetadata {
    pub fn from_bytes(raw: Vec<u8>) -> Result<Self, MetadataError> {
        let root = decode(&raw)?;

        if !matches!(root, Value::Dict(_)) {
            return Err(MetadataError::RootNotDict);
        }

        match root.get(b"info") {
            Some(Value::Dict(_)) => {}
            _ => return Err(MetadataError::MissingInfo),
        }

        let info_span = root_value_span(&raw, b"info")?.ok_or(MetadataError::MissingInfo)?;

        Ok(Self {
            raw,
            root,
            info_span,
        })
    }

    /// SHA-1 over the raw `info` bytes as they appeared in the input
    pub fn info_hash(&self) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(&self.raw[self.info_span.clone()]);
        hasher.finalize().into()
    }

    /// The raw encoded `info` bytes
    pub fn info_bytes(&self) -> &[u8] {
        &self.raw[self.info_span.clone()]
    }

    /// The current top-level announce URL
    pub fn announce(&self) -> Result<&[u8], MetadataError> {
        self.root
            .get(b"announce")
            .and_then(Value::as_bytes)
            .ok_or(MetadataError::MissingAnnounce)
    }

    /// Total payload size in bytes
    ///
    /// Single-file layout reads `info.length`; multi-file sums every
    /// `length` inside the `files` list.
    pub fn total_size(&self) -> Result<u64, MetadataError> {
        let info = self.root.get(b"info").ok_or(MetadataError::MissingInfo)?;

        if let Some(length) = info.get(b"length").and_then(Value::as_int) {
            return u64::try_from(length).map_err(|_| MetadataError::MissingLength);
        }

        let files = info
            .get(b"files")
            .and_then(Value::as_list)
            .ok_or(MetadataError::MissingLength)?;

        let mut total: u64 = 0;
        for file in files {
            let length = file
                .get(b"length")
                .and_then(Value::as_int)
                .and_then(|n| u64::try_from(n).ok())
                .ok_or(MetadataError::InvalidFileEntry)?;
            total = total
                .checked_add(length)
                .ok_or(MetadataError::InvalidFileEntry)?;
        }

        Ok(total)
    }

    /// Replace the announce endpoint everywhere it appears
    ///
    /// Rewrites the top-level `announce` field and every string inside
    /// `announce-list` tiers. No other field is touched.
    pub fn rewrite_announce(&mut self, url: &str) {
        if let Some(announce) = self.root.get_mut(b"announce") {
            *announce = Value::Bytes(url.as_bytes().to_vec());
        }

        if let Some(Value::List(tiers)) = self.root.get_mut(b"announce-list") {
            for tier in tiers {
                if let Value::List(entries) = tier {
                    for entry in entries {
                        if matches!(entry, Value::Bytes(_)) {
                            *entry = Value::Bytes(url.as_bytes().to_vec());
                        }
                    }
                }
            }
        }
    }

    /// Re-encode the torrent, splicing the original `info` bytes
    ///
    /// Everything outside `info` is encoded from the (possibly
    /// rewritten) tree; `info` itself is copied from the raw input so
    /// the infohash cannot drift.
    pub fn to_bytes(&self) -> Vec<u8> {
        let entries = match &self.root {
            Value::Dict(entries) => entries,
            // from_bytes guarantees a dict root
            _ => unreachable!("torrent root is always a dictionary"),
        };

        let mut buf = Vec::with_capacity(self.raw.len() + 128);
        buf.extend_from_slice(b"d");

        for (key, value) in entries {
            key.bencode(&mut buf);
            if key.as_slice() == b"info" {
                buf.extend_from_slice(&self.raw[self.info_span.clone()]);
            } else {
                encode_into(value, &mut buf);
            }
        }

        buf.extend_from_slice(b"e");
        buf
    }
}
