// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Row Codec
//!
//! Maps a [`JournalEntry`] to the column layout every storage backend shares
//! and back again.
//!
//! # Columns
//! ```text
//! ordering | persistence_id | sequence_nr | payload | manifest | writer_id | tags | checksum | deleted
//! ```
//!
//! - `tags` is a JSON array of strings (sorted, since tags are a set).
//! - `checksum` is the CRC-64 of the payload, bit-cast to `i64` so it fits a
//!   signed integer column.
//!
//! Decoding re-derives the checksum and fails per row; callers decide whether
//! a bad row aborts anything.

use std::collections::BTreeSet;

use crc64fast::Digest;

use crate::error::{DecodeError, KernelError, Result};
use crate::types::{JournalEntry, OrderingOffset, SequenceNr};

/// Storage-shaped journal row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalRow {
    pub ordering: OrderingOffset,
    pub persistence_id: String,
    pub sequence_nr: SequenceNr,
    pub payload: Vec<u8>,
    pub manifest: String,
    pub writer_id: String,
    pub tags: String,
    pub checksum: i64,
    pub deleted: bool,
}

pub fn payload_checksum(payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(payload);
    digest.sum64()
}

pub fn encode_tags(tags: &BTreeSet<String>) -> Result<String> {
    serde_json::to_string(tags).map_err(|e| KernelError::TagEncoding(e.to_string()))
}

pub fn decode_tags(column: &str) -> std::result::Result<BTreeSet<String>, DecodeError> {
    if column.is_empty() {
        return Ok(BTreeSet::new());
    }
    serde_json::from_str(column).map_err(|e| DecodeError::InvalidTags(e.to_string()))
}

pub fn encode(entry: &JournalEntry) -> Result<JournalRow> {
    Ok(JournalRow {
        ordering: entry.ordering,
        persistence_id: entry.persistence_id.clone(),
        sequence_nr: entry.sequence_nr,
        payload: entry.payload.clone(),
        manifest: entry.manifest.clone(),
        writer_id: entry.writer_id.clone(),
        tags: encode_tags(&entry.tags)?,
        checksum: payload_checksum(&entry.payload) as i64,
        deleted: entry.deleted,
    })
}

/// Consuming encode for the write path, avoids copying the payload.
pub fn encode_owned(entry: JournalEntry) -> Result<JournalRow> {
    let tags = encode_tags(&entry.tags)?;
    let checksum = payload_checksum(&entry.payload) as i64;
    Ok(JournalRow {
        ordering: entry.ordering,
        persistence_id: entry.persistence_id,
        sequence_nr: entry.sequence_nr,
        payload: entry.payload,
        manifest: entry.manifest,
        writer_id: entry.writer_id,
        tags,
        checksum,
        deleted: entry.deleted,
    })
}

pub fn decode(row: JournalRow) -> std::result::Result<JournalEntry, DecodeError> {
    let found = payload_checksum(&row.payload);
    let expected = row.checksum as u64;
    if found != expected {
        return Err(DecodeError::ChecksumMismatch { expected, found });
    }
    let tags = decode_tags(&row.tags)?;

    Ok(JournalEntry {
        persistence_id: row.persistence_id,
        sequence_nr: row.sequence_nr,
        ordering: row.ordering,
        payload: row.payload,
        manifest: row.manifest,
        writer_id: row.writer_id,
        tags,
        deleted: row.deleted,
    })
}
