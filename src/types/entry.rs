// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{OrderingOffset, SequenceNr};

/// One event of a persistence stream.
///
/// `ordering` stays 0 until storage assigns an offset at commit time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub persistence_id: String,
    pub sequence_nr: SequenceNr,
    pub ordering: OrderingOffset,
    pub payload: Vec<u8>,
    pub manifest: String,
    pub writer_id: String,
    pub tags: BTreeSet<String>,
    pub deleted: bool,
}

impl JournalEntry {
    pub fn new(persistence_id: impl Into<String>, sequence_nr: SequenceNr, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            sequence_nr,
            ordering: 0,
            payload: payload.into(),
            manifest: String::new(),
            writer_id: String::new(),
            tags: BTreeSet::new(),
            deleted: false,
        }
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    pub fn with_writer(mut self, writer_id: impl Into<String>) -> Self {
        self.writer_id = writer_id.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}
