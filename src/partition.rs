// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Partition Router
//!
//! Decides which physical table holds a persistence id. The write path and
//! the replay engine both go through the same router, so a row is always read
//! back from where it was written.
//!
//! # Strategies
//! - `Plain`: one table, `journal`.
//! - `Partitioned`: `journal_p{n}` with `n = h(persistence_id) mod N`.
//! - `NestedPartitions`: `journal_p{n}_b{m}` with the outer split as above and
//!   `m = (sequence_nr - 1) / bucket_size`.
//!
//! `h` is the first 8 bytes of BLAKE3, read little-endian. It does not depend
//! on the process, the platform or the compiler, so a restarted node computes
//! the same location.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_BUCKET_SIZE, JOURNAL_TABLE};
use crate::error::{KernelError, Result};
use crate::types::SequenceNr;

/// Deployment-time choice of physical layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartitionStrategy {
    #[default]
    Plain,
    Partitioned {
        partitions: u32,
    },
    NestedPartitions {
        partitions: u32,
        #[serde(default = "default_bucket_size")]
        bucket_size: i64,
    },
}

fn default_bucket_size() -> i64 {
    DEFAULT_BUCKET_SIZE
}

/// Physical location of a row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub table: String,
    pub partition: Option<u32>,
    pub bucket: Option<i64>,
}

impl Target {
    fn plain() -> Self {
        Self {
            table: JOURNAL_TABLE.to_string(),
            partition: None,
            bucket: None,
        }
    }

    fn partition(n: u32) -> Self {
        Self {
            table: format!("{JOURNAL_TABLE}_p{n}"),
            partition: Some(n),
            bucket: None,
        }
    }

    fn nested(n: u32, bucket: i64) -> Self {
        Self {
            table: format!("{JOURNAL_TABLE}_p{n}_b{bucket}"),
            partition: Some(n),
            bucket: Some(bucket),
        }
    }
}

pub trait PartitionRouter: Send + Sync {
    fn strategy(&self) -> PartitionStrategy;

    /// Target of the row `(persistence_id, sequence_nr)`. Pure.
    fn locate(&self, persistence_id: &str, sequence_nr: SequenceNr) -> Target;

    /// Inclusive sequence range stored in the same target as `sequence_nr`.
    fn span(&self, sequence_nr: SequenceNr) -> (SequenceNr, SequenceNr) {
        let _ = sequence_nr;
        (1, SequenceNr::MAX)
    }

    /// Every target holding rows of `persistence_id` in `[from, to]`.
    fn targets_between(&self, persistence_id: &str, from: SequenceNr, to: SequenceNr) -> Vec<Target> {
        if from > to {
            return Vec::new();
        }
        vec![self.locate(persistence_id, from)]
    }
}

/// Stable 64-bit hash of a persistence id.
pub fn stable_hash(persistence_id: &str) -> u64 {
    let digest = blake3::hash(persistence_id.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

pub fn outer_partition(persistence_id: &str, partitions: u32) -> u32 {
    (stable_hash(persistence_id) % partitions as u64) as u32
}

#[derive(Debug, Default)]
pub struct PlainRouter;

impl PartitionRouter for PlainRouter {
    fn strategy(&self) -> PartitionStrategy {
        PartitionStrategy::Plain
    }

    fn locate(&self, _persistence_id: &str, _sequence_nr: SequenceNr) -> Target {
        Target::plain()
    }
}

#[derive(Debug)]
pub struct HashPartitionRouter {
    partitions: u32,
}

impl HashPartitionRouter {
    pub fn new(partitions: u32) -> Result<Self> {
        if partitions == 0 {
            return Err(KernelError::InvalidPartitioning("partitions must be > 0".into()));
        }
        Ok(Self { partitions })
    }
}

impl PartitionRouter for HashPartitionRouter {
    fn strategy(&self) -> PartitionStrategy {
        PartitionStrategy::Partitioned {
            partitions: self.partitions,
        }
    }

    fn locate(&self, persistence_id: &str, _sequence_nr: SequenceNr) -> Target {
        Target::partition(outer_partition(persistence_id, self.partitions))
    }
}

#[derive(Debug)]
pub struct NestedPartitionRouter {
    partitions: u32,
    bucket_size: i64,
}

impl NestedPartitionRouter {
    pub fn new(partitions: u32, bucket_size: i64) -> Result<Self> {
        if partitions == 0 {
            return Err(KernelError::InvalidPartitioning("partitions must be > 0".into()));
        }
        if bucket_size <= 0 {
            return Err(KernelError::InvalidPartitioning("bucket_size must be > 0".into()));
        }
        Ok(Self {
            partitions,
            bucket_size,
        })
    }

    fn bucket_of(&self, sequence_nr: SequenceNr) -> i64 {
        (sequence_nr.max(1) - 1) / self.bucket_size
    }
}

impl PartitionRouter for NestedPartitionRouter {
    fn strategy(&self) -> PartitionStrategy {
        PartitionStrategy::NestedPartitions {
            partitions: self.partitions,
            bucket_size: self.bucket_size,
        }
    }

    fn locate(&self, persistence_id: &str, sequence_nr: SequenceNr) -> Target {
        Target::nested(
            outer_partition(persistence_id, self.partitions),
            self.bucket_of(sequence_nr),
        )
    }

    fn span(&self, sequence_nr: SequenceNr) -> (SequenceNr, SequenceNr) {
        let bucket = self.bucket_of(sequence_nr);
        let start = bucket * self.bucket_size + 1;
        let end = start.saturating_add(self.bucket_size - 1);
        (start, end)
    }

    fn targets_between(&self, persistence_id: &str, from: SequenceNr, to: SequenceNr) -> Vec<Target> {
        if from > to {
            return Vec::new();
        }
        let outer = outer_partition(persistence_id, self.partitions);
        (self.bucket_of(from)..=self.bucket_of(to))
            .map(|bucket| Target::nested(outer, bucket))
            .collect()
    }
}

/// Resolves the router for a configured strategy. Called once at startup.
pub fn router_for(strategy: &PartitionStrategy) -> Result<Arc<dyn PartitionRouter>> {
    let router: Arc<dyn PartitionRouter> = match *strategy {
        PartitionStrategy::Plain => Arc::new(PlainRouter),
        PartitionStrategy::Partitioned { partitions } => Arc::new(HashPartitionRouter::new(partitions)?),
        PartitionStrategy::NestedPartitions {
            partitions,
            bucket_size,
        } => Arc::new(NestedPartitionRouter::new(partitions, bucket_size)?),
    };
    Ok(router)
}
