// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Batch Replay Engine
//!
//! A [`ReplayCursor`] walks one persistence id page by page. It holds at most
//! one page and fetches the next one only when the consumer asks for an
//! element the buffer cannot satisfy, so memory stays O(page_size) whatever
//! the range.
//!
//! For nested partitions a page never crosses a bucket: the query bound is
//! clipped to the bucket end. A clipped page that comes back short only
//! means the bucket is done, since sequence numbers may have holes. Before
//! the first bucketed fetch the range is cut at the source's highest
//! sequence number, so empty tail buckets are not probed.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};
use rowjournal_kernel::config::DEFAULT_PAGE_SIZE;
use rowjournal_kernel::{codec, JournalEntry, JournalRow, PartitionRouter, SequenceNr};

use crate::errors::{JournalError, Result};
use crate::storage::{PageQuery, PageSource};
use crate::telemetry::{REPLAY_DECODE_FAILURES_TOTAL, REPLAY_PAGES_TOTAL};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayRequest {
    pub persistence_id: String,
    /// Inclusive.
    pub from_sequence_nr: SequenceNr,
    /// Inclusive.
    pub to_sequence_nr: SequenceNr,
    pub page_size: usize,
    /// `None` is unbounded.
    pub max_items: Option<u64>,
}

impl ReplayRequest {
    pub fn new(persistence_id: impl Into<String>, from_sequence_nr: SequenceNr, to_sequence_nr: SequenceNr) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            from_sequence_nr,
            to_sequence_nr,
            page_size: DEFAULT_PAGE_SIZE,
            max_items: None,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_items(mut self, max_items: u64) -> Self {
        self.max_items = Some(max_items);
        self
    }
}

/// One delivered element. `delivery_seq_nr` is the 1-based position within
/// this replay call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayedEntry {
    pub entry: JournalEntry,
    pub delivery_seq_nr: u64,
}

pub struct ReplayCursor<S: PageSource + ?Sized> {
    source: Arc<S>,
    router: Arc<dyn PartitionRouter>,
    persistence_id: String,
    to_sequence_nr: SequenceNr,
    page_size: usize,
    remaining: Option<u64>,
    /// Highest sequence number already fetched.
    after: SequenceNr,
    buffer: VecDeque<JournalRow>,
    /// No further fetch will be issued.
    exhausted: bool,
    /// `to_sequence_nr` has been cut at the source's upper bound.
    bounded: bool,
    finished: bool,
    position: u64,
    pages_fetched: u64,
    high_water_mark: usize,
    delivered: u64,
}

impl<S: PageSource + ?Sized> ReplayCursor<S> {
    pub fn new(source: Arc<S>, router: Arc<dyn PartitionRouter>, request: ReplayRequest) -> Result<Self> {
        if request.page_size == 0 {
            return Err(JournalError::InvalidRequest("page_size must be > 0".into()));
        }
        let from = request.from_sequence_nr.max(1);
        let empty = from > request.to_sequence_nr || request.max_items == Some(0);

        Ok(Self {
            source,
            router,
            persistence_id: request.persistence_id,
            to_sequence_nr: request.to_sequence_nr,
            page_size: request.page_size,
            remaining: request.max_items,
            after: from - 1,
            buffer: VecDeque::with_capacity(request.page_size.min(1024)),
            exhausted: empty,
            bounded: false,
            finished: empty,
            position: 0,
            pages_fetched: 0,
            high_water_mark: 0,
            delivered: 0,
        })
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Most rows ever buffered at once.
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Entries successfully decoded and handed out.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub async fn next(&mut self) -> Option<Result<ReplayedEntry>> {
        loop {
            if self.finished {
                return None;
            }
            if self.remaining == Some(0) {
                self.finish();
                return None;
            }

            if let Some(row) = self.buffer.pop_front() {
                if row.deleted {
                    continue;
                }
                return Some(self.deliver(row));
            }

            if self.exhausted {
                self.finish();
                return None;
            }

            if let Err(e) = self.fetch_next_page().await {
                tracing::warn!(
                    "Replay of {} stopped after sequence_nr {}: {}",
                    self.persistence_id,
                    self.after,
                    e
                );
                self.finish();
                return Some(Err(e));
            }
        }
    }

    /// Lazy stream over the remaining elements. Nothing is fetched until polled.
    pub fn into_stream(self) -> impl Stream<Item = Result<ReplayedEntry>> + Send
    where
        S: 'static,
    {
        stream::unfold(self, |mut cursor| async move {
            let item = cursor.next().await?;
            Some((item, cursor))
        })
    }

    fn deliver(&mut self, row: JournalRow) -> Result<ReplayedEntry> {
        self.position += 1;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }

        let persistence_id = row.persistence_id.clone();
        let sequence_nr = row.sequence_nr;
        match codec::decode(row) {
            Ok(entry) => {
                self.delivered += 1;
                Ok(ReplayedEntry {
                    entry,
                    delivery_seq_nr: self.position,
                })
            }
            Err(source) => {
                metrics::counter!(REPLAY_DECODE_FAILURES_TOTAL, 1);
                tracing::warn!("Undecodable row {} #{}: {}", persistence_id, sequence_nr, source);
                Err(JournalError::Decode {
                    persistence_id,
                    sequence_nr,
                    source,
                })
            }
        }
    }

    async fn fetch_next_page(&mut self) -> Result<()> {
        let next = self.after + 1;
        let (_, span_end) = self.router.span(next);
        if !self.bounded && span_end < self.to_sequence_nr {
            self.bounded = true;
            if let Some(highest) = self.source.stream_upper_bound(&self.persistence_id).await? {
                self.to_sequence_nr = self.to_sequence_nr.min(highest);
                if self.after >= self.to_sequence_nr {
                    self.exhausted = true;
                    return Ok(());
                }
            }
        }
        let bound = self.to_sequence_nr.min(span_end);
        let limit = match self.remaining {
            Some(remaining) => self.page_size.min(usize::try_from(remaining).unwrap_or(usize::MAX)),
            None => self.page_size,
        };

        let query = PageQuery {
            target: self.router.locate(&self.persistence_id, next),
            persistence_id: self.persistence_id.clone(),
            after_sequence_nr: self.after,
            to_sequence_nr: bound,
            limit,
        };
        let rows = self.source.fetch_page(query).await?;
        self.pages_fetched += 1;
        metrics::counter!(REPLAY_PAGES_TOTAL, 1);

        let fetched = rows.len();
        if let Some(last) = rows.last() {
            if last.sequence_nr <= self.after {
                return Err(JournalError::storage(
                    format!("replay {}", self.persistence_id),
                    format!("page went backwards to sequence_nr {}", last.sequence_nr),
                ));
            }
            self.after = last.sequence_nr;
        }
        self.buffer.extend(rows);
        self.high_water_mark = self.high_water_mark.max(self.buffer.len());

        if self.after >= self.to_sequence_nr {
            self.exhausted = true;
        } else if fetched < limit {
            if bound < self.to_sequence_nr {
                tracing::trace!("Replay of {} moves to the bucket after {}", self.persistence_id, bound);
                self.after = bound;
            } else {
                self.exhausted = true;
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        self.exhausted = true;
        self.buffer.clear();
    }
}
