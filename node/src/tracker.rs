// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Gapless Ordering Tracker
//!
//! Offsets are handed out when a transaction starts writing but become
//! visible when it commits, so the committed set can have holes. The tracker
//! publishes the highest offset `w` such that every offset `<= w` is either
//! committed or has been given up on.
//!
//! ```text
//!        ┌────────────── tick ──────────────┐
//!        ▼                                  │
//!      Idle ──▶ Querying ──no gap──▶ Advancing
//!                  │                        ▲
//!                  └──gap──▶ GapWait ─expired┘
//! ```
//!
//! On the first sighting of a gap the horizon is fixed at the max offset seen
//! then. The wait keeps counting while the lowest gap stays at or under that
//! horizon; once `max_gap_wait_cycles` polls have gone by, every hole up to
//! the horizon is treated as a rolled-back write.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use rowjournal_kernel::OrderingOffset;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::config::TrackerConfig;
use crate::errors::Result;
use crate::storage::OrderingSource;
use crate::telemetry::{TRACKER_GAPS_SKIPPED_TOTAL, TRACKER_POLL_FAILURES_TOTAL, WATERMARK};

/// Shared watermark. Reads are a single atomic load.
#[derive(Debug)]
pub struct Watermark {
    value: AtomicI64,
    tx: watch::Sender<OrderingOffset>,
}

impl Default for Watermark {
    fn default() -> Self {
        Self::new()
    }
}

impl Watermark {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            value: AtomicI64::new(0),
            tx,
        }
    }

    pub fn current(&self) -> OrderingOffset {
        self.value.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> watch::Receiver<OrderingOffset> {
        self.tx.subscribe()
    }

    /// Raises the watermark to `to`. Lower values are ignored.
    pub(crate) fn advance(&self, to: OrderingOffset) -> bool {
        let previous = self.value.fetch_max(to, Ordering::AcqRel);
        if to <= previous {
            return false;
        }
        self.tx.send_if_modified(|published| {
            if to > *published {
                *published = to;
                true
            } else {
                false
            }
        });
        metrics::gauge!(WATERMARK, to as f64);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    Querying,
    GapWait {
        gap: OrderingOffset,
        horizon: OrderingOffset,
        cycles: u32,
    },
    Advancing,
}

pub struct OrderingTracker<S: OrderingSource + ?Sized> {
    source: Arc<S>,
    watermark: Arc<Watermark>,
    max_gap_wait_cycles: u32,
    state: TrackerState,
}

impl<S: OrderingSource + ?Sized> OrderingTracker<S> {
    pub fn new(source: Arc<S>, watermark: Arc<Watermark>, max_gap_wait_cycles: u32) -> Self {
        Self {
            source,
            watermark,
            max_gap_wait_cycles,
            state: TrackerState::Idle,
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn watermark(&self) -> &Arc<Watermark> {
        &self.watermark
    }

    /// One Querying pass. Returns the state the pass settled in: `Advancing`
    /// if the watermark moved to the max offset, `GapWait` while a gap is
    /// open, `Idle` when nothing new is committed.
    ///
    /// On error the watermark is left alone and the tracker is back in `Idle`;
    /// an open gap wait restarts from the next successful pass.
    pub async fn poll_once(&mut self) -> Result<TrackerState> {
        let waiting = match self.state {
            TrackerState::GapWait { horizon, cycles, .. } => Some((horizon, cycles)),
            _ => None,
        };
        self.state = TrackerState::Querying;

        match self.query(waiting).await {
            Ok(outcome) => {
                self.state = match outcome {
                    TrackerState::GapWait { .. } => outcome,
                    _ => TrackerState::Idle,
                };
                Ok(outcome)
            }
            Err(e) => {
                metrics::counter!(TRACKER_POLL_FAILURES_TOTAL, 1);
                self.state = TrackerState::Idle;
                Err(e)
            }
        }
    }

    async fn query(&self, waiting: Option<(OrderingOffset, u32)>) -> Result<TrackerState> {
        let watermark = self.watermark.current();
        let max = self.source.max_ordering().await?;
        if max <= watermark {
            return Ok(TrackerState::Idle);
        }

        let Some(gap) = self.source.first_gap(watermark, max).await? else {
            self.watermark.advance(max);
            return Ok(TrackerState::Advancing);
        };

        self.watermark.advance(gap - 1);
        let (horizon, cycles) = match waiting {
            Some((horizon, cycles)) if gap <= horizon => (horizon, cycles + 1),
            _ => {
                tracing::debug!("Gap at offset {} (max committed {})", gap, max);
                (max, 0)
            }
        };

        if cycles >= self.max_gap_wait_cycles {
            tracing::warn!(
                "Offsets missing in {}..={} after {} polls, treating them as rolled back",
                gap,
                horizon,
                cycles
            );
            metrics::counter!(TRACKER_GAPS_SKIPPED_TOTAL, 1);
            self.watermark.advance(horizon);
            return Ok(TrackerState::Advancing);
        }

        Ok(TrackerState::GapWait { gap, horizon, cycles })
    }
}

/// Owns the periodic tracker task.
pub struct TrackerSupervisor;

impl TrackerSupervisor {
    pub fn spawn<S>(source: Arc<S>, config: TrackerConfig) -> TrackerHandle
    where
        S: OrderingSource + ?Sized + 'static,
    {
        Self::spawn_with(source, Arc::new(Watermark::new()), config)
    }

    /// Like [`spawn`](Self::spawn), publishing into an existing watermark.
    pub fn spawn_with<S>(source: Arc<S>, watermark: Arc<Watermark>, config: TrackerConfig) -> TrackerHandle
    where
        S: OrderingSource + ?Sized + 'static,
    {
        let cancel = CancellationToken::new();
        let tracker = OrderingTracker::new(source, Arc::clone(&watermark), config.max_gap_wait_cycles);
        let task = tokio::spawn(run(tracker, config, cancel.clone()));
        TrackerHandle {
            watermark,
            cancel,
            task: Some(task),
        }
    }
}

async fn run<S>(mut tracker: OrderingTracker<S>, config: TrackerConfig, cancel: CancellationToken)
where
    S: OrderingSource + ?Sized,
{
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut backoff = config.failure_backoff();

    tracing::info!(
        "Ordering tracker started (poll {:?}, gap wait {} cycles)",
        config.poll_interval(),
        config.max_gap_wait_cycles
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = tracker.poll_once() => outcome,
        };

        match outcome {
            Ok(_) => backoff = config.failure_backoff(),
            Err(e) => {
                tracing::warn!(
                    "Tracker query failed at watermark {}: {}. Retrying in {:?}",
                    tracker.watermark().current(),
                    e,
                    backoff
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(config.max_failure_backoff());
            }
        }
    }

    tracing::info!("Ordering tracker stopped at watermark {}", tracker.watermark().current());
}

/// Handle to a running tracker. Dropping it stops the task.
pub struct TrackerHandle {
    watermark: Arc<Watermark>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TrackerHandle {
    pub fn current_watermark(&self) -> OrderingOffset {
        self.watermark.current()
    }

    pub fn watermark(&self) -> Arc<Watermark> {
        Arc::clone(&self.watermark)
    }

    pub fn subscribe(&self) -> watch::Receiver<OrderingOffset> {
        self.watermark.subscribe()
    }

    pub fn watermark_stream(&self) -> WatchStream<OrderingOffset> {
        WatchStream::new(self.subscribe())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Tracker task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::JournalError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicBool;

    /// Committed offsets set by hand.
    #[derive(Default)]
    struct ScriptedSource {
        committed: Mutex<BTreeSet<OrderingOffset>>,
        failing: AtomicBool,
    }

    impl ScriptedSource {
        fn commit(&self, offsets: impl IntoIterator<Item = OrderingOffset>) {
            self.committed.lock().extend(offsets);
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(JournalError::transient("tracker query", "database is locked"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl OrderingSource for ScriptedSource {
        async fn max_ordering(&self) -> Result<OrderingOffset> {
            self.check()?;
            Ok(self.committed.lock().last().copied().unwrap_or(0))
        }

        async fn first_gap(&self, after: OrderingOffset, up_to: OrderingOffset) -> Result<Option<OrderingOffset>> {
            self.check()?;
            let committed = self.committed.lock();
            Ok((after + 1..=up_to).find(|o| !committed.contains(o)))
        }
    }

    fn tracker(cycles: u32) -> (OrderingTracker<ScriptedSource>, Arc<ScriptedSource>) {
        let source = Arc::new(ScriptedSource::default());
        (OrderingTracker::new(Arc::clone(&source), Arc::new(Watermark::new()), cycles), source)
    }

    #[tokio::test]
    async fn test_advances_to_max_without_gaps() {
        let (mut tracker, source) = tracker(3);
        assert_eq!(tracker.poll_once().await.unwrap(), TrackerState::Idle);

        source.commit(1..=4);
        assert_eq!(tracker.poll_once().await.unwrap(), TrackerState::Advancing);
        assert_eq!(tracker.watermark().current(), 4);
        assert_eq!(tracker.state(), TrackerState::Idle);
    }

    #[tokio::test]
    async fn test_gap_holds_watermark_below_it_until_closed() {
        let (mut tracker, source) = tracker(5);
        source.commit([1, 2, 4, 5]);

        let state = tracker.poll_once().await.unwrap();
        assert_eq!(
            state,
            TrackerState::GapWait {
                gap: 3,
                horizon: 5,
                cycles: 0
            }
        );
        assert_eq!(tracker.watermark().current(), 2);

        source.commit([3]);
        assert_eq!(tracker.poll_once().await.unwrap(), TrackerState::Advancing);
        assert_eq!(tracker.watermark().current(), 5);
    }

    #[tokio::test]
    async fn test_permanent_gap_is_skipped_after_bounded_wait() {
        let (mut tracker, source) = tracker(2);
        source.commit([1, 3]);

        assert!(matches!(tracker.poll_once().await.unwrap(), TrackerState::GapWait { cycles: 0, .. }));
        // Later commits beyond the horizon do not extend the wait for offset 2.
        source.commit([4, 5]);
        assert!(matches!(tracker.poll_once().await.unwrap(), TrackerState::GapWait { cycles: 1, .. }));
        assert_eq!(tracker.watermark().current(), 1);

        assert_eq!(tracker.poll_once().await.unwrap(), TrackerState::Advancing);
        assert_eq!(tracker.watermark().current(), 3);

        assert_eq!(tracker.poll_once().await.unwrap(), TrackerState::Advancing);
        assert_eq!(tracker.watermark().current(), 5);
    }

    #[tokio::test]
    async fn test_gap_past_horizon_starts_a_new_wait() {
        let (mut tracker, source) = tracker(3);
        source.commit([1, 3]);
        tracker.poll_once().await.unwrap();

        source.commit([2, 5]);
        let state = tracker.poll_once().await.unwrap();
        assert_eq!(
            state,
            TrackerState::GapWait {
                gap: 4,
                horizon: 5,
                cycles: 0
            }
        );
        assert_eq!(tracker.watermark().current(), 3);
    }

    #[tokio::test]
    async fn test_zero_wait_cycles_skips_immediately() {
        let (mut tracker, source) = tracker(0);
        source.commit([2]);
        assert_eq!(tracker.poll_once().await.unwrap(), TrackerState::Advancing);
        assert_eq!(tracker.watermark().current(), 2);
    }

    #[tokio::test]
    async fn test_failed_query_keeps_watermark() {
        let (mut tracker, source) = tracker(3);
        source.commit(1..=2);
        tracker.poll_once().await.unwrap();

        source.commit(3..=4);
        source.failing.store(true, Ordering::SeqCst);
        assert!(tracker.poll_once().await.unwrap_err().is_retryable());
        assert_eq!(tracker.watermark().current(), 2);
        assert_eq!(tracker.state(), TrackerState::Idle);

        source.failing.store(false, Ordering::SeqCst);
        tracker.poll_once().await.unwrap();
        assert_eq!(tracker.watermark().current(), 4);
    }

    #[test]
    fn test_watermark_never_regresses() {
        let watermark = Watermark::new();
        let rx = watermark.subscribe();
        assert!(watermark.advance(7));
        assert!(!watermark.advance(3));
        assert!(!watermark.advance(7));
        assert_eq!(watermark.current(), 7);
        assert_eq!(*rx.borrow(), 7);
    }

    #[tokio::test]
    async fn test_supervisor_publishes_and_shuts_down() {
        let source = Arc::new(ScriptedSource::default());
        source.commit(1..=3);
        let config = TrackerConfig {
            poll_interval_ms: 5,
            ..TrackerConfig::default()
        };
        let handle = TrackerSupervisor::spawn(Arc::clone(&source), config);
        let mut rx = handle.subscribe();
        tokio::time::timeout(std::time::Duration::from_secs(5), rx.wait_for(|w| *w == 3))
            .await
            .expect("watermark never reached 3")
            .unwrap();
        assert_eq!(handle.current_watermark(), 3);
        assert!(handle.is_running());
        handle.shutdown().await;
    }
}
