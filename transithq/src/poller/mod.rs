//! Periodic retrieval of position snapshots.
//!
//! The [`Poller`] fetches immediately on start and then once per interval.
//! Every retrieval gets a sequence number so the consumer can reject a result
//! that resolves after a newer one.
//!
//! # Cancellation
//!
//! ```text
//! tick ──► spawn retrieval(seq) ──► fetch().await ──► cancelled? ──yes──► drop
//!                                                         │
//!                                                         no
//!                                                         ▼
//!                                             on_snapshot / on_error
//! ```
//!
//! [`PollerHandle::stop`] cancels the schedule and every in-flight retrieval.
//! The cancellation flag is checked at the callback boundary, so a retrieval
//! that completes after `stop()` never reaches the callbacks.
//!
//! Failures do not stop the schedule and there is no backoff: the next tick
//! fires at its normal time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entity::SequencedSnapshot;
use crate::feed::{FeedError, PositionsFeed};

/// Default poll interval (10 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Callbacks a running poller delivers results to.
struct Dispatch<S, E> {
    on_snapshot: S,
    on_error: E,
    cancellation: CancellationToken,
}

/// Drives periodic retrieval from a [`PositionsFeed`].
pub struct Poller {
    feed: Arc<dyn PositionsFeed>,
    interval: Duration,
}

impl Poller {
    /// Create a poller for `feed` ticking every `interval`.
    pub fn new(feed: Arc<dyn PositionsFeed>, interval: Duration) -> Self {
        Self { feed, interval }
    }

    /// Start polling on the current tokio runtime.
    ///
    /// `on_snapshot` receives each successful retrieval; `on_error` receives
    /// the sequence number and error of each failed one. Neither is called
    /// after [`PollerHandle::stop`].
    pub fn start<S, E>(self, on_snapshot: S, on_error: E) -> PollerHandle
    where
        S: Fn(SequencedSnapshot) + Send + Sync + 'static,
        E: Fn(u64, FeedError) + Send + Sync + 'static,
    {
        let cancellation = CancellationToken::new();
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        let dispatch = Arc::new(Dispatch {
            on_snapshot,
            on_error,
            cancellation: cancellation.clone(),
        });

        info!(
            feed = %self.feed.describe(),
            interval_ms = self.interval.as_millis() as u64,
            "Poller starting"
        );

        let task = tokio::spawn(Self::run(self.feed, self.interval, dispatch, trigger_rx));

        PollerHandle {
            cancellation,
            trigger: trigger_tx,
            task: Some(task),
        }
    }

    async fn run<S, E>(
        feed: Arc<dyn PositionsFeed>,
        period: Duration,
        dispatch: Arc<Dispatch<S, E>>,
        mut trigger_rx: mpsc::UnboundedReceiver<()>,
    ) where
        S: Fn(SequencedSnapshot) + Send + Sync + 'static,
        E: Fn(u64, FeedError) + Send + Sync + 'static,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sequence: u64 = 0;

        loop {
            tokio::select! {
                biased;

                _ = dispatch.cancellation.cancelled() => {
                    info!("Poller stopped");
                    break;
                }

                _ = ticker.tick() => {}

                Some(()) = trigger_rx.recv() => {
                    debug!("Manual refresh requested");
                }
            }

            sequence += 1;
            tokio::spawn(Self::retrieve(
                Arc::clone(&feed),
                Arc::clone(&dispatch),
                sequence,
            ));
        }
    }

    async fn retrieve<S, E>(
        feed: Arc<dyn PositionsFeed>,
        dispatch: Arc<Dispatch<S, E>>,
        sequence: u64,
    ) where
        S: Fn(SequencedSnapshot) + Send + Sync + 'static,
        E: Fn(u64, FeedError) + Send + Sync + 'static,
    {
        let result = tokio::select! {
            biased;
            _ = dispatch.cancellation.cancelled() => return,
            result = feed.fetch() => result,
        };

        // Stop may have landed while the fetch was resolving.
        if dispatch.cancellation.is_cancelled() {
            debug!(sequence, "Discarding retrieval completed after stop");
            return;
        }

        match result {
            Ok(snapshot) => {
                debug!(sequence, entities = snapshot.len(), "Retrieved snapshot");
                (dispatch.on_snapshot)(SequencedSnapshot::new(sequence, snapshot));
            }
            Err(error) => {
                warn!(sequence, error = %error, "Positions retrieval failed");
                (dispatch.on_error)(sequence, error);
            }
        }
    }
}

/// Handle to a running poller.
///
/// Dropping the handle stops the poller.
#[derive(Debug)]
pub struct PollerHandle {
    cancellation: CancellationToken,
    trigger: mpsc::UnboundedSender<()>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Halt all future retrievals and discard in-flight ones.
    pub fn stop(&self) {
        self.cancellation.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Start an extra retrieval now, outside the regular schedule.
    pub fn poll_now(&self) {
        if !self.is_stopped() {
            let _ = self.trigger.send(());
        }
    }

    /// Stop and wait for the scheduling task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
