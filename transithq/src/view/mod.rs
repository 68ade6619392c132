//! View lifecycle controller.
//!
//! The [`ViewController`] owns the rendering surface for one mounted view and
//! wires the poller, reconciler, sink and interaction handler around it.
//!
//! # Lifecycle
//!
//! ```text
//!  Uninitialized ──initialize()──► Initializing ──surface Ready──► Ready
//!        │                              │                           │
//!        └──────────────────────────────┴───────destroy()───────────┴──► Destroyed
//! ```
//!
//! # Event flow
//!
//! ```text
//!  Poller ──────────── Snapshot / PollFailed ─────┐
//!  Surface ─────────── Surface(ready, click) ─────┤
//!  expansion task ──── AggregateResolved ─────────┼──► mpsc ──► ViewController
//!  ViewHandle ──────── Refresh / Unmount ─────────┘              (one task)
//! ```
//!
//! Everything that touches the surface or the displayed set runs on the task
//! draining that channel, one event at a time. Snapshots are applied in
//! sequence order; anything older than the newest one seen is dropped.
//!
//! Teardown order on [`ViewController::destroy`]: stop the poller, cancel
//! pending aggregate resolutions, close the popup, remove sink visuals,
//! destroy the surface. No command reaches the surface afterwards.
//!
//! # Example
//!
//! ```ignore
//! use transithq::feed::FeedSource;
//! use transithq::surface::HeadlessSurfaceFactory;
//! use transithq::view::{ViewConfig, ViewController};
//!
//! let feed = FeedSource::default().build()?;
//! let factory = Arc::new(HeadlessSurfaceFactory::default());
//! let (controller, handle) = ViewController::new(ViewConfig::default(), feed, factory);
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(controller.run(shutdown.clone()));
//!
//! handle.refresh();
//! println!("{}", handle.current_status().status_line());
//! ```

mod config;
mod error;
mod status;

pub use config::{ViewConfig, DEFAULT_CENTER, DEFAULT_STYLE_URL, DEFAULT_ZOOM};
pub use error::ViewError;
pub use status::ViewStatus;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::entity::{LngLat, SequencedSnapshot};
use crate::feed::{FeedError, PositionsFeed};
use crate::interaction::{InteractionHandler, PendingExpansion};
use crate::poller::{Poller, PollerHandle};
use crate::reconcile::diff;
use crate::sink::EntitySink;
use crate::surface::{RenderSurface, SurfaceError, SurfaceEvent, SurfaceEvents, SurfaceFactory};

// =============================================================================
// State and events
// =============================================================================

/// Lifecycle state of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewState {
    /// Constructed, no surface yet.
    #[default]
    Uninitialized,
    /// Surface created, waiting for it to become ready.
    Initializing,
    /// Surface ready, snapshots are applied as they arrive.
    Ready,
    /// Torn down. Terminal.
    Destroyed,
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViewState::Uninitialized => "uninitialized",
            ViewState::Initializing => "initializing",
            ViewState::Ready => "ready",
            ViewState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Everything the controller reacts to.
#[derive(Debug)]
pub enum ViewEvent {
    /// A signal from the rendering surface.
    Surface(SurfaceEvent),
    /// A retrieval completed.
    Snapshot(SequencedSnapshot),
    /// A retrieval failed.
    PollFailed { sequence: u64, error: FeedError },
    /// An aggregate's expansion zoom resolved.
    AggregateResolved {
        request: u64,
        center: LngLat,
        result: Result<f64, SurfaceError>,
    },
    /// Retrieve now instead of waiting for the next tick.
    Refresh,
    /// Tear the view down.
    Unmount,
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable remote control for a running view.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    events: mpsc::UnboundedSender<ViewEvent>,
    status: watch::Receiver<ViewStatus>,
}

impl ViewHandle {
    /// Ask for an immediate retrieval.
    pub fn refresh(&self) {
        let _ = self.events.send(ViewEvent::Refresh);
    }

    /// Ask the view to tear itself down.
    pub fn unmount(&self) {
        let _ = self.events.send(ViewEvent::Unmount);
    }

    /// Subscribe to status changes.
    pub fn status(&self) -> watch::Receiver<ViewStatus> {
        self.status.clone()
    }

    /// The latest published status.
    pub fn current_status(&self) -> ViewStatus {
        self.status.borrow().clone()
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Owns the surface of one mounted view and keeps it in sync with the feed.
pub struct ViewController {
    config: ViewConfig,
    feed: Arc<dyn PositionsFeed>,
    factory: Arc<dyn SurfaceFactory>,
    state: ViewState,
    surface: Option<Box<dyn RenderSurface>>,
    sink: Box<dyn EntitySink>,
    interaction: InteractionHandler,
    poller: Option<PollerHandle>,
    /// Latest snapshot received before the surface was ready.
    pending: Option<SequencedSnapshot>,
    /// Newest snapshot sequence applied or buffered.
    last_sequence: u64,
    /// Cancelled on destroy; guards background work tied to this view.
    lifetime: CancellationToken,
    events_tx: mpsc::UnboundedSender<ViewEvent>,
    events_rx: mpsc::UnboundedReceiver<ViewEvent>,
    status: watch::Sender<ViewStatus>,
}

impl ViewController {
    /// Create an unmounted view.
    ///
    /// Returns the controller and a handle for refresh, unmount and status.
    pub fn new(
        config: ViewConfig,
        feed: Arc<dyn PositionsFeed>,
        factory: Arc<dyn SurfaceFactory>,
    ) -> (Self, ViewHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ViewStatus::default());
        let sink = config.mode.build(config.cluster);

        let handle = ViewHandle {
            events: events_tx.clone(),
            status: status_rx,
        };

        let controller = Self {
            config,
            feed,
            factory,
            state: ViewState::Uninitialized,
            surface: None,
            sink,
            interaction: InteractionHandler::default(),
            poller: None,
            pending: None,
            last_sequence: 0,
            lifetime: CancellationToken::new(),
            events_tx,
            events_rx,
            status: status_tx,
        };

        (controller, handle)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ViewState {
        self.state
    }

    /// The sink holding the displayed set.
    pub fn sink(&self) -> &dyn EntitySink {
        self.sink.as_ref()
    }

    /// The latest published status.
    pub fn status(&self) -> ViewStatus {
        self.status.borrow().clone()
    }

    /// Create the surface, install the sink and start polling.
    ///
    /// Idempotent while initializing or ready. Must be called within a tokio
    /// runtime.
    pub fn initialize(&mut self) -> Result<(), ViewError> {
        match self.state {
            ViewState::Destroyed => return Err(ViewError::Destroyed),
            ViewState::Initializing | ViewState::Ready => {
                debug!(state = %self.state, "View already initialized");
                return Ok(());
            }
            ViewState::Uninitialized => {}
        }

        let events_tx = self.events_tx.clone();
        let events = SurfaceEvents::new(move |event| {
            let _ = events_tx.send(ViewEvent::Surface(event));
        });

        let options = self.config.surface_options();
        let mut surface = self.factory.create(&options, events)?;
        if let Err(e) = self.sink.install(surface.as_mut()) {
            surface.destroy();
            return Err(e.into());
        }
        self.surface = Some(surface);
        self.set_state(ViewState::Initializing);

        let snapshots_tx = self.events_tx.clone();
        let errors_tx = self.events_tx.clone();
        let poller = Poller::new(Arc::clone(&self.feed), self.config.poll_interval).start(
            move |snapshot| {
                let _ = snapshots_tx.send(ViewEvent::Snapshot(snapshot));
            },
            move |sequence, error| {
                let _ = errors_tx.send(ViewEvent::PollFailed { sequence, error });
            },
        );
        self.poller = Some(poller);

        info!(
            mode = %self.config.mode,
            style = %self.config.style,
            center = %self.config.center,
            zoom = self.config.zoom,
            "View initializing"
        );
        Ok(())
    }

    /// Process one event.
    pub fn handle_event(&mut self, event: ViewEvent) {
        if self.state == ViewState::Destroyed {
            debug!(event = ?event, "Dropping event for destroyed view");
            return;
        }

        match event {
            ViewEvent::Surface(SurfaceEvent::Ready) => self.on_ready(),
            ViewEvent::Surface(event) => self.on_interaction(event),
            ViewEvent::Snapshot(snapshot) => self.on_snapshot(snapshot),
            ViewEvent::PollFailed { sequence, error } => self.on_poll_failed(sequence, error),
            ViewEvent::AggregateResolved {
                request,
                center,
                result,
            } => {
                if self.state != ViewState::Ready {
                    return;
                }
                if let Some(surface) = self.surface.as_deref_mut() {
                    self.interaction
                        .complete_expansion(request, center, result, surface);
                }
            }
            ViewEvent::Refresh => {
                if let Some(poller) = &self.poller {
                    poller.poll_now();
                }
            }
            ViewEvent::Unmount => self.destroy(),
        }
    }

    /// Process every queued event without waiting.
    ///
    /// Returns the number of events handled.
    pub fn drain_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Tear the view down. Safe to call in any state; repeated calls are
    /// no-ops.
    pub fn destroy(&mut self) {
        if self.state == ViewState::Destroyed {
            return;
        }

        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        self.lifetime.cancel();
        self.pending = None;

        if let Some(mut surface) = self.surface.take() {
            self.interaction.reset(surface.as_mut());
            self.sink.teardown(surface.as_mut());
            surface.destroy();
        }

        self.set_state(ViewState::Destroyed);
        info!("View destroyed");
    }

    /// Initialize, then process events until unmounted or `shutdown` fires.
    ///
    /// The view is destroyed before this returns.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), ViewError> {
        self.initialize()?;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("View shutdown requested");
                    break;
                }

                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
            }

            if self.state == ViewState::Destroyed {
                break;
            }
        }

        self.destroy();
        Ok(())
    }

    fn on_ready(&mut self) {
        if self.state != ViewState::Initializing {
            debug!(state = %self.state, "Ignoring surface ready signal");
            return;
        }
        self.set_state(ViewState::Ready);
        info!("View ready");

        if let Some(snapshot) = self.pending.take() {
            debug!(sequence = snapshot.sequence, "Applying buffered snapshot");
            self.apply(snapshot);
        }
    }

    fn on_snapshot(&mut self, snapshot: SequencedSnapshot) {
        if snapshot.sequence <= self.last_sequence {
            debug!(
                sequence = snapshot.sequence,
                latest = self.last_sequence,
                "Discarding out-of-order snapshot"
            );
            return;
        }
        self.last_sequence = snapshot.sequence;

        match self.state {
            ViewState::Ready => self.apply(snapshot),
            _ => {
                debug!(sequence = snapshot.sequence, "Surface not ready, buffering snapshot");
                self.pending = Some(snapshot);
            }
        }
    }

    fn on_poll_failed(&mut self, sequence: u64, error: FeedError) {
        if sequence <= self.last_sequence {
            debug!(sequence, "Ignoring failure older than displayed data");
            return;
        }
        let message = error.to_string();
        self.status.send_modify(|status| {
            status.error = Some(message);
            status.failures += 1;
        });
    }

    fn on_interaction(&mut self, event: SurfaceEvent) {
        if self.state != ViewState::Ready {
            return;
        }
        let Some(surface) = self.surface.as_deref_mut() else {
            return;
        };
        if let Some(pending) = self
            .interaction
            .handle(&event, self.sink.as_ref(), surface)
        {
            self.spawn_expansion(pending);
        }
    }

    /// Resolve an expansion zoom off the event loop, unless the view dies
    /// first.
    fn spawn_expansion(&self, pending: PendingExpansion) {
        let events = self.events_tx.clone();
        let lifetime = self.lifetime.clone();
        let PendingExpansion {
            request,
            center,
            resolve,
        } = pending;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = lifetime.cancelled() => {
                    debug!(request, "Aggregate expansion abandoned");
                }
                result = resolve => {
                    let _ = events.send(ViewEvent::AggregateResolved { request, center, result });
                }
            }
        });
    }

    fn apply(&mut self, sequenced: SequencedSnapshot) {
        let Some(surface) = self.surface.as_deref_mut() else {
            return;
        };
        let snapshot = &sequenced.snapshot;
        let delta = diff(&self.sink.displayed_ids(), snapshot);

        match self.sink.apply(surface, snapshot, &delta) {
            Ok(report) => {
                if report.is_noop() {
                    debug!(sequence = sequenced.sequence, "Snapshot changed nothing on screen");
                } else {
                    info!(
                        sequence = sequenced.sequence,
                        added = report.added,
                        moved = report.moved,
                        removed = report.removed,
                        failed = report.failed,
                        "Snapshot applied"
                    );
                }
                let displayed = self.sink.displayed_len();
                self.status.send_modify(|status| {
                    status.vehicles = displayed;
                    status.last_updated = Some(snapshot.retrieved_at());
                    status.sequence = sequenced.sequence;
                    status.rejected = snapshot.rejected();
                    status.error = None;
                });
            }
            Err(e) => {
                warn!(sequence = sequenced.sequence, error = %e, "Failed to apply snapshot");
            }
        }
    }

    fn set_state(&mut self, state: ViewState) {
        self.state = state;
        self.status.send_modify(|status| status.state = state);
    }
}

impl Drop for ViewController {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityId, Snapshot};
    use crate::sink::{SinkMode, CLUSTER_LAYER, POINT_LAYER, SOURCE_ID};
    use crate::surface::{HeadlessProbe, HeadlessSurfaceFactory, ReadyMode, SurfaceOp};
    use chrono::Utc;
    use futures::future::{self, BoxFuture};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Feed whose retrievals never complete.
    struct SilentFeed;

    impl PositionsFeed for SilentFeed {
        fn fetch(&self) -> BoxFuture<'_, Result<Snapshot, FeedError>> {
            Box::pin(future::pending())
        }

        fn describe(&self) -> String {
            "silent".to_string()
        }
    }

    /// Feed resolving each retrieval when the test says so.
    #[derive(Default)]
    struct GatedFeed {
        gates: Mutex<VecDeque<oneshot::Receiver<Snapshot>>>,
        calls: Mutex<usize>,
    }

    impl GatedFeed {
        fn gate(&self) -> oneshot::Sender<Snapshot> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().push_back(rx);
            tx
        }
    }

    impl PositionsFeed for GatedFeed {
        fn fetch(&self) -> BoxFuture<'_, Result<Snapshot, FeedError>> {
            *self.calls.lock() += 1;
            let gate = self.gates.lock().pop_front();
            Box::pin(async move {
                match gate {
                    Some(rx) => rx.await.map_err(|_| FeedError::Http("gate dropped".into())),
                    None => future::pending().await,
                }
            })
        }

        fn describe(&self) -> String {
            "gated".to_string()
        }
    }

    fn snapshot(sequence: u64, entities: &[(&str, f64, f64)]) -> ViewEvent {
        let entities = entities
            .iter()
            .map(|(id, lon, lat)| Entity::new(*id, LngLat::new(*lon, *lat)))
            .collect();
        ViewEvent::Snapshot(SequencedSnapshot::new(
            sequence,
            Snapshot::new(entities, Utc::now()),
        ))
    }

    fn mount(
        feed: Arc<dyn PositionsFeed>,
        ready: ReadyMode,
        mode: SinkMode,
    ) -> (ViewController, ViewHandle, HeadlessProbe) {
        let factory = HeadlessSurfaceFactory::new(ready);
        let probe = factory.probe();
        let config = ViewConfig::default().with_mode(mode);
        let (controller, handle) = ViewController::new(config, feed, Arc::new(factory));
        (controller, handle, probe)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (mut view, _handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Manual, SinkMode::Clustered);

        view.initialize().unwrap();
        view.initialize().unwrap();

        assert_eq!(view.state(), ViewState::Initializing);
        assert_eq!(probe.surfaces_created(), 1);
        assert_eq!(probe.count_ops(|op| matches!(op, SurfaceOp::AddSource(_))), 1);
    }

    #[tokio::test]
    async fn test_latest_pending_snapshot_applied_once_on_ready() {
        let (mut view, _handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Manual, SinkMode::Clustered);
        view.initialize().unwrap();

        view.handle_event(snapshot(1, &[("a", 0.0, 0.0)]));
        view.handle_event(snapshot(2, &[("a", 0.0, 0.0), ("b", 1.0, 1.0)]));
        assert_eq!(probe.source_len(SOURCE_ID), Some(0), "nothing applied before ready");

        probe.signal_ready();
        view.drain_events();

        assert_eq!(view.state(), ViewState::Ready);
        assert_eq!(probe.source_len(SOURCE_ID), Some(2));
        assert_eq!(
            probe.count_ops(|op| matches!(op, SurfaceOp::SetSourceData { .. })),
            1
        );
        assert_eq!(view.status().vehicles, 2);
        assert_eq!(view.status().sequence, 2);
    }

    #[tokio::test]
    async fn test_out_of_order_snapshot_is_discarded() {
        let (mut view, _handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Markers);
        view.initialize().unwrap();
        view.drain_events();

        view.handle_event(snapshot(2, &[("new", 0.0, 0.0)]));
        view.handle_event(snapshot(1, &[("old", 1.0, 1.0)]));

        assert!(view.sink().entity(&EntityId::from("new")).is_some());
        assert!(view.sink().entity(&EntityId::from("old")).is_none());
        assert_eq!(probe.markers().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_failure_is_reported_then_cleared() {
        let (mut view, handle, _probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Clustered);
        view.initialize().unwrap();
        view.drain_events();

        view.handle_event(ViewEvent::PollFailed {
            sequence: 1,
            error: FeedError::Status {
                status: 503,
                body: "unavailable".into(),
            },
        });
        assert_eq!(
            handle.current_status().status_line(),
            "Error: API error: 503 unavailable"
        );

        view.handle_event(snapshot(2, &[("a", 0.0, 0.0)]));
        assert_eq!(handle.current_status().error, None);
    }

    #[tokio::test]
    async fn test_identical_failures_each_counted() {
        let (mut view, handle, _surface) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Markers);
        view.initialize().unwrap();
        view.drain_events();

        for sequence in [1, 2] {
            view.handle_event(ViewEvent::PollFailed {
                sequence,
                error: FeedError::Http("connection refused".into()),
            });
        }
        let status = handle.current_status();
        assert_eq!(status.failures, 2);
        assert_eq!(status.error.as_deref(), Some("HTTP error: connection refused"));

        view.handle_event(snapshot(3, &[("a", 0.0, 0.0)]));
        let status = handle.current_status();
        assert_eq!(status.error, None);
        assert_eq!(status.failures, 2, "recovery keeps the running total");
    }

    #[tokio::test]
    async fn test_destroy_tears_down_in_order() {
        let (mut view, _handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Markers);
        view.initialize().unwrap();
        view.drain_events();
        view.handle_event(snapshot(1, &[("a", 0.0, 0.0), ("b", 1.0, 1.0)]));
        let marker = *probe.markers().keys().next().unwrap();
        view.handle_event(ViewEvent::Surface(SurfaceEvent::MarkerClick { marker }));
        assert!(probe.popup().is_some());

        view.destroy();

        assert_eq!(view.state(), ViewState::Destroyed);
        assert!(probe.is_destroyed());
        assert!(probe.markers().is_empty());
        assert!(probe.popup().is_none());
        assert_eq!(probe.ops().last(), Some(&SurfaceOp::Destroy));

        // Anything arriving later is ignored without touching the surface.
        view.handle_event(snapshot(2, &[("c", 0.0, 0.0)]));
        view.destroy();
        assert_eq!(probe.rejected_after_destroy(), 0);
        assert!(matches!(view.initialize(), Err(ViewError::Destroyed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_during_in_flight_retrieval() {
        let feed = Arc::new(GatedFeed::default());
        let gate = feed.gate();
        let (mut view, _handle, probe) = mount(
            Arc::clone(&feed) as Arc<dyn PositionsFeed>,
            ReadyMode::Immediate,
            SinkMode::Markers,
        );
        view.initialize().unwrap();
        settle().await;
        view.drain_events();
        assert_eq!(*feed.calls.lock(), 1);

        view.destroy();
        let _ = gate.send(Snapshot::new(
            vec![Entity::new("late", LngLat::new(0.0, 0.0))],
            Utc::now(),
        ));
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        view.drain_events();

        assert!(probe.markers().is_empty());
        assert_eq!(view.sink().displayed_len(), 0);
        assert_eq!(probe.rejected_after_destroy(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_flow_from_poller() {
        let feed = Arc::new(GatedFeed::default());
        let gate = feed.gate();
        let (mut view, handle, probe) = mount(
            Arc::clone(&feed) as Arc<dyn PositionsFeed>,
            ReadyMode::Immediate,
            SinkMode::Clustered,
        );
        view.initialize().unwrap();

        gate.send(Snapshot::new(
            vec![Entity::new("a", LngLat::new(0.0, 0.0))],
            Utc::now(),
        ))
        .unwrap();
        settle().await;
        view.drain_events();

        assert_eq!(probe.source_len(SOURCE_ID), Some(1));
        assert_eq!(handle.current_status().state, ViewState::Ready);

        handle.refresh();
        view.drain_events();
        settle().await;
        assert_eq!(*feed.calls.lock(), 2, "refresh starts a retrieval");
    }

    #[tokio::test]
    async fn test_aggregate_tap_moves_camera() {
        let (mut view, _handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Clustered);
        view.initialize().unwrap();
        view.drain_events();
        view.handle_event(snapshot(
            1,
            &[("a", -117.1611, 32.7157), ("b", -117.1612, 32.7158)],
        ));
        probe.set_zoom(6.0);

        let cluster = probe.rendered_features(CLUSTER_LAYER).remove(0);
        assert!(probe.click(CLUSTER_LAYER, cluster));
        view.drain_events();
        settle().await;
        view.drain_events();

        let moves = probe.count_ops(|op| matches!(op, SurfaceOp::EaseTo { .. }));
        assert_eq!(moves, 1);
        assert!(probe.camera().1 >= 6.0);
    }

    #[tokio::test]
    async fn test_aggregate_resolution_after_destroy_is_noop() {
        let (mut view, _handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Clustered);
        view.initialize().unwrap();
        view.drain_events();
        view.handle_event(snapshot(
            1,
            &[("a", -117.1611, 32.7157), ("b", -117.1612, 32.7158)],
        ));
        probe.set_zoom(6.0);

        let cluster = probe.rendered_features(CLUSTER_LAYER).remove(0);
        probe.click(CLUSTER_LAYER, cluster);
        view.drain_events();
        view.destroy();
        settle().await;
        view.drain_events();

        assert_eq!(probe.count_ops(|op| matches!(op, SurfaceOp::EaseTo { .. })), 0);
        assert_eq!(probe.rejected_after_destroy(), 0);
    }

    #[tokio::test]
    async fn test_point_tap_opens_popup_with_id() {
        let (mut view, _handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Clustered);
        view.initialize().unwrap();
        view.drain_events();
        view.handle_event(snapshot(1, &[("1042", -117.1611, 32.7157)]));
        probe.set_zoom(16.0);

        let point = probe.rendered_features(POINT_LAYER).remove(0);
        probe.click(POINT_LAYER, point);
        view.drain_events();

        assert_eq!(probe.count_ops(|op| matches!(op, SurfaceOp::OpenPopup(_))), 1);
        assert!(probe.popup().unwrap().text().contains("1042"));
    }

    #[tokio::test]
    async fn test_run_stops_on_unmount() {
        let (view, handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Clustered);
        let task = tokio::spawn(view.run(CancellationToken::new()));

        settle().await;
        assert_eq!(handle.current_status().state, ViewState::Ready);

        handle.unmount();
        task.await.unwrap().unwrap();
        assert!(probe.is_destroyed());
        assert_eq!(handle.current_status().state, ViewState::Destroyed);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (view, _handle, probe) =
            mount(Arc::new(SilentFeed), ReadyMode::Immediate, SinkMode::Markers);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(view.run(shutdown.clone()));

        settle().await;
        shutdown.cancel();
        task.await.unwrap().unwrap();
        assert!(probe.is_destroyed());
    }
}
