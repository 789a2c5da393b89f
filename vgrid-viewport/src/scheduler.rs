use std::sync::Arc;
use std::time::{Duration, Instant};

use bon::Builder;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use vgrid_query::{FilterSpec, IndexQuery, SortSpec};
use vgrid_store::{BufferExtent, BufferLease, RecordProducer, StoreError};

use crate::consumer::GridConsumer;
use crate::window::{RowMap, ViewportError, ViewportRange, ViewportWindow, WindowId, WindowState};

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Builder)]
/// Configuration options for the refresh scheduler.
pub struct SchedulerOptions {
    #[builder(default = DEFAULT_REFRESH_INTERVAL)]
    /// How often the producer's time-varying fields are advanced and the
    /// visible rows are pushed to the consumer.
    ///
    /// Default is `1000ms`.
    refresh_interval: Duration,
    #[builder(default = 128)]
    /// The maximum number of consumer events queued before senders
    /// wait for the coordinator to catch up.
    event_capacity: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SchedulerOptions {
    /// Rejects options the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.refresh_interval.is_zero() {
            return Err(SchedulerError::InvalidInterval(self.refresh_interval));
        }
        if self.event_capacity == 0 {
            return Err(SchedulerError::InvalidEventCapacity);
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}

#[derive(Debug, thiserror::Error)]
/// An error that can occur when setting up or talking to the viewport coordinator.
pub enum SchedulerError {
    #[error("refresh interval must be greater than zero, got {0:?}")]
    InvalidInterval(Duration),
    #[error("event capacity must be greater than zero")]
    InvalidEventCapacity,
    #[error("Viewport Error: {0}")]
    Viewport(#[from] ViewportError),
    #[error("viewport coordinator shutdown")]
    /// The coordinator task has exited.
    Shutdown,
}

/// Spawns the coordinator for a new viewport onto the current tokio runtime.
///
/// The coordinator owns the [ViewportWindow] and is the only place the index
/// set is recomputed, every refresh trigger (interval tick, range change, filter
/// or sort change) is funnelled through its event queue. It runs until every
/// [ViewportHandle] has been dropped.
pub fn spawn_viewport<P: RecordProducer>(
    producer: Arc<P>,
    options: SchedulerOptions,
) -> Result<ViewportHandle, SchedulerError> {
    options.validate()?;

    let (events_tx, events_rx) = flume::bounded(options.event_capacity);
    let window = ViewportWindow::new();
    let window_id = window.id();

    let coordinator = ViewportCoordinator {
        producer,
        window,
        consumer: None,
        filter: FilterSpec::default(),
        sort: SortSpec::default(),
        extent: None,
        refresh_interval: options.refresh_interval,
        events: events_rx,
    };

    tokio::spawn(coordinator.run());

    Ok(ViewportHandle {
        window_id,
        events_tx,
    })
}

#[derive(Clone)]
/// The consumer's side of a viewport.
///
/// Once the viewport has been destroyed every call still succeeds but
/// is ignored by the coordinator.
pub struct ViewportHandle {
    window_id: WindowId,
    events_tx: flume::Sender<ViewportEvent>,
}

impl ViewportHandle {
    /// Returns the [WindowId] of the viewport.
    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    /// Attaches the consumer and establishes the total row count.
    pub async fn init(&self, consumer: impl GridConsumer) -> Result<(), SchedulerError> {
        self.send(ViewportEvent::Init(Box::new(consumer))).await
    }

    /// Changes the visible range, the rows are pushed to the consumer
    /// without waiting for the next tick.
    pub async fn set_range(&self, first: usize, last: usize) -> Result<(), SchedulerError> {
        let range = ViewportRange::new(first, last)?;
        self.send(ViewportEvent::RangeChanged(range)).await
    }

    /// Replaces the active filter and immediately recomputes the index set.
    pub async fn set_filter(&self, filter: FilterSpec) -> Result<(), SchedulerError> {
        self.send(ViewportEvent::FilterChanged(filter)).await
    }

    /// Replaces the active sort and immediately recomputes the index set.
    pub async fn set_sort(&self, sort: SortSpec) -> Result<(), SchedulerError> {
        self.send(ViewportEvent::SortChanged(sort)).await
    }

    /// Resolves an arbitrary range against the latest index set and returns it
    /// to the caller rather than the consumer.
    pub async fn resolve(&self, first: usize, last: usize) -> Result<RowMap, SchedulerError> {
        let range = ViewportRange::new(first, last)?;
        let (ack, rx) = oneshot::channel();
        self.send(ViewportEvent::Resolve { range, ack }).await?;
        rx.await.map_err(|_| SchedulerError::Shutdown)
    }

    /// Detaches the consumer, pending and future refreshes become no-ops.
    pub async fn destroy(&self) -> Result<(), SchedulerError> {
        self.send(ViewportEvent::Destroy).await
    }

    async fn send(&self, event: ViewportEvent) -> Result<(), SchedulerError> {
        self.events_tx.send_async(event).await.map_err(|_| {
            warn!(window_id = %self.window_id, "Viewport coordinator aborted unexpectedly");
            SchedulerError::Shutdown
        })
    }
}

enum ViewportEvent {
    Init(Box<dyn GridConsumer>),
    RangeChanged(ViewportRange),
    FilterChanged(FilterSpec),
    SortChanged(SortSpec),
    Resolve {
        range: ViewportRange,
        ack: oneshot::Sender<RowMap>,
    },
    Destroy,
}

#[derive(Default)]
/// The work accumulated from a tick and any events queued alongside it.
struct PendingPass {
    advance_time: bool,
    recompute: bool,
    push_rows: bool,
    announce_row_count: Option<usize>,
    replies: Vec<(ViewportRange, oneshot::Sender<RowMap>)>,
}

impl PendingPass {
    fn tick(&mut self) {
        self.advance_time = true;
        self.recompute = true;
        self.push_rows = true;
    }
}

#[derive(Default)]
struct PassOutcome {
    row_count: Option<usize>,
    rows: Option<RowMap>,
    replies: Vec<(RowMap, oneshot::Sender<RowMap>)>,
}

/// Runs a CPU bound pass without stalling the other tasks on this worker.
///
/// On a multi-threaded runtime the worker hands its queued tasks off for the
/// duration of `f`, a current-thread runtime has nowhere to move them and
/// runs `f` inline.
fn run_blocking<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}

struct ViewportCoordinator<P> {
    producer: Arc<P>,
    window: ViewportWindow,
    consumer: Option<Box<dyn GridConsumer>>,
    filter: FilterSpec,
    sort: SortSpec,
    /// The buffer bounds observed by the last pass.
    extent: Option<BufferExtent>,
    refresh_interval: Duration,
    events: flume::Receiver<ViewportEvent>,
}

impl<P: RecordProducer> ViewportCoordinator<P> {
    #[instrument("viewport", skip(self), fields(window_id = %self.window.id()))]
    async fn run(mut self) {
        info!(refresh_interval = ?self.refresh_interval, "Viewport coordinator is active");

        let mut ticker = tokio::time::interval(self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately, refreshes start one interval in.
        ticker.tick().await;

        loop {
            let next = tokio::select! {
                _ = ticker.tick() => None,
                event = self.events.recv_async() => Some(event),
            };

            let mut pass = PendingPass::default();
            match next {
                None => pass.tick(),
                Some(Ok(event)) => self.apply_event(event, &mut pass),
                Some(Err(_)) => break,
            }

            // Anything queued while the last pass ran is folded into this one.
            while let Ok(event) = self.events.try_recv() {
                self.apply_event(event, &mut pass);
            }

            self.run_pass(pass).await;
        }

        info!("Viewport coordinator is closing");
    }

    fn apply_event(&mut self, event: ViewportEvent, pass: &mut PendingPass) {
        if self.window.state() == WindowState::Destroyed {
            match event {
                ViewportEvent::Resolve { ack, .. } => {
                    let _ = ack.send(RowMap::new());
                },
                _ => debug!("Ignoring event for destroyed viewport"),
            }
            return;
        }

        match event {
            ViewportEvent::Init(consumer) => {
                let total_row_count = self.producer.record_count();
                if self.window.init(total_row_count) {
                    info!(total_row_count, "Viewport initialised");
                    self.consumer = Some(consumer);
                    pass.announce_row_count = Some(total_row_count);
                    pass.recompute = true;
                    pass.push_rows = true;
                }
            },
            ViewportEvent::RangeChanged(range) => {
                if self.window.set_range(range) {
                    debug!(first = range.first(), last = range.last(), "Viewport range changed");
                    pass.recompute = true;
                    pass.push_rows = true;
                } else {
                    debug!("Ignoring range change on uninitialised viewport");
                }
            },
            ViewportEvent::FilterChanged(filter) => {
                debug!(filter = ?filter, "Filter changed");
                self.filter = filter;
                pass.recompute = true;
                pass.push_rows = true;
            },
            ViewportEvent::SortChanged(sort) => {
                debug!(sort = ?sort, "Sort changed");
                self.sort = sort;
                pass.recompute = true;
                pass.push_rows = true;
            },
            ViewportEvent::Resolve { range, ack } => {
                pass.recompute = true;
                pass.replies.push((range, ack));
            },
            ViewportEvent::Destroy => {
                info!("Viewport destroyed");
                self.window.destroy();
                self.consumer = None;
            },
        }
    }

    async fn run_pass(&mut self, pass: PendingPass) {
        if self.window.state() == WindowState::Destroyed {
            for (_, ack) in pass.replies {
                let _ = ack.send(RowMap::new());
            }
            return;
        }

        if pass.advance_time {
            self.producer.advance_time();
        }

        let outcome = if pass.recompute {
            let push_rows = pass.push_rows;
            let replies = pass.replies;
            run_blocking(|| self.recompute_and_resolve(push_rows, replies))
        } else {
            PassOutcome::default()
        };

        if let Some(consumer) = self.consumer.as_mut() {
            if let Some(total_row_count) = pass.announce_row_count {
                consumer.set_row_count(total_row_count).await;
            }
            if let Some(row_count) = outcome.row_count {
                debug!(row_count, "Row count changed");
                consumer.set_row_count(row_count).await;
            }
            if let Some(rows) = outcome.rows {
                consumer.set_row_data(rows).await;
            }
        }

        for (rows, ack) in outcome.replies {
            let _ = ack.send(rows);
        }
    }

    /// Recomputes the index set and decodes the visible rows in a single
    /// pass over one buffer lease.
    ///
    /// The lease never escapes this function, the producer is free to mutate
    /// the buffer again once it returns.
    fn recompute_and_resolve(
        &mut self,
        push_rows: bool,
        replies: Vec<(ViewportRange, oneshot::Sender<RowMap>)>,
    ) -> PassOutcome {
        let start = Instant::now();
        let producer = self.producer.clone();
        let lease = self.acquire_lease(&producer);

        let index_set = IndexQuery::new(&self.filter, &self.sort).evaluate(&lease);
        let row_count = self.window.replace_index_set(index_set);

        let rows = if push_rows && self.window.range().is_some() {
            Some(self.window.resolve(&lease))
        } else {
            None
        };

        let replies = replies
            .into_iter()
            .map(|(range, ack)| (self.window.resolve_range(&lease, range), ack))
            .collect();

        debug!(
            elapsed = ?start.elapsed(),
            index_count = self.window.index_set().len(),
            resolved = rows.as_ref().map(|rows| rows.len()).unwrap_or(0),
            "Refreshed viewport"
        );

        PassOutcome {
            row_count,
            rows,
            replies,
        }
    }

    /// Leases the buffer, re-validating the bounds seen by the previous pass.
    fn acquire_lease<'p>(&mut self, producer: &'p P) -> BufferLease<'p> {
        let lease = match self.extent.as_ref() {
            None => producer.lease(),
            Some(extent) => match producer.lease_checked(extent) {
                Ok(lease) => lease,
                Err(StoreError::StaleBufferHandle { expected, current }) => {
                    debug!(expected, current, "Buffer replaced since last pass, re-acquiring");
                    producer.lease()
                },
                Err(e) => {
                    warn!(error = %e, "Failed to validate buffer lease, re-acquiring");
                    producer.lease()
                },
            },
        };

        self.extent = Some(lease.extent());
        lease
    }
}
