use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::DispatchSettings;
use crate::engine::offers::OfferWaiters;
use crate::engine::queue::{DispatchBook, DispatchRequest};
use crate::error::AppError;
use crate::geo::GeoIndex;
use crate::models::event::DispatchEvent;
use crate::observability::metrics::Metrics;
use crate::ports::{
    BasicProofValidator, Clock, LoggingNotifier, Notifier, ProofValidator, SystemClock,
};
use crate::store::{
    AllocationStore, EarningStore, InMemoryAllocationStore, InMemoryEarningStore,
    InMemoryOfferStore, InMemoryTaskStore, InMemoryWorkerStore, OfferStore, TaskStore,
    WorkerStore,
};

pub struct AppState {
    pub workers: Arc<dyn WorkerStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub offers: Arc<dyn OfferStore>,
    pub allocations: Arc<dyn AllocationStore>,
    pub earnings: Arc<dyn EarningStore>,
    pub geo: GeoIndex,
    pub notifier: Arc<dyn Notifier>,
    pub proof_validator: Arc<dyn ProofValidator>,
    pub clock: Arc<dyn Clock>,
    pub settings: DispatchSettings,
    pub dispatch_tx: mpsc::Sender<DispatchRequest>,
    pub events_tx: broadcast::Sender<DispatchEvent>,
    pub waiters: OfferWaiters,
    pub book: DispatchBook,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        dispatch_queue_size: usize,
        event_buffer_size: usize,
    ) -> (Self, mpsc::Receiver<DispatchRequest>) {
        AppStateBuilder::new()
            .dispatch_queue_size(dispatch_queue_size)
            .event_buffer_size(event_buffer_size)
            .build_unchecked()
    }

    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }

    /// Publishes to websocket observers. Having no subscribers is not an error.
    pub fn publish(&self, event: DispatchEvent) {
        let _ = self.events_tx.send(event);
    }
}

/// Wires stores and collaborators into an `AppState`. Defaults are the
/// in-memory stores, the system clock and the logging notifier.
pub struct AppStateBuilder {
    dispatch_queue_size: usize,
    event_buffer_size: usize,
    settings: DispatchSettings,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    proof_validator: Arc<dyn ProofValidator>,
    workers: Arc<dyn WorkerStore>,
    tasks: Arc<dyn TaskStore>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            dispatch_queue_size: 1024,
            event_buffer_size: 1024,
            settings: DispatchSettings::default(),
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LoggingNotifier),
            proof_validator: Arc::new(BasicProofValidator),
            workers: Arc::new(InMemoryWorkerStore::new()),
            tasks: Arc::new(InMemoryTaskStore::new()),
        }
    }

    pub fn dispatch_queue_size(mut self, size: usize) -> Self {
        self.dispatch_queue_size = size.max(1);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size.max(1);
        self
    }

    pub fn settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn proof_validator(mut self, validator: Arc<dyn ProofValidator>) -> Self {
        self.proof_validator = validator;
        self
    }

    pub fn worker_store(mut self, workers: Arc<dyn WorkerStore>) -> Self {
        self.workers = workers;
        self
    }

    pub fn task_store(mut self, tasks: Arc<dyn TaskStore>) -> Self {
        self.tasks = tasks;
        self
    }

    /// Fails fast on settings the engine cannot run with.
    pub fn build(self) -> Result<(AppState, mpsc::Receiver<DispatchRequest>), AppError> {
        self.settings.validate()?;
        Ok(self.build_unchecked())
    }

    fn build_unchecked(self) -> (AppState, mpsc::Receiver<DispatchRequest>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(self.dispatch_queue_size);
        let (events_tx, _unused_rx) = broadcast::channel(self.event_buffer_size);

        (
            AppState {
                workers: self.workers,
                tasks: self.tasks,
                offers: Arc::new(InMemoryOfferStore::new()),
                allocations: Arc::new(InMemoryAllocationStore::new()),
                earnings: Arc::new(InMemoryEarningStore::new()),
                geo: GeoIndex::new(),
                notifier: self.notifier,
                proof_validator: self.proof_validator,
                clock: self.clock,
                settings: self.settings,
                dispatch_tx,
                events_tx,
                waiters: OfferWaiters::default(),
                book: DispatchBook::default(),
                metrics: Metrics::new(),
            },
            dispatch_rx,
        )
    }
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
