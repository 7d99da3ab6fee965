use crate::{
    ChainWorker, SupervisorError,
    config::Config,
    event::{ChainEvent, ChainEventHandler, ChainEventNotification, EventEmitter, EventForwarder},
    reorg::{BlockSourceRegistry, L2BlockSource, Rewinder},
    safety_checker::{CrossSafePromoter, CrossSafeWorker},
};
use alloy_primitives::ChainId;
use interop_supervisor_storage::{ChainDbFactory, DerivationStorageWriter};
use interop_supervisor_types::{DependencySet, DerivedBlockRefPair, StaticDependencySet};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type DbFactory = ChainDbFactory<StaticDependencySet>;

/// Owns the storage, registries and per-chain workers of the supervisor core.
///
/// Every started chain runs one [`ChainWorker`] dispatching to a [`CrossSafeWorker`] and a
/// [`Rewinder`]. Events for a chain are fed through the sender returned by
/// [`SupervisorCore::start_chain`]. Every dispatched event is republished to the receivers
/// returned by [`SupervisorCore::subscribe`].
#[derive(Debug)]
pub struct SupervisorCore {
    config: Arc<Config>,
    database_factory: Arc<DbFactory>,
    promoter: Arc<CrossSafePromoter<DbFactory, StaticDependencySet>>,
    sources: Arc<BlockSourceRegistry>,
    emitter: Arc<EventEmitter>,
    notifications: broadcast::Sender<ChainEventNotification>,
    cancel_token: CancellationToken,
    workers: Mutex<HashMap<ChainId, JoinHandle<()>>>,
}

impl SupervisorCore {
    /// Creates a new [`SupervisorCore`] after validating `config`.
    pub fn new(config: Config) -> Result<Self, SupervisorError> {
        config.validate()?;

        let mut database_factory =
            ChainDbFactory::new(config.datadir.clone(), config.dependency_set.clone());
        if config.metrics_enabled {
            database_factory = database_factory.with_metrics();
        }
        let database_factory = Arc::new(database_factory);

        let mut promoter =
            CrossSafePromoter::new(database_factory.clone(), config.dependency_set.clone())
                .with_max_hazard_checks(config.max_hazard_block_checks);
        if config.metrics_enabled {
            promoter = promoter.with_metrics();
        }

        let (notifications, _) = broadcast::channel(config.event_channel_capacity);
        Ok(Self {
            config: Arc::new(config),
            database_factory,
            promoter: Arc::new(promoter),
            sources: Arc::new(BlockSourceRegistry::new()),
            emitter: Arc::new(EventEmitter::new()),
            notifications,
            cancel_token: CancellationToken::new(),
            workers: Mutex::new(HashMap::new()),
        })
    }

    /// Opens the database of `chain_id` and anchors it at `anchor`.
    ///
    /// The anchor becomes the first local-safe and cross-safe block. Initialising an already
    /// anchored chain with the same anchor is a no-op.
    pub fn initialise_chain(
        &self,
        chain_id: ChainId,
        anchor: DerivedBlockRefPair,
    ) -> Result<(), SupervisorError> {
        self.ensure_supported(chain_id)?;
        let db = self.database_factory.get_or_create_db(chain_id)?;
        db.initialise(anchor).inspect_err(|err| {
            error!(target: "supervisor::service", chain_id, %anchor, %err, "Failed to initialise chain");
        })?;
        info!(target: "supervisor::service", chain_id, %anchor, "Initialised chain");
        Ok(())
    }

    /// Starts the workers of `chain_id` and returns the sender feeding its event loop.
    pub fn start_chain(
        &self,
        chain_id: ChainId,
        source: Arc<dyn L2BlockSource>,
    ) -> Result<mpsc::Sender<ChainEvent>, SupervisorError> {
        self.start_chain_with_handlers(chain_id, source, Vec::new())
    }

    /// Starts the workers of `chain_id` with `handlers` dispatched after the built-in ones.
    pub fn start_chain_with_handlers(
        &self,
        chain_id: ChainId,
        source: Arc<dyn L2BlockSource>,
        handlers: Vec<Arc<dyn ChainEventHandler>>,
    ) -> Result<mpsc::Sender<ChainEvent>, SupervisorError> {
        self.ensure_supported(chain_id)?;
        let mut workers = self.workers.lock().map_err(|err| {
            error!(target: "supervisor::service", %err, "Failed to acquire lock on chain workers");
            SupervisorError::LockPoisoned
        })?;
        if workers.contains_key(&chain_id) {
            warn!(target: "supervisor::service", chain_id, "Chain already started");
            return Err(SupervisorError::AlreadyStarted(chain_id));
        }

        let db = self.database_factory.get_or_create_db(chain_id)?;
        self.sources.register(chain_id, source)?;

        let (tx, rx) = mpsc::channel(self.config.event_channel_capacity);
        self.emitter.register(chain_id, tx.clone());

        let mut cross_safe =
            CrossSafeWorker::new(chain_id, self.promoter.clone(), self.emitter.clone());
        let mut rewinder =
            Rewinder::new(chain_id, db, self.sources.clone(), self.emitter.clone());
        if self.config.metrics_enabled {
            cross_safe = cross_safe.with_metrics();
            rewinder = rewinder.with_metrics();
        }

        let mut worker = ChainWorker::new(
            chain_id,
            rx,
            self.config.cross_safe_interval(),
            self.cancel_token.child_token(),
        )
        .with_handler(Arc::new(cross_safe))
        .with_handler(Arc::new(rewinder));
        let extra = handlers.len();
        for handler in handlers {
            worker = worker.with_handler(handler);
        }
        worker = worker.with_handler(Arc::new(EventForwarder::new(
            chain_id,
            self.notifications.clone(),
        )));

        workers.insert(chain_id, tokio::spawn(worker.run()));
        info!(target: "supervisor::service", chain_id, extra_handlers = extra, "Started chain");
        Ok(tx)
    }

    /// The registry of per-chain databases.
    pub const fn db_factory(&self) -> &Arc<DbFactory> {
        &self.database_factory
    }

    /// Subscribes to the events dispatched on every started chain.
    ///
    /// A receiver that falls more than the event channel capacity behind loses the oldest
    /// events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEventNotification> {
        self.notifications.subscribe()
    }

    /// The emitter routing events between chain workers.
    pub const fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// Returns list of supervised [`ChainId`]s, ordered by chain index.
    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.config.dependency_set.chains()
    }

    /// Cancels every chain worker and waits for them to stop.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handles: Vec<(ChainId, JoinHandle<()>)> = match self.workers.lock() {
            Ok(mut workers) => workers.drain().collect(),
            Err(err) => {
                error!(target: "supervisor::service", %err, "Failed to acquire lock on chain workers");
                return;
            }
        };
        for (chain_id, handle) in handles {
            if let Err(err) = handle.await {
                error!(target: "supervisor::service", chain_id, %err, "Chain worker panicked");
            }
        }
        info!(target: "supervisor::service", "Supervisor core stopped");
    }

    fn ensure_supported(&self, chain_id: ChainId) -> Result<(), SupervisorError> {
        if !self.config.dependency_set.dependencies.contains_key(&chain_id) {
            warn!(target: "supervisor::service", chain_id, "Unsupported chain ID");
            return Err(SupervisorError::UnsupportedChainId(chain_id));
        }
        Ok(())
    }
}
