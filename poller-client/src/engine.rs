use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::types::{RegistrySnapshot, ServiceId, StatusEvent};
use tokio::sync::{mpsc, oneshot, watch};
use crate::error::{PollerError, Result};
use crate::push::PushHandler;
use crate::registry::RegistryApi;
use crate::validate::validate_service;

/// Called after every change of the visible snapshot, in order. Runs on the
/// engine task, so it must not block. A panicking observer is logged and
/// skipped.
pub type Observer = Box<dyn Fn(&RegistrySnapshot) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Extra `list` attempts when a resync fails
    pub resync_retries: u32,
    pub resync_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resync_retries: 2,
            resync_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Commands sent to the engine task
enum EngineCommand {
    Initialize(oneshot::Sender<Result<()>>),
    ApplyStatus(StatusEvent, oneshot::Sender<bool>),
    Create {
        name: String,
        url: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Update {
        id: ServiceId,
        name: String,
        url: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Delete(ServiceId, oneshot::Sender<Result<()>>),
    Observe(Observer),
    Shutdown,
}

/// Handle to the status synchronization engine.
///
/// The engine task owns the merged snapshot and processes one command at a
/// time, so merges, resyncs and mutations never interleave.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    snapshot_rx: watch::Receiver<Arc<RegistrySnapshot>>,
}

impl EngineHandle {
    /// Spawn the engine task with an empty snapshot.
    pub fn spawn(registry: Arc<dyn RegistryApi>, config: EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel::<EngineCommand>(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(RegistrySnapshot::default()));

        let engine = Engine {
            registry,
            config,
            current: Arc::new(RegistrySnapshot::default()),
            snapshot_tx,
            observers: Vec::new(),
            last_observed: HashMap::new(),
        };
        tokio::spawn(engine.run(rx));

        Self { tx, snapshot_rx }
    }

    /// Current merged snapshot
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver that sees every published snapshot (latest wins)
    pub fn subscribe(&self) -> watch::Receiver<Arc<RegistrySnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Register a callback run after each snapshot change
    pub async fn observe<F>(&self, observer: F) -> Result<()>
    where
        F: Fn(&RegistrySnapshot) + Send + Sync + 'static,
    {
        self.send(EngineCommand::Observe(Box::new(observer))).await
    }

    /// Replace the snapshot with a fresh listing from the registry
    pub async fn initialize(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Initialize(reply)).await?;
        rx.await.map_err(|_| PollerError::EngineClosed)?
    }

    /// Merge one status event. Returns false when it was discarded.
    pub async fn apply_status_event(&self, event: StatusEvent) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::ApplyStatus(event, reply)).await?;
        rx.await.map_err(|_| PollerError::EngineClosed)
    }

    pub async fn create_entry(&self, name: &str, url: &str) -> Result<()> {
        validate_service(name, url)?;

        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Create {
            name: name.trim().to_string(),
            url: url.trim().to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| PollerError::EngineClosed)?
    }

    pub async fn update_entry(&self, id: ServiceId, name: &str, url: &str) -> Result<()> {
        validate_service(name, url)?;

        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Update {
            id,
            name: name.trim().to_string(),
            url: url.trim().to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| PollerError::EngineClosed)?
    }

    pub async fn delete_entry(&self, id: ServiceId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Delete(id, reply)).await?;
        rx.await.map_err(|_| PollerError::EngineClosed)?
    }

    /// Stop the engine once queued commands are done
    pub async fn shutdown(&self) -> Result<()> {
        self.send(EngineCommand::Shutdown).await
    }

    async fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.tx.send(cmd).await.map_err(|_| PollerError::EngineClosed)
    }
}

#[async_trait]
impl PushHandler for EngineHandle {
    async fn on_open(&self) {
        if let Err(e) = self.initialize().await {
            tracing::error!("Initial sync failed: {}", e);
        }
    }

    async fn on_reconnect(&self) {
        if let Err(e) = self.initialize().await {
            tracing::error!("Resync after reconnect failed: {}", e);
        }
    }

    async fn on_event(&self, event: StatusEvent) {
        if let Err(e) = self.apply_status_event(event).await {
            tracing::warn!("Status event not applied: {}", e);
        }
    }
}

struct Engine {
    registry: Arc<dyn RegistryApi>,
    config: EngineConfig,
    current: Arc<RegistrySnapshot>,
    snapshot_tx: watch::Sender<Arc<RegistrySnapshot>>,
    observers: Vec<Observer>,
    /// Latest `observedAt` applied per service
    last_observed: HashMap<ServiceId, DateTime<Utc>>,
}

impl Engine {
    async fn run(mut self, mut rx: mpsc::Receiver<EngineCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                EngineCommand::Initialize(reply) => {
                    let result = self.resync().await;
                    let _ = reply.send(result);
                }
                EngineCommand::ApplyStatus(event, reply) => {
                    let applied = self.apply_status(event);
                    let _ = reply.send(applied);
                }
                EngineCommand::Create { name, url, reply } => {
                    let result = match self.registry.create(&name, &url).await {
                        Ok(_) => self.resync().await,
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }
                EngineCommand::Update { id, name, url, reply } => {
                    let result = match self.registry.update(id, &name, &url).await {
                        Ok(_) => self.resync().await,
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }
                EngineCommand::Delete(id, reply) => {
                    let result = match self.registry.delete(id).await {
                        Ok(()) => self.resync().await,
                        Err(PollerError::NotFound(_)) => {
                            tracing::debug!("Service {} already deleted", id);
                            self.resync().await
                        }
                        Err(e) => Err(e),
                    };
                    let _ = reply.send(result);
                }
                EngineCommand::Observe(observer) => {
                    self.observers.push(observer);
                }
                EngineCommand::Shutdown => {
                    tracing::info!("Sync engine shutting down");
                    break;
                }
            }
        }
    }

    /// Fetch a full listing and make it the visible snapshot. On failure the
    /// previous snapshot stays in place.
    async fn resync(&mut self) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.registry.list().await {
                Ok(listing) => {
                    self.replace(listing);
                    return Ok(());
                }
                Err(e) if attempt < self.config.resync_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, "Resync failed, retrying: {}", e);
                    tokio::time::sleep(self.config.resync_retry_delay).await;
                }
                Err(e) => {
                    tracing::error!("Resync failed, keeping last snapshot: {}", e);
                    return Err(e);
                }
            }
        }
    }

    fn replace(&mut self, listing: RegistrySnapshot) {
        let mut seen = HashSet::new();
        let services = listing
            .services
            .into_iter()
            .filter(|s| {
                let first = seen.insert(s.id);
                if !first {
                    tracing::warn!("Registry listed service {} twice, keeping the first", s.id);
                }
                first
            })
            .collect();

        let snapshot = RegistrySnapshot::new(services);
        self.last_observed.retain(|id, _| snapshot.contains(*id));

        tracing::info!("Synced {} services from registry", snapshot.len());
        self.publish(snapshot);
    }

    fn apply_status(&mut self, event: StatusEvent) -> bool {
        let Some(entry) = self.current.get(event.id) else {
            tracing::debug!("Discarding status for unknown service {}", event.id);
            return false;
        };

        if let Some(observed) = event.observed_at {
            if let Some(last) = self.last_observed.get(&event.id) {
                if observed < *last {
                    tracing::debug!("Discarding stale status for service {}", event.id);
                    return false;
                }
            }
            self.last_observed.insert(event.id, observed);
        }

        if entry.current_status == event.current_status {
            return true;
        }

        match self.current.with_status(event.id, event.current_status) {
            Some(next) => {
                tracing::debug!("Service {} is now {}", event.id, event.current_status);
                self.publish(next);
                true
            }
            None => false,
        }
    }

    fn publish(&mut self, snapshot: RegistrySnapshot) {
        self.current = Arc::new(snapshot);
        self.snapshot_tx.send_replace(self.current.clone());
        for observer in &self.observers {
            let snapshot = self.current.as_ref();
            if panic::catch_unwind(AssertUnwindSafe(|| observer(snapshot))).is_err() {
                tracing::error!("Snapshot observer panicked");
            }
        }
    }
}
