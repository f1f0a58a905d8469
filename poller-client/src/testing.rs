//! In-memory registry and push transport used by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::types::{RegistrySnapshot, ServiceEntry, ServiceId, ServiceStatus};
use tokio::sync::mpsc;
use crate::error::{PollerError, Result};
use crate::push::transport::{Connection, Connector};
use crate::registry::RegistryApi;

pub fn entry(id: ServiceId, name: &str, status: ServiceStatus) -> ServiceEntry {
    ServiceEntry {
        id,
        name: name.to_string(),
        url: format!("http://{name}.local"),
        created_at: Utc.timestamp_millis_opt(1_640_995_200_000).unwrap(),
        current_status: status,
    }
}

pub fn status_frame(id: ServiceId, status: &str) -> String {
    format!(r#"{{"type":"rec","address":"kry.services","body":{{"id":{id},"currentStatus":"{status}"}}}}"#)
}

/// Registry held in memory, counting every network call.
#[derive(Default)]
pub struct FakeRegistry {
    services: Mutex<Vec<ServiceEntry>>,
    calls: AtomicUsize,
    failing_lists: AtomicU32,
}

impl FakeRegistry {
    pub fn with_services(services: Vec<ServiceEntry>) -> Arc<Self> {
        Arc::new(Self {
            services: Mutex::new(services),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The next `n` calls to `list` fail with a network error.
    pub fn fail_next_lists(&self, n: u32) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    /// Change a status server-side without publishing an event.
    pub fn set_status(&self, id: ServiceId, status: ServiceStatus) {
        let mut services = self.services.lock().unwrap();
        if let Some(s) = services.iter_mut().find(|s| s.id == id) {
            s.current_status = status;
        }
    }

    pub fn current(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(self.services.lock().unwrap().clone())
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    async fn list(&self) -> Result<RegistrySnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_lists.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_lists.store(failing - 1, Ordering::SeqCst);
            return Err(PollerError::Network("connection refused".to_string()));
        }
        Ok(self.current())
    }

    async fn create(&self, name: &str, url: &str) -> Result<Option<ServiceEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut services = self.services.lock().unwrap();
        let id = services.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let created = ServiceEntry {
            id,
            name: name.to_string(),
            url: url.to_string(),
            created_at: Utc::now(),
            current_status: ServiceStatus::Unknown,
        };
        services.push(created.clone());

        // Echo something that differs from what a fresh listing returns
        Ok(Some(ServiceEntry {
            id: 999,
            current_status: ServiceStatus::Ok,
            ..created
        }))
    }

    async fn update(&self, id: ServiceId, name: &str, url: &str) -> Result<Option<ServiceEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut services = self.services.lock().unwrap();
        let service = services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(PollerError::NotFound(id))?;
        service.name = name.to_string();
        service.url = url.to_string();
        Ok(None)
    }

    async fn delete(&self, id: ServiceId) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut services = self.services.lock().unwrap();
        let before = services.len();
        services.retain(|s| s.id != id);
        if services.len() == before {
            return Err(PollerError::NotFound(id));
        }
        Ok(())
    }
}

pub struct FakeConnection {
    rx: mpsc::UnboundedReceiver<String>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {}
}

/// Hands out queued connections and refuses once the queue is empty.
#[derive(Default)]
pub struct FakeConnector {
    queue: Mutex<VecDeque<FakeConnection>>,
    sent: Arc<Mutex<Vec<String>>>,
    attempts: AtomicU32,
}

impl FakeConnector {
    /// Queue a connection. Frames sent on the returned sender are received by
    /// the subscriber; dropping it closes the connection.
    pub fn push_connection(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.queue.lock().unwrap().push_back(FakeConnection {
            rx,
            sent: self.sent.clone(),
        });
        tx
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(conn) => Ok(Box::new(conn)),
            None => Err(PollerError::Transport("connection refused".to_string())),
        }
    }
}
