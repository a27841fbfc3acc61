use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::audit_log::AuditStore;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// An audit log entry to record. Never carries passwords or tokens.
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEntry {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            ..Default::default()
        }
    }

    pub fn user(mut self, id: Uuid, email: &str) -> Self {
        self.user_id = Some(id);
        self.user_email = Some(email.to_string());
        self
    }

    pub fn resource(mut self, kind: &str, id: Uuid) -> Self {
        self.resource_type = Some(kind.to_string());
        self.resource_id = Some(id);
        self
    }

    pub fn client(mut self, ip: &str, user_agent: Option<&str>) -> Self {
        self.ip_address = Some(ip.to_string());
        self.user_agent = user_agent.map(str::to_string);
        self
    }
}

/// Bounded audit queue drained by a single worker task.
///
/// `record` never blocks a request: when the queue is full the entry is
/// dropped with a warning. `shutdown` closes the queue and waits for the
/// worker to flush what is already queued.
pub struct AuditLog {
    sender: Mutex<Option<mpsc::Sender<AuditEntry>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AuditLog {
    pub fn spawn(store: Arc<dyn AuditStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEntry>(capacity);

        let worker = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                match tokio::time::timeout(WRITE_TIMEOUT, store.insert(&entry)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!("audit log insert failed for {}: {e:#}", entry.action),
                    Err(_) => tracing::warn!("audit log insert timed out for {}", entry.action),
                }
            }
            tracing::debug!("audit log worker drained");
        });

        Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            tracing::warn!("audit log closed, dropping {}", entry.action);
            return;
        };

        match sender.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                tracing::warn!("audit queue full, dropping {}", entry.action)
            }
            Err(TrySendError::Closed(entry)) => {
                tracing::warn!("audit worker stopped, dropping {}", entry.action)
            }
        }
    }

    pub async fn shutdown(&self) {
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!("audit log worker panicked: {e}");
            }
        }
    }
}
