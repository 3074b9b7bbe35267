//! Process-wide service health registry.
//!
//! The registry maps a service name (`""` meaning the whole server) to its
//! serving status. It is created once at startup and handed to whichever
//! component needs it; request processing never writes to it.
use std::fmt;

use scc::{HashMap, hash_map::Entry};
use tokio::sync::broadcast;

/// Serving status of a tracked service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServingStatus::Unknown => write!(f, "UNKNOWN"),
            ServingStatus::Serving => write!(f, "SERVING"),
            ServingStatus::NotServing => write!(f, "NOT_SERVING"),
        }
    }
}

/// A status transition, broadcast to watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub service: String,
    pub status: ServingStatus,
}

/// Name → status map shared between the health surfaces.
pub struct HealthRegistry {
    statuses: HashMap<String, ServingStatus>,
    changes: broadcast::Sender<StatusChange>,
}

impl HealthRegistry {
    /// Key for the overall server status.
    pub const OVERALL: &'static str = "";

    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            statuses: HashMap::new(),
            changes,
        }
    }

    /// Record a status. Last write wins; repeating a status is a no-op for watchers.
    pub async fn set_status(&self, service: &str, status: ServingStatus) {
        let entry = match self.statuses.entry_async(service.to_string()).await {
            Entry::Occupied(entry) if *entry.get() == status => return,
            Entry::Occupied(mut entry) => {
                *entry.get_mut() = status;
                entry
            }
            Entry::Vacant(entry) => entry.insert_entry(status),
        };

        // Sent while the entry is still locked so watchers see writes in map order.
        tracing::info!(service = %service, status = %status, "service health changed");
        let _ = self.changes.send(StatusChange {
            service: service.to_string(),
            status,
        });
        drop(entry);
    }

    /// Current status, `Unknown` for services never registered.
    pub async fn status(&self, service: &str) -> ServingStatus {
        self.statuses
            .read_async(service, |_, status| *status)
            .await
            .unwrap_or(ServingStatus::Unknown)
    }

    /// Whether the service has ever been registered.
    pub async fn is_tracked(&self, service: &str) -> bool {
        self.statuses.contains_async(service).await
    }

    /// Mark a service and the overall entry as serving.
    pub async fn mark_serving(&self, service: &str) {
        self.set_status(service, ServingStatus::Serving).await;
        self.set_status(Self::OVERALL, ServingStatus::Serving).await;
    }

    /// Mark a service and the overall entry as not serving.
    pub async fn mark_not_serving(&self, service: &str) {
        self.set_status(service, ServingStatus::NotServing).await;
        self.set_status(Self::OVERALL, ServingStatus::NotServing).await;
    }

    /// Subscribe to subsequent status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("tracked", &self.statuses.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Barrier;

    use super::*;

    #[tokio::test]
    async fn test_unknown_by_default() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.status("anything").await, ServingStatus::Unknown);
        assert_eq!(
            registry.status(HealthRegistry::OVERALL).await,
            ServingStatus::Unknown
        );
        assert!(!registry.is_tracked("anything").await);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let registry = HealthRegistry::new();
        registry.set_status("svc", ServingStatus::Serving).await;
        registry.set_status("svc", ServingStatus::NotServing).await;
        registry.set_status("svc", ServingStatus::NotServing).await;
        assert_eq!(registry.status("svc").await, ServingStatus::NotServing);
        assert!(registry.is_tracked("svc").await);
    }

    #[tokio::test]
    async fn test_mark_serving_sets_overall() {
        let registry = HealthRegistry::new();
        registry.mark_serving("svc").await;
        assert_eq!(registry.status("svc").await, ServingStatus::Serving);
        assert_eq!(registry.status("").await, ServingStatus::Serving);

        registry.mark_not_serving("svc").await;
        assert_eq!(registry.status("svc").await, ServingStatus::NotServing);
        assert_eq!(registry.status("").await, ServingStatus::NotServing);
    }

    #[tokio::test]
    async fn test_changes_are_broadcast_once() {
        let registry = HealthRegistry::new();
        let mut rx = registry.subscribe();

        registry.set_status("svc", ServingStatus::Serving).await;
        registry.set_status("svc", ServingStatus::Serving).await;
        registry.set_status("svc", ServingStatus::NotServing).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            StatusChange {
                service: "svc".to_string(),
                status: ServingStatus::Serving,
            }
        );
        assert_eq!(rx.try_recv().unwrap().status, ServingStatus::NotServing);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_and_writer() {
        let registry = Arc::new(HealthRegistry::new());
        registry.set_status("svc", ServingStatus::Serving).await;

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    for _ in 0..1000 {
                        let status = registry.status("svc").await;
                        assert_ne!(status, ServingStatus::Unknown);
                    }
                })
            })
            .collect();

        for i in 0..100 {
            let status = if i % 2 == 0 {
                ServingStatus::NotServing
            } else {
                ServingStatus::Serving
            };
            registry.set_status("svc", status).await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_writers_broadcast_final_status_last() {
        for _ in 0..500 {
            let registry = Arc::new(HealthRegistry::new());
            let mut rx = registry.subscribe();
            let barrier = Arc::new(Barrier::new(2));

            let writers: Vec<_> = [ServingStatus::Serving, ServingStatus::NotServing]
                .into_iter()
                .map(|status| {
                    let registry = registry.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        registry.set_status("svc", status).await;
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap();
            }

            let mut last = None;
            while let Ok(change) = rx.try_recv() {
                last = Some(change.status);
            }
            assert_eq!(last, Some(registry.status("svc").await));
        }
    }
}
