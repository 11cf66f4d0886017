//! Per-origin worker registration.
//!
//! The host owns at most one controlling (activated) worker and one waiting
//! worker. Registering a new version installs it; the waiting worker is
//! promoted when it asks to skip waiting or when nothing controls the origin
//! yet. Promotion activates it, hands it every subsequent fetch, and
//! announces the change to open pages.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use swcache_core::Error;
use tokio::sync::{Mutex, broadcast};

use super::{EventOutcome, OfflineWorker, WorkerEvent, WorkerState};
use crate::fetch::{Fetcher, Request, Response};

/// Announced when a newly activated worker takes control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerChange {
    pub version: String,
    pub previous: Option<String>,
}

#[derive(Default)]
struct Slots {
    active: Option<Arc<OfflineWorker>>,
    waiting: Option<Arc<OfflineWorker>>,
}

pub struct ServiceHost {
    fetcher: Arc<dyn Fetcher>,
    slots: Mutex<Slots>,
    controller_tx: broadcast::Sender<ControllerChange>,
}

impl ServiceHost {
    /// Create a host; `fetcher` carries requests no worker intercepts.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        let (controller_tx, _) = broadcast::channel(16);
        Self { fetcher, slots: Mutex::new(Slots::default()), controller_tx }
    }

    /// Install a worker and promote it if nothing stands in its way.
    ///
    /// A previously waiting worker is replaced and becomes redundant.
    pub async fn register(&self, worker: OfflineWorker) -> Result<Arc<OfflineWorker>, Error> {
        let worker = Arc::new(worker);
        worker.dispatch(WorkerEvent::Install).await?;

        let promote = {
            let mut slots = self.slots.lock().await;
            if let Some(previous) = slots.waiting.replace(worker.clone()) {
                previous.mark_redundant();
            }
            worker.skip_waiting_requested() || slots.active.is_none()
        };

        if promote {
            self.promote().await?;
        } else {
            tracing::info!(version = worker.version(), "worker installed and waiting");
        }

        Ok(worker)
    }

    /// Deliver a page message to the waiting worker.
    ///
    /// A skip-wait message promotes it. With no waiting worker the message
    /// is ignored.
    pub async fn post_message(&self, message: serde_json::Value) -> Result<EventOutcome, Error> {
        let Some(worker) = self.waiting().await else {
            return Ok(EventOutcome::Ignored);
        };

        let outcome = worker.dispatch(WorkerEvent::Message(message)).await?;
        if worker.state() == WorkerState::Activating {
            self.promote().await?;
        }
        Ok(outcome)
    }

    async fn promote(&self) -> Result<(), Error> {
        let Some(worker) = self.slots.lock().await.waiting.take() else {
            return Ok(());
        };

        worker.dispatch(WorkerEvent::Activate).await?;

        let previous = self.slots.lock().await.active.replace(worker.clone());
        let previous_version = previous.as_ref().map(|p| p.version().to_string());
        if let Some(previous) = previous {
            previous.mark_redundant();
        }

        tracing::info!(version = worker.version(), previous = ?previous_version, "worker took control");

        // No open pages is fine.
        let _ = self
            .controller_tx
            .send(ControllerChange { version: worker.version().to_string(), previous: previous_version });

        Ok(())
    }

    /// Route a page request through the controlling worker.
    ///
    /// Requests the worker passes through, and every request while nothing
    /// controls the origin, go straight to the network uncached.
    pub async fn fetch(&self, request: Request) -> Result<Response, Error> {
        match self.controller().await {
            Some(worker) => self.route(worker, request).await,
            None => self.network(request).await,
        }
    }

    /// Deliver a fetch to `worker`.
    ///
    /// The worker may have been replaced since it was looked up; the request
    /// then goes to its successor, or to the network if there is none.
    async fn route(&self, worker: Arc<OfflineWorker>, request: Request) -> Result<Response, Error> {
        let outcome = match worker.dispatch(WorkerEvent::Fetch(request.clone())).await {
            Err(Error::InvalidState(_)) if worker.state() == WorkerState::Redundant => {
                tracing::debug!(version = worker.version(), "controller replaced before fetch {}", request.url);
                match self.controller().await {
                    Some(current) if !Arc::ptr_eq(&current, &worker) => {
                        current.dispatch(WorkerEvent::Fetch(request.clone())).await?
                    }
                    _ => EventOutcome::PassThrough,
                }
            }
            outcome => outcome?,
        };

        match outcome {
            EventOutcome::Respond(response) => Ok(response),
            _ => self.network(request).await,
        }
    }

    async fn network(&self, request: Request) -> Result<Response, Error> {
        tracing::debug!("{} {} not intercepted", request.method, request.url);
        self.fetcher.fetch(&request).await
    }

    /// The transport for requests no worker intercepts.
    pub fn fetcher(&self) -> Arc<dyn Fetcher> {
        self.fetcher.clone()
    }

    pub async fn controller(&self) -> Option<Arc<OfflineWorker>> {
        self.slots.lock().await.active.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<OfflineWorker>> {
        self.slots.lock().await.waiting.clone()
    }

    /// Receive controller changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerChange> {
        self.controller_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ResponseSource;
    use crate::testing::ScriptedFetcher;
    use crate::worker::WorkerConfig;
    use reqwest::Method;
    use serde_json::json;
    use swcache_core::{AppConfig, CacheDb};

    fn config(version: &str, skip_waiting_on_install: bool) -> WorkerConfig {
        let app = AppConfig {
            cache_version: version.into(),
            origin: "https://app.example.com".into(),
            skip_waiting_on_install,
            ..Default::default()
        };
        WorkerConfig::from_app_config(&app).unwrap()
    }

    fn shell_fetcher() -> Arc<ScriptedFetcher> {
        Arc::new(
            ScriptedFetcher::new()
                .respond("https://app.example.com/", 200, b"root")
                .respond("https://app.example.com/index.html", 200, b"index")
                .respond("https://app.example.com/manifest.json", 200, b"{}"),
        )
    }

    async fn setup(fetcher: Arc<ScriptedFetcher>) -> (ServiceHost, CacheDb) {
        let db = CacheDb::open_in_memory().await.unwrap();
        (ServiceHost::new(fetcher), db)
    }

    #[tokio::test]
    async fn test_first_registration_takes_control() {
        let fetcher = shell_fetcher();
        let (host, db) = setup(fetcher.clone()).await;
        let mut changes = host.subscribe();

        let worker = host
            .register(OfflineWorker::new(config("app-v1", false), db, fetcher))
            .await
            .unwrap();

        assert_eq!(worker.state(), WorkerState::Activated);
        assert_eq!(host.controller().await.unwrap().version(), "app-v1");
        assert!(host.waiting().await.is_none());
        let change = changes.try_recv().unwrap();
        assert_eq!(change, ControllerChange { version: "app-v1".into(), previous: None });
    }

    #[tokio::test]
    async fn test_update_with_skip_waiting_replaces_controller() {
        let fetcher = shell_fetcher();
        let (host, db) = setup(fetcher.clone()).await;
        let v1 = host
            .register(OfflineWorker::new(config("app-v1", true), db.clone(), fetcher.clone()))
            .await
            .unwrap();

        let v2 = host
            .register(OfflineWorker::new(config("app-v2", true), db.clone(), fetcher))
            .await
            .unwrap();

        assert_eq!(v1.state(), WorkerState::Redundant);
        assert_eq!(v2.state(), WorkerState::Activated);
        assert_eq!(db.store_names().await.unwrap(), vec!["app-v2"]);
    }

    #[tokio::test]
    async fn test_update_waits_for_skip_wait_message() {
        let fetcher = shell_fetcher();
        let (host, db) = setup(fetcher.clone()).await;
        host.register(OfflineWorker::new(config("app-v1", false), db.clone(), fetcher.clone()))
            .await
            .unwrap();

        let v2 = host
            .register(OfflineWorker::new(config("app-v2", false), db.clone(), fetcher))
            .await
            .unwrap();

        assert_eq!(v2.state(), WorkerState::Installed);
        assert_eq!(host.controller().await.unwrap().version(), "app-v1");
        assert_eq!(db.store_names().await.unwrap(), vec!["app-v1", "app-v2"]);

        let outcome = host.post_message(json!({"type": "SKIP_WAITING"})).await.unwrap();

        assert!(matches!(outcome, EventOutcome::SkipWaitingRequested));
        assert_eq!(v2.state(), WorkerState::Activated);
        assert_eq!(host.controller().await.unwrap().version(), "app-v2");
        assert_eq!(db.store_names().await.unwrap(), vec!["app-v2"]);
    }

    #[tokio::test]
    async fn test_message_without_waiting_worker_ignored() {
        let fetcher = shell_fetcher();
        let (host, _db) = setup(fetcher).await;
        let outcome = host.post_message(json!({"type": "SKIP_WAITING"})).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_failed_install_leaves_controller() {
        let fetcher = shell_fetcher();
        let (host, db) = setup(fetcher.clone()).await;
        host.register(OfflineWorker::new(config("app-v1", true), db.clone(), fetcher))
            .await
            .unwrap();

        let broken = Arc::new(ScriptedFetcher::new());
        let Err(err) = host
            .register(OfflineWorker::new(config("app-v2", true), db.clone(), broken))
            .await
        else {
            panic!("install should fail");
        };

        assert!(matches!(err, Error::InstallFailed(_)));
        assert_eq!(host.controller().await.unwrap().version(), "app-v1");
        assert_eq!(db.store_names().await.unwrap(), vec!["app-v1"]);
    }

    #[tokio::test]
    async fn test_fetch_routes_through_controller() {
        let fetcher = shell_fetcher();
        let (host, db) = setup(fetcher.clone()).await;
        host.register(OfflineWorker::new(config("app-v1", true), db, fetcher.clone()))
            .await
            .unwrap();

        fetcher.set_offline(true);
        let response = host.fetch(Request::get("https://app.example.com/").unwrap()).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_fetch_to_replaced_controller_reaches_successor() {
        let fetcher = shell_fetcher();
        let (host, db) = setup(fetcher.clone()).await;
        host.register(OfflineWorker::new(config("app-v1", true), db.clone(), fetcher.clone()))
            .await
            .unwrap();
        let stale = host.controller().await.unwrap();
        host.register(OfflineWorker::new(config("app-v2", true), db.clone(), fetcher.clone()))
            .await
            .unwrap();
        assert_eq!(stale.state(), WorkerState::Redundant);

        fetcher.set_offline(true);
        let request = Request::get("https://app.example.com/index.html").unwrap();
        let response = host.route(stale, request).await.unwrap();

        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(&response.body[..], b"index");
    }

    #[tokio::test]
    async fn test_fetch_to_retired_controller_without_successor_uses_network() {
        let fetcher = shell_fetcher();
        let (host, db) = setup(fetcher.clone()).await;
        let worker = host
            .register(OfflineWorker::new(config("app-v1", true), db, fetcher.clone()))
            .await
            .unwrap();
        worker.mark_redundant();
        let calls = fetcher.calls();

        let request = Request::get("https://app.example.com/index.html").unwrap();
        let response = host.route(worker, request).await.unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(fetcher.calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_pass_through_reaches_network_uncached() {
        let fetcher = shell_fetcher();
        fetcher.set_route("https://app.example.com/api/auth/user", 200, b"{\"id\":1}");
        let (host, db) = setup(fetcher.clone()).await;
        let worker = host
            .register(OfflineWorker::new(config("app-v1", true), db, fetcher.clone()))
            .await
            .unwrap();

        let request = Request::new(Method::PATCH, "https://app.example.com/api/auth/user").unwrap();
        let response = host.fetch(request).await.unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert!(
            worker
                .store()
                .get("PATCH", "https://app.example.com/api/auth/user")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_fetch_without_controller_goes_to_network() {
        let fetcher = shell_fetcher();
        let (host, _db) = setup(fetcher.clone()).await;
        let response = host.fetch(Request::get("https://app.example.com/").unwrap()).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(fetcher.calls(), 1);
    }
}
