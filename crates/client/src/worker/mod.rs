//! The offline worker: one versioned instance of the cache manager.
//!
//! A worker moves through `installing -> installed -> activating -> activated`
//! and ends `redundant` when its install fails or a newer version replaces it.
//! Every lifecycle input is a [`WorkerEvent`]; [`OfflineWorker::dispatch`]
//! returns the future the host must drive to completion before the event
//! counts as handled.

pub mod host;
pub mod inflight;

use futures_util::future::{BoxFuture, try_join_all};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use swcache_core::{AppConfig, CacheDb, CacheStore, Error};
use tokio::sync::watch;

use crate::classify::{ResourceClass, classify};
use crate::fetch::{Fetcher, Request, Response};
use crate::strategy::{fetch_cache_first, fetch_network_first};

pub use host::{ControllerChange, ServiceHost};
pub use inflight::InflightGate;

/// Per-version worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Store name owned by this worker.
    pub version: String,
    pub origin: url::Url,
    pub precache: Vec<String>,
    pub image_max_age: Duration,
    pub font_max_age: Duration,
    pub skip_waiting_on_install: bool,
    pub coalesce_inflight: bool,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = url::Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        Ok(Self {
            version: config.cache_version.clone(),
            origin,
            precache: config.precache.clone(),
            image_max_age: config.image_max_age(),
            font_max_age: config.font_max_age(),
            skip_waiting_on_install: config.skip_waiting_on_install,
            coalesce_inflight: config.coalesce_inflight,
        })
    }

    /// Same settings under another version name.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self { version: version.into(), ..self.clone() }
    }

    /// Staleness threshold for cache-first classes.
    pub fn max_age(&self, class: ResourceClass) -> Option<Duration> {
        match class {
            ResourceClass::Image => Some(self.image_max_age),
            ResourceClass::Font => Some(self.font_max_age),
            ResourceClass::Document | ResourceClass::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Messages a page can post to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    SkipWaiting,
}

impl WorkerMessage {
    /// Parse a posted message; unrecognized payloads are None.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Message(serde_json::Value),
}

#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed { seeded: usize },
    Activated { purged: Vec<String> },
    Respond(Response),
    /// The request is not intercepted; the host sends it to the network untouched.
    PassThrough,
    SkipWaitingRequested,
    Ignored,
}

pub struct OfflineWorker {
    config: WorkerConfig,
    db: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
    inflight: InflightGate,
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Self {
        let (state, _) = watch::channel(WorkerState::Installing);
        Self { config, db, fetcher, state, skip_waiting: AtomicBool::new(false), inflight: InflightGate::new() }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// This worker's own store.
    pub fn store(&self) -> CacheStore {
        self.db.store(&self.config.version)
    }

    pub(crate) fn mark_redundant(&self) {
        self.transition(WorkerState::Redundant);
    }

    fn transition(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(version = %self.config.version, from = ?previous, to = ?next, "worker state changed");
        }
    }

    fn expect_state(&self, allowed: &[WorkerState], event: &str) -> Result<(), Error> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "{event} delivered to {} worker {}",
                state_name(state),
                self.config.version
            )))
        }
    }

    /// Handle one lifecycle event.
    ///
    /// The event is complete only once the returned future resolves.
    pub fn dispatch(&self, event: WorkerEvent) -> BoxFuture<'_, Result<EventOutcome, Error>> {
        Box::pin(async move {
            match event {
                WorkerEvent::Install => self.install().await,
                WorkerEvent::Activate => self.activate().await,
                WorkerEvent::Fetch(request) => self.fetch(request).await,
                WorkerEvent::Message(message) => Ok(self.message(&message)),
            }
        })
    }

    async fn install(&self) -> Result<EventOutcome, Error> {
        self.expect_state(&[WorkerState::Installing], "install")?;

        match self.seed().await {
            Ok(seeded) => {
                if self.config.skip_waiting_on_install {
                    self.skip_waiting.store(true, Ordering::SeqCst);
                }
                self.transition(WorkerState::Installed);
                Ok(EventOutcome::Installed { seeded })
            }
            Err(e) => {
                tracing::warn!(version = %self.config.version, error = %e, "install failed");
                self.mark_redundant();
                Err(e)
            }
        }
    }

    /// Fetch every seed before writing any, so a partial seed set is never stored.
    async fn seed(&self) -> Result<usize, Error> {
        let requests = self
            .config
            .precache
            .iter()
            .map(|path| {
                let url = self
                    .config
                    .origin
                    .join(path)
                    .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
                Request::get(url.as_str())
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = self
                .fetcher
                .fetch(request)
                .await
                .map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
            if !response.ok() {
                return Err(Error::InstallFailed(format!("{}: status {}", request.url, response.status.as_u16())));
            }
            Ok(response)
        }))
        .await?;

        let seeds = requests
            .iter()
            .zip(&responses)
            .map(|(request, response)| response.to_cached(&request.method))
            .collect();
        self.db.seed_store(&self.config.version, seeds).await?;

        tracing::info!(version = %self.config.version, seeded = responses.len(), "precache populated");
        Ok(responses.len())
    }

    async fn activate(&self) -> Result<EventOutcome, Error> {
        self.expect_state(&[WorkerState::Installed, WorkerState::Activating], "activate")?;
        self.transition(WorkerState::Activating);

        match self.purge_old_stores().await {
            Ok(purged) => {
                self.transition(WorkerState::Activated);
                Ok(EventOutcome::Activated { purged })
            }
            Err(e) => {
                tracing::warn!(version = %self.config.version, error = %e, "activation failed");
                self.mark_redundant();
                Err(e)
            }
        }
    }

    async fn purge_old_stores(&self) -> Result<Vec<String>, Error> {
        let mut purged = Vec::new();
        for name in self.db.store_names().await? {
            if name != self.config.version && self.db.delete_store(&name).await? {
                tracing::info!(store = %name, "purged old cache store");
                purged.push(name);
            }
        }
        Ok(purged)
    }

    async fn fetch(&self, request: Request) -> Result<EventOutcome, Error> {
        self.expect_state(&[WorkerState::Activated], "fetch")?;

        if request.method != Method::GET || request.is_extension() {
            return Ok(EventOutcome::PassThrough);
        }

        let class = classify(request.url.path());
        let store = self.store();
        let response = match self.config.max_age(class) {
            Some(max_age) if self.config.coalesce_inflight => {
                let _guard = self.inflight.acquire(&request.cache_key()).await;
                fetch_cache_first(&store, self.fetcher.as_ref(), &request, max_age).await?
            }
            Some(max_age) => fetch_cache_first(&store, self.fetcher.as_ref(), &request, max_age).await?,
            None => fetch_network_first(&store, self.fetcher.as_ref(), &request).await?,
        };

        Ok(EventOutcome::Respond(response))
    }

    fn message(&self, message: &serde_json::Value) -> EventOutcome {
        match WorkerMessage::from_value(message) {
            Some(WorkerMessage::SkipWaiting) => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                if self.state() == WorkerState::Installed {
                    self.transition(WorkerState::Activating);
                }
                EventOutcome::SkipWaitingRequested
            }
            None => {
                tracing::debug!(version = %self.config.version, "ignoring unrecognized message");
                EventOutcome::Ignored
            }
        }
    }
}

fn state_name(state: WorkerState) -> &'static str {
    match state {
        WorkerState::Installing => "installing",
        WorkerState::Installed => "installed",
        WorkerState::Activating => "activating",
        WorkerState::Activated => "activated",
        WorkerState::Redundant => "redundant",
    }
}
