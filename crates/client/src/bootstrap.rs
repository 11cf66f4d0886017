//! Page-side update flow.
//!
//! A page session watches its host for two things: an update that installed
//! but is waiting behind the current controller, and a controller change.
//! The first is offered to the user through an [`UpdatePrompt`]; accepting
//! sends the skip-wait message and reloads. The second reloads too. A
//! session reloads at most once, however many of these fire.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use swcache_core::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::worker::{ControllerChange, ServiceHost, WorkerState};

/// Asks the user whether to switch to a waiting version.
pub trait UpdatePrompt: Send + Sync {
    fn confirm_update(&self, version: &str) -> bool;
}

impl<F> UpdatePrompt for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm_update(&self, version: &str) -> bool {
        self(version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum UpdateDecision {
    /// Nothing waiting, or nothing controlling the page yet.
    NoUpdate,
    Declined { version: String },
    Applied { version: String },
}

impl UpdateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateDecision::NoUpdate => "no_update",
            UpdateDecision::Declined { .. } => "declined",
            UpdateDecision::Applied { .. } => "applied",
        }
    }
}

pub struct PageSession {
    host: Arc<ServiceHost>,
    changes: broadcast::Receiver<ControllerChange>,
    reloaded: bool,
}

impl PageSession {
    /// Open a session; only controller changes after this point are observed.
    pub fn attach(host: Arc<ServiceHost>) -> Self {
        let changes = host.subscribe();
        Self { host, changes, reloaded: false }
    }

    pub fn reloaded(&self) -> bool {
        self.reloaded
    }

    /// Offer a waiting update to the user and apply it on confirmation.
    pub async fn check_for_update(&mut self, prompt: &dyn UpdatePrompt) -> Result<UpdateDecision, Error> {
        let Some(waiting) = self.host.waiting().await else {
            return Ok(UpdateDecision::NoUpdate);
        };
        if waiting.state() != WorkerState::Installed || self.host.controller().await.is_none() {
            return Ok(UpdateDecision::NoUpdate);
        }

        let version = waiting.version().to_string();
        if !prompt.confirm_update(&version) {
            tracing::info!(version = %version, "update declined");
            return Ok(UpdateDecision::Declined { version });
        }

        self.host.post_message(json!({ "type": "SKIP_WAITING" })).await?;
        self.reload();
        Ok(UpdateDecision::Applied { version })
    }

    /// Drain pending controller changes, reloading if any arrived.
    ///
    /// Returns the most recent change seen, if any.
    pub fn poll_controller_change(&mut self) -> Option<ControllerChange> {
        let mut latest = None;
        loop {
            match self.changes.try_recv() {
                Ok(change) => latest = Some(change),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "controller changes lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        if let Some(change) = &latest {
            tracing::debug!(version = %change.version, "controller changed");
            self.reload();
        }
        latest
    }

    fn reload(&mut self) {
        if self.reloaded {
            return;
        }
        self.reloaded = true;
        tracing::info!("reloading page");
    }
}
