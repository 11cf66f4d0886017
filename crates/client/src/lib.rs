//! Client side of swcache.
//!
//! This crate provides the offline worker: request classification, the
//! cache-first and network-first strategies, the worker lifecycle, the
//! per-origin host that registers and promotes worker versions, and the
//! page-side update flow.

pub mod bootstrap;
pub mod classify;
pub mod fetch;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use bytes::Bytes;
pub use reqwest::header::HeaderMap;
pub use reqwest::{Method, StatusCode};

pub use bootstrap::{PageSession, UpdateDecision, UpdatePrompt};
pub use classify::{ResourceClass, classify};
pub use fetch::{FetchConfig, Fetcher, HttpFetcher, Request, Response, ResponseSource};
pub use strategy::{fetch_cache_first, fetch_network_first};
pub use worker::{
    ControllerChange, EventOutcome, OfflineWorker, ServiceHost, WorkerConfig, WorkerEvent, WorkerMessage, WorkerState,
};
