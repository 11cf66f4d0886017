//! Fetch strategies.
//!
//! - Cache-first: serve a fresh stored response without touching the network;
//!   otherwise fetch and refresh the store.
//! - Network-first: always fetch; fall back to the store only when the
//!   network fails.
//!
//! Both store only 2xx responses and fall back to any stored response, in
//! any store, when the fetch itself fails.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use swcache_core::{CacheStore, CachedResponse, Error};

use crate::fetch::{Fetcher, Request, Response};

/// Whether a stored response is younger than `max_age` at `now`.
///
/// Entries with no usable timestamp are stale.
pub fn is_fresh(entry: &CachedResponse, max_age: Duration, now: DateTime<Utc>) -> bool {
    let Some(date) = entry.response_date() else {
        return false;
    };
    let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
    now - date < max_age
}

/// Serve from the store while fresh, else fetch and refresh.
pub async fn fetch_cache_first(
    store: &CacheStore, fetcher: &dyn Fetcher, request: &Request, max_age: Duration,
) -> Result<Response, Error> {
    if let Some(entry) = store.get(request.method.as_str(), request.url.as_str()).await? {
        if is_fresh(&entry, max_age, Utc::now()) {
            tracing::debug!("cache hit for {}", request.url);
            return Response::from_cached(entry);
        }
        tracing::debug!("stale cache entry for {}", request.url);
    }

    match fetcher.fetch(request).await {
        Ok(response) => {
            refresh(store, request, &response).await;
            Ok(response)
        }
        Err(err) => fall_back(store, request, err).await,
    }
}

/// Fetch first; serve from the store only when the network fails.
pub async fn fetch_network_first(
    store: &CacheStore, fetcher: &dyn Fetcher, request: &Request,
) -> Result<Response, Error> {
    match fetcher.fetch(request).await {
        Ok(response) => {
            refresh(store, request, &response).await;
            Ok(response)
        }
        Err(err) => fall_back(store, request, err).await,
    }
}

/// Store a copy of a successful response before it is handed back.
///
/// A failed write is logged; the page still gets the response.
async fn refresh(store: &CacheStore, request: &Request, response: &Response) {
    if !response.ok() {
        tracing::debug!("not caching {} (status {})", request.url, response.status.as_u16());
        return;
    }
    if let Err(e) = store.put(&response.to_cached(&request.method)).await {
        tracing::warn!(url = %request.url, error = %e, "failed to store response");
    }
}

/// Serve whatever the stores hold for this request, or surface the original failure.
async fn fall_back(store: &CacheStore, request: &Request, err: Error) -> Result<Response, Error> {
    match store.db().match_any(&request.cache_key()).await {
        Ok(Some(entry)) => {
            tracing::warn!(url = %request.url, error = %err, "network failed; serving cached response");
            Response::from_cached(entry)
        }
        Ok(None) => Err(err),
        Err(lookup) => {
            tracing::warn!(url = %request.url, error = %lookup, "cache lookup failed during fallback");
            Err(err)
        }
    }
}
