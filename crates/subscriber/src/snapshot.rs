//! Cold-start snapshot fetch.
//!
//! The first paint never waits on the stream and never fails: any network
//! error, non-success status, or unparseable body yields a demo snapshot.

use crate::error::{Error, Result};
use normalizer::Snapshot;
use reqwest::header::CACHE_CONTROL;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// Fetch the raw snapshot payload.
pub async fn fetch_snapshot(client: &reqwest::Client, url: Url) -> Result<Value> {
    let response = client.get(url).header(CACHE_CONTROL, "no-store").send().await?;
    if !response.status().is_success() {
        return Err(Error::Status(response.status()));
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Fetch and normalize the current snapshot, falling back to demo data.
pub async fn fetch_or_demo(client: &reqwest::Client, url: Url) -> Snapshot {
    match fetch_snapshot(client, url.clone()).await {
        Ok(payload) => {
            debug!("Fetched snapshot from {}", url);
            normalizer::normalize(Some(&payload))
        }
        Err(e) => {
            warn!("Snapshot fetch from {} failed, using demo data: {}", url, e);
            normalizer::build_demo()
        }
    }
}
