//! Attaches external stylesheets and scripts to the page and waits for the
//! capabilities they install.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::error::{ResourceKind, ResourceLoadError};

/// The host document. Each `append_*` call adds one node and resolves once
/// the browser reports the resource as loaded.
#[async_trait]
pub trait Document: Send + Sync {
    async fn append_stylesheet(&self, href: &str) -> anyhow::Result<()>;
    async fn append_script(&self, src: &str) -> anyhow::Result<()>;

    fn set_text(&self, element_id: &str, text: &str);
    fn set_html(&self, element_id: &str, html: &str);
    fn add_class(&self, element_id: &str, class: &str);
    /// Insert a block at the very top of the page body.
    fn prepend_banner(&self, html: &str);
}

pub struct ResourceLoader<'a, D: ?Sized> {
    document: &'a D,
    poll_interval: Duration,
}

impl<'a, D: Document + ?Sized> ResourceLoader<'a, D> {
    pub fn new(document: &'a D, poll_interval: Duration) -> Self {
        Self { document, poll_interval }
    }

    pub async fn load_stylesheet(&self, url: &str) -> Result<(), ResourceLoadError> {
        debug!(url, "injecting stylesheet");
        self.document
            .append_stylesheet(url)
            .await
            .map_err(|e| ResourceLoadError {
                kind: ResourceKind::Stylesheet,
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    pub async fn load_script(&self, url: &str) -> Result<(), ResourceLoadError> {
        debug!(url, "injecting script");
        self.document
            .append_script(url)
            .await
            .map_err(|e| ResourceLoadError {
                kind: ResourceKind::Script,
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    /// Poll `predicate` every `poll_interval` until it holds or `timeout`
    /// elapses. Timing out is not an error here; the caller decides.
    pub async fn wait_for_capability<F>(&self, mut predicate: F, timeout: Duration) -> bool
    where
        F: FnMut() -> bool,
    {
        let start = Instant::now();
        let mut polls = 0u32;
        while start.elapsed() < timeout {
            polls += 1;
            if predicate() {
                info!(polls, elapsed_ms = start.elapsed().as_millis() as u64, "capability available");
                return true;
            }
            sleep(self.poll_interval).await;
        }
        debug!(polls, timeout_ms = timeout.as_millis() as u64, "capability poll timed out");
        false
    }
}
