//! Analytics consent handler: grants or denies the tag's consent signal,
//! loads the tag once, and removes its cookies when consent is withdrawn.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{ConsentHandler, ConsentService};
use crate::cookie_jar::CookieStore;

/// Service name of the analytics tag in the consent object.
pub const ANALYTICS_SERVICE: &str = "googleAnalytics";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentSignal {
    Granted,
    Denied,
}

/// Where the analytics tag actually lives (a page script, a test double).
pub trait TagLoader: Send + Sync {
    /// Load and configure the tag for `tag_id`.
    fn load(&self, tag_id: &str);

    fn set_consent(&self, signal: ConsentSignal);
}

/// Loader that only logs, for hosts without a tag runtime.
#[derive(Clone, Debug)]
pub struct LogTagLoader;

impl TagLoader for LogTagLoader {
    fn load(&self, tag_id: &str) {
        info!(tag_id = %tag_id, "Analytics tag loaded");
    }

    fn set_consent(&self, signal: ConsentSignal) {
        info!(signal = ?signal, "Analytics consent signal");
    }
}

/// `_ga`, `_ga_<id>`, `_gid`, `_gat` and `_gat_<id>`.
pub fn is_analytics_cookie(name: &str) -> bool {
    name == "_ga" || name.starts_with("_ga_") || name == "_gid" || name.starts_with("_gat")
}

pub struct AnalyticsHandler {
    loader: Arc<dyn TagLoader>,
    cookies: Arc<dyn CookieStore>,
    host: String,
    location: Option<watch::Receiver<String>>,
    configured: AtomicBool,
}

impl AnalyticsHandler {
    pub fn new(loader: Arc<dyn TagLoader>, cookies: Arc<dyn CookieStore>, host: impl Into<String>) -> Self {
        Self {
            loader,
            cookies,
            host: host.into(),
            location: None,
            configured: AtomicBool::new(false),
        }
    }

    /// Follow the current page, so cookies scoped to its path ancestors are
    /// removed too.
    pub fn track_location(mut self, location: watch::Receiver<String>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    fn current_path(&self) -> String {
        self.location
            .as_ref()
            .map(|rx| rx.borrow().clone())
            .unwrap_or_else(|| "/".to_string())
    }

    fn delete_cookies(&self) {
        let domains = domain_variants(&self.host);
        let paths = path_ancestors(&self.current_path());
        let mut removed = 0;

        for name in self.cookies.names().into_iter().filter(|n| is_analytics_cookie(n)) {
            for domain in &domains {
                for path in &paths {
                    if self.cookies.remove(&name, domain.as_deref(), path) {
                        removed += 1;
                    }
                }
            }
        }
        debug!(removed, "Analytics cookies removed");
    }
}

impl ConsentHandler for AnalyticsHandler {
    fn service(&self) -> &str {
        ANALYTICS_SERVICE
    }

    fn on_enable(&self, service: &ConsentService) {
        self.loader.set_consent(ConsentSignal::Granted);

        let Some(tag_id) = service.gtag.as_deref() else {
            warn!("Analytics enabled without a tag identifier");
            return;
        };
        if !self.configured.swap(true, Ordering::SeqCst) {
            self.loader.load(tag_id);
        }
    }

    fn on_disable(&self, _service: &ConsentService) {
        self.loader.set_consent(ConsentSignal::Denied);
        self.delete_cookies();
    }
}

/// Host-only, then the host and each parent domain, with and without the
/// leading dot. Single-label parents (the TLD) are skipped.
fn domain_variants(host: &str) -> Vec<Option<String>> {
    let mut variants = vec![None];
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();

    if labels.len() < 2 {
        if !host.is_empty() {
            variants.push(Some(host.to_string()));
        }
        return variants;
    }

    for start in 0..labels.len() - 1 {
        let domain = labels[start..].join(".");
        variants.push(Some(format!(".{}", domain)));
        variants.push(Some(domain));
    }
    variants
}

/// `/a/b` -> `/`, `/a`, `/a/b`.
fn path_ancestors(path: &str) -> Vec<String> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut ancestors = vec!["/".to_string()];
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        ancestors.push(current.clone());
    }
    ancestors
}
