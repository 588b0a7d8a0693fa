//! Tracking consent: what the visitor agreed to, persisted under
//! `cookieConsent`, and the handlers that switch services on and off.

mod analytics;

pub use analytics::{
    ANALYTICS_SERVICE, AnalyticsHandler, ConsentSignal, LogTagLoader, TagLoader,
    is_analytics_cookie,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::storage::Storage;

/// Storage key of the persisted consent object.
pub const CONSENT_STORAGE_KEY: &str = "cookieConsent";

pub const NECESSARY_CATEGORY: &str = "necessary";
pub const ANALYTICS_CATEGORY: &str = "analytics";
const ESSENTIAL_SERVICE: &str = "essential";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentService {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentCategory {
    pub category: String,
    #[serde(default)]
    pub services: Vec<ConsentService>,
    #[serde(default)]
    pub hide: bool,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentState {
    #[serde(default)]
    pub consent_given: bool,
    #[serde(default)]
    pub categories: Vec<ConsentCategory>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConsentError {
    #[error("unknown consent category: {0}")]
    UnknownCategory(String),
    #[error("consent category {0} cannot be changed")]
    NotEditable(String),
}

fn necessary_category() -> ConsentCategory {
    ConsentCategory {
        category: NECESSARY_CATEGORY.to_string(),
        services: vec![ConsentService {
            name: ESSENTIAL_SERVICE.to_string(),
            gtag: None,
        }],
        hide: false,
        editable: false,
        enabled: true,
    }
}

fn analytics_category(analytics_id: &str) -> ConsentCategory {
    ConsentCategory {
        category: ANALYTICS_CATEGORY.to_string(),
        services: vec![ConsentService {
            name: ANALYTICS_SERVICE.to_string(),
            gtag: Some(analytics_id.to_string()),
        }],
        hide: false,
        editable: true,
        enabled: false,
    }
}

impl ConsentState {
    /// Consent before the visitor made any choice.
    pub fn default_for(analytics_id: Option<&str>) -> Self {
        let mut categories = vec![necessary_category()];
        if let Some(id) = analytics_id {
            categories.push(analytics_category(id));
        }
        Self {
            consent_given: false,
            categories,
        }
    }

    pub fn category(&self, name: &str) -> Option<&ConsentCategory> {
        self.categories.iter().find(|c| c.category == name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.category(name).is_some_and(|c| c.enabled)
    }

    /// Bring a persisted object in line with the current configuration.
    ///
    /// `necessary` is restored and forced on. `analytics` is added when an
    /// identifier is configured but was not before, gets its identifier
    /// updated in place, and is removed when no identifier is configured.
    /// Other categories are kept as stored.
    pub fn reconcile(mut self, analytics_id: Option<&str>) -> Self {
        match self
            .categories
            .iter_mut()
            .find(|c| c.category == NECESSARY_CATEGORY)
        {
            Some(necessary) => {
                necessary.enabled = true;
                necessary.editable = false;
            }
            None => self.categories.insert(0, necessary_category()),
        }

        match analytics_id {
            Some(id) => match self
                .categories
                .iter_mut()
                .find(|c| c.category == ANALYTICS_CATEGORY)
            {
                Some(analytics) => {
                    match analytics
                        .services
                        .iter_mut()
                        .find(|s| s.name == ANALYTICS_SERVICE)
                    {
                        Some(service) => service.gtag = Some(id.to_string()),
                        None => analytics.services.push(ConsentService {
                            name: ANALYTICS_SERVICE.to_string(),
                            gtag: Some(id.to_string()),
                        }),
                    }
                }
                None => self.categories.push(analytics_category(id)),
            },
            None => self.categories.retain(|c| c.category != ANALYTICS_CATEGORY),
        }

        self
    }
}

/// Switches one service on or off when its category's consent changes.
pub trait ConsentHandler: Send + Sync {
    /// Service name this handler owns, e.g. `googleAnalytics`.
    fn service(&self) -> &str;

    fn on_enable(&self, service: &ConsentService);

    fn on_disable(&self, service: &ConsentService);
}

pub struct ConsentManager {
    analytics_id: Option<String>,
    storage: Arc<dyn Storage>,
    state: ConsentState,
    handlers: Vec<Arc<dyn ConsentHandler>>,
}

impl ConsentManager {
    pub fn new(analytics_id: Option<String>, storage: Arc<dyn Storage>) -> Self {
        let state = ConsentState::default_for(analytics_id.as_deref());
        Self {
            analytics_id,
            storage,
            state,
            handlers: Vec::new(),
        }
    }

    pub fn with_handler(mut self, handler: impl ConsentHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn state(&self) -> &ConsentState {
        &self.state
    }

    /// Load the persisted choice, reconcile it with the configuration,
    /// persist the result and start every enabled service.
    ///
    /// Returns whether the consent prompt must be shown.
    pub fn load(&mut self) -> bool {
        let stored = match self.storage.get(CONSENT_STORAGE_KEY) {
            Ok(Some(text)) => match serde_json::from_str::<ConsentState>(&text) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable consent");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read consent");
                None
            }
        };

        let analytics_id = self.analytics_id.as_deref();
        self.state = stored
            .unwrap_or_else(|| ConsentState::default_for(analytics_id))
            .reconcile(analytics_id);
        self.persist();

        let enabled: Vec<ConsentCategory> = self
            .state
            .categories
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect();
        for category in &enabled {
            self.apply(category);
        }

        let prompt = !self.state.consent_given;
        debug!(prompt, "Consent loaded");
        prompt
    }

    pub fn set_category(&mut self, name: &str, enabled: bool) -> Result<(), ConsentError> {
        let category = self
            .state
            .category(name)
            .ok_or_else(|| ConsentError::UnknownCategory(name.to_string()))?;
        if category.enabled == enabled {
            return Ok(());
        }
        if !category.editable {
            return Err(ConsentError::NotEditable(name.to_string()));
        }

        self.commit(|state| {
            for category in state.categories.iter_mut().filter(|c| c.category == name) {
                category.enabled = enabled;
            }
        });
        Ok(())
    }

    pub fn accept_all(&mut self) {
        info!("Consent: accept all");
        self.commit(|state| {
            state.consent_given = true;
            for category in state.categories.iter_mut().filter(|c| c.editable) {
                category.enabled = true;
            }
        });
    }

    pub fn reject_all(&mut self) {
        info!("Consent: reject all");
        self.commit(|state| {
            state.consent_given = true;
            for category in state.categories.iter_mut().filter(|c| c.editable) {
                category.enabled = false;
            }
        });
    }

    /// Record the current toggles as the visitor's choice.
    pub fn save_preferences(&mut self) {
        info!("Consent: preferences saved");
        self.commit(|state| state.consent_given = true);
    }

    /// Mutate, persist, then run handlers for every category whose
    /// `enabled` flag changed.
    fn commit(&mut self, mutate: impl FnOnce(&mut ConsentState)) {
        let before: HashMap<String, bool> = self
            .state
            .categories
            .iter()
            .map(|c| (c.category.clone(), c.enabled))
            .collect();

        mutate(&mut self.state);
        self.persist();

        let changed: Vec<ConsentCategory> = self
            .state
            .categories
            .iter()
            .filter(|c| before.get(&c.category).copied().unwrap_or(false) != c.enabled)
            .cloned()
            .collect();
        for category in &changed {
            self.apply(category);
        }
    }

    fn apply(&self, category: &ConsentCategory) {
        for service in &category.services {
            for handler in self.handlers.iter().filter(|h| h.service() == service.name) {
                if category.enabled {
                    handler.on_enable(service);
                } else {
                    handler.on_disable(service);
                }
            }
        }
    }

    fn persist(&self) {
        let text = match serde_json::to_string(&self.state) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode consent");
                return;
            }
        };
        if let Err(e) = self.storage.set(CONSENT_STORAGE_KEY, &text) {
            warn!(error = %e, "Failed to persist consent");
        }
    }
}
