//! Client-side session: the token cookie, in-flight queries, and the
//! logout procedure shared by every tab.

use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::channel::{SessionChannel, SessionMessage};
use super::queries::QueryRegistry;
use crate::auth::SIGNIN_PATH;
use crate::cookie_jar::{Cookie, CookieStore, SameSite};
use crate::session::{TOKEN_COOKIE_NAME, is_session_valid, now_secs};
use crate::storage::Storage;

/// Local-storage flags that only make sense for the signed-in user.
pub const SESSION_STORAGE_FLAGS: &[&str] = &["paymentNotificationHidden", "loggedInUsingSSO"];

pub struct SessionContext {
    cookies: Arc<dyn CookieStore>,
    cached_token: RwLock<Option<String>>,
    storage: Arc<dyn Storage>,
    queries: QueryRegistry,
    location: watch::Sender<String>,
    channel: Option<SessionChannel>,
    tab_id: Uuid,
}

pub struct SessionContextBuilder {
    cookies: Arc<dyn CookieStore>,
    storage: Arc<dyn Storage>,
    queries: QueryRegistry,
    location: String,
    channel: Option<SessionChannel>,
}

impl SessionContextBuilder {
    pub fn queries(mut self, queries: QueryRegistry) -> Self {
        self.queries = queries;
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn channel(mut self, channel: SessionChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn build(self) -> Arc<SessionContext> {
        let cached_token = self.cookies.get(TOKEN_COOKIE_NAME);
        Arc::new(SessionContext {
            cookies: self.cookies,
            cached_token: RwLock::new(cached_token),
            storage: self.storage,
            queries: self.queries,
            location: watch::Sender::new(self.location),
            channel: self.channel,
            tab_id: Uuid::new_v4(),
        })
    }
}

impl SessionContext {
    pub fn builder(cookies: Arc<dyn CookieStore>, storage: Arc<dyn Storage>) -> SessionContextBuilder {
        SessionContextBuilder {
            cookies,
            storage,
            queries: QueryRegistry::new(),
            location: "/".to_string(),
            channel: None,
        }
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    pub fn queries(&self) -> &QueryRegistry {
        &self.queries
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Current session token, read from the cookie store. Refreshes the
    /// in-memory copy.
    pub fn token(&self) -> Option<String> {
        let token = self
            .cookies
            .get(TOKEN_COOKIE_NAME)
            .filter(|token| !token.is_empty());
        *self.cached_token.write().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    /// In-memory copy of the token as of the last read or write.
    pub fn cached_token(&self) -> Option<String> {
        self.cached_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn has_valid_session(&self) -> bool {
        self.token()
            .is_some_and(|token| is_session_valid(&token, now_secs()))
    }

    /// Store a freshly issued token.
    pub fn sign_in(&self, token: &str) {
        self.cookies.set(
            Cookie::new(TOKEN_COOKIE_NAME, token)
                .same_site(SameSite::Strict)
                .secure(true),
        );
        *self.cached_token.write().unwrap_or_else(PoisonError::into_inner) =
            Some(token.to_string());
    }

    pub fn location(&self) -> String {
        self.location.borrow().clone()
    }

    pub fn subscribe_location(&self) -> watch::Receiver<String> {
        self.location.subscribe()
    }

    pub fn navigate(&self, path: &str) {
        debug!(path = %path, "Navigating");
        self.location.send_replace(path.to_string());
    }

    /// Tear down this tab's session. Queries are cancelled before the token
    /// goes away so none of them can observe a half-cleared session.
    pub fn logout_local(&self) {
        self.queries.cancel_all();

        self.cookies.remove(TOKEN_COOKIE_NAME, None, "/");
        *self.cached_token.write().unwrap_or_else(PoisonError::into_inner) = None;

        for key in SESSION_STORAGE_FLAGS {
            if let Err(e) = self.storage.remove(key) {
                warn!(key = %key, error = %e, "Failed to clear storage flag on logout");
            }
        }

        self.navigate(SIGNIN_PATH);
        info!(tab = %self.tab_id, "Logged out");
    }

    /// Tell sibling tabs to log out. Delivery failures are ignored.
    pub fn broadcast_logout(&self) {
        let Some(channel) = &self.channel else {
            return;
        };
        if let Err(e) = channel.post(self.tab_id, &SessionMessage::Logout) {
            debug!(channel = %channel.name(), error = %e, "Logout broadcast not delivered");
        }
    }

    /// Listen for logout messages from sibling tabs. Returns `None` without a
    /// channel. The task ends when the session is dropped or the channel
    /// closes.
    pub fn spawn_logout_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let channel = self.channel.as_ref()?;
        let mut rx = channel.subscribe();
        let session: Weak<SessionContext> = Arc::downgrade(self);
        let tab_id = self.tab_id;

        Some(tokio::spawn(async move {
            loop {
                let message = match rx.recv().await {
                    Ok(message) => message,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Session channel lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if message.sender == tab_id {
                    continue;
                }
                match serde_json::from_str::<SessionMessage>(&message.payload) {
                    Ok(SessionMessage::Logout) => {
                        let Some(session) = session.upgrade() else {
                            break;
                        };
                        info!(tab = %tab_id, from = %message.sender, "Logout from another tab");
                        session.logout_local();
                    }
                    Err(e) => debug!(error = %e, "Ignoring unknown session message"),
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::channel::{BroadcastHub, SESSION_CHANNEL_NAME};
    use crate::cookie_jar::MemoryCookieJar;
    use crate::storage::{MemoryStorage, StorageError};
    use std::time::Duration;

    /// Storage that refuses every operation, like a browser with storage
    /// disabled.
    struct UnavailableStorage;

    impl Storage for UnavailableStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }
    }

    fn session() -> (Arc<SessionContext>, Arc<MemoryCookieJar>, Arc<MemoryStorage>) {
        let cookies = Arc::new(MemoryCookieJar::new());
        let storage = Arc::new(MemoryStorage::new());
        let session = SessionContext::builder(cookies.clone(), storage.clone())
            .location("/instances")
            .build();
        (session, cookies, storage)
    }

    #[test]
    fn test_sign_in_writes_strict_cookie() {
        let (session, cookies, _) = session();
        session.sign_in("abc");
        let cookie = cookies.all().pop().unwrap();
        assert_eq!(cookie.value, "abc");
        assert_eq!(cookie.same_site, SameSite::Strict);
        assert!(cookie.secure);
        assert_eq!(session.cached_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_logout_local_clears_everything() {
        let (session, cookies, storage) = session();
        session.sign_in("abc");
        storage.set("paymentNotificationHidden", "true").unwrap();
        storage.set("loggedInUsingSSO", "true").unwrap();
        storage.set("cookieConsent", "{}").unwrap();

        session.logout_local();

        assert_eq!(cookies.get(TOKEN_COOKIE_NAME), None);
        assert_eq!(session.cached_token(), None);
        assert_eq!(storage.get("paymentNotificationHidden").unwrap(), None);
        assert_eq!(storage.get("loggedInUsingSSO").unwrap(), None);
        assert!(storage.get("cookieConsent").unwrap().is_some());
        assert_eq!(session.location(), "/signin");
        assert_eq!(session.queries().epoch(), 1);
    }

    #[tokio::test]
    async fn test_logout_local_survives_storage_failure() {
        let cookies = Arc::new(MemoryCookieJar::new());
        let session = SessionContext::builder(cookies.clone(), Arc::new(UnavailableStorage))
            .location("/billing")
            .build();
        session.sign_in("abc");
        let mut pending = session.queries().track();

        session.logout_local();

        tokio::time::timeout(Duration::from_secs(1), pending.cancelled())
            .await
            .unwrap();
        assert_eq!(session.queries().epoch(), 1);
        assert_eq!(cookies.get(TOKEN_COOKIE_NAME), None);
        assert_eq!(session.cached_token(), None);
        assert_eq!(session.location(), "/signin");
    }

    #[tokio::test]
    async fn test_sibling_tab_logs_out_on_broadcast() {
        let hub = BroadcastHub::new();
        let storage = Arc::new(MemoryStorage::new());

        let jar_a = Arc::new(MemoryCookieJar::new());
        let tab_a = SessionContext::builder(jar_a.clone(), storage.clone())
            .channel(hub.channel(SESSION_CHANNEL_NAME))
            .location("/billing")
            .build();
        let jar_b = Arc::new(MemoryCookieJar::new());
        let tab_b = SessionContext::builder(jar_b.clone(), storage)
            .channel(hub.channel(SESSION_CHANNEL_NAME))
            .location("/usage")
            .build();
        tab_a.sign_in("t");
        tab_b.sign_in("t");

        let _listener_a = tab_a.spawn_logout_listener().unwrap();
        let _listener_b = tab_b.spawn_logout_listener().unwrap();
        let mut location_b = tab_b.subscribe_location();

        tab_a.logout_local();
        tab_a.broadcast_logout();

        tokio::time::timeout(Duration::from_secs(1), location_b.wait_for(|l| l == "/signin"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(jar_b.get(TOKEN_COOKIE_NAME), None);
        // The sender does not process its own message a second time.
        assert_eq!(tab_a.queries().epoch(), 1);
    }
}
