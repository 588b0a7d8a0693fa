//! Client-side cookie store.
//!
//! The portal client keeps the session token and third-party analytics
//! cookies here. Cookies are keyed by name, domain and path, the way a
//! browser keys them, so removing one requires naming all three.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// `None` is a host-only cookie.
    pub domain: Option<String>,
    pub path: String,
    pub same_site: SameSite,
    pub secure: bool,
}

impl Cookie {
    /// Host-only cookie on `/`.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: "/".to_string(),
            same_site: SameSite::default(),
            secure: false,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }
}

/// `Set-Cookie` rendering.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path={}", self.name, self.value, self.path)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={}", domain)?;
        }
        write!(f, "; SameSite={}", self.same_site)?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

pub trait CookieStore: Send + Sync {
    /// Value of the first cookie called `name`, whatever its domain or path.
    fn get(&self, name: &str) -> Option<String>;
    /// Insert or replace the cookie with the same name, domain and path.
    fn set(&self, cookie: Cookie);
    /// Remove one cookie. Returns whether it existed.
    fn remove(&self, name: &str, domain: Option<&str>, path: &str) -> bool;
    /// Names of every stored cookie, duplicates included once.
    fn names(&self) -> Vec<String>;
}

type CookieKey = (String, Option<String>, String);

#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: Mutex<BTreeMap<CookieKey, Cookie>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every cookie currently stored.
    pub fn all(&self) -> Vec<Cookie> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.values().cloned().collect()
    }
}

impl CookieStore for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies
            .values()
            .find(|cookie| cookie.name == name)
            .map(|cookie| cookie.value.clone())
    }

    fn set(&self, cookie: Cookie) {
        let key = (cookie.name.clone(), cookie.domain.clone(), cookie.path.clone());
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.insert(key, cookie);
    }

    fn remove(&self, name: &str, domain: Option<&str>, path: &str) -> bool {
        let key = (name.to_string(), domain.map(str::to_string), path.to_string());
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.remove(&key).is_some()
    }

    fn names(&self) -> Vec<String> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = cookies.keys().map(|(name, _, _)| name.clone()).collect();
        names.dedup();
        names
    }
}
