//! Cookie transport.
//!
//! [`RequestCookies`] is a read-only view of the incoming `Cookie` header.
//! [`ResponseCookies`] accumulates `Set-Cookie` directives for one response;
//! hosts emit one header per directive and must append, never overwrite.

use std::collections::BTreeMap;

use cookie::Cookie;
use cookie::time::Duration as CookieDuration;

use crate::config::{CookieConfig, SameSitePolicy};

/// Cookies sent by the browser on the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCookies {
    cookies: BTreeMap<String, String>,
}

impl RequestCookies {
    /// No cookies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `Cookie` header value. Unparsable pairs are skipped; when a
    /// name repeats, the first value wins.
    pub fn from_header(header: &str) -> Self {
        Self::from_headers([header])
    }

    /// Parse several `Cookie` header values (HTTP/2 may split them).
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut cookies = BTreeMap::new();
        for header in headers {
            for parsed in Cookie::split_parse(header) {
                match parsed {
                    Ok(cookie) => {
                        cookies
                            .entry(cookie.name().to_string())
                            .or_insert_with(|| cookie.value().to_string());
                    }
                    Err(e) => tracing::trace!(error = %e, "skipping malformed cookie pair"),
                }
            }
        }
        Self { cookies }
    }

    /// Build from `(name, value)` pairs; first value wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut cookies = BTreeMap::new();
        for (name, value) in pairs {
            cookies.entry(name.into()).or_insert_with(|| value.into());
        }
        Self { cookies }
    }

    /// Value of the cookie called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Iterate `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// `Set-Cookie` directives for one response.
#[derive(Debug, Clone, Default)]
pub struct ResponseCookies {
    cookies: Vec<Cookie<'static>>,
}

impl ResponseCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directive. A later directive for the same name replaces an
    /// earlier one; all other directives accumulate.
    pub fn set(&mut self, cookie: Cookie<'static>) {
        match self.cookies.iter_mut().find(|c| c.name() == cookie.name()) {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    /// The pending directive for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.iter().find(|c| c.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie<'static>> {
        self.cookies.iter()
    }

    /// Move every directive of `other` into `self`.
    pub fn extend(&mut self, other: ResponseCookies) {
        for cookie in other.cookies {
            self.set(cookie);
        }
    }

    /// Rendered `Set-Cookie` header values, one per directive.
    pub fn header_values(&self) -> Vec<String> {
        self.cookies.iter().map(|c| c.to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Attributes shared by every cookie of one family (session or transient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieAttributes {
    pub domain: Option<String>,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    /// `None` omits the attribute entirely.
    pub same_site: Option<SameSitePolicy>,
}

impl CookieAttributes {
    /// Attributes of the session cookie.
    pub fn from_session(cookie: &CookieConfig) -> Self {
        Self {
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            http_only: cookie.http_only,
            secure: cookie.secure,
            same_site: Some(cookie.same_site),
        }
    }

    /// Build a cookie carrying these attributes. `max_age` of `None` makes a
    /// browser-session cookie.
    pub fn build(&self, name: &str, value: &str, max_age: Option<i64>) -> Cookie<'static> {
        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .path(self.path.clone())
            .http_only(self.http_only)
            .secure(self.secure);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(same_site) = self.same_site {
            builder = builder.same_site(same_site.into());
        }
        if let Some(secs) = max_age {
            builder = builder.max_age(CookieDuration::seconds(secs.max(0)));
        }
        builder.build()
    }

    /// A directive that deletes the cookie called `name`.
    pub fn removal(&self, name: &str) -> Cookie<'static> {
        let mut cookie = self.build(name, "", None);
        cookie.make_removal();
        cookie
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
