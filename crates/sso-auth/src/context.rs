//! Explicit request and response state.
//!
//! The login flow never reaches for ambient request state. Callers build a
//! [`RequestContext`] from the inbound cookies and headers, pass it through
//! the flow, and apply the collected `Set-Cookie` values to their response.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Only sent on same-site requests
    Strict,
    /// Also sent on top-level navigations
    Lax,
    /// Always sent (requires Secure)
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// One outbound cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCookie {
    /// Cookie name
    pub name: String,

    /// Cookie value
    pub value: String,

    /// Path attribute
    pub path: String,

    /// Max-Age in seconds; zero expires the cookie
    pub max_age: i64,

    /// HttpOnly flag
    pub http_only: bool,

    /// Secure flag
    pub secure: bool,

    /// SameSite attribute
    pub same_site: SameSite,
}

impl SetCookie {
    /// HTTP-only cookie scoped to the whole site.
    ///
    /// `Lax` lets the cookie ride the top-level redirect back from a provider.
    pub fn http_only(name: impl Into<String>, value: impl Into<String>, max_age: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: "/".to_string(),
            max_age,
            http_only: true,
            secure: true,
            same_site: SameSite::Lax,
        }
    }

    /// Cookie that deletes `name`.
    pub fn expired(name: impl Into<String>) -> Self {
        Self::http_only(name, "", 0)
    }

    /// Set the Secure flag.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Render as a `Set-Cookie` header value.
    pub fn header_value(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];

        parts.push(format!("Path={}", self.path));

        if self.http_only {
            parts.push("HttpOnly".to_string());
        }

        if self.secure {
            parts.push("Secure".to_string());
        }

        parts.push(format!("SameSite={}", self.same_site.as_str()));
        parts.push(format!("Max-Age={}", self.max_age));

        parts.join("; ")
    }
}

/// Inbound cookies and headers plus the cookies to send back.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cookies: HashMap<String, String>,
    headers: HashMap<String, String>,
    outgoing: Vec<SetCookie>,
    secure_cookies: bool,
}

impl RequestContext {
    /// Empty context for an HTTPS site.
    pub fn new() -> Self {
        Self {
            secure_cookies: true,
            ..Default::default()
        }
    }

    /// Parse a raw `Cookie` header.
    pub fn from_cookie_header(header: &str) -> Self {
        let mut ctx = Self::new();
        for cookie in header.split(';') {
            let parts: Vec<&str> = cookie.trim().splitn(2, '=').collect();
            if parts.len() == 2 && !parts[0].is_empty() {
                ctx.cookies
                    .insert(parts[0].to_string(), parts[1].to_string());
            }
        }
        ctx
    }

    /// Add an inbound cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Add an inbound header. Names are case-insensitive.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Emit cookies without the Secure flag (plain-HTTP development sites).
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Inbound cookie value.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Inbound header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Bearer token from the `authorization` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
            Some(token.trim())
        } else {
            None
        }
    }

    /// Queue a cookie for the response.
    ///
    /// The cookie is also visible to later reads within the same request.
    pub fn set_cookie(&mut self, cookie: SetCookie) {
        let cookie = cookie.with_secure(self.secure_cookies);
        if cookie.max_age > 0 {
            self.cookies.insert(cookie.name.clone(), cookie.value.clone());
        } else {
            self.cookies.remove(&cookie.name);
        }
        self.outgoing.retain(|c| c.name != cookie.name);
        self.outgoing.push(cookie);
    }

    /// Queue deletion of a cookie.
    pub fn clear_cookie(&mut self, name: &str) {
        self.set_cookie(SetCookie::expired(name));
    }

    /// Cookies queued for the response.
    pub fn outgoing_cookies(&self) -> &[SetCookie] {
        &self.outgoing
    }

    /// Queued cookie by name.
    pub fn outgoing_cookie(&self, name: &str) -> Option<&SetCookie> {
        self.outgoing.iter().find(|c| c.name == name)
    }
}

/// Response produced by the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,

    /// Response headers, `Set-Cookie` included
    pub headers: Vec<(String, String)>,

    /// Response body
    pub body: String,
}

impl HttpResponse {
    /// 302 redirect.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".to_string(), location.into())],
            body: String::new(),
        }
    }

    /// HTML document.
    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![
                ("Content-Type".to_string(), "text/html; charset=utf-8".to_string()),
                ("Cache-Control".to_string(), "no-store".to_string()),
            ],
            body: body.into(),
        }
    }

    /// Append the context's queued cookies as `Set-Cookie` headers.
    pub fn with_cookies(mut self, ctx: &RequestContext) -> Self {
        for cookie in ctx.outgoing_cookies() {
            self.headers
                .push(("Set-Cookie".to_string(), cookie.header_value()));
        }
        self
    }

    /// First header with this name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `Location` header of a redirect.
    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }
}
