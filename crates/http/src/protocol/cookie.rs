//! Cookies carried by the `Cookie` request header and `Set-Cookie` response headers.
//!
//! Only name, value, `Domain`, `Path` and `Expires` are modelled; every other attribute
//! is skipped when parsing and never written.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::trace;

/// IMF-fixdate, the only date format written for `Expires`
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), domain: None, path: None, expires: None }
    }

    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Parses the value of a request `Cookie` header: `a=1; b=2`.
    ///
    /// Pairs without `=` or with an empty name are skipped.
    pub fn parse_cookie_header(value: &str) -> Vec<Cookie> {
        value.split(';').filter_map(split_pair).map(|(name, value)| Cookie::new(name, value)).collect()
    }

    /// Parses one `Set-Cookie` header value.
    pub fn parse_set_cookie(value: &str) -> Option<Cookie> {
        let mut attributes = value.split(';');
        let (name, value) = attributes.next().and_then(split_pair)?;
        let mut cookie = Cookie::new(name, value);

        for attribute in attributes {
            let (key, value) = match attribute.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (attribute.trim(), ""),
            };

            if key.eq_ignore_ascii_case("domain") {
                cookie.domain = Some(value.trim_start_matches('.').to_string());
            } else if key.eq_ignore_ascii_case("path") {
                cookie.path = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("expires") {
                match DateTime::parse_from_rfc2822(value) {
                    Ok(expires) => cookie.expires = Some(expires.with_timezone(&Utc)),
                    Err(e) => trace!(value, cause = %e, "skip unparseable cookie expiry"),
                }
            }
        }
        Some(cookie)
    }

    /// Renders a `Cookie` request header value from a list of cookies.
    pub fn to_cookie_header(cookies: &[Cookie]) -> String {
        cookies.iter().map(|cookie| format!("{}={}", cookie.name, cookie.value)).collect::<Vec<_>>().join("; ")
    }

    /// Renders this cookie as a `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(expires) = &self.expires {
            write!(f, "; Expires={}", expires.format(IMF_FIXDATE))?;
        }
        Ok(())
    }
}

fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim().trim_matches('"')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_request_cookies() {
        let cookies = Cookie::parse_cookie_header("session=abc123; theme=\"dark\"; broken; =x");
        assert_eq!(cookies, vec![Cookie::new("session", "abc123"), Cookie::new("theme", "dark")]);
        assert_eq!(Cookie::to_cookie_header(&cookies), "session=abc123; theme=dark");
    }

    #[test]
    fn parse_set_cookie_attributes() {
        let cookie =
            Cookie::parse_set_cookie("id=a3fWa; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Secure; HttpOnly; Domain=.example.com; Path=/docs")
                .unwrap();

        assert_eq!(cookie.name, "id");
        assert_eq!(cookie.value, "a3fWa");
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(cookie.path.as_deref(), Some("/docs"));
        assert_eq!(cookie.expires, Some(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap()));
    }

    #[test]
    fn render_set_cookie() {
        let cookie = Cookie::new("id", "a3fWa").domain("example.com").path("/").expires(Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap());

        let rendered = cookie.to_set_cookie();
        assert_eq!(rendered, "id=a3fWa; Domain=example.com; Path=/; Expires=Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(Cookie::parse_set_cookie(&rendered), Some(cookie));
    }

    #[test]
    fn missing_name_is_rejected() {
        assert_eq!(Cookie::parse_set_cookie("novalue"), None);
        assert_eq!(Cookie::parse_set_cookie("=v; Path=/"), None);
    }
}
