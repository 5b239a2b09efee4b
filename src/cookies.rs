//! Cookie jar with Netscape cookie file persistence
//!
//! The jar is filled from three places: a `--cookie "a=b; c=d"` string, a
//! `--load-cookie` file in the Netscape/curl format and `Set-Cookie` headers
//! of responses. It can be written back with `--dump-cookie`.
//!
//! File format, one cookie per line, tab separated:
//!
//! ```text
//! .example.com  TRUE  /  FALSE  946684799  NAME  VALUE
//! ```
//!
//! domain, include-subdomains flag, path, secure, expiry (unix seconds),
//! name, value. Lines starting with `#` are comments.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use cookie::Cookie;
use http::header::{HeaderMap, SET_COOKIE};
use url::Url;

use crate::errors::{QuickError, Result};
use crate::utils::open_file_to_write;

/// Expiry written for session cookies: 9999-12-31T23:59:59Z
pub const SESSION_COOKIE_EXPIRY: i64 = 253_402_300_799;

/// Get current Unix timestamp
pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Check if a cookie is expired based on expires timestamp
pub fn is_cookie_expired(expires: Option<i64>) -> bool {
    match expires {
        Some(exp) => exp <= current_timestamp(),
        None => false,
    }
}

/// One cookie as held by the jar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    /// Domain as written; a leading dot is kept for display
    pub domain: String,
    /// Only the exact host may read the cookie
    pub host_only: bool,
    pub path: String,
    pub secure: bool,
    /// Unix seconds; `None` for a session cookie
    pub expires: Option<i64>,
    pub name: String,
    pub value: String,
}

impl StoredCookie {
    fn bare_domain(&self) -> &str {
        self.domain.trim_start_matches('.')
    }

    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name
            && self.path == other.path
            && self.bare_domain().eq_ignore_ascii_case(other.bare_domain())
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let domain = self.bare_domain().to_ascii_lowercase();

        let domain_ok = if self.host_only {
            host == domain
        } else {
            host == domain || host.ends_with(&format!(".{}", domain))
        };
        let path_ok = path_matches(url.path(), &self.path);
        let secure_ok = !self.secure || url.scheme() == "https";

        domain_ok && path_ok && secure_ok && !is_cookie_expired(self.expires)
    }

    /// Write the Netscape line for this cookie, without a line terminator
    fn write_line(&self, out: &mut String, trailing_ws: bool) {
        out.push_str(&self.domain);
        out.push_str("\tTRUE\t");
        out.push_str(&self.path);
        out.push('\t');
        out.push_str(if self.secure { "TRUE" } else { "FALSE" });
        out.push('\t');
        out.push_str(&self.expires.unwrap_or(SESSION_COOKIE_EXPIRY).to_string());
        out.push('\t');
        out.push_str(&self.name);
        if !self.value.is_empty() || trailing_ws {
            out.push('\t');
            out.push_str(&self.value);
        }
    }
}

/// RFC 6265 path-match
fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    if let Some(rest) = request_path.strip_prefix(cookie_path) {
        return cookie_path.ends_with('/') || rest.starts_with('/');
    }
    false
}

/// Default path of a cookie set without a Path attribute
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Split Set-Cookie header value into individual cookies
///
/// Handles the tricky case where cookie values may contain commas
/// (e.g., in Expires date), but cookies are separated by ", name=".
pub fn split_cookies(cookies: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut iter = cookies.char_indices();

    while let Some((i, c)) = iter.next() {
        if c == ',' && cookies[i + 1..].starts_with(' ') && looks_like_cookie_start(&cookies[i + 2..]) {
            result.push(current.trim().to_string());
            current.clear();
            // skip the space
            iter.next();
            continue;
        }
        current.push(c);
    }

    if !current.trim().is_empty() {
        result.push(current.trim().to_string());
    }

    result
}

/// Check if string starts with a cookie name pattern (token=)
fn looks_like_cookie_start(s: &str) -> bool {
    let mut chars = s.chars();

    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-' => {}
        _ => return false,
    }

    for c in chars {
        if c == '=' {
            return true;
        }
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
            return false;
        }
    }

    false
}

/// Parse a Set-Cookie header into typed Cookie structs
pub fn parse_set_cookie_header(header: &str) -> Vec<Cookie<'static>> {
    split_cookies(header)
        .into_iter()
        .filter_map(|s| Cookie::parse(s).ok())
        .map(|c| c.into_owned())
        .collect()
}

/// In-memory cookie jar
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Vec<StoredCookie>,
}

/// Jar shared by every connection of a run
pub type SharedCookieJar = Arc<Mutex<CookieJar>>;

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedCookieJar {
        Arc::new(Mutex::new(self))
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredCookie> {
        self.cookies.iter()
    }

    /// Insert a cookie, replacing the one with the same domain, path and name
    pub fn insert(&mut self, cookie: StoredCookie) {
        if let Some(existing) = self.cookies.iter_mut().find(|c| c.same_slot(&cookie)) {
            *existing = cookie;
        } else {
            self.cookies.push(cookie);
        }
    }

    /// Attach cookies from a `name=value; name=value` string to `url`
    ///
    /// Well-known attribute names (`secure`, `path`, ...) apply to every
    /// cookie of the string instead of becoming cookies themselves.
    pub fn load_cookies_for_url(&mut self, url: &Url, cookies: &str) -> Result<()> {
        let invalid = || QuickError::Cookie("invalid cookies string".to_string());
        let host = url.host_str().ok_or_else(invalid)?.to_string();

        let mut pending = Vec::new();
        let mut path = "/".to_string();
        let mut domain: Option<String> = None;
        let mut secure = false;
        let mut expires = None;

        for pair in cookies.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair.split_once('=').ok_or_else(invalid)?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() {
                return Err(invalid());
            }

            match name.to_ascii_lowercase().as_str() {
                "secure" => secure = !value.eq_ignore_ascii_case("false"),
                "httponly" => {}
                "path" => path = value.to_string(),
                "domain" => domain = Some(value.to_string()),
                "expires" => {
                    let parsed = Cookie::parse(format!("x=1; Expires={}", value)).map_err(|_| invalid())?;
                    expires = Some(parsed.expires_datetime().ok_or_else(invalid)?.unix_timestamp());
                }
                "max-age" => {
                    let secs: i64 = value.parse().map_err(|_| invalid())?;
                    expires = Some(current_timestamp() + secs);
                }
                _ => pending.push((name.to_string(), value.to_string())),
            }
        }

        if pending.is_empty() {
            return Err(invalid());
        }

        let host_only = domain.is_none();
        let domain = domain.unwrap_or(host);
        for (name, value) in pending {
            self.insert(StoredCookie {
                domain: domain.clone(),
                host_only,
                path: path.clone(),
                secure,
                expires,
                name,
                value,
            });
        }
        Ok(())
    }

    /// Load cookies from a Netscape cookie file
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        self.load_from(BufReader::new(file))
    }

    /// Load cookies in Netscape format from any reader
    pub fn load_from<R: BufRead>(&mut self, reader: R) -> Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cookie = parse_netscape_line(&line)?;
            self.insert(cookie);
        }
        Ok(())
    }

    /// Write every cookie to `path` in Netscape format
    pub fn dump(&self, path: &Path) -> Result<()> {
        let mut file = open_file_to_write(path)?;
        file.write_all(self.render(true).as_bytes())?;
        Ok(())
    }

    fn render(&self, trailing_ws: bool) -> String {
        let mut out = String::new();
        let last = self.cookies.len().saturating_sub(1);
        for (i, cookie) in self.cookies.iter().enumerate() {
            cookie.write_line(&mut out, trailing_ws);
            if trailing_ws || i < last {
                out.push('\n');
            }
        }
        out
    }

    /// Value for the `Cookie` request header, if any cookie applies to `url`
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.matches(url))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Store every `Set-Cookie` of a response received from `url`
    pub fn store_response(&mut self, url: &Url, headers: &HeaderMap) {
        let Some(host) = url.host_str() else {
            return;
        };

        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            for cookie in parse_set_cookie_header(raw) {
                let (domain, host_only) = match cookie.domain() {
                    Some(d) if !d.is_empty() => (d.trim_start_matches('.').to_string(), false),
                    _ => (host.to_string(), true),
                };
                let expires = match cookie.max_age() {
                    Some(age) => Some(current_timestamp() + age.whole_seconds()),
                    None => cookie.expires_datetime().map(|dt| dt.unix_timestamp()),
                };
                let stored = StoredCookie {
                    domain,
                    host_only,
                    path: cookie.path().map(str::to_string).unwrap_or_else(|| default_path(url)),
                    secure: cookie.secure().unwrap_or(false),
                    expires,
                    name: cookie.name().to_string(),
                    value: cookie.value().to_string(),
                };

                if is_cookie_expired(stored.expires) {
                    self.cookies.retain(|c| !c.same_slot(&stored));
                } else {
                    self.insert(stored);
                }
            }
        }
    }
}

impl fmt::Display for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

fn parse_netscape_line(line: &str) -> Result<StoredCookie> {
    let bad = |why: &str| QuickError::Cookie(format!("invalid cookie entry({}): {}", line, why));

    // tabs are the standard separator, but any whitespace is tolerated
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(bad("not enough fields"));
    }

    let domain = fields[0];
    if !is_valid_domain(domain) {
        return Err(bad("invalid domain"));
    }

    let path = fields[2];
    let secure = match fields[3] {
        "TRUE" => true,
        "FALSE" => false,
        _ => return Err(bad("unrecognized secure")),
    };
    let expires: i64 = fields[4].parse().map_err(|e: std::num::ParseIntError| bad(&e.to_string()))?;

    Ok(StoredCookie {
        domain: domain.to_string(),
        host_only: false,
        path: path.to_string(),
        secure,
        expires: Some(expires),
        name: fields[5].to_string(),
        value: fields.get(6).map(|v| v.to_string()).unwrap_or_default(),
    })
}

fn is_valid_domain(domain: &str) -> bool {
    let bare = domain.strip_prefix('.').unwrap_or(domain);
    if bare.is_empty() {
        return false;
    }
    match Url::parse(&format!("https://{}", bare)) {
        Ok(url) => url
            .host_str()
            .map(|h| h.eq_ignore_ascii_case(bare))
            .unwrap_or(false),
        Err(_) => false,
    }
}
