//! Argument validation
//!
//! Turns parsed [`Args`] into an immutable [`QuickConfig`], rejecting
//! conflicting or invalid combinations with the messages users of the
//! original `quick` know.

use std::path::PathBuf;
use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;
use url::Url;

use super::args::Args;
use crate::bench::BenchConfig;
use crate::client::Http3ClientOptions;
use crate::cookies::SharedCookieJar;
use crate::errors::{QuickError, Result};
use crate::request::{BodySource, DataSources, FormFields, RequestFactory, DEFAULT_USER_AGENT};
use crate::resolve::{split_host_port, ResolveOverrides};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Validated configuration for one invocation
#[derive(Debug, Clone)]
pub struct QuickConfig {
    /// Request URL as given on the command line
    pub url: Url,
    /// Request URL with the host rewritten by `--resolve`
    pub address: Url,
    /// Host as given on the command line, without a default `:443`
    pub origin_host: String,
    /// `host:port` to dial
    pub authority: String,
    pub sni: String,
    pub resolve: ResolveOverrides,

    pub method: Method,
    pub headers: HeaderMap,
    pub content_type: String,
    pub user_agent: String,
    pub body: BodySource,

    pub include_headers: bool,
    pub headers_only: bool,
    pub output: Option<PathBuf>,

    pub insecure: bool,
    pub no_redirect: bool,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_time: Duration,

    pub cookie: Option<String>,
    pub load_cookie: Option<PathBuf>,
    pub dump_cookie: Option<PathBuf>,

    pub bench: BenchConfig,
}

impl QuickConfig {
    pub fn is_benchmark(&self) -> bool {
        self.bench.is_enabled()
    }

    /// Factory producing the configured request
    pub fn request_factory(&self) -> RequestFactory {
        RequestFactory::new(self.method.clone(), self.address.clone())
            .with_host(self.origin_host.clone())
            .with_user_agent(self.user_agent.clone())
            .with_headers(self.headers.clone())
            .with_body(self.body.clone(), self.content_type.clone())
    }

    /// Transport settings for a connection to `authority`
    pub fn client_options(&self, authority: &str, jar: Option<SharedCookieJar>) -> Http3ClientOptions {
        Http3ClientOptions {
            authority: authority.to_string(),
            sni: self.sni.clone(),
            insecure: self.insecure,
            connect_timeout: self.connect_timeout,
            idle_timeout: (!self.idle_timeout.is_zero()).then_some(self.idle_timeout),
            max_time: (!self.max_time.is_zero()).then_some(self.max_time),
            jar,
        }
    }
}

/// Split a `-H "Name: value"` argument
fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let invalid = || QuickError::Argument(format!("invalid header: [{}]", raw));
    let value = raw.trim();
    let colon = value.find(':').filter(|&i| i > 0 && i < value.len() - 1).ok_or_else(invalid)?;

    let name = HeaderName::from_bytes(value[..colon].trim().as_bytes()).map_err(|_| invalid())?;
    let val = HeaderValue::from_str(value[colon + 1..].trim()).map_err(|_| invalid())?;
    Ok((name, val))
}

fn parse_url(raw: &str) -> Result<Url> {
    let raw = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };

    let invalid = || QuickError::Argument("URL invalid".to_string());
    let url = match Url::parse(&raw) {
        Ok(url) => url,
        Err(url::ParseError::EmptyHost) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    if url.scheme() != "https" || url.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }
    Ok(url)
}

/// Point `url` at `authority` (`host:port`)
pub(crate) fn rewrite_host(url: &mut Url, authority: &str) -> Result<()> {
    let invalid = || QuickError::Resolve(format!("invalid address: {}", authority));
    let (host, port) = split_host_port(authority).map_err(|_| invalid())?;
    let port: u16 = port.parse().map_err(|_| invalid())?;

    let host = if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    url.set_host(Some(&host)).map_err(|_| invalid())?;
    url.set_port(Some(port)).map_err(|_| invalid())?;
    Ok(())
}

fn parse_method(raw: &str) -> Result<Method> {
    let upper = raw.to_uppercase();
    match upper.as_str() {
        "GET" | "HEAD" | "DELETE" | "POST" | "PATCH" | "PUT" => Method::from_bytes(upper.as_bytes())
            .map_err(|_| QuickError::Argument(format!("invalid argument: unknown method {}", upper))),
        "CONNECT" | "OPTIONS" | "TRACE" => Err(QuickError::Argument(format!(
            "invalid argument: method {} is unsupported",
            upper
        ))),
        _ => Err(QuickError::Argument(format!("invalid argument: unknown method {}", upper))),
    }
}

/// Validate the command line
pub fn process_args(args: &Args) -> Result<QuickConfig> {
    let raw_url = args
        .url
        .as_deref()
        .ok_or_else(|| QuickError::Argument("no URL specified".to_string()))?;
    let url = parse_url(raw_url)?;
    let mut address = url.clone();

    let url_host = url.host_str().unwrap_or_default().to_string();
    let sni = match args.sni.as_deref() {
        Some(sni) if !sni.is_empty() => sni.to_string(),
        _ => url_host.trim_start_matches('[').trim_end_matches(']').to_string(),
    };
    let sni = if sni.contains(':') && sni.parse::<std::net::Ipv6Addr>().is_err() {
        split_host_port(&sni)
            .map(|(host, _)| host.to_string())
            .map_err(|_| QuickError::Argument(format!("invalid sni: {}", sni)))?
    } else {
        sni
    };

    let mut resolve = ResolveOverrides::new();
    for entry in &args.resolve {
        resolve.add(entry)?;
    }
    let port = address.port_or_known_default().unwrap_or(443);
    let resolved = resolve.resolve(&format!("{}:{}", url_host, port));
    rewrite_host(&mut address, &resolved.authority)?;

    // timeouts
    let max_time = args.max_time;
    if max_time.is_negative() {
        return Err(QuickError::Argument(format!(
            "invalid argument: -max-time should not be negative, got {}",
            max_time
        )));
    }
    let mut connect_timeout = args.connect_timeout.abs();
    let mut idle_timeout = args.idle_timeout.abs();
    if !max_time.is_zero() {
        connect_timeout = connect_timeout.min(max_time.abs());
        idle_timeout = idle_timeout.min(max_time.abs());
    }
    if args.connect_timeout.is_negative() || args.connect_timeout.is_zero() {
        return Err(QuickError::Argument(format!(
            "invalid argument: -connect-timeout should be positive, got {}",
            args.connect_timeout
        )));
    }
    if args.idle_timeout.is_negative() {
        return Err(QuickError::Argument(format!(
            "invalid argument: -idle-timeout should not be negative, got {}",
            args.idle_timeout
        )));
    }

    // body
    let mut data = DataSources::new();
    for value in &args.data {
        data.add(value)?;
    }
    let mut forms = FormFields::new();
    for value in &args.forms {
        forms.add(value)?;
    }
    if data.is_provided() && forms.is_provided() {
        return Err(QuickError::Argument(
            "invalid argument: -d can't be used with -F".to_string(),
        ));
    }

    let method = match args.method.as_deref() {
        Some(m) if !m.is_empty() => parse_method(m)?,
        _ if data.is_provided() || forms.is_provided() => Method::POST,
        _ if args.headers_only => Method::HEAD,
        _ => Method::GET,
    };

    if args.cookie.is_some() && args.load_cookie.is_some() {
        return Err(QuickError::Argument(
            "invalid argument: -cookie can't be used with -load-cookie".to_string(),
        ));
    }

    let mut headers = HeaderMap::new();
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        headers.append(name, value);
    }
    let content_type = match headers.remove(CONTENT_TYPE) {
        Some(ct) => ct
            .to_str()
            .map_err(|_| QuickError::Argument("invalid header: [Content-Type]".to_string()))?
            .to_string(),
        None => DEFAULT_CONTENT_TYPE.to_string(),
    };

    let body = if data.is_provided() {
        BodySource::Data(data)
    } else if forms.is_provided() {
        BodySource::Form(forms)
    } else {
        BodySource::Empty
    };

    let mut bench = BenchConfig {
        duration: Duration::ZERO,
        connections: args.bm_conn,
        requests_per_connection: args.bm_req_per_conn,
    };
    if !args.bm_duration.is_negative() {
        bench.duration = args.bm_duration.abs();
    }

    let mut config = QuickConfig {
        url,
        address,
        origin_host: resolved.origin_host,
        authority: resolved.authority,
        sni,
        resolve,
        method,
        headers,
        content_type,
        user_agent: args.user_agent.clone().unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        body,
        include_headers: args.include_headers,
        headers_only: args.headers_only,
        output: args.output.clone(),
        insecure: args.insecure,
        no_redirect: args.no_redirect,
        connect_timeout,
        idle_timeout,
        max_time: max_time.abs(),
        cookie: args.cookie.clone(),
        load_cookie: args.load_cookie.clone(),
        dump_cookie: args.dump_cookie.clone(),
        bench,
    };

    if config.is_benchmark() {
        if config.dump_cookie.is_some() {
            return Err(QuickError::Argument("unsupport option in benchmark mode".to_string()));
        }
        if config.output.is_some() || config.include_headers || config.headers_only {
            return Err(QuickError::Argument(
                "output customization is not allowed in benchmark mode".to_string(),
            ));
        }
        config.no_redirect = true;
        config.insecure = true;
        if config.max_time.is_zero() {
            config.max_time = config.bench.duration;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn check(args: &[&str]) -> Result<QuickConfig> {
        let mut argv = vec!["quick"];
        argv.extend_from_slice(args);
        process_args(&Args::try_parse_from(argv).unwrap())
    }

    fn err(args: &[&str]) -> String {
        check(args).unwrap_err().to_string()
    }

    #[test]
    fn test_url_checks() {
        assert_eq!(err(&[]), "no URL specified");
        assert_eq!(err(&["http://example.com"]), "URL invalid");
        assert_eq!(err(&["https://"]), "URL invalid");

        let config = check(&["example.com/path?q=1"]).unwrap();
        assert_eq!(config.address.as_str(), "https://example.com/path?q=1");
        assert_eq!(config.origin_host, "example.com");
        assert_eq!(config.authority, "example.com:443");
        assert_eq!(config.sni, "example.com");
    }

    #[test]
    fn test_sni() {
        let config = check(&["https://example.com:8443/"]).unwrap();
        assert_eq!(config.sni, "example.com");
        assert_eq!(config.origin_host, "example.com:8443");

        let config = check(&["--sni", "other.com:443", "https://example.com/"]).unwrap();
        assert_eq!(config.sni, "other.com");

        let config = check(&["https://[::1]:8443/"]).unwrap();
        assert_eq!(config.sni, "::1");
    }

    #[test]
    fn test_resolve_rewrites_address() {
        let config = check(&["--resolve", "example.com:443:127.0.0.1:8443", "https://example.com/a"]).unwrap();
        assert_eq!(config.address.as_str(), "https://127.0.0.1:8443/a");
        assert_eq!(config.url.as_str(), "https://example.com/a");
        assert_eq!(config.authority, "127.0.0.1:8443");
        assert_eq!(config.origin_host, "example.com");
        assert_eq!(config.sni, "example.com");

        assert_eq!(err(&["--resolve", "bad", "example.com"]), "invalid resolve: [bad]");
    }

    #[test]
    fn test_timeouts() {
        assert_eq!(
            err(&["--max-time", "-1s", "a.com"]),
            "invalid argument: -max-time should not be negative, got -1s"
        );
        assert_eq!(
            err(&["--connect-timeout", "0", "a.com"]),
            "invalid argument: -connect-timeout should be positive, got 0s"
        );
        assert_eq!(
            err(&["--idle-timeout", "-2s", "a.com"]),
            "invalid argument: -idle-timeout should not be negative, got -2s"
        );

        let config = check(&["--max-time", "500ms", "--idle-timeout", "10s", "a.com"]).unwrap();
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.idle_timeout, Duration::from_millis(500));
        assert_eq!(config.max_time, Duration::from_millis(500));
    }

    #[test]
    fn test_methods() {
        assert_eq!(check(&["a.com"]).unwrap().method, Method::GET);
        assert_eq!(check(&["-I", "a.com"]).unwrap().method, Method::HEAD);
        assert_eq!(check(&["-d", "x", "a.com"]).unwrap().method, Method::POST);
        assert_eq!(check(&["-F", "a=b", "a.com"]).unwrap().method, Method::POST);
        assert_eq!(check(&["-X", "put", "-d", "x", "a.com"]).unwrap().method, Method::PUT);

        assert_eq!(err(&["-X", "options", "a.com"]), "invalid argument: method OPTIONS is unsupported");
        assert_eq!(err(&["-X", "fetch", "a.com"]), "invalid argument: unknown method FETCH");
    }

    #[test]
    fn test_conflicts() {
        assert_eq!(err(&["-d", "x", "-F", "a=b", "a.com"]), "invalid argument: -d can't be used with -F");
        assert_eq!(
            err(&["--cookie", "a=b", "--load-cookie", "c.txt", "a.com"]),
            "invalid argument: -cookie can't be used with -load-cookie"
        );
        assert_eq!(err(&["-d", "", "a.com"]), "empty data not allowed");
        assert_eq!(err(&["-F", "=y", "a.com"]), "invalid form: [=y]");
    }

    #[test]
    fn test_headers() {
        let config = check(&["-H", "X-A: 1", "-H", "content-type: text/plain", "a.com"]).unwrap();
        assert_eq!(config.headers.get("x-a").unwrap(), "1");
        assert!(config.headers.get(CONTENT_TYPE).is_none());
        assert_eq!(config.content_type, "text/plain");

        assert_eq!(check(&["a.com"]).unwrap().content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(err(&["-H", "broken", "a.com"]), "invalid header: [broken]");
        assert_eq!(err(&["-H", "X-A:", "a.com"]), "invalid header: [X-A:]");
    }

    #[test]
    fn test_benchmark_mode() {
        let config = check(&["--bm-duration", "2s", "--bm-conn", "2", "--bm-req-per-conn", "3", "a.com"]).unwrap();
        assert!(config.is_benchmark());
        assert!(config.insecure);
        assert!(config.no_redirect);
        assert_eq!(config.max_time, Duration::from_secs(2));
        assert_eq!(config.bench.connections, 2);
        assert_eq!(config.bench.requests_per_connection, 3);

        let partial = check(&["--bm-duration", "2s", "--bm-conn", "2", "a.com"]).unwrap();
        assert!(!partial.is_benchmark());
        assert!(!partial.insecure);

        let bm = ["--bm-duration", "1s", "--bm-conn", "1", "--bm-req-per-conn", "1"];
        let with = |extra: &[&str]| {
            let mut v: Vec<&str> = bm.to_vec();
            v.extend_from_slice(extra);
            v.push("a.com");
            err(&v)
        };
        assert_eq!(with(&["--dump-cookie", "c.txt"]), "unsupport option in benchmark mode");
        assert_eq!(with(&["-o", "out"]), "output customization is not allowed in benchmark mode");
        assert_eq!(with(&["-i"]), "output customization is not allowed in benchmark mode");
        assert_eq!(with(&["-I"]), "output customization is not allowed in benchmark mode");
    }

    #[test]
    fn test_client_options() {
        let config = check(&["--idle-timeout", "3s", "a.com"]).unwrap();
        let options = config.client_options(&config.authority, None);
        assert_eq!(options.authority, "a.com:443");
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.max_time, None);
        assert_eq!(options.connect_timeout, Duration::from_secs(1));
    }
}
