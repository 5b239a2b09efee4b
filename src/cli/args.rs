//! CLI argument definitions using clap
//!
//! This module defines all command-line arguments for quick. Flag names follow
//! curl where curl has an equivalent.

use clap::{ArgAction, Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::{format_duration, parse_go_duration};

/// A duration that remembers a leading minus sign
///
/// Timeouts must be rejected when negative rather than fail to parse, so the
/// sign is kept separately from the magnitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignedDuration {
    negative: bool,
    value: Duration,
}

impl SignedDuration {
    pub fn new(value: Duration) -> Self {
        Self { negative: false, value }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// The magnitude, ignoring the sign
    pub fn abs(&self) -> Duration {
        self.value
    }
}

impl FromStr for SignedDuration {
    type Err = String;

    /// Accepts humantime syntax (`1s`, `1m 30s`) and Go-style fractions (`1.5s`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let value = humantime::parse_duration(rest)
            .ok()
            .or_else(|| parse_go_duration(rest))
            .ok_or_else(|| format!("invalid duration \"{}\"", s))?;

        Ok(Self {
            negative: negative && !value.is_zero(),
            value,
        })
    }
}

impl fmt::Display for SignedDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        write!(f, "{}", format_duration(self.value))
    }
}

/// quick - a curl-like HTTP/3 client with a built-in benchmark mode
#[derive(Parser, Debug, Clone)]
#[command(name = "quick", about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Args {
    /// The URL to request (https:// prefix optional)
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    // =========================================================================
    // OUTPUT
    // =========================================================================

    /// Include the response status line and headers in the output
    #[arg(short = 'i', long = "include", action = ArgAction::SetTrue)]
    pub include_headers: bool,

    /// Show response headers only (HEAD unless -X is given)
    #[arg(short = 'I', long = "head", action = ArgAction::SetTrue)]
    pub headers_only: bool,

    /// Write the response body to this file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    // =========================================================================
    // CONNECTION
    // =========================================================================

    /// Don't verify the server certificate. This is the default in benchmark mode
    #[arg(short = 'k', long = "insecure", action = ArgAction::SetTrue)]
    pub insecure: bool,

    /// Don't follow redirects. This is the default in benchmark mode
    #[arg(long = "no-redirect", action = ArgAction::SetTrue)]
    pub no_redirect: bool,

    /// Maximum time for the connect operation, like 1.5s
    #[arg(long = "connect-timeout", value_name = "DURATION", default_value = "1s", allow_hyphen_values = true)]
    pub connect_timeout: SignedDuration,

    /// Close an established connection after this long without network
    /// activity. A reasonable value is chosen when zero
    #[arg(long = "idle-timeout", value_name = "DURATION", default_value = "0", allow_hyphen_values = true)]
    pub idle_timeout: SignedDuration,

    /// Maximum time for the whole operation, like 1.5s. Zero means no limit
    #[arg(long = "max-time", value_name = "DURATION", default_value = "0", allow_hyphen_values = true)]
    pub max_time: SignedDuration,

    /// Server name for TLS instead of the URL host
    #[arg(long = "sni", value_name = "NAME")]
    pub sni: Option<String>,

    /// Provide a custom address for a host and port pair, in
    /// host:port:address[:port] format
    #[arg(long = "resolve", value_name = "HOST:PORT:ADDR")]
    pub resolve: Vec<String>,

    // =========================================================================
    // REQUEST
    // =========================================================================

    /// Request method
    #[arg(short = 'X', long = "request", value_name = "METHOD")]
    pub method: Option<String>,

    /// Custom header to pass to the server, "Name: value"
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// User-Agent to send
    #[arg(long = "user-agent", value_name = "UA")]
    pub user_agent: Option<String>,

    /// Request body data; '@file' reads a file, repeated values are concatenated.
    /// POST is used unless -X is given
    #[arg(short = 'd', long = "data", value_name = "DATA")]
    pub data: Vec<String>,

    /// Multipart form field, like curl's -F ('@file', 'type=', 'filename=').
    /// POST is used unless -X is given
    #[arg(short = 'F', long = "form", value_name = "FIELD")]
    pub forms: Vec<String>,

    // =========================================================================
    // COOKIES
    // =========================================================================

    /// Cookies to attach, in 'name=value; name=value' format
    #[arg(long = "cookie", value_name = "COOKIES")]
    pub cookie: Option<String>,

    /// Load cookies from a Netscape cookie file
    #[arg(long = "load-cookie", value_name = "FILE")]
    pub load_cookie: Option<PathBuf>,

    /// Write cookies to this file after the request
    #[arg(long = "dump-cookie", value_name = "FILE")]
    pub dump_cookie: Option<PathBuf>,

    // =========================================================================
    // BENCHMARK
    // =========================================================================

    /// Duration of the benchmark
    #[arg(long = "bm-duration", value_name = "DURATION", default_value = "0", allow_hyphen_values = true)]
    pub bm_duration: SignedDuration,

    /// Number of connections in the benchmark
    #[arg(long = "bm-conn", value_name = "N", default_value_t = 0)]
    pub bm_conn: usize,

    /// Number of requests to keep in flight on each connection
    #[arg(long = "bm-req-per-conn", value_name = "N", default_value_t = 0)]
    pub bm_req_per_conn: usize,

    // =========================================================================
    // TROUBLESHOOTING
    // =========================================================================

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Show debug logs
    #[arg(long = "debug", action = ArgAction::SetTrue)]
    pub debug: bool,

    /// Show version and supported QUIC versions
    #[arg(long = "version", action = ArgAction::SetTrue)]
    pub version: bool,
}

/// Log output format
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text output (default)
    #[default]
    Text,
    /// JSON Lines format for parsing
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["quick"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["example.com"]);
        assert_eq!(args.url.as_deref(), Some("example.com"));
        assert_eq!(args.connect_timeout.abs(), Duration::from_secs(1));
        assert!(args.max_time.is_zero());
        assert_eq!(args.bm_conn, 0);
        assert!(args.log_format.is_none());
    }

    #[test]
    fn test_repeatable_flags() {
        let args = parse(&[
            "-H", "A: 1", "-H", "B: 2", "-d", "x", "-d", "@f", "--resolve", "a:443:b",
            "https://a",
        ]);
        assert_eq!(args.headers, vec!["A: 1", "B: 2"]);
        assert_eq!(args.data, vec!["x", "@f"]);
        assert_eq!(args.resolve, vec!["a:443:b"]);
    }

    #[test]
    fn test_negative_duration_is_parsed() {
        let args = parse(&["--max-time", "-1s", "a"]);
        assert!(args.max_time.is_negative());
        assert_eq!(args.max_time.to_string(), "-1s");
    }

    #[test]
    fn test_signed_duration_forms() {
        assert_eq!("1.5s".parse::<SignedDuration>().unwrap().abs(), Duration::from_millis(1500));
        assert_eq!("1m 30s".parse::<SignedDuration>().unwrap().abs(), Duration::from_secs(90));
        assert_eq!("250ms".parse::<SignedDuration>().unwrap().abs(), Duration::from_millis(250));
        assert!(!"-0s".parse::<SignedDuration>().unwrap().is_negative());
        assert!("fast".parse::<SignedDuration>().is_err());
    }

    #[test]
    fn test_log_format() {
        let args = parse(&["--log-format", "json", "a"]);
        assert_eq!(args.log_format, Some(LogFormat::Json));
    }
}
