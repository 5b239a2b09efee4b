//! Custom host resolution (`--resolve host:port:address[:port]`)
//!
//! An override maps a `host:port` pair to another address, like curl's
//! `--resolve`. The request still carries the original host as its authority
//! and SNI; only the dial target changes.

use std::fmt;

use crate::errors::{QuickError, Result};

/// Why a `host:port` string could not be split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPortError {
    MissingPort,
    Invalid,
}

/// Split `host:port` (IPv6 hosts bracketed) into its parts
pub fn split_host_port(s: &str) -> std::result::Result<(&str, &str), HostPortError> {
    if let Some(rest) = s.strip_prefix('[') {
        let end = rest.find(']').ok_or(HostPortError::Invalid)?;
        let host = &rest[..end];
        let after = &rest[end + 1..];
        if after.is_empty() {
            return Err(HostPortError::MissingPort);
        }
        let port = after.strip_prefix(':').ok_or(HostPortError::Invalid)?;
        if port.contains(':') {
            return Err(HostPortError::Invalid);
        }
        return Ok((host, port));
    }

    let idx = s.rfind(':').ok_or(HostPortError::MissingPort)?;
    let host = &s[..idx];
    if host.contains(':') || host.contains('[') || host.contains(']') {
        return Err(HostPortError::Invalid);
    }
    Ok((host, &s[idx + 1..]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Override {
    source: String,
    target: String,
}

/// The outcome of looking a `host:port` pair up in the overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddr {
    /// Host as the user wrote it, without the default `:443`
    pub origin_host: String,
    /// `host:port` to dial
    pub authority: String,
}

/// Ordered set of resolve overrides; the most recently added one wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOverrides {
    entries: Vec<Override>,
}

impl ResolveOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse and register one `host:port:address[:port]` entry
    pub fn add(&mut self, value: &str) -> Result<()> {
        let invalid = || QuickError::Resolve(format!("invalid resolve: [{}]", value));

        if value.is_empty() {
            return Err(invalid());
        }

        let (host, port, dest) = if value.starts_with('[') {
            let right = value.find(']').ok_or_else(invalid)?;
            if right + 2 >= value.len() {
                return Err(invalid());
            }
            let mut parts = value[right + 1..].splitn(3, ':');
            let _empty = parts.next();
            let port = parts.next().ok_or_else(invalid)?;
            let dest = parts.next().ok_or_else(invalid)?;
            (&value[..=right], port, dest)
        } else {
            let mut parts = value.splitn(3, ':');
            let host = parts.next().ok_or_else(invalid)?;
            let port = parts.next().ok_or_else(invalid)?;
            let dest = parts.next().ok_or_else(invalid)?;
            (host, port, dest)
        };

        match port.parse::<u32>() {
            Ok(p) if p > 0 && p < 65536 => {}
            _ => return Err(invalid()),
        }

        let target = match split_host_port(dest) {
            Ok(_) => dest.to_string(),
            Err(HostPortError::MissingPort) => format!("{}:{}", dest, port),
            Err(HostPortError::Invalid) => return Err(invalid()),
        };

        self.entries.insert(0, Override {
            source: format!("{}:{}", host, port),
            target,
        });
        Ok(())
    }

    /// Find the override registered for `host_port`, if any
    pub fn lookup(&self, host_port: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|o| o.source == host_port)
            .map(|o| o.target.as_str())
    }

    /// Resolve a `host:port` pair into the origin host and the address to dial
    pub fn resolve(&self, host_port: &str) -> ResolvedAddr {
        let origin_host = match split_host_port(host_port) {
            Ok((host, "443")) => {
                if host.contains(':') {
                    format!("[{}]", host)
                } else {
                    host.to_string()
                }
            }
            _ => host_port.to_string(),
        };

        let authority = self
            .lookup(host_port)
            .map(str::to_string)
            .unwrap_or_else(|| host_port.to_string());

        ResolvedAddr { origin_host, authority }
    }
}

impl fmt::Display for ResolveOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .entries
            .iter()
            .map(|o| format!("{}:{}", o.source, o.target))
            .collect();
        write!(f, "{}", pairs.join(" "))
    }
}
