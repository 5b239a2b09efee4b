//! Builds ready-to-send requests
//!
//! A [`RequestFactory`] is configured once from the command line and then
//! produces a fresh [`PreparedRequest`] for every attempt, re-reading any
//! body files each time.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, HOST, USER_AGENT};
use http::Method;
use url::Url;

use super::data::DataSources;
use super::form::FormFields;
use crate::errors::{QuickError, Result};

pub const DEFAULT_USER_AGENT: &str = concat!("quick/", env!("CARGO_PKG_VERSION"));

/// Where the request body comes from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BodySource {
    #[default]
    Empty,
    /// `-d` values
    Data(DataSources),
    /// `-F` fields, sent as multipart/form-data
    Form(FormFields),
}

/// A request with its body fully materialised
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Produces identical requests on demand
#[derive(Debug, Clone)]
pub struct RequestFactory {
    method: Method,
    url: Url,
    /// `Host` to send when the URL points at an overridden address
    host: Option<String>,
    user_agent: String,
    content_type: String,
    headers: HeaderMap,
    body: BodySource,
}

impl RequestFactory {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            host: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            content_type: String::new(),
            headers: HeaderMap::new(),
            body: BodySource::Empty,
        }
    }

    /// Custom headers; they replace any default header of the same name
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Body source and the content type to announce for `-d` data
    pub fn with_body(mut self, body: BodySource, content_type: impl Into<String>) -> Self {
        self.body = body;
        self.content_type = content_type.into();
        self
    }

    /// Host header for the configured URL, when it differs from the URL's own
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn has_body(&self) -> bool {
        !matches!(self.body, BodySource::Empty)
    }

    /// Build the configured request
    ///
    /// Fails when a body file can't be read; callers treat that as fatal.
    pub fn build(&self) -> Result<PreparedRequest> {
        let host = self.host.clone().unwrap_or_else(|| origin_authority(&self.url));
        self.build_for(self.method.clone(), self.url.clone(), &host, true)
    }

    /// Build a request for another method, URL and host with the same
    /// headers, optionally dropping the body (used when following redirects)
    pub fn build_for(&self, method: Method, url: Url, host: &str, keep_body: bool) -> Result<PreparedRequest> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(HOST, header_value(host)?);

        let body = match (&self.body, keep_body) {
            (BodySource::Data(data), true) => {
                let (bytes, content_type) = data.open(&self.content_type)?;
                if !content_type.is_empty() {
                    headers.insert(CONTENT_TYPE, header_value(&content_type)?);
                }
                Some(bytes)
            }
            (BodySource::Form(form), true) => {
                let boundary = uuid::Uuid::new_v4().simple().to_string();
                let (bytes, content_type) = form.encode(&boundary)?;
                headers.insert(CONTENT_TYPE, header_value(&content_type)?);
                Some(bytes)
            }
            _ => None,
        };

        merge_headers(&mut headers, &self.headers);

        Ok(PreparedRequest {
            method,
            url,
            headers,
            body,
        })
    }
}

/// Copy `custom` into `base`; every name present in `custom` replaces all of
/// its values in `base`
fn merge_headers(base: &mut HeaderMap, custom: &HeaderMap) {
    let mut current: Option<&HeaderName> = None;
    for (name, value) in custom {
        if current != Some(name) {
            base.remove(name);
            current = Some(name);
        }
        base.append(name.clone(), value.clone());
    }
}

/// `host[:port]` of a URL, the port only when it isn't the default one
pub fn origin_authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| QuickError::Argument(format!("invalid header value: {}", value)))
}
