//! HTTP/3 client using h3-quinn
//!
//! One [`Http3Client`] owns one QUIC connection, dialed lazily on the first
//! request and redialed when the previous one has closed. Requests are
//! multiplexed as concurrent streams over that connection.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::future::{BoxFuture, FutureExt, Shared};
use h3_quinn::quinn;
use http::header::{COOKIE, HOST};
use http::{HeaderMap, HeaderValue, Request, Version};
use tokio::net::lookup_host;
use tracing::{debug, trace, warn};
use url::Url;

use super::ssl::build_tls_config;
use super::{BodyMode, ClientFactory, HttpClient, Response, TransportError};
use crate::cookies::SharedCookieJar;
use crate::errors::{QuickError, Result};
use crate::request::{origin_authority, PreparedRequest};

/// Settings shared by every connection of a run
#[derive(Debug, Clone)]
pub struct Http3ClientOptions {
    /// `host:port` to dial, after resolve overrides
    pub authority: String,
    /// TLS server name
    pub sni: String,
    pub insecure: bool,
    pub connect_timeout: Duration,
    /// QUIC idle timeout; `None` keeps the quinn default
    pub idle_timeout: Option<Duration>,
    /// Limit for one request, counted from the call; the exchange gets what
    /// connection setup left of it
    pub max_time: Option<Duration>,
    pub jar: Option<SharedCookieJar>,
}

impl Http3ClientOptions {
    pub fn new(authority: impl Into<String>, sni: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            sni: sni.into(),
            insecure: false,
            connect_timeout: Duration::from_secs(1),
            idle_timeout: None,
            max_time: None,
            jar: None,
        }
    }
}

type SendRequest = h3::client::SendRequest<h3_quinn::OpenStreams, Bytes>;

struct Established {
    // kept alive for as long as the connection is used
    _endpoint: quinn::Endpoint,
    conn: quinn::Connection,
    sender: SendRequest,
}

/// The current dial, shared by every request waiting on it
type Dial = Shared<BoxFuture<'static, std::result::Result<Arc<Established>, TransportError>>>;

/// HTTP/3 client bound to a single QUIC connection
pub struct Http3Client {
    options: Arc<Http3ClientOptions>,
    quic_config: quinn::ClientConfig,
    state: Mutex<Option<Dial>>,
}

impl Http3Client {
    pub fn new(options: Http3ClientOptions) -> Result<Self> {
        let quic_config = build_quic_config(&options)?;
        Ok(Self::with_config(Arc::new(options), quic_config))
    }

    fn with_config(options: Arc<Http3ClientOptions>, quic_config: quinn::ClientConfig) -> Self {
        Self {
            options,
            quic_config,
            state: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &Http3ClientOptions {
        &self.options
    }

    /// Request sender for the current connection, dialing a new one if needed
    ///
    /// Callers arriving while a dial is in flight wait on that same dial and
    /// all see its outcome. A failed or closed connection is redialed by the
    /// next caller.
    async fn sender(&self) -> std::result::Result<SendRequest, TransportError> {
        let dial = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TransportError::Connect("connection state poisoned".to_string()))?;
            let current = state.as_ref().filter(|dial| is_reusable(dial)).cloned();
            match current {
                Some(dial) => dial,
                None => {
                    let dial = connect(self.options.clone(), self.quic_config.clone()).boxed().shared();
                    *state = Some(dial.clone());
                    dial
                }
            }
        };

        Ok(dial.await?.sender.clone())
    }

    async fn exchange(
        &self,
        mut sender: SendRequest,
        request: PreparedRequest,
        mode: BodyMode,
    ) -> std::result::Result<Response, TransportError> {
        let url = request.url.clone();
        let mut req = to_h3_request(&request)?;
        if let Some(ref jar) = self.options.jar {
            if let Some(cookie) = cookie_header(jar, &url) {
                let value = HeaderValue::from_str(&cookie)
                    .map_err(|e| TransportError::Request(e.to_string()))?;
                req.headers_mut().insert(COOKIE, value);
            }
        }

        let mut stream = sender.send_request(req).await.map_err(stream_error)?;
        if let Some(body) = request.body.filter(|b| !b.is_empty()) {
            stream.send_data(body).await.map_err(stream_error)?;
        }
        stream.finish().await.map_err(stream_error)?;

        let resp = stream.recv_response().await.map_err(stream_error)?;

        let mut body = BytesMut::new();
        while let Some(mut chunk) = stream.recv_data().await.map_err(stream_error)? {
            match mode {
                BodyMode::Collect => body.put(chunk),
                BodyMode::Discard => chunk.advance(chunk.remaining()),
            }
        }
        trace!(status = %resp.status(), bytes = body.len(), "response received");

        if let Some(ref jar) = self.options.jar {
            store_cookies(jar, &url, resp.headers());
        }

        let (parts, ()) = resp.into_parts();
        Ok(Response {
            status: parts.status,
            version: Version::HTTP_3,
            headers: parts.headers,
            body: body.freeze(),
        })
    }
}

impl HttpClient for Http3Client {
    /// Connection setup is bounded by the connect timeout, which validation
    /// clamps to max-time; the exchange gets whatever is left of max-time.
    async fn send(
        &self,
        request: PreparedRequest,
        mode: BodyMode,
    ) -> std::result::Result<Response, TransportError> {
        let start = Instant::now();
        let sender = self.sender().await?;

        match self.options.max_time {
            Some(limit) => {
                let remaining = limit.saturating_sub(start.elapsed());
                tokio::time::timeout(remaining, self.exchange(sender, request, mode))
                    .await
                    .map_err(|_| TransportError::Timeout)?
            }
            None => self.exchange(sender, request, mode).await,
        }
    }
}

/// In-flight dials and live connections are reused; failed or closed ones
/// are replaced
fn is_reusable(dial: &Dial) -> bool {
    match dial.peek() {
        None => true,
        Some(Ok(est)) => match est.conn.close_reason() {
            None => true,
            Some(reason) => {
                debug!(%reason, "connection closed, redialing");
                false
            }
        },
        Some(Err(_)) => false,
    }
}

async fn connect(
    options: Arc<Http3ClientOptions>,
    quic_config: quinn::ClientConfig,
) -> std::result::Result<Arc<Established>, TransportError> {
    let timeout = options.connect_timeout;
    let est = if timeout.is_zero() {
        dial(&options, quic_config).await?
    } else {
        tokio::time::timeout(timeout, dial(&options, quic_config))
            .await
            .map_err(|_| TransportError::ConnectTimeout)??
    };
    Ok(Arc::new(est))
}

async fn dial(
    options: &Http3ClientOptions,
    quic_config: quinn::ClientConfig,
) -> std::result::Result<Established, TransportError> {
    let authority = &options.authority;
    let addr = lookup_host(authority.as_str())
        .await
        .map_err(|e| TransportError::Connect(format!("lookup {}: {}", authority, e)))?
        .next()
        .ok_or_else(|| TransportError::Connect(format!("lookup {}: no addresses found", authority)))?;

    let bind: SocketAddr = if addr.is_ipv6() {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    };
    let mut endpoint = quinn::Endpoint::client(bind)
        .map_err(|e| TransportError::Connect(format!("Failed to create QUIC endpoint: {}", e)))?;
    endpoint.set_default_client_config(quic_config);

    debug!(%addr, sni = %options.sni, "dialing QUIC connection");
    let conn = endpoint
        .connect(addr, &options.sni)
        .map_err(|e| TransportError::Connect(format!("QUIC connect error: {}", e)))?
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let (mut driver, sender) = h3::client::new(h3_quinn::Connection::new(conn.clone()))
        .await
        .map_err(|e| TransportError::Connect(format!("HTTP/3 handshake failed: {}", e)))?;

    // Spawn driver task
    tokio::spawn(async move {
        let _ = futures::future::poll_fn(|cx| driver.poll_close(cx)).await;
    });

    Ok(Established {
        _endpoint: endpoint,
        conn,
        sender,
    })
}

/// `Cookie` header value for `url`; a poisoned jar sends none
fn cookie_header(jar: &SharedCookieJar, url: &Url) -> Option<String> {
    match jar.lock() {
        Ok(jar) => jar.header_for(url),
        Err(_) => {
            warn!(%url, "cookie jar poisoned, sending request without cookies");
            None
        }
    }
}

fn store_cookies(jar: &SharedCookieJar, url: &Url, headers: &HeaderMap) {
    match jar.lock() {
        Ok(mut jar) => jar.store_response(url, headers),
        Err(_) => warn!(%url, "cookie jar poisoned, dropping Set-Cookie"),
    }
}

fn stream_error(err: impl std::fmt::Display) -> TransportError {
    TransportError::Stream(err.to_string())
}

/// Convert a prepared request into the `http::Request` h3 expects
///
/// h3 takes `:authority` from the URI, so the `Host` header (possibly
/// overridden with `-H`) is moved there rather than sent twice.
fn to_h3_request(request: &PreparedRequest) -> std::result::Result<Request<()>, TransportError> {
    let mut headers = request.headers.clone();
    let authority = match headers.remove(HOST) {
        Some(host) => host
            .to_str()
            .map_err(|e| TransportError::Request(e.to_string()))?
            .to_string(),
        None => origin_authority(&request.url),
    };

    let mut path = request.url.path().to_string();
    if let Some(query) = request.url.query() {
        path.push('?');
        path.push_str(query);
    }
    let uri = format!("https://{}{}", authority, path);

    let mut req = Request::builder()
        .method(request.method.clone())
        .uri(uri)
        .version(Version::HTTP_3)
        .body(())
        .map_err(|e| TransportError::Request(e.to_string()))?;
    *req.headers_mut() = headers;
    Ok(req)
}

fn build_quic_config(options: &Http3ClientOptions) -> Result<quinn::ClientConfig> {
    let tls = build_tls_config(options.insecure)?;
    let crypto = quinn::crypto::rustls::QuicClientConfig::try_from(tls)
        .map_err(|e| QuickError::Ssl(format!("TLS config error: {}", e)))?;
    let mut config = quinn::ClientConfig::new(Arc::new(crypto));

    if let Some(idle) = options.idle_timeout {
        let idle = quinn::IdleTimeout::try_from(idle)
            .map_err(|_| QuickError::Config(format!("idle timeout out of range: {:?}", idle)))?;
        let mut transport = quinn::TransportConfig::default();
        transport.max_idle_timeout(Some(idle));
        config.transport_config(Arc::new(transport));
    }

    Ok(config)
}

/// Creates [`Http3Client`]s sharing one TLS/QUIC configuration
pub struct Http3ClientFactory {
    options: Arc<Http3ClientOptions>,
    quic_config: quinn::ClientConfig,
}

impl Http3ClientFactory {
    pub fn new(options: Http3ClientOptions) -> Result<Self> {
        let quic_config = build_quic_config(&options)?;
        Ok(Self {
            options: Arc::new(options),
            quic_config,
        })
    }
}

impl ClientFactory for Http3ClientFactory {
    type Client = Http3Client;

    fn create(&self) -> Result<Http3Client> {
        Ok(Http3Client::with_config(self.options.clone(), self.quic_config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::{run_benchmark, BenchConfig};
    use crate::request::RequestFactory;
    use http::Method;
    use crate::cookies::CookieJar;
    use tokio_util::sync::CancellationToken;

    fn prepared(url: &str, headers: &[(&'static str, &'static str)]) -> PreparedRequest {
        let mut map = http::HeaderMap::new();
        for (k, v) in headers {
            map.append(*k, HeaderValue::from_static(v));
        }
        PreparedRequest {
            method: Method::GET,
            url: Url::parse(url).unwrap(),
            headers: map,
            body: None,
        }
    }

    #[test]
    fn test_h3_request_uses_host_as_authority() {
        let req = to_h3_request(&prepared("https://a.com/x?y=1", &[("host", "b.com"), ("x-k", "v")])).unwrap();
        assert_eq!(req.uri().to_string(), "https://b.com/x?y=1");
        assert!(req.headers().get(HOST).is_none());
        assert_eq!(req.headers().get("x-k").unwrap(), "v");
    }

    #[test]
    fn test_h3_request_without_host_header() {
        let req = to_h3_request(&prepared("https://a.com:8443/", &[])).unwrap();
        assert_eq!(req.uri().authority().unwrap().as_str(), "a.com:8443");
    }

    #[tokio::test]
    async fn test_unreachable_connect_times_out() {
        let mut options = Http3ClientOptions::new("192.0.2.1:443", "example.com");
        options.insecure = true;
        options.connect_timeout = Duration::from_millis(50);
        let client = Http3Client::new(options).unwrap();

        let err = client
            .send(prepared("https://example.com/", &[]), BodyMode::Discard)
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::ConnectTimeout);
        assert_eq!(err.to_string(), "connect timeout");
    }

    fn dead_target_options() -> Http3ClientOptions {
        // nothing listens on the discard port
        let mut options = Http3ClientOptions::new("127.0.0.1:9", "localhost");
        options.insecure = true;
        options.connect_timeout = Duration::from_millis(100);
        options.max_time = Some(Duration::from_millis(100));
        options
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_dial() {
        let client = Http3Client::new(dead_target_options()).unwrap();
        let start = Instant::now();

        let results = futures::future::join_all(
            (0..4).map(|_| client.send(prepared("https://localhost/", &[]), BodyMode::Discard)),
        )
        .await;

        for result in results {
            assert_eq!(result.unwrap_err(), TransportError::ConnectTimeout);
        }
        // one dial, not four in a row
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_bench_slots_on_dead_target_report_one_error() {
        let factory = Http3ClientFactory::new(dead_target_options()).unwrap();
        let requests = Arc::new(RequestFactory::new(
            Method::GET,
            Url::parse("https://127.0.0.1:9/").unwrap(),
        ));
        let config = BenchConfig {
            duration: Duration::from_millis(100),
            connections: 1,
            requests_per_connection: 4,
        };

        let mut out = Vec::new();
        let stat = run_benchmark(config, &factory, requests, CancellationToken::new(), &mut out)
            .await
            .unwrap();

        assert_eq!(stat.errors().len(), 1, "{:?}", stat.errors());
        assert_eq!(stat.errors().get("connect timeout"), Some(&stat.requests()));
        assert!(stat.requests() >= 4);
    }

    #[test]
    fn test_poisoned_jar_is_skipped() {
        let url = Url::parse("https://a.com/").unwrap();
        let mut jar = CookieJar::new();
        jar.load_cookies_for_url(&url, "a=1").unwrap();
        let jar = jar.into_shared();
        assert_eq!(cookie_header(&jar, &url).as_deref(), Some("a=1"));

        let held = jar.clone();
        let _ = std::thread::spawn(move || {
            let _guard = held.lock().unwrap();
            panic!("poison the jar");
        })
        .join();
        assert!(jar.is_poisoned());

        assert_eq!(cookie_header(&jar, &url), None);
        let mut headers = HeaderMap::new();
        headers.insert("set-cookie", HeaderValue::from_static("b=2"));
        store_cookies(&jar, &url, &headers);
    }

    #[test]
    fn test_factory_shares_options() {
        let mut options = Http3ClientOptions::new("127.0.0.1:443", "localhost");
        options.insecure = true;
        options.idle_timeout = Some(Duration::from_secs(5));
        let factory = Http3ClientFactory::new(options).unwrap();
        let a = factory.create().unwrap();
        let b = factory.create().unwrap();
        assert_eq!(a.options().authority, b.options().authority);
    }
}
