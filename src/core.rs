use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use http::header::{HeaderValue, LOCATION, REFERER};
use http::{Method, StatusCode};
use tracing::{debug, info};
use url::Url;

use crate::bench::run_benchmark;
use crate::cli::process::rewrite_host;
use crate::cli::{process_args, Args, QuickConfig};
use crate::client::{BodyMode, Http3Client, Http3ClientFactory, HttpClient, Response, SUPPORTED_QUIC_VERSIONS};
use crate::config::Config;
use crate::cookies::{CookieJar, SharedCookieJar};
use crate::errors::{QuickError, Result};
use crate::logging;
use crate::signals;
use crate::status::ExitStatus;
use crate::utils::open_file_to_write;

const MAX_REDIRECTS: usize = 10;

/// Main entry point for the CLI.
///
/// Handles argument parsing, configuration loading, and dispatches to normal
/// or benchmark mode.
pub fn run(args: Vec<String>) -> ExitStatus {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}", e);
            Config::default()
        }
    };

    let merged_args = config.merge_into(args);

    let parsed = match Args::try_parse_from(&merged_args) {
        Ok(args) => args,
        Err(e) => {
            e.print().ok();
            return if e.kind() == clap::error::ErrorKind::DisplayHelp {
                ExitStatus::Success
            } else {
                ExitStatus::Error
            };
        }
    };

    if parsed.version {
        print_version();
        return ExitStatus::Success;
    }

    logging::init(parsed.log_format.unwrap_or_default(), parsed.debug);
    debug!(?merged_args, "arguments");

    let quick = match process_args(&parsed) {
        Ok(quick) => quick,
        Err(e) => return handle_error(e, parsed.debug),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return handle_error(e.into(), parsed.debug),
    };

    match runtime.block_on(program(quick)) {
        Ok(status) => status,
        Err(e) => handle_error(e, parsed.debug),
    }
}

fn print_version() {
    println!("quick {}", env!("CARGO_PKG_VERSION"));
    println!("Supported QUIC versions: {}", SUPPORTED_QUIC_VERSIONS.join(", "));
}

pub async fn program(config: QuickConfig) -> Result<ExitStatus> {
    let jar = create_cookie_jar(&config)?.into_shared();
    let mut out = std::io::stdout();

    if config.is_benchmark() {
        run_bench(&config, jar, &mut out).await?;
    } else {
        run_normal(&config, jar, &mut out).await?;
    }
    out.flush()?;

    Ok(ExitStatus::Success)
}

fn create_cookie_jar(config: &QuickConfig) -> Result<CookieJar> {
    let mut jar = CookieJar::new();
    if let Some(ref cookies) = config.cookie {
        jar.load_cookies_for_url(&config.address, cookies)?;
    } else if let Some(ref path) = config.load_cookie {
        jar.load(path)?;
    }
    Ok(jar)
}

async fn run_bench(config: &QuickConfig, jar: SharedCookieJar, out: &mut dyn Write) -> Result<()> {
    let options = config.client_options(&config.authority, Some(jar));
    let factory = Http3ClientFactory::new(options)?;
    let requests = Arc::new(config.request_factory());

    run_benchmark(config.bench, &factory, requests, signals::cancellation_token(), out).await?;
    Ok(())
}

/// Send one request, following redirects, and print the response
async fn run_normal(config: &QuickConfig, jar: SharedCookieJar, out: &mut dyn Write) -> Result<()> {
    let requests = config.request_factory();
    let mut client = Http3Client::new(config.client_options(&config.authority, Some(jar.clone())))?;
    let mut request = requests.build()?;
    let mut current = config.url.clone();
    let mut hops = 0;

    let response = loop {
        let response = client.send(request.clone(), BodyMode::Collect).await?;
        if config.no_redirect {
            break response;
        }
        let Some((method, keep_body)) = redirect_method(response.status, &request.method) else {
            break response;
        };
        let Some(location) = response.headers.get(LOCATION).and_then(|v| v.to_str().ok()) else {
            break response;
        };

        if hops >= MAX_REDIRECTS {
            return Err(QuickError::Connection(format!("stopped after {} redirects", MAX_REDIRECTS)));
        }
        hops += 1;

        let next = current.join(location)?;
        if next.scheme() != "https" {
            return Err(QuickError::Connection(format!(
                "unsupported scheme {} in redirect",
                next.scheme()
            )));
        }

        let host = next.host_str().unwrap_or_default().to_string();
        let port = next.port_or_known_default().unwrap_or(443);
        let resolved = config.resolve.resolve(&format!("{}:{}", host, port));
        let mut address = next.clone();
        rewrite_host(&mut address, &resolved.authority)?;
        info!(status = %response.status, location = %next, "following redirect");

        let mut next_request = requests.build_for(method, address, &resolved.origin_host, keep_body)?;
        if let Ok(referer) = HeaderValue::from_str(referer_for(&current).as_str()) {
            next_request.headers.insert(REFERER, referer);
        }

        if resolved.authority != client.options().authority {
            let mut options = config.client_options(&resolved.authority, Some(jar.clone()));
            if resolved.origin_host != config.origin_host {
                options.sni = host.trim_start_matches('[').trim_end_matches(']').to_string();
            }
            client = Http3Client::new(options)?;
        }

        current = next;
        request = next_request;
    };

    if let Some(ref path) = config.dump_cookie {
        let dumped = jar
            .lock()
            .map_err(|_| QuickError::Cookie("cookie jar poisoned".to_string()))
            .and_then(|jar| jar.dump(path));
        if let Err(e) = dumped {
            eprintln!("failed to dump cookie: {}", e);
        }
    }

    write_response(config, &response, out)
}

/// Method and body handling for a redirect status, `None` when not a redirect
fn redirect_method(status: StatusCode, method: &Method) -> Option<(Method, bool)> {
    match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => {
            if *method == Method::GET || *method == Method::HEAD {
                Some((method.clone(), false))
            } else {
                Some((Method::GET, false))
            }
        }
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => Some((method.clone(), true)),
        _ => None,
    }
}

/// Previous URL without credentials or fragment
fn referer_for(url: &Url) -> Url {
    let mut referer = url.clone();
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    referer.set_fragment(None);
    referer
}

/// Print headers (with `-i`/`-I`) and the body
fn write_response(config: &QuickConfig, response: &Response, out: &mut dyn Write) -> Result<()> {
    if config.include_headers || config.headers_only {
        write!(out, "HTTP/3 {}\r\n", response.status)?;

        let mut names: Vec<_> = response.headers.keys().collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for name in names {
            for value in response.headers.get_all(name) {
                out.write_all(name.as_str().as_bytes())?;
                out.write_all(b": ")?;
                out.write_all(value.as_bytes())?;
                out.write_all(b"\r\n")?;
            }
        }
    }

    if config.headers_only {
        return Ok(());
    }

    if config.include_headers {
        out.write_all(b"\r\n")?;
    }

    match config.output {
        Some(ref path) => {
            let mut file = open_file_to_write(path)?;
            file.write_all(&response.body)?;
        }
        None => out.write_all(&response.body)?,
    }

    Ok(())
}

fn handle_error(error: QuickError, debug: bool) -> ExitStatus {
    if debug {
        eprintln!("Error: {:?}", error);
    } else {
        eprintln!("Error: {}", error);
    }

    // All errors return the same exit code (1) following Unix conventions
    ExitStatus::Error
}
