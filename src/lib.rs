//! quick library interface
//!
//! A curl-like HTTP/3 client with a wrk-style benchmark mode.
//!
//! # Module Organization
//!
//! - [`cli`] - Argument parsing and validation (Args, QuickConfig)
//! - [`request`] - Request bodies and the request factory
//! - [`client`] - HTTP/3 transport over QUIC
//! - [`bench`] - Benchmark engine (workers, histogram stats, report)
//! - [`cookies`] - Cookie jar with Netscape file support
//! - [`resolve`] - `--resolve` host overrides
//! - [`signals`] - Interrupt handling (was_interrupted, set_interrupted)
//! - [`errors`] - Error types (QuickError, Result)
//! - [`status`] - Exit status codes (ExitStatus)
//! - [`core`] - Main execution logic

pub mod bench;
pub mod cli;
pub mod client;
pub mod config;
pub mod cookies;
pub mod core;
pub mod errors;
pub mod logging;
pub mod request;
pub mod resolve;
pub mod signals;
pub mod status;
pub mod utils;
