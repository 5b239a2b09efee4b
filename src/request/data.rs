//! `-d` request body sources
//!
//! Each `-d` value is either literal data or `@file`. Sources are concatenated
//! in order; for `application/x-www-form-urlencoded` bodies they are joined
//! with `&`. Files are re-read every time the body is opened, so a benchmark
//! can build a fresh body for each attempt.

use std::fmt;
use std::path::Path;

use bytes::{Bytes, BytesMut};

use crate::errors::{QuickError, Result};

pub const FORM_URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// Ordered list of `-d` values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSources {
    srcs: Vec<String>,
}

impl DataSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one `-d` value
    pub fn add(&mut self, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(QuickError::Argument("empty data not allowed".to_string()));
        }
        if value == "@" {
            return Err(QuickError::Argument("empty file name not allowed".to_string()));
        }
        self.srcs.push(value.to_string());
        Ok(())
    }

    pub fn is_provided(&self) -> bool {
        !self.srcs.is_empty()
    }

    /// Read all sources into one body
    ///
    /// Returns the body and the content type to send. When the body comes from
    /// exactly one file, the type is guessed from its extension and replaces
    /// `content_type` if a guess exists.
    pub fn open(&self, content_type: &str) -> Result<(Bytes, String)> {
        let joined = content_type == FORM_URL_ENCODED;
        let mut body = BytesMut::new();
        let mut guessed: Option<String> = None;

        for (i, src) in self.srcs.iter().enumerate() {
            if i > 0 && joined {
                body.extend_from_slice(b"&");
            }
            match src.strip_prefix('@') {
                Some(file) => {
                    let content = std::fs::read(file)
                        .map_err(|e| QuickError::Body(format!("open {}: {}", file, e)))?;
                    body.extend_from_slice(&content);
                    if i == 0 {
                        guessed = mime_guess::from_path(Path::new(file))
                            .first()
                            .map(|m| m.essence_str().to_string());
                    }
                }
                None => body.extend_from_slice(src.as_bytes()),
            }
        }

        let content_type = match guessed {
            Some(ct) if self.srcs.len() == 1 => ct,
            _ => content_type.to_string(),
        };

        Ok((body.freeze(), content_type))
    }
}

impl fmt::Display for DataSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.srcs.join(" "))
    }
}
