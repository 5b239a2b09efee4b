//! `-F` multipart/form-data fields
//!
//! Accepts curl's syntax: `name=value`, `name=@path`, quoted values with
//! `\"` escapes, plus the `filename=` and `type=` keywords.
//! `headers=` is not supported.

use std::fmt;
use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::errors::{QuickError, Result};

const OCTET_STREAM: &str = "application/octet-stream";

/// One `-F` field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    /// Literal value, or the file path when `from_file` is set
    pub data: String,
    pub from_file: bool,
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name={}", self.name)?;
        if let Some(ref filename) = self.filename {
            write!(f, ";filename={}", filename)?;
        }
        if let Some(ref ct) = self.content_type {
            write!(f, ";type={}", ct)?;
        }
        write!(f, ";data={}", self.data)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Key,
    Value,
    QuotedValue,
    Separator,
}

/// Split a `-F` argument into alternating key/value tokens
fn tokenize(raw: &str) -> Vec<String> {
    let mut value = raw.to_string();
    if !value.ends_with(';') {
        value.push(';');
    }
    let bytes = value.as_bytes();

    let mut tokens = Vec::new();
    let mut state = State::Key;
    let mut start = 0;
    let mut need_unescape = false;

    for (i, c) in value.char_indices() {
        match c {
            '=' => {
                if state == State::Key {
                    tokens.push(value[start..i].to_string());
                    start = i + 1;
                    state = State::Value;
                }
            }
            '"' => match state {
                State::Value => {
                    if bytes[i - 1] == b'=' {
                        start = i + 1;
                        state = State::QuotedValue;
                    } else if bytes[i - 1] == b'"' {
                        need_unescape = true;
                    }
                }
                State::QuotedValue => {
                    if bytes[i - 1] != b'\\' {
                        tokens.push(take_piece(&value[start..i], &mut need_unescape));
                        state = State::Separator;
                    } else {
                        need_unescape = true;
                    }
                }
                _ => {}
            },
            ';' => {
                if state == State::Value {
                    tokens.push(take_piece(&value[start..i], &mut need_unescape));
                    state = State::Separator;
                }
            }
            c if !c.is_whitespace() => {
                if state == State::Separator {
                    start = i;
                    state = State::Key;
                }
            }
            _ => {}
        }
    }

    tokens
}

fn take_piece(s: &str, need_unescape: &mut bool) -> String {
    if std::mem::take(need_unescape) {
        unescape_quotes(s)
    } else {
        s.to_string()
    }
}

/// Undo `\\` and `\"` escapes
fn unescape_quotes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '\\' || next == '"' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Escape `\` and `"` for a quoted header parameter
fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Ordered list of `-F` fields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: Vec<FormField>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_provided(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn last(&self) -> Option<&FormField> {
        self.fields.last()
    }

    /// Parse and register one `-F` argument
    pub fn add(&mut self, raw: &str) -> Result<()> {
        let invalid = || QuickError::Argument(format!("invalid form: [{}]", raw));

        let tokens = tokenize(raw);
        if tokens.len() < 2 {
            return Err(invalid());
        }

        let mut field = FormField::default();
        let mut named = false;
        for pair in tokens.chunks_exact(2) {
            let (key, value) = (&pair[0], &pair[1]);
            match key.as_str() {
                "filename" => field.filename = Some(value.clone()),
                "type" => field.content_type = Some(value.clone()),
                _ if !named => {
                    field.name = key.clone();
                    field.data = value.clone();
                    named = true;
                }
                _ => warn!("skip unknown form field: {}={}", key, value),
            }
        }

        if field.name.is_empty() {
            return Err(invalid());
        }
        if let Some(path) = field.data.strip_prefix('@') {
            if path.is_empty() {
                return Err(invalid());
            }
            let path = path.to_string();
            if field.filename.is_none() {
                field.filename = Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string());
            }
            field.data = path;
            field.from_file = true;
        }

        self.fields.push(field);
        Ok(())
    }

    /// Encode every field as a multipart/form-data body
    ///
    /// Returns the body and its `Content-Type` (with the boundary parameter).
    /// Files are read at this point.
    pub fn encode(&self, boundary: &str) -> Result<(Bytes, String)> {
        let mut body = BytesMut::new();

        for field in &self.fields {
            body.put_slice(format!("--{}\r\n", boundary).as_bytes());

            let guessed = match field.filename {
                Some(ref filename) => {
                    body.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                            escape_quotes(&field.name),
                            escape_quotes(filename)
                        )
                        .as_bytes(),
                    );
                    mime_guess::from_path(filename).first().map(|m| m.essence_str().to_string())
                }
                None => {
                    body.put_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n", escape_quotes(&field.name))
                            .as_bytes(),
                    );
                    None
                }
            };

            let part_type = field
                .content_type
                .clone()
                .or(guessed)
                .or_else(|| field.from_file.then(|| OCTET_STREAM.to_string()));
            if let Some(ct) = part_type {
                body.put_slice(format!("Content-Type: {}\r\n", ct).as_bytes());
            }
            body.put_slice(b"\r\n");

            if field.from_file {
                let content = std::fs::read(&field.data)
                    .map_err(|e| QuickError::Body(format!("open {}: {}", field.data, e)))?;
                body.put_slice(&content);
            } else {
                body.put_slice(field.data.as_bytes());
            }
            body.put_slice(b"\r\n");
        }
        body.put_slice(format!("--{}--\r\n", boundary).as_bytes());

        Ok((body.freeze(), format!("multipart/form-data; boundary={}", boundary)))
    }
}

impl fmt::Display for FormFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.fields.iter().map(|field| field.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}
