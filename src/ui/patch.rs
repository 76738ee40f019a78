use crate::ui::tree::Element;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    SetRoot { key: String },
    SetElement { key: String, element: Element },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchParseError {
    Json { message: String },
    UnsupportedOp { op: String },
    BadPath { path: String },
    RootValueNotAKey,
    ElementShape { message: String },
}

impl fmt::Display for PatchParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json { message } => write!(f, "line is not valid JSON: {message}"),
            Self::UnsupportedOp { op } => write!(f, "unsupported op `{op}`"),
            Self::BadPath { path } => write!(f, "unrecognized patch path `{path}`"),
            Self::RootValueNotAKey => write!(f, "/root value must be an element key string"),
            Self::ElementShape { message } => {
                write!(f, "element value has the wrong shape: {message}")
            }
        }
    }
}

impl std::error::Error for PatchParseError {}

#[derive(Debug, Deserialize)]
struct RawPatch {
    op: String,
    path: String,
    value: Value,
}

const ELEMENTS_PREFIX: &str = "/elements/";

pub fn parse_line(line: &str) -> Result<PatchOp, PatchParseError> {
    let raw: RawPatch = serde_json::from_str(line).map_err(|err| PatchParseError::Json {
        message: err.to_string(),
    })?;

    if raw.op != "set" {
        return Err(PatchParseError::UnsupportedOp { op: raw.op });
    }

    if raw.path == "/root" {
        let key = raw
            .value
            .as_str()
            .ok_or(PatchParseError::RootValueNotAKey)?;
        if key.is_empty() {
            return Err(PatchParseError::RootValueNotAKey);
        }
        return Ok(PatchOp::SetRoot {
            key: key.to_string(),
        });
    }

    if let Some(key) = raw.path.strip_prefix(ELEMENTS_PREFIX) {
        if key.is_empty() || key.contains('/') {
            return Err(PatchParseError::BadPath { path: raw.path });
        }
        let element: Element =
            serde_json::from_value(raw.value).map_err(|err| PatchParseError::ElementShape {
                message: err.to_string(),
            })?;
        return Ok(PatchOp::SetElement {
            key: key.to_string(),
            element,
        });
    }

    Err(PatchParseError::BadPath { path: raw.path })
}

// Splits an incoming chunk stream into patch lines. Network chunking can cut
// a line anywhere, including inside a multi-byte UTF-8 character, so the
// buffer holds raw bytes and nothing is decoded until a `\n` (never part of
// a multi-byte sequence) completes the line.
#[derive(Debug, Default)]
pub struct PatchDecoder {
    buffer: Vec<u8>,
}

impl PatchDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &[u8]) -> Vec<Result<PatchOp, PatchParseError>> {
        self.buffer.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(result) = Self::decode_line(&line) {
                decoded.push(result);
            }
        }
        decoded
    }

    pub fn push_chunk(&mut self, chunk: &str) -> Vec<Result<PatchOp, PatchParseError>> {
        self.push_bytes(chunk.as_bytes())
    }

    // End of stream: whatever is buffered is the final (unterminated) line.
    pub fn finish(&mut self) -> Option<Result<PatchOp, PatchParseError>> {
        let line = std::mem::take(&mut self.buffer);
        Self::decode_line(&line)
    }

    fn decode_line(line: &[u8]) -> Option<Result<PatchOp, PatchParseError>> {
        let line = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(err) => {
                return Some(Err(PatchParseError::Json {
                    message: format!("line is not valid UTF-8: {err}"),
                }))
            }
        };
        if line.is_empty() {
            None
        } else {
            Some(parse_line(line))
        }
    }
}
