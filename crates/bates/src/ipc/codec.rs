//! MessagePack framing for the single request/response exchange.
//!
//! - A request is the 2-element array `[source, destination]` of UTF-8 path
//!   strings.
//! - A successful response is a bare non-negative integer (the page count).
//! - A failed response is the map `{"error": <message>}`. Failures with a
//!   known kind also carry `kind`, `path` and `reason` so the parent rebuilds
//!   the same [`AnnotationError`] the annotator returned.
//!
//! No frame may exceed [`MAX_FRAME_LEN`] bytes.

use crate::{AnnotationError, Error, PageCount, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Maximum encoded size of any message on the channel.
pub const MAX_FRAME_LEN: usize = 10_000;

/// Work request sent from the parent to its worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub source: String,
    pub destination: String,
}

impl Request {
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if either path is not valid UTF-8.
    pub fn new(source: &Path, destination: &Path) -> Result<Self> {
        Ok(Self {
            source: utf8(source)?.to_owned(),
            destination: utf8(destination)?.to_owned(),
        })
    }

    pub fn into_paths(self) -> (PathBuf, PathBuf) {
        (PathBuf::from(self.source), PathBuf::from(self.destination))
    }
}

/// Outcome sent back from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Pages(PageCount),
    Failed(AnnotationError),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireResponse {
    Pages(PageCount),
    Failed(WireFailure),
}

#[derive(Serialize, Deserialize)]
struct WireFailure {
    error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FailureKind {
    Unreadable,
    Unwritable,
    Malformed,
}

impl From<&AnnotationError> for WireFailure {
    fn from(err: &AnnotationError) -> Self {
        let (kind, path, reason) = match err {
            AnnotationError::Unreadable { path, reason } => (FailureKind::Unreadable, path, reason),
            AnnotationError::Unwritable { path, reason } => (FailureKind::Unwritable, path, reason),
            AnnotationError::Malformed { path, reason } => (FailureKind::Malformed, path, reason),
            AnnotationError::Other(_) => {
                return Self {
                    error: err.to_string(),
                    kind: None,
                    path: None,
                    reason: None,
                };
            }
        };
        Self {
            error: err.to_string(),
            kind: Some(kind),
            path: Some(path.clone()),
            reason: Some(reason.clone()),
        }
    }
}

impl From<WireFailure> for AnnotationError {
    fn from(wire: WireFailure) -> Self {
        match (wire.kind, wire.path, wire.reason) {
            (Some(FailureKind::Unreadable), Some(path), Some(reason)) => Self::Unreadable { path, reason },
            (Some(FailureKind::Unwritable), Some(path), Some(reason)) => Self::Unwritable { path, reason },
            (Some(FailureKind::Malformed), Some(path), Some(reason)) => Self::Malformed { path, reason },
            _ => Self::Other(wire.error),
        }
    }
}

/// Encodes a request, rejecting it if it would not fit in one frame.
///
/// # Errors
///
/// Returns [`Error::FrameTooLarge`] for oversized paths and [`Error::Codec`]
/// if encoding fails.
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    // Struct fields encode positionally, as a 2-element array.
    let frame = rmp_serde::to_vec(request).map_err(codec_error)?;
    check_len(frame)
}

pub fn decode_request(frame: &[u8]) -> Result<Request> {
    rmp_serde::from_slice(frame).map_err(codec_error)
}

pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
    let wire = match response {
        Response::Pages(pages) => WireResponse::Pages(*pages),
        Response::Failed(error) => WireResponse::Failed(error.into()),
    };
    // Named encoding so the failure tag is a map keyed by "error".
    let frame = rmp_serde::to_vec_named(&wire).map_err(codec_error)?;
    check_len(frame)
}

pub fn decode_response(frame: &[u8]) -> Result<Response> {
    match rmp_serde::from_slice(frame).map_err(codec_error)? {
        WireResponse::Pages(pages) => Ok(Response::Pages(pages)),
        WireResponse::Failed(failure) => Ok(Response::Failed(failure.into())),
    }
}

fn check_len(frame: Vec<u8>) -> Result<Vec<u8>> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge {
            len: frame.len(),
            max: MAX_FRAME_LEN,
        });
    }
    Ok(frame)
}

fn utf8(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| Error::Codec {
        context: format!("path is not valid UTF-8: {}", path.display()),
    })
}

fn codec_error(err: impl core::fmt::Display) -> Error {
    Error::Codec {
        context: err.to_string(),
    }
}
