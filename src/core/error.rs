// Centralized error handling for the proxy

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors produced by the bencode decoder
///
/// Each variant carries the byte offset the decoder failed at so a bad
/// torrent file can be reported precisely and skipped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("invalid prefix byte 0x{byte:02x} at offset {offset}")]
    InvalidPrefix { byte: u8, offset: usize },

    #[error("invalid integer at offset {offset}")]
    InvalidInteger { offset: usize },

    #[error("invalid byte string length at offset {offset}")]
    InvalidLength { offset: usize },

    #[error("dictionary key is not a byte string at offset {offset}")]
    InvalidKey { offset: usize },

    #[error("duplicate dictionary key at offset {offset}")]
    DuplicateKey { offset: usize },

    #[error("nesting too deep at offset {offset}")]
    TooDeep { offset: usize },

    #[error("trailing data after root value at offset {offset}")]
    TrailingData { offset: usize },
}

/// Errors raised while interpreting a decoded torrent
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetadataError {
    #[error("bencode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("torrent root is not a dictionary")]
    RootNotDict,

    #[error("torrent has no info dictionary")]
    MissingInfo,

    #[error("torrent has no announce URL")]
    MissingAnnounce,

    #[error("info dictionary has neither length nor files")]
    MissingLength,

    #[error("invalid file entry in files list")]
    InvalidFileEntry,
}

/// Errors for one file in the rewrite pass
///
/// Each aborts that single file; the pass continues with the rest.
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("file has no usable name: {0}")]
    BadFileName(String),
}

/// Errors from the one-time upstream announce
///
/// Any of these aborts the bootstrap; the session slot reverts to
/// absent so the client's next announce retries from scratch.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(u16),

    #[error("failed to decompress upstream response: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("upstream response is not valid bencode: {0}")]
    InvalidResponse(#[from] DecodeError),

    #[error("upstream response is not a dictionary")]
    NotADict,
}

/// Errors that can occur during announce processing
#[derive(Error, Debug)]
pub enum AnnounceError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("This is a BitTorrent tracker announce URL, not meant to be opened in a web browser. Add it to your torrent client instead."
    )]
    BrowserAccess,
}

impl From<ValidationError> for AnnounceError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingParameter(name) => AnnounceError::MissingParameter(name),
            other => AnnounceError::InvalidParameter(other.to_string()),
        }
    }
}

impl IntoResponse for AnnounceError {
    fn into_response(self) -> Response {
        // Special case: BrowserAccess returns plain text for users
        if matches!(self, AnnounceError::BrowserAccess) {
            let message = "Nothing to see here".to_string();

            return Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; charset=utf-8")
                .body(message.into())
                .unwrap();
        }

        // For all other errors, return bencode response
        use crate::bencode::encoder::BencodeEncode;

        let message = self.to_string();

        // Build bencode error response: d14:failure reason<len>:<message>e
        let mut buf = Vec::with_capacity(128);

        buf.extend_from_slice(b"d");

        "failure reason".bencode(&mut buf);
        message.as_str().bencode(&mut buf);

        buf.extend_from_slice(b"e");

        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(buf.into())
            .unwrap()
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter format: {0}")]
    InvalidFormat(String),

    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid percent-encoding: {0}")]
    InvalidEscape(String),
}
