//! Public error taxonomy for the connection engine.

use crate::frame::FrameError;
use crate::handshake::HandshakeError;
use crate::url::UrlError;

#[derive(thiserror::Error, Debug)]
pub enum WsError {
    #[error("invalid argument: {0}")]
    InvalidArgs(&'static str),
    #[error(transparent)]
    Network(#[from] std::io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
    #[error("timed out waiting for socket readiness")]
    Timeout,
    #[error("connection closed")]
    Closed,
    #[error("frame does not fit the send scratch buffer")]
    BufferFull,
    #[error("not ready, retry")]
    NotReady,
}

impl WsError {
    /// Stable, short, lower-case label for the error class. These labels do
    /// not change between releases and are safe to match on or ship across
    /// an FFI boundary.
    pub fn as_str(&self) -> &'static str {
        match self {
            WsError::InvalidArgs(_) => "invalid args",
            WsError::Network(_) => "network",
            WsError::Handshake(_) => "handshake",
            WsError::Protocol(_) => "protocol",
            WsError::Timeout => "timeout",
            WsError::Closed => "closed",
            WsError::BufferFull => "buffer full",
            WsError::NotReady => "not ready",
        }
    }

    /// Transient errors leave the connection usable; the caller just tries
    /// again. Everything else is sticky.
    pub fn is_transient(&self) -> bool {
        matches!(self, WsError::NotReady | WsError::Timeout)
    }
}

impl From<UrlError> for WsError {
    fn from(e: UrlError) -> Self {
        WsError::InvalidArgs(match e {
            UrlError::Scheme => "URL must start with ws://",
            UrlError::TlsUnsupported => "wss:// is not supported, plaintext ws:// only",
            UrlError::Host => "empty host",
            UrlError::Port => "invalid port",
        })
    }
}

impl From<FrameError> for WsError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Protocol(reason) => WsError::Protocol(reason),
            FrameError::TooLarge => WsError::Protocol("frame exceeds the configured maximum"),
        }
    }
}
