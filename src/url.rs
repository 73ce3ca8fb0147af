//! Parsing for `ws://host[:port]/path` URLs.
//!
//! This engine speaks plaintext WebSocket only, so `wss://` is recognized
//! but rejected with a dedicated error instead of the generic scheme error.

#[derive(Debug, Clone)]
pub struct WsUrl<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path_and_query: &'a str,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlError {
    #[error("URL must start with ws://")]
    Scheme,
    #[error("wss:// requires TLS, which this engine does not provide")]
    TlsUnsupported,
    #[error("empty host")]
    Host,
    #[error("invalid port")]
    Port,
}

pub fn parse_ws_url(input: &str) -> Result<WsUrl<'_>, UrlError> {
    if input.starts_with("wss://") {
        return Err(UrlError::TlsUnsupported);
    }
    let rest = input.strip_prefix("ws://").ok_or(UrlError::Scheme)?;

    let (host_port, path_and_query) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };

    let (host, port) = match host_port.rsplit_once(':') {
        Some((h, p)) => (h, p.parse().map_err(|_| UrlError::Port)?),
        None => (host_port, 80),
    };
    if host.is_empty() {
        return Err(UrlError::Host);
    }

    Ok(WsUrl {
        host,
        port,
        path_and_query,
    })
}
