//! HTTP/1.1 Upgrade handshake: key generation, request building, and
//! validation of the server's 101 response.

use base64::{Engine as _, engine::general_purpose::STANDARD as b64};
use httparse::Status;
use monoio_compat::AsyncReadExt;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::client::Config;

pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

#[derive(thiserror::Error, Debug)]
pub enum HandshakeError {
    #[error("eof during handshake")]
    Eof,
    #[error("oversized handshake")]
    Oversized,
    #[error("non-101 status line")]
    Status,
    #[error("missing upgrade headers")]
    Headers,
    #[error("bad Sec-WebSocket-Accept")]
    Accept,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

pub struct ClientKey {
    pub sec_websocket_key: String,
    pub expected_accept: String,
}

/// `base64(SHA1(key ∥ WS_GUID))`, the token the server must echo back in
/// `Sec-WebSocket-Accept`. Always 28 characters.
pub fn compute_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    b64.encode(sha1.finalize())
}

/// Draw a fresh 16-byte nonce and derive the accept value the server must
/// answer with. The key is standard base64, exactly 24 characters.
pub fn generate_client_key() -> ClientKey {
    let mut key_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut key_bytes);
    let sec_websocket_key = b64.encode(key_bytes);
    let expected_accept = compute_accept(&sec_websocket_key);

    ClientKey {
        sec_websocket_key,
        expected_accept,
    }
}

/// Build the Upgrade request. Required headers come first in a fixed order;
/// `User-Agent`, `Origin` and `Sec-WebSocket-Protocol` are appended only
/// when configured.
pub fn build_request(
    host: &str,
    port: u16,
    path_and_query: &str,
    sec_websocket_key: &str,
    cfg: &Config,
) -> String {
    let mut req = format!(
        "GET {path_and_query} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {sec_websocket_key}\r\n\
         Sec-WebSocket-Version: 13\r\n"
    );
    if let Some(ua) = cfg.user_agent.as_deref().filter(|s| !s.is_empty()) {
        req.push_str(&format!("User-Agent: {ua}\r\n"));
    }
    if let Some(origin) = cfg.origin.as_deref().filter(|s| !s.is_empty()) {
        req.push_str(&format!("Origin: {origin}\r\n"));
    }
    if let Some(proto) = cfg.protocol.as_deref().filter(|s| !s.is_empty()) {
        req.push_str(&format!("Sec-WebSocket-Protocol: {proto}\r\n"));
    }
    req.push_str("\r\n");
    req
}

/// Read and validate the server's response. On success, returns any bytes
/// that arrived after the header terminator; those are frame bytes and
/// belong to the connection's recv buffer.
pub async fn read_response<S>(
    stream: &mut S,
    expected_accept: &str,
) -> Result<Vec<u8>, HandshakeError>
where
    S: AsyncReadExt + Unpin,
{
    let mut hdr = Vec::with_capacity(2048);
    let mut chunk = [0u8; 1024];
    let mut headers = [httparse::EMPTY_HEADER; 32];

    while !hdr.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Eof);
        }

        hdr.extend_from_slice(&chunk[..n]);
        if hdr.len() > 16 * 1024 {
            return Err(HandshakeError::Oversized);
        }
    }

    let mut response = httparse::Response::new(&mut headers);
    match response.parse(&hdr) {
        Ok(Status::Complete(header_len)) => {
            validate_response(&response, expected_accept)?;
            Ok(hdr.split_off(header_len))
        }
        _ => Err(HandshakeError::Headers),
    }
}

fn validate_response(
    response: &httparse::Response<'_, '_>,
    expected_accept: &str,
) -> Result<(), HandshakeError> {
    // httparse reports the minor version: Some(1) is HTTP/1.1, Some(0) is
    // HTTP/1.0. The status line must be exactly `HTTP/1.1 101 ...`.
    if response.version != Some(1) || response.code != Some(101) {
        return Err(HandshakeError::Status);
    }

    let upgrade = find_header(response.headers, "Upgrade").ok_or(HandshakeError::Headers)?;
    if !value_contains(upgrade, "websocket")? {
        return Err(HandshakeError::Headers);
    }

    let connection = find_header(response.headers, "Connection").ok_or(HandshakeError::Headers)?;
    if !value_contains(connection, "upgrade")? {
        return Err(HandshakeError::Headers);
    }

    let accept =
        find_header(response.headers, "Sec-WebSocket-Accept").ok_or(HandshakeError::Headers)?;
    if std::str::from_utf8(accept)?.trim() != expected_accept {
        return Err(HandshakeError::Accept);
    }

    Ok(())
}

fn find_header<'a>(headers: &'a [httparse::Header<'a>], name: &str) -> Option<&'a [u8]> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value)
}

fn value_contains(value: &[u8], token: &str) -> Result<bool, std::str::Utf8Error> {
    let text = std::str::from_utf8(value)?.to_ascii_lowercase();
    Ok(text.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_and_validate(raw: &[u8], expected: &str) -> Result<(), HandshakeError> {
        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        match response.parse(raw) {
            Ok(Status::Complete(_)) => validate_response(&response, expected),
            _ => Err(HandshakeError::Headers),
        }
    }

    #[test]
    fn accept_known_vector() {
        // RFC 6455 §1.3 sample nonce
        assert_eq!(
            compute_accept("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn generated_key_shape() {
        let key = generate_client_key();
        assert_eq!(key.sec_websocket_key.len(), 24);
        assert_eq!(key.expected_accept.len(), 28);
        assert_eq!(key.expected_accept, compute_accept(&key.sec_websocket_key));
    }

    #[test]
    fn request_contains_required_lines() {
        let req = build_request("example.com", 80, "/chat", "abcd", &Config::default());
        for must in [
            "GET /chat HTTP/1.1\r\n",
            "Host: example.com:80\r\n",
            "Upgrade: websocket\r\n",
            "Connection: Upgrade\r\n",
            "Sec-WebSocket-Key: abcd\r\n",
            "Sec-WebSocket-Version: 13\r\n\r\n",
        ] {
            assert!(req.contains(must), "missing {must:?}");
        }
    }

    #[test]
    fn optional_headers_only_when_configured() {
        let req = build_request("h", 80, "/", "k", &Config::default());
        assert!(!req.contains("User-Agent"));
        assert!(!req.contains("Origin"));
        assert!(!req.contains("Sec-WebSocket-Protocol"));

        let cfg = Config {
            user_agent: Some("engine/0.1".into()),
            origin: Some("http://example.com".into()),
            protocol: Some("chat".into()),
            ..Default::default()
        };
        let req = build_request("h", 9001, "/", "k", &cfg);
        assert!(req.contains("Host: h:9001\r\n"));
        assert!(req.contains("User-Agent: engine/0.1\r\n"));
        assert!(req.contains("Origin: http://example.com\r\n"));
        assert!(req.contains("Sec-WebSocket-Protocol: chat\r\n"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[test]
    fn validates_correct_response() {
        let raw = b"HTTP/1.1 101 Switching Protocols\r\n\
                    Upgrade: websocket\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        assert!(parse_and_validate(raw, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").is_ok());
    }

    #[test]
    fn header_matching_is_case_insensitive() {
        let raw = b"HTTP/1.1 101 Switching Protocols\r\n\
                    UPGRADE: WebSocket\r\n\
                    connection: keep-alive, Upgrade\r\n\
                    sec-websocket-accept:  s3pPLMBiTxaQ9kYGzzhZRbK+xOo= \r\n\r\n";
        assert!(parse_and_validate(raw, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=").is_ok());
    }

    #[test]
    fn rejects_non_101() {
        let raw = b"HTTP/1.1 200 OK\r\n\
                    Upgrade: websocket\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Accept: x\r\n\r\n";
        assert!(matches!(parse_and_validate(raw, "x"), Err(HandshakeError::Status)));
    }

    #[test]
    fn rejects_http_1_0_status_line() {
        // 101 and correct headers are not enough; the upgrade is only
        // defined for HTTP/1.1.
        let raw = b"HTTP/1.0 101 Switching Protocols\r\n\
                    Upgrade: websocket\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        assert!(matches!(
            parse_and_validate(raw, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
            Err(HandshakeError::Status)
        ));
    }

    #[test]
    fn rejects_missing_headers() {
        let raw = b"HTTP/1.1 101 Switching Protocols\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Accept: x\r\n\r\n";
        assert!(matches!(parse_and_validate(raw, "x"), Err(HandshakeError::Headers)));

        let raw = b"HTTP/1.1 101 Switching Protocols\r\n\
                    Upgrade: h2c\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Accept: x\r\n\r\n";
        assert!(matches!(parse_and_validate(raw, "x"), Err(HandshakeError::Headers)));
    }

    #[test]
    fn rejects_wrong_accept() {
        let raw = b"HTTP/1.1 101 Switching Protocols\r\n\
                    Upgrade: websocket\r\n\
                    Connection: Upgrade\r\n\
                    Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBhbnN3ZXI=\r\n\r\n";
        assert!(matches!(
            parse_and_validate(raw, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
            Err(HandshakeError::Accept)
        ));
    }
}
