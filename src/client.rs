//! The connection engine: socket lifecycle, handshake, masked sends, and a
//! zero-copy receive path with automatic control-frame handling.

use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use monoio::net::TcpStream;
use monoio::time::timeout;
use monoio_compat::{AsyncReadExt, AsyncWriteExt, StreamWrapper};
use rand::RngCore;

use crate::error::WsError;
use crate::frame::{self, FrameParser, Opcode, MAX_CONTROL_PAYLOAD, MAX_HEADER_LEN};
use crate::handshake;
use crate::url::parse_ws_url;

/// Close codes this client may put on the wire (RFC 6455 §7.4.1).
/// 1005/1006 are reserved for local reporting and are never sent;
/// 3000-4999 are application-defined and also accepted by `send_close`.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const TOO_LARGE: u16 = 1009;
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Connection configuration. `Default` matches the protocol defaults:
/// 5 s handshake timeout, 1 MiB maximum frame size, no optional headers.
#[derive(Debug, Clone)]
pub struct Config {
    pub handshake_timeout_ms: u32,
    pub max_frame_size: usize,
    pub user_agent: Option<String>,
    pub origin: Option<String>,
    /// Requested subprotocol (`Sec-WebSocket-Protocol`).
    pub protocol: Option<String>,
    /// Accepted for configuration compatibility; permessage-deflate is not
    /// implemented and the flag is ignored.
    pub enable_compression: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 5_000,
            max_frame_size: 1 << 20,
            user_agent: None,
            origin: None,
            protocol: None,
            enable_compression: false,
        }
    }
}

/// Connection lifecycle. Transitions are monotone toward `Closed`/`Error`
/// except `Connecting` → `Open`. `Init` and `Connecting` cover the window
/// inside [`WsClient::connect`] and are not observable through a handle,
/// which only exists once the connection is `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Connecting,
    Open,
    Closing,
    Closed,
    Error,
}

/// A received data frame. The payload borrows the connection's recv buffer:
/// the borrow is the pin, and dropping the message releases it. The next
/// call on the connection slides the consumed bytes out of the buffer.
#[derive(Debug)]
pub struct Message<'a> {
    pub opcode: Opcode,
    pub payload: &'a [u8],
    pub fin: bool,
}

impl Message<'_> {
    /// Payload as text. `None` for the non-final fragments of a TEXT
    /// message when a code point straddles the fragment boundary (the
    /// engine has still validated the stream as a whole).
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(self.payload).ok()
    }
}

enum Parsed {
    NeedMore,
    /// A control frame was consumed (PING answered, PONG discarded).
    ControlHandled,
    /// CLOSE received and echoed; the connection is down.
    PeerClosed,
    Data {
        start: usize,
        end: usize,
        opcode: Opcode,
        fin: bool,
    },
}

/// A single plaintext WebSocket client connection.
///
/// One owner, no internal threads; every operation is a plain `async fn`
/// bounded by the caller's timeout where the protocol calls for one.
pub struct WsClient {
    stream: StreamWrapper<TcpStream>,
    fd: RawFd,
    state: State,
    cfg: Config,
    parser: FrameParser,

    // Flat recv buffer. `filled` bytes are valid, the first `fed` of them
    // have been handed to the parser, and `pending_consume` marks the
    // prefix owned by the message returned from the previous `recv`.
    recv_buf: Box<[u8]>,
    filled: usize,
    fed: usize,
    pending_consume: usize,

    scratch: Vec<u8>,
    last_error: Option<&'static str>,
}

impl WsClient {
    /// Connect to `ws://host[:port]/path` and run the upgrade handshake.
    /// The whole exchange is bounded by `Config::handshake_timeout_ms`.
    pub async fn connect(uri: &str, cfg: Config) -> Result<Self, WsError> {
        let url = parse_ws_url(uri)?;
        let hs_timeout = Duration::from_millis(u64::from(if cfg.handshake_timeout_ms == 0 {
            5_000
        } else {
            cfg.handshake_timeout_ms
        }));

        let tcp = timeout(hs_timeout, TcpStream::connect((url.host, url.port)))
            .await
            .map_err(|_| WsError::Timeout)??;
        let fd = tcp.as_raw_fd();

        let mut client = Self {
            stream: StreamWrapper::new(tcp),
            fd,
            state: State::Connecting,
            cfg,
            parser: FrameParser::new(0), // replaced once the handshake settles the config
            recv_buf: Box::default(),
            filled: 0,
            fed: 0,
            pending_consume: 0,
            scratch: Vec::new(),
            last_error: None,
        };
        let r = client
            .upgrade(url.host, url.port, url.path_and_query, hs_timeout)
            .await;
        eprintln!("DEBUG: upgrade returned {:?}", r.is_ok());
        r?;
        eprintln!("DEBUG: connect returning Ok");
        Ok(client)
    }

    async fn upgrade(
        &mut self,
        host: &str,
        port: u16,
        path: &str,
        hs_timeout: Duration,
    ) -> Result<(), WsError> {
        let key = handshake::generate_client_key();
        let req = handshake::build_request(host, port, path, &key.sec_websocket_key, &self.cfg);

        let stream = &mut self.stream;
        eprintln!("DEBUG: before write");
        let leftover = timeout(hs_timeout, async move {
            stream.write_all(req.as_bytes()).await?;
            eprintln!("DEBUG: after write");
            stream.flush().await?;
            eprintln!("DEBUG: after flush");
            let r = handshake::read_response(stream, &key.expected_accept).await;
            eprintln!("DEBUG: read_response returned {:?}", r.is_ok());
            r
        })
        .await
        .map_err(|_| WsError::Timeout)??;
        eprintln!("DEBUG: after timeout wrap");

        // The response read may have pulled in the first frame bytes; they
        // seed the recv buffer. Capacity never changes after this point so
        // payload borrows stay put.
        let cap = (self.cfg.max_frame_size + MAX_HEADER_LEN + 2).max(leftover.len());
        let mut buf = vec![0u8; cap].into_boxed_slice();
        buf[..leftover.len()].copy_from_slice(&leftover);
        self.recv_buf = buf;
        self.filled = leftover.len();
        self.parser = FrameParser::new(self.cfg.max_frame_size);
        self.scratch = vec![0u8; self.cfg.max_frame_size + MAX_HEADER_LEN];
        self.state = State::Open;
        Ok(())
    }

    /// Send a TEXT frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), WsError> {
        self.send_frame(Opcode::Text, text.as_bytes()).await
    }

    /// Send a BINARY frame.
    pub async fn send_binary(&mut self, data: &[u8]) -> Result<(), WsError> {
        self.send_frame(Opcode::Binary, data).await
    }

    /// Send a PING. The payload is limited to 125 bytes like any control
    /// frame.
    pub async fn send_ping(&mut self, data: &[u8]) -> Result<(), WsError> {
        if data.len() > MAX_CONTROL_PAYLOAD {
            return Err(self.fail(WsError::InvalidArgs("ping payload over 125 bytes")));
        }
        self.send_frame(Opcode::Ping, data).await
    }

    /// Send a CLOSE frame and move to `Closing`. The reason is truncated on
    /// a character boundary so the whole payload fits a control frame.
    pub async fn send_close(&mut self, code: u16, reason: &str) -> Result<(), WsError> {
        if !close_code_sendable(code) {
            return Err(self.fail(WsError::InvalidArgs("close code not sendable")));
        }
        let reason = truncate_reason(reason);
        let mut payload = [0u8; MAX_CONTROL_PAYLOAD];
        payload[..2].copy_from_slice(&code.to_be_bytes());
        payload[2..2 + reason.len()].copy_from_slice(reason.as_bytes());
        self.send_frame(Opcode::Close, &payload[..2 + reason.len()])
            .await?;
        self.state = State::Closing;
        Ok(())
    }

    /// Receive the next data frame, waiting at most `wait` for the socket.
    ///
    /// Control frames never surface here: PINGs are answered with a PONG
    /// and PONGs discarded (both yield `not ready`, retry), a CLOSE is
    /// echoed and yields `closed`. `not ready` is also returned when a
    /// frame is still incomplete after one read; it is transient, as is
    /// `timeout`.
    pub async fn recv(&mut self, wait: Duration) -> Result<Message<'_>, WsError> {
        if self.state != State::Open {
            return Err(WsError::NotReady);
        }
        self.compact();

        // A frame may already be buffered from an earlier read; surface it
        // before touching the socket again.
        let mut parsed = if self.fed < self.filled {
            self.pump().await?
        } else {
            Parsed::NeedMore
        };

        if matches!(parsed, Parsed::NeedMore) {
            debug_assert!(self.filled < self.recv_buf.len());
            let n = match timeout(wait, self.stream.read(&mut self.recv_buf[self.filled..])).await
            {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    self.state = State::Error;
                    return Err(self.fail(WsError::Network(e)));
                }
                Err(_) => return Err(WsError::Timeout),
            };
            if n == 0 {
                self.state = State::Closed;
                return Err(self.fail(WsError::Closed));
            }
            self.filled += n;
            parsed = self.pump().await?;
        }

        match parsed {
            Parsed::NeedMore | Parsed::ControlHandled => Err(WsError::NotReady),
            Parsed::PeerClosed => Err(self.fail(WsError::Closed)),
            Parsed::Data {
                start,
                end,
                opcode,
                fin,
            } => {
                self.pending_consume = end;
                Ok(Message {
                    opcode,
                    fin,
                    payload: &self.recv_buf[start..end],
                })
            }
        }
    }

    /// Feed buffered bytes to the parser and deal with whatever completes.
    async fn pump(&mut self) -> Result<Parsed, WsError> {
        let feed = match self.parser.feed(&self.recv_buf[self.fed..self.filled]) {
            Ok(feed) => feed,
            Err(e) => {
                self.state = State::Error;
                return Err(self.fail(WsError::from(e)));
            }
        };
        self.fed += feed.consumed;
        let Some(raw) = feed.frame else {
            return Ok(Parsed::NeedMore);
        };
        let (opcode, fin, payload_len) = (raw.opcode, raw.fin, raw.payload_len);

        // The frame's last byte is the last byte fed; with the buffer held
        // stable since the frame started, its whole payload sits just
        // before that point.
        let end = self.fed;
        let start = end - payload_len;

        match opcode {
            Opcode::Ping => {
                let mut echo = [0u8; MAX_CONTROL_PAYLOAD];
                echo[..payload_len].copy_from_slice(&self.recv_buf[start..end]);
                self.discard_through(end);
                self.send_frame(Opcode::Pong, &echo[..payload_len]).await?;
                Ok(Parsed::ControlHandled)
            }
            Opcode::Pong => {
                self.discard_through(end);
                Ok(Parsed::ControlHandled)
            }
            Opcode::Close => {
                let _ = self
                    .send_frame(Opcode::Close, &close_code::NORMAL.to_be_bytes())
                    .await;
                self.discard_through(end);
                self.state = State::Closed;
                Ok(Parsed::PeerClosed)
            }
            _ => Ok(Parsed::Data {
                start,
                end,
                opcode,
                fin,
            }),
        }
    }

    async fn send_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), WsError> {
        let permitted = match self.state {
            State::Open => true,
            State::Closing => opcode == Opcode::Close,
            _ => false,
        };
        if !permitted {
            return Err(WsError::NotReady);
        }

        let mut mask = [0u8; 4];
        rand::rng().fill_bytes(&mut mask);
        let n = match frame::build_frame(&mut self.scratch, true, opcode, Some(mask), payload) {
            Some(n) => n,
            None => return Err(self.fail(WsError::BufferFull)),
        };
        if let Err(e) = self.stream.write_all(&self.scratch[..n]).await {
            self.state = State::Error;
            return Err(self.fail(WsError::Network(e)));
        }
        if let Err(e) = self.stream.flush().await {
            self.state = State::Error;
            return Err(self.fail(WsError::Network(e)));
        }
        Ok(())
    }

    /// Close the connection: best-effort CLOSE frame when still open, then
    /// socket shutdown. Idempotent, never fails.
    pub async fn close(&mut self) {
        if matches!(self.state, State::Open | State::Closing) {
            let _ = self
                .send_frame(Opcode::Close, &close_code::NORMAL.to_be_bytes())
                .await;
        }
        let _ = self.stream.shutdown().await;
        self.state = State::Closed;
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Label of the most recent non-transient error (`"protocol"`,
    /// `"network"`, ...), if any. Transient `not ready`/`timeout` results
    /// are not recorded.
    pub fn last_error(&self) -> Option<&'static str> {
        self.last_error
    }

    /// The underlying socket descriptor, for callers that integrate the
    /// connection into their own readiness loop.
    pub fn fileno(&self) -> RawFd {
        self.fd
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Slide the frame returned by the previous `recv` out of the buffer.
    /// Runs on entry to the next call, once the payload borrow has ended.
    fn compact(&mut self) {
        if self.pending_consume > 0 {
            let n = self.pending_consume;
            self.recv_buf.copy_within(n..self.filled, 0);
            self.filled -= n;
            self.fed -= n;
            self.pending_consume = 0;
        }
    }

    /// Drop a fully handled control frame immediately; nothing borrows it.
    fn discard_through(&mut self, end: usize) {
        self.recv_buf.copy_within(end..self.filled, 0);
        self.filled -= end;
        self.fed -= end;
    }

    fn fail(&mut self, e: WsError) -> WsError {
        if !e.is_transient() {
            self.last_error = Some(e.as_str());
        }
        e
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("fd", &self.fd)
            .field("state", &self.state)
            .field("buffered", &(self.filled - self.fed))
            .finish_non_exhaustive()
    }
}

fn close_code_sendable(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1009 | 1011 | 3000..=4999)
}

/// Cap the close reason so `2 + reason` fits a control frame, backing off
/// to a character boundary rather than splitting a scalar.
fn truncate_reason(reason: &str) -> &str {
    let max = MAX_CONTROL_PAYLOAD - 2;
    if reason.len() <= max {
        return reason;
    }
    let mut cut = max;
    while !reason.is_char_boundary(cut) {
        cut -= 1;
    }
    &reason[..cut]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sendable_close_codes() {
        for code in [1000, 1001, 1002, 1003, 1007, 1008, 1009, 1011, 3000, 4999] {
            assert!(close_code_sendable(code), "code {code}");
        }
        for code in [999, 1004, 1005, 1006, 1010, 1015, 2999, 5000] {
            assert!(!close_code_sendable(code), "code {code}");
        }
    }

    #[test]
    fn reason_truncation_respects_char_boundaries() {
        let short = "going away";
        assert_eq!(truncate_reason(short), short);

        let long = "x".repeat(200);
        assert_eq!(truncate_reason(&long).len(), 123);

        // 61 two-byte scalars = 122 bytes; one more would cross 123 mid-char
        let wide = "é".repeat(80);
        let cut = truncate_reason(&wide);
        assert!(cut.len() <= 123);
        assert_eq!(cut.len() % 2, 0);
        assert!(std::str::from_utf8(cut.as_bytes()).is_ok());
    }

    #[test]
    fn default_config_matches_protocol_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.handshake_timeout_ms, 5_000);
        assert_eq!(cfg.max_frame_size, 1 << 20);
        assert!(cfg.user_agent.is_none());
        assert!(!cfg.enable_compression);
    }
}
