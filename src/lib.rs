//! # wsengine-monoio
//!
//! A zero-copy, single-connection WebSocket (RFC 6455) client engine for
//! the [`monoio`] async runtime. Unlike our delegating client wrapper, the
//! whole protocol lives in this crate: handshake codec, incremental frame
//! parser with strict validation, frame builder with client masking, and a
//! connection state machine with readiness-bounded waits.
//!
//! ## Features
//!
//! - **Zero-copy receive**: payloads are borrowed straight out of the
//!   connection's recv buffer; the borrow checker pins them until you let
//!   go, and no bytes move while you hold one.
//! - **Strict RFC 6455 validation**: reserved bits and opcodes,
//!   fragmentation ordering, control-frame limits, close codes, and UTF-8
//!   in text payloads (incremental across fragments) are all enforced.
//! - **Single-threaded cooperative**: one owner per connection, no spawned
//!   threads, every wait bounded by a caller timeout.
//! - **Plaintext only**: `ws://` over TCP. `wss://` is rejected up front;
//!   put a TLS terminator in front if you need it.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use wsengine_monoio::{Config, WsClient, WsError};
//!
//! #[monoio::main(timer_enabled = true)]
//! async fn main() -> Result<(), WsError> {
//!     let mut client = WsClient::connect("ws://127.0.0.1:9001/chat", Config::default()).await?;
//!     client.send_text("hello").await?;
//!     loop {
//!         match client.recv(Duration::from_secs(5)).await {
//!             Ok(msg) => {
//!                 println!("{} bytes, fin={}", msg.payload.len(), msg.fin);
//!                 break;
//!             }
//!             Err(WsError::NotReady) => continue,
//!             Err(e) => return Err(e),
//!         }
//!     }
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! [`monoio`]: https://docs.rs/monoio

pub mod client;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod ring;
pub mod url;
pub mod utf8;

pub use client::{close_code, Config, Message, State, WsClient};
pub use error::WsError;
pub use frame::Opcode;
pub use ring::RingBuffer;
