//! A simple echo client example demonstrating basic usage of the engine.
//!
//! Point it at any plaintext WebSocket echo server, e.g. one started
//! locally, send a message, and print the echoed response.

use std::time::Duration;

use anyhow::Result;
use wsengine_monoio::{Config, Opcode, WsClient, WsError};

#[monoio::main(timer_enabled = true)]
async fn main() -> Result<()> {
    let uri = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://127.0.0.1:9001/".to_string());

    println!("Connecting to {uri} ...");
    let mut client = WsClient::connect(&uri, Config::default()).await?;
    println!("Connected (fd {})", client.fileno());

    let message = "Hello from wsengine-monoio!";
    client.send_text(message).await?;
    println!("Message sent: {message}");

    loop {
        match client.recv(Duration::from_secs(5)).await {
            Ok(msg) => {
                match msg.opcode {
                    Opcode::Text => {
                        println!("Echo received: {}", msg.as_text().unwrap_or("<split utf-8>"));
                    }
                    Opcode::Binary => {
                        println!("Received binary frame ({} bytes)", msg.payload.len());
                    }
                    other => println!("Received frame type: {other:?}"),
                }
                if msg.fin {
                    break;
                }
            }
            Err(WsError::NotReady) => continue,
            Err(WsError::Closed) => {
                println!("Server closed the connection");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    client.close().await;
    println!("Done.");
    Ok(())
}
