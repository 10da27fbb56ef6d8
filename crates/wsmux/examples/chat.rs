//! Chat example — two sessions over an in-memory transport pair,
//! mixing one-way events and a request/response exchange.
//!
//! Run with:
//!   cargo run --example chat

use serde_json::{json, Value};
use wsmux::session::HandlerReply;
use wsmux::wire::RemoteError;
use wsmux::{PairTransport, Session};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (mut left, mut right) = PairTransport::pair();
    left.open();
    right.open();

    let client = Session::new();
    let server = Session::new();

    // Server side: a chat channel and an auth channel.
    server.of("chat").on("msg", |event| {
        let from = event.arg(0).and_then(Value::as_str).unwrap_or("?");
        let text = event.arg(1).and_then(Value::as_str).unwrap_or("");
        eprintln!("[server] <{from}> {text}");
        Ok(HandlerReply::none())
    })?;
    server.of("auth").on("login", |event| {
        let user = event.arg(0).and_then(Value::as_str).unwrap_or("");
        if user.is_empty() {
            return Err(RemoteError::new("username required"));
        }
        eprintln!("[server] {user} logged in");
        Ok(json!({ "user": user, "motd": "welcome" }).into())
    })?;

    client.bind(Box::new(left))?;
    server.bind(Box::new(right))?;

    // Log in, then chat.
    let login = client.of("auth").request("login", vec![json!("alice")])?;
    client.of("chat").emit("msg", vec![json!("alice"), json!("hello!")])?;

    client.poll()?;
    server.poll()?;
    client.poll()?;

    match login.try_result() {
        Some(Ok(value)) => eprintln!("[client] login ok: {value}"),
        Some(Err(error)) => eprintln!("[client] login failed: {error}"),
        None => eprintln!("[client] login still pending"),
    }
    Ok(())
}
