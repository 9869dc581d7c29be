//! Request/response protocol with the UI service.
//!
//! Both channels speak JSON text frames, strictly half-duplex: each send is
//! followed by exactly one blocking receive. The service answers in
//! submission order on a single socket, so there are no correlation IDs.
//!
//! # Wire format
//!
//! - Query: `["volume"]` → `{"volume": 42}`
//! - Mutation: `{"volume": 42}` → `{"volume": 42}` (echo; absence = not set)
//! - Instruction (action channel): `["cycle_page"]` → object, discarded
//!
//! Functions here are regular functions over a passed-in
//! [`ChannelManager`] (M-REGULAR-FN) rather than methods on the bridge,
//! making them independently testable. Any transport or parse failure
//! releases the affected connection so the next call reconnects.

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::channel::{Channel, ChannelManager};
use crate::constants::ROUNDTRIP_TIMEOUT;
use crate::ws::WsConnection;

/// Query the current value of `key` over the state channel.
///
/// Returns the service's value if present, else JSON `0` — the service
/// treats unset keys as zero-equivalent.
///
/// # Errors
///
/// Propagates "no connection available" from the manager, or a transport/
/// protocol failure (which releases the connection first).
pub async fn query(channels: &mut ChannelManager, key: &str) -> Result<Value> {
    let request = serde_json::to_string(&Value::Array(vec![Value::from(key)]))
        .context("encode state query")?;
    let response = roundtrip(channels, Channel::State, &request).await?;
    Ok(response.get(key).cloned().unwrap_or_else(|| Value::from(0)))
}

/// Set `key` to `value` over the state channel.
///
/// Returns the echoed value, or `None` when the service omitted the key
/// from its response ("not set").
///
/// # Errors
///
/// Same failure/release behavior as [`query`].
pub async fn mutate(channels: &mut ChannelManager, key: &str, value: Value) -> Result<Option<Value>> {
    let mut body = Map::new();
    body.insert(key.to_owned(), value);
    let request = serde_json::to_string(&Value::Object(body)).context("encode state mutation")?;
    let response = roundtrip(channels, Channel::State, &request).await?;
    Ok(response.get(key).cloned())
}

/// Send a single instruction over the action channel.
///
/// The response is read and validated as JSON but not interpreted further.
///
/// # Errors
///
/// Propagates acquire/transport/protocol failures; the action connection
/// is released on failure, independently of the state channel.
pub async fn send_instruction(channels: &mut ChannelManager, instruction: &str) -> Result<()> {
    let request = serde_json::to_string(&Value::Array(vec![Value::from(instruction)]))
        .context("encode instruction")?;
    roundtrip(channels, Channel::Action, &request).await?;
    Ok(())
}

/// One bounded send/receive pair on `channel`, parsed as a JSON object.
///
/// The connection is released on any failure after acquisition so the
/// next call dials fresh.
async fn roundtrip(
    channels: &mut ChannelManager,
    channel: Channel,
    request: &str,
) -> Result<Map<String, Value>> {
    let outcome = {
        let conn = channels.acquire(channel).await?;
        tokio::time::timeout(ROUNDTRIP_TIMEOUT, exchange(conn, request))
            .await
            .unwrap_or_else(|_| {
                Err(anyhow::anyhow!(
                    "{} channel round-trip timed out",
                    channel.name()
                ))
            })
    };

    match outcome {
        Ok(map) => Ok(map),
        Err(e) => {
            channels.release(channel).await;
            Err(e)
        }
    }
}

async fn exchange(conn: &mut WsConnection, request: &str) -> Result<Map<String, Value>> {
    conn.send_text(request).await?;
    let raw = conn.recv_text().await?;
    match serde_json::from_str::<Value>(&raw).context("unparsable service response")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("service response is not an object: {other}"),
    }
}
