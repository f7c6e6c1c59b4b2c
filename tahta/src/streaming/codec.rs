//! Wire codec for the streaming feed.
//!
//! Inbound frames are JSON objects discriminated by a `type` field
//! (`data`, `heartbeat`, `error`, `warning`). Data frames carry a
//! feed-specific payload: BIST-family feeds use the provider's short field
//! names (`_id`, `symbol`, `cl`, `_i`, `d`, `c`), US-family feeds use
//! (`s`, `p`, `t`). The payload shape is selected by the frame's declared
//! feed, never by sniffing payload keys.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tahta_core::{BistTick, Feed, PriceUpdate, TahtaError, UsTick};

/// One decoded inbound frame: either a normalized tick or a control
/// signal.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A price update on `feed`.
    Tick {
        /// Feed the update arrived on.
        feed: Feed,
        /// The normalized tick.
        update: PriceUpdate,
    },
    /// Server liveness signal; no payload.
    Heartbeat,
    /// Provider-reported error text.
    ProviderError(String),
    /// Provider-reported warning text.
    ProviderWarning(String),
    /// A frame with a `type` discriminator this client does not know.
    Unknown(String),
}

/// Outbound frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Start receiving ticks for the listed symbols.
    Subscribe,
    /// Stop receiving ticks for the listed symbols.
    Unsubscribe,
}

#[derive(Serialize)]
struct CommandFrame<'a> {
    #[serde(rename = "type")]
    kind: CommandKind,
    symbols: &'a [String],
    feed: Feed,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    feed: Option<Feed>,
    message: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BistWire {
    #[serde(rename = "_id")]
    id: String,
    symbol: String,
    cl: Decimal,
    #[serde(rename = "_i")]
    tip_id: i64,
    d: i64,
    c: Decimal,
}

#[derive(Deserialize)]
struct UsWire {
    s: String,
    p: Decimal,
    t: i64,
}

/// Encode a subscribe/unsubscribe frame.
///
/// # Errors
/// Returns `TahtaError::Other` if serialization fails (not expected for
/// these types).
pub fn encode_command(
    kind: CommandKind,
    feed: Feed,
    symbols: &[String],
) -> Result<String, TahtaError> {
    serde_json::to_string(&CommandFrame {
        kind,
        symbols,
        feed,
    })
    .map_err(|e| TahtaError::Other(e.to_string()))
}

/// Decode one inbound text frame.
///
/// # Errors
/// Returns `TahtaError::Parse` for invalid JSON, a missing discriminator,
/// a data frame without feed or payload, or a payload that does not match
/// its feed family. Callers log and drop such frames; decode failures must
/// never terminate the session.
pub fn decode_frame(text: &str) -> Result<Inbound, TahtaError> {
    let raw: RawFrame =
        serde_json::from_str(text).map_err(|e| TahtaError::parse(e.to_string()))?;

    match raw.kind.as_str() {
        "data" => {
            let feed = raw
                .feed
                .ok_or_else(|| TahtaError::parse("data frame without feed"))?;
            let message = match raw.message {
                Some(m) if !m.is_null() => m,
                _ => return Err(TahtaError::parse("data frame without message payload")),
            };
            let update = decode_payload(feed, message)?;
            Ok(Inbound::Tick { feed, update })
        }
        "heartbeat" => Ok(Inbound::Heartbeat),
        "error" => Ok(Inbound::ProviderError(message_text(raw.message))),
        "warning" => Ok(Inbound::ProviderWarning(message_text(raw.message))),
        other => Ok(Inbound::Unknown(other.to_string())),
    }
}

fn decode_payload(feed: Feed, message: serde_json::Value) -> Result<PriceUpdate, TahtaError> {
    if feed.is_us() {
        let wire: UsWire =
            serde_json::from_value(message).map_err(|e| TahtaError::parse(e.to_string()))?;
        Ok(PriceUpdate::Us(UsTick {
            symbol: wire.s,
            close_price: wire.p,
            ts: millis_to_ts(wire.t)?,
        }))
    } else {
        let wire: BistWire =
            serde_json::from_value(message).map_err(|e| TahtaError::parse(e.to_string()))?;
        Ok(PriceUpdate::Bist(BistTick {
            symbol: wire.symbol,
            close_price: wire.cl,
            percent_change: wire.c,
            ts: millis_to_ts(wire.d)?,
            tip_id: wire.tip_id,
            id: wire.id,
        }))
    }
}

fn millis_to_ts(millis: i64) -> Result<DateTime<Utc>, TahtaError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| TahtaError::parse(format!("timestamp out of range: {millis}")))
}

fn message_text(message: Option<serde_json::Value>) -> String {
    match message {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
