//! Domain types shared by the streaming engine and its consumers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A logical price channel, partitioning ticks by instrument universe
/// (Borsa Istanbul vs US markets) and live-vs-delayed access level.
///
/// The feed is a partition key: subscriptions, wire frames, and fan-out are
/// all scoped to a single feed. The serde form is the wire identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    /// Real-time BIST prices.
    Live,
    /// Delayed BIST prices.
    Delayed,
    /// Real-time US market prices.
    LiveUs,
    /// Delayed US market prices.
    DelayedUs,
}

impl Feed {
    /// All feeds, in wire-identifier order.
    pub const ALL: [Self; 4] = [Self::Live, Self::Delayed, Self::LiveUs, Self::DelayedUs];

    /// `true` for the US instrument family, which uses the compact
    /// `{s, p, t}` payload shape on the wire.
    #[must_use]
    pub const fn is_us(self) -> bool {
        matches!(self, Self::LiveUs | Self::DelayedUs)
    }

    /// Wire identifier for this feed.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Delayed => "delayed",
            Self::LiveUs => "live_us",
            Self::DelayedUs => "delayed_us",
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One price update for a BIST-family instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BistTick {
    /// Ticker symbol, e.g. `THYAO`.
    pub symbol: String,
    /// Last close price.
    pub close_price: Decimal,
    /// Percent change against the previous close.
    pub percent_change: Decimal,
    /// Exchange timestamp of the update.
    pub ts: DateTime<Utc>,
    /// Instrument-type discriminator assigned by the provider.
    pub tip_id: i64,
    /// Opaque provider-side record id.
    pub id: String,
}

/// One price update for a US-family instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsTick {
    /// Ticker symbol, e.g. `AAPL`.
    pub symbol: String,
    /// Last close price.
    pub close_price: Decimal,
    /// Exchange timestamp of the update.
    pub ts: DateTime<Utc>,
}

/// A normalized tick, tagged by instrument family.
///
/// The variant is selected by the feed a frame arrived on, never by
/// inspecting payload keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PriceUpdate {
    /// BIST-family tick.
    Bist(BistTick),
    /// US-family tick.
    Us(UsTick),
}

impl PriceUpdate {
    /// Ticker symbol of the update.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Bist(t) => &t.symbol,
            Self::Us(t) => &t.symbol,
        }
    }

    /// Last close price of the update.
    #[must_use]
    pub const fn close_price(&self) -> Decimal {
        match self {
            Self::Bist(t) => t.close_price,
            Self::Us(t) => t.close_price,
        }
    }

    /// Exchange timestamp of the update.
    #[must_use]
    pub const fn ts(&self) -> DateTime<Utc> {
        match self {
            Self::Bist(t) => t.ts,
            Self::Us(t) => t.ts,
        }
    }
}

/// Why a session ended up closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The caller closed the session explicitly.
    Normal,
    /// The transport failed and recovery was not possible.
    ConnectionError,
    /// Every reconnect attempt failed.
    MaxReconnectExceeded,
    /// The session closed for a cause it could not classify.
    Unknown,
}

/// Observable lifecycle state of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been opened yet.
    Idle,
    /// The initial handshake is in flight.
    Connecting,
    /// A connection is open and frames are flowing.
    Open,
    /// The connection was lost and recovery attempts are running.
    Reconnecting,
    /// The session is closed and will make no further attempts.
    Closed(CloseReason),
}

impl ConnectionState {
    /// `true` unless an open connection currently exists.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        !matches!(self, Self::Open)
    }
}
