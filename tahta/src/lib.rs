//! Tahta streams live prices from a single multiplexed feed connection.
//!
//! Overview
//! - One WebSocket-style connection carries four logical feeds
//!   (live/delayed BIST and live/delayed US); any number of subscriptions
//!   share it.
//! - Subscriptions are reference counted per `(symbol, feed)`: a wire
//!   subscribe goes out only when coverage rises from zero, a wire
//!   unsubscribe only when it falls back to zero.
//! - Unexpected closes of an open connection trigger capped exponential
//!   backoff and, on success, replay of the registry's *current* aggregate
//!   subscription set (changes made while disconnected are honored).
//! - First-connect handshake failures are surfaced to the caller and never
//!   retried by the session; retry policy for initial setup is the
//!   caller's.
//!
//! Key behaviors and trade-offs
//! - `subscribe` is synchronous; the wire send happens in the background
//!   and failures are logged rather than surfaced, so a subscription is
//!   live in the registry even while the link is down.
//! - Reconnect timers are background tasks; they never keep the process
//!   alive on their own, and `close()` cancels them before returning.
//! - Frame decode problems are logged and dropped; a malformed frame can
//!   never take the session down.
//!
//! Example
//! ```rust,ignore
//! use tahta::{Feed, Tahta};
//!
//! let client = Tahta::new();
//! client.connect(&url).await?;
//!
//! let sub = client.subscribe(["THYAO", "GARAN"], Feed::Live, |update| {
//!     println!("{} -> {}", update.symbol(), update.close_price());
//! });
//!
//! // ... later
//! sub.unsubscribe();
//! client.close().await?;
//! ```
//!
//! This crate assumes the Tokio ecosystem: sessions spawn Tokio tasks and
//! use Tokio synchronization primitives, so everything here must run under
//! a Tokio 1.x runtime.
#![warn(missing_docs)]

mod client;
/// Streaming engine internals (codec, registry, session, transport).
pub mod streaming;

pub use client::{Subscription, Tahta, TahtaBuilder};
pub use streaming::{StreamTransport, WsTransport};

// Re-export core types for convenience
pub use tahta_core::{
    BistTick, CloseReason, ConnectionState, Feed, PriceUpdate, ReconnectConfig, TahtaError, UsTick,
};
