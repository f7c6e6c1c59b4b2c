//! tahta-core
//!
//! Core types shared across the tahta ecosystem.
//!
//! - `types`: feeds, normalized price updates, close reasons, connection
//!   state.
//! - `error`: the unified [`TahtaError`] enum.
//! - `config`: the [`ReconnectConfig`] backoff policy.
//!
//! This crate is runtime-agnostic; the `tahta` crate that builds on it
//! assumes the Tokio ecosystem (its session spawns Tokio tasks and uses
//! Tokio synchronization primitives), so code consuming the streaming
//! client must run under a Tokio 1.x runtime.
#![warn(missing_docs)]

/// Streaming session configuration.
pub mod config;
/// Unified workspace error type.
pub mod error;
pub mod types;

pub use config::ReconnectConfig;
pub use error::TahtaError;
pub use types::{BistTick, CloseReason, ConnectionState, Feed, PriceUpdate, UsTick};
