//! Streaming engine: codec, registry, session state machine, transport.

pub mod backoff;
pub mod codec;
pub mod registry;
pub mod session;
pub mod transport;

pub use registry::{Handle, SubscriptionRegistry, TickHandler};
pub use session::StreamSession;
pub use transport::{Connection, FrameSink, StreamTransport, WsTransport};
