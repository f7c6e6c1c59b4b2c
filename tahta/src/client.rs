use std::sync::Arc;

use tahta_core::{CloseReason, ConnectionState, Feed, PriceUpdate, ReconnectConfig, TahtaError};

use crate::streaming::registry::Handle;
use crate::streaming::{StreamSession, StreamTransport, WsTransport};

/// Live price streaming client.
///
/// One `Tahta` owns one streaming session: a single connection multiplexed
/// across any number of subscriptions. Cheap to clone-by-Arc internally;
/// share it by reference or wrap it in your own `Arc`.
pub struct Tahta {
    session: Arc<StreamSession>,
}

/// Builder for constructing a [`Tahta`] client with custom configuration.
pub struct TahtaBuilder {
    transport: Option<Arc<dyn StreamTransport>>,
    reconnect: ReconnectConfig,
}

impl Default for TahtaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TahtaBuilder {
    /// Create a builder with the default WebSocket transport and default
    /// reconnect policy (5 attempts, 5s base delay, 30s cap).
    #[must_use]
    pub fn new() -> Self {
        Self {
            transport: None,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Replace the connection factory. Used to inject a mock transport in
    /// tests or to wrap the default one.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the reconnect policy applied after unexpected closes.
    #[must_use]
    pub const fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> Tahta {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WsTransport::new()));
        Tahta {
            session: Arc::new(StreamSession::new(transport, self.reconnect)),
        }
    }
}

impl Default for Tahta {
    fn default() -> Self {
        Self::new()
    }
}

impl Tahta {
    /// Client with default transport and reconnect policy.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a customized client.
    #[must_use]
    pub fn builder() -> TahtaBuilder {
        TahtaBuilder::new()
    }

    /// Open the streaming connection.
    ///
    /// `url` is the one-time endpoint issued by the provider's session
    /// API; obtaining it is the caller's responsibility. Concurrent calls
    /// join the same in-flight handshake.
    ///
    /// # Errors
    /// `TahtaError::Connection` when the handshake fails; first-connect
    /// failures are not retried automatically.
    pub async fn connect(&self, url: &str) -> Result<(), TahtaError> {
        self.session.connect(url).await
    }

    /// Subscribe `handler` to ticks for `symbols` on `feed`.
    ///
    /// Returns immediately with a [`Subscription`] guard; the wire
    /// subscribe (only for symbols not already covered by another
    /// subscription on the same feed) is sent in the background and its
    /// failure is logged, not surfaced here. An empty symbol list yields a
    /// guard that controls nothing and never touches the wire.
    ///
    /// Must be called within a Tokio runtime.
    pub fn subscribe<I, S, F>(&self, symbols: I, feed: Feed, handler: F) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(PriceUpdate) + Send + Sync + 'static,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        let (handle, newly_covered) = self.session.register(symbols, feed, Arc::new(handler));

        if !newly_covered.is_empty() {
            let session = Arc::clone(&self.session);
            tokio::spawn(async move {
                if let Err(_err) = session.add_symbols(feed, &newly_covered).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%feed, error = %_err, "subscribe send failed");
                }
            });
        }

        Subscription {
            session: Arc::clone(&self.session),
            handle,
        }
    }

    /// Close the session, cancelling any pending reconnect and dropping
    /// every subscription. Idempotent.
    ///
    /// # Errors
    /// `TahtaError::Close` if the close handshake failed; the session is
    /// fully reset either way.
    pub async fn close(&self) -> Result<(), TahtaError> {
        self.session.close().await
    }

    /// `true` unless a connection is currently open.
    #[must_use]
    pub fn is_connection_closed(&self) -> bool {
        self.session.is_connection_closed()
    }

    /// Why the session closed, or `None` while it has not.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.session.close_reason()
    }

    /// Full lifecycle state, for diagnostics.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }
}

/// Guard for one subscription. Call [`Subscription::unsubscribe`] to end
/// it; dropping the guard without unsubscribing leaves the subscription
/// active for the life of the session.
#[must_use = "call unsubscribe() to end the subscription; dropping the guard keeps it active"]
pub struct Subscription {
    session: Arc<StreamSession>,
    handle: Handle,
}

impl Subscription {
    /// Remove the subscription. Symbols this entry alone covered are
    /// unsubscribed on the wire in the background; the send failure, if
    /// any, is logged. Safe to call after `close()` (no-op).
    pub fn unsubscribe(self) {
        if let Some((feed, released)) = self.session.unregister(self.handle)
            && !released.is_empty()
        {
            let session = Arc::clone(&self.session);
            tokio::spawn(async move {
                if let Err(_err) = session.remove_symbols(feed, &released).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%feed, error = %_err, "unsubscribe send failed");
                }
            });
        }
    }
}
