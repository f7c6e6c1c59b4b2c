//! The streaming session state machine.
//!
//! One session owns at most one physical connection at a time and drives
//! the full lifecycle: shared in-flight connect, frame dispatch, reconnect
//! with capped exponential backoff after an unexpected close, aggregate
//! resubscription on recovery, and idempotent close with guaranteed
//! cleanup.
//!
//! Locking discipline: `state`, `registry`, and `url` are plain mutexes
//! and are never held across an `await`. The connect-in-flight state is an
//! explicit enum variant carrying its waiters, so late callers join the
//! pending handshake instead of racing it.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use tahta_core::{CloseReason, ConnectionState, Feed, ReconnectConfig, TahtaError};

use super::backoff::reconnect_delay;
use super::codec::{self, CommandKind, Inbound};
use super::registry::{Handle, SubscriptionRegistry, TickHandler};
use super::transport::{Connection, FrameSink, StreamTransport};

type ConnectWaiter = oneshot::Sender<Result<(), TahtaError>>;

enum WriterCmd {
    Frame {
        text: String,
        ack: oneshot::Sender<Result<(), TahtaError>>,
    },
    Shutdown {
        ack: oneshot::Sender<Result<(), TahtaError>>,
    },
}

enum ConnState {
    Idle,
    Connecting {
        waiters: Vec<ConnectWaiter>,
    },
    Open {
        generation: u64,
        writer: mpsc::UnboundedSender<WriterCmd>,
        reader: JoinHandle<()>,
    },
    Reconnecting {
        generation: u64,
        waiters: Vec<ConnectWaiter>,
    },
    Closed {
        reason: CloseReason,
    },
}

/// A multiplexed streaming session over one connection.
///
/// Must run under a Tokio 1.x runtime: the session spawns reader/writer
/// tasks and schedules reconnect timers as background work (they never
/// keep the process alive on their own).
pub struct StreamSession {
    transport: Arc<dyn StreamTransport>,
    reconnect: ReconnectConfig,
    registry: Mutex<SubscriptionRegistry>,
    state: Mutex<ConnState>,
    /// Stop broadcast: flipped to `true` by `close()`, back to `false` by
    /// a fresh `connect()`. Reader loops and reconnect sleeps select on it.
    stop: watch::Sender<bool>,
    url: Mutex<Option<String>>,
    generation: AtomicU64,
}

impl StreamSession {
    /// Create a session using `transport` for every (re)connect.
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>, reconnect: ReconnectConfig) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            transport,
            reconnect,
            registry: Mutex::new(SubscriptionRegistry::new()),
            state: Mutex::new(ConnState::Idle),
            stop,
            url: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Open a connection to `url`, suspending until the handshake settles.
    ///
    /// Concurrent callers while a handshake is in flight (initial or
    /// reconnect) join it and settle with the same outcome; a second
    /// handshake is never started. Calling on an open session is a no-op.
    ///
    /// # Errors
    /// `TahtaError::Connection` when the handshake fails. A failed first
    /// connect is not retried by the session; retrying is the caller's
    /// choice. No handshake timeout is enforced beyond the transport's
    /// own.
    pub async fn connect(self: &Arc<Self>, url: &str) -> Result<(), TahtaError> {
        let pending = {
            let mut state = self.lock_state();
            match &mut *state {
                ConnState::Open { .. } => return Ok(()),
                ConnState::Connecting { waiters } | ConnState::Reconnecting { waiters, .. } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                ConnState::Idle | ConnState::Closed { .. } => {
                    *state = ConnState::Connecting {
                        waiters: Vec::new(),
                    };
                    None
                }
            }
        };

        if let Some(rx) = pending {
            return rx
                .await
                .unwrap_or_else(|_| Err(TahtaError::connection("connect aborted")));
        }

        self.stop.send_replace(false);
        *self.lock_url() = Some(url.to_string());

        match self.transport.connect(url).await {
            Ok(conn) => {
                let waiters = self.install(conn)?;
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
                Ok(())
            }
            Err(err) => {
                let message = connection_message(&err);
                let waiters = {
                    let mut state = self.lock_state();
                    match std::mem::replace(&mut *state, ConnState::Idle) {
                        ConnState::Connecting { waiters } => waiters,
                        // close() won the race; keep its state
                        other => {
                            *state = other;
                            Vec::new()
                        }
                    }
                };
                for waiter in waiters {
                    let _ = waiter.send(Err(TahtaError::connection(message.clone())));
                }
                Err(TahtaError::connection(message))
            }
        }
    }

    /// Send a wire subscribe for `symbols` on `feed`.
    ///
    /// No-op for an empty list. Awaits an in-flight connect before
    /// sending.
    ///
    /// # Errors
    /// `NotInitialized` if no connection was ever opened, `NotConnected`
    /// if the connection exists but is not open, `Connection` if the send
    /// itself fails.
    pub async fn add_symbols(&self, feed: Feed, symbols: &[String]) -> Result<(), TahtaError> {
        if symbols.is_empty() {
            return Ok(());
        }
        self.await_ready().await?;
        self.send_command(CommandKind::Subscribe, feed, symbols)
            .await
    }

    /// Send a wire unsubscribe for `symbols` on `feed`.
    ///
    /// Same contract as [`StreamSession::add_symbols`].
    ///
    /// # Errors
    /// See [`StreamSession::add_symbols`].
    pub async fn remove_symbols(&self, feed: Feed, symbols: &[String]) -> Result<(), TahtaError> {
        if symbols.is_empty() {
            return Ok(());
        }
        self.await_ready().await?;
        self.send_command(CommandKind::Unsubscribe, feed, symbols)
            .await
    }

    /// Close the session: cancel any pending reconnect, perform the close
    /// handshake if a connection is open, and drop every subscription.
    ///
    /// Idempotent; a session already closed keeps its original close
    /// reason. State is fully reset even when the close handshake fails.
    ///
    /// # Errors
    /// `TahtaError::Close` if the close handshake reported a failure.
    pub async fn close(&self) -> Result<(), TahtaError> {
        let prev = {
            let mut state = self.lock_state();
            if matches!(&*state, ConnState::Closed { .. }) {
                return Ok(());
            }
            // The reason is recorded before the socket is touched so the
            // reader's close path cannot mistake this for an unexpected
            // drop and start reconnecting.
            std::mem::replace(
                &mut *state,
                ConnState::Closed {
                    reason: CloseReason::Normal,
                },
            )
        };
        self.stop.send_replace(true);
        self.lock_url().take();

        let mut result = Ok(());
        match prev {
            ConnState::Open { writer, reader, .. } => {
                let (ack_tx, ack_rx) = oneshot::channel();
                if writer.send(WriterCmd::Shutdown { ack: ack_tx }).is_ok() {
                    match ack_rx.await {
                        Ok(Err(err)) => result = Err(TahtaError::close(err.to_string())),
                        Ok(Ok(())) | Err(_) => {}
                    }
                }
                let _ = reader.await;
            }
            ConnState::Connecting { waiters } | ConnState::Reconnecting { waiters, .. } => {
                for waiter in waiters {
                    let _ = waiter.send(Err(TahtaError::connection("session closed")));
                }
            }
            ConnState::Idle | ConnState::Closed { .. } => {}
        }

        // Cleanup happens regardless of how the handshake went.
        self.lock_registry().clear();
        result
    }

    /// Register a subscription. Returns its handle and the symbols that
    /// need a wire subscribe (coverage went zero → nonzero).
    pub fn register(
        &self,
        symbols: Vec<String>,
        feed: Feed,
        handler: TickHandler,
    ) -> (Handle, Vec<String>) {
        self.lock_registry().add(symbols, feed, handler)
    }

    /// Remove a subscription. Returns its feed and the symbols that need a
    /// wire unsubscribe (coverage dropped to zero). `None` for an unknown
    /// handle.
    pub fn unregister(&self, handle: Handle) -> Option<(Feed, Vec<String>)> {
        self.lock_registry().remove(handle)
    }

    /// Snapshot of the per-feed symbol union currently registered.
    #[must_use]
    pub fn aggregate_by_feed(&self) -> HashMap<Feed, BTreeSet<String>> {
        self.lock_registry().aggregate_by_feed()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock_registry().len()
    }

    /// Observable lifecycle state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        match &*self.lock_state() {
            ConnState::Idle => ConnectionState::Idle,
            ConnState::Connecting { .. } => ConnectionState::Connecting,
            ConnState::Open { .. } => ConnectionState::Open,
            ConnState::Reconnecting { .. } => ConnectionState::Reconnecting,
            ConnState::Closed { reason } => ConnectionState::Closed(*reason),
        }
    }

    /// `true` unless a connection is currently open.
    #[must_use]
    pub fn is_connection_closed(&self) -> bool {
        self.connection_state().is_closed()
    }

    /// Why the session closed, if it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        match &*self.lock_state() {
            ConnState::Closed { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Install a fresh connection: spawn its writer and reader tasks and
    /// transition to `Open`, returning the drained connect waiters.
    fn install(self: &Arc<Self>, conn: Connection) -> Result<Vec<ConnectWaiter>, TahtaError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Connection { sink, frames } = conn;

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(sink, writer_rx));

        // The reader is gated until the state transition below is visible;
        // an instantly-dying stream must not race it and be mistaken for a
        // stale generation.
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let session = Arc::clone(self);
        let reader = tokio::spawn(async move {
            if ready_rx.await.is_ok() {
                session.run_reader(frames, generation).await;
            }
        });

        let mut state = self.lock_state();
        if !matches!(
            &*state,
            ConnState::Connecting { .. } | ConnState::Reconnecting { .. }
        ) {
            // close() settled while the handshake was in flight; tear the
            // fresh connection down again.
            drop(state);
            drop(ready_tx);
            let (ack, _ack_rx) = oneshot::channel();
            let _ = writer_tx.send(WriterCmd::Shutdown { ack });
            return Err(TahtaError::connection("session closed during connect"));
        }
        let prev = std::mem::replace(
            &mut *state,
            ConnState::Open {
                generation,
                writer: writer_tx,
                reader,
            },
        );
        drop(state);
        let _ = ready_tx.send(());

        Ok(match prev {
            ConnState::Connecting { waiters } | ConnState::Reconnecting { waiters, .. } => waiters,
            _ => Vec::new(),
        })
    }

    async fn run_reader(
        self: Arc<Self>,
        mut frames: BoxStream<'static, Result<String, TahtaError>>,
        generation: u64,
    ) {
        let stop = stopped(self.stop.subscribe());
        tokio::pin!(stop);
        loop {
            tokio::select! {
                biased;
                () = &mut stop => return,
                frame = frames.next() => match frame {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(_err)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(error = %_err, "stream transport error");
                        break;
                    }
                    None => break,
                },
            }
        }
        self.on_connection_lost(generation).await;
    }

    /// Decode one inbound frame and fan it out. Decode failures are logged
    /// and dropped; nothing here may take the session down.
    fn dispatch(&self, text: &str) {
        match codec::decode_frame(text) {
            Ok(Inbound::Tick { feed, update }) => {
                let handlers = self.lock_registry().handlers_for(update.symbol(), feed);
                for handler in handlers {
                    handler(update.clone());
                }
            }
            Ok(Inbound::Heartbeat) => {
                #[cfg(feature = "tracing")]
                tracing::trace!("heartbeat");
            }
            Ok(Inbound::ProviderError(_message)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(message = %_message, "provider error frame");
            }
            Ok(Inbound::ProviderWarning(_message)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(message = %_message, "provider warning frame");
            }
            Ok(Inbound::Unknown(_kind)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(kind = %_kind, "ignoring unknown frame type");
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_err, "dropping undecodable frame");
            }
        }
    }

    async fn on_connection_lost(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.lock_state();
            let ours = matches!(
                &*state,
                ConnState::Open { generation: g, .. } if *g == generation
            );
            if !ours {
                // Explicitly closed, or a newer connection took over.
                return;
            }
            *state = ConnState::Reconnecting {
                generation,
                waiters: Vec::new(),
            };
        }
        #[cfg(feature = "tracing")]
        tracing::warn!("connection lost unexpectedly; reconnecting");
        self.run_reconnect(generation).await;
    }

    async fn run_reconnect(self: &Arc<Self>, generation: u64) {
        let Some(url) = self.lock_url().clone() else {
            self.finish_reconnect(generation, CloseReason::Unknown, 0);
            return;
        };

        let max_attempts = self.reconnect.max_attempts;
        let stop_rx = self.stop.subscribe();

        for attempt in 1..=max_attempts {
            let delay = reconnect_delay(&self.reconnect, attempt);
            #[cfg(feature = "tracing")]
            tracing::debug!(attempt, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "scheduling reconnect attempt");

            let stop = stopped(stop_rx.clone());
            tokio::pin!(stop);
            tokio::select! {
                biased;
                // close() already settled the state; just stand down.
                () = &mut stop => return,
                () = tokio::time::sleep(delay) => {}
            }
            if !self.is_reconnecting(generation) {
                return;
            }

            match self.transport.connect(&url).await {
                Ok(conn) => {
                    let Ok(waiters) = self.install(conn) else {
                        // Closed while handshaking; connection torn down.
                        return;
                    };
                    for waiter in waiters {
                        let _ = waiter.send(Ok(()));
                    }
                    #[cfg(feature = "tracing")]
                    tracing::info!(attempt, "reconnected");
                    // Replay the registry as it is *now*, not as it was at
                    // disconnect time.
                    self.replay_subscriptions().await;
                    return;
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %_err, "reconnect attempt failed");
                }
            }
        }

        self.finish_reconnect(generation, CloseReason::MaxReconnectExceeded, max_attempts);
    }

    fn finish_reconnect(&self, generation: u64, reason: CloseReason, attempts: u32) {
        let waiters = {
            let mut state = self.lock_state();
            let prev = std::mem::replace(&mut *state, ConnState::Closed { reason });
            match prev {
                ConnState::Reconnecting {
                    generation: g,
                    waiters,
                } if g == generation => waiters,
                other => {
                    *state = other;
                    return;
                }
            }
        };
        #[cfg(feature = "tracing")]
        tracing::error!(?reason, "reconnect abandoned; session closed");
        for waiter in waiters {
            let _ = waiter.send(Err(match reason {
                CloseReason::MaxReconnectExceeded => TahtaError::MaxReconnectExceeded { attempts },
                _ => TahtaError::connection("reconnect abandoned"),
            }));
        }
    }

    async fn replay_subscriptions(&self) {
        let aggregate = self.lock_registry().aggregate_by_feed();
        for (feed, symbols) in aggregate {
            let symbols: Vec<String> = symbols.into_iter().collect();
            if let Err(_err) = self
                .send_command(CommandKind::Subscribe, feed, &symbols)
                .await
            {
                #[cfg(feature = "tracing")]
                tracing::warn!(%feed, error = %_err, "failed to replay subscriptions");
            }
        }
    }

    /// Suspend until the session is open: joins an in-flight connect,
    /// fails fast otherwise.
    async fn await_ready(&self) -> Result<(), TahtaError> {
        let pending = {
            let mut state = self.lock_state();
            match &mut *state {
                ConnState::Open { .. } => None,
                ConnState::Connecting { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                ConnState::Idle => return Err(TahtaError::NotInitialized),
                ConnState::Reconnecting { .. } | ConnState::Closed { .. } => {
                    return Err(TahtaError::NotConnected);
                }
            }
        };
        if let Some(rx) = pending {
            rx.await
                .unwrap_or_else(|_| Err(TahtaError::connection("connect aborted")))?;
        }
        Ok(())
    }

    async fn send_command(
        &self,
        kind: CommandKind,
        feed: Feed,
        symbols: &[String],
    ) -> Result<(), TahtaError> {
        let frame = codec::encode_command(kind, feed, symbols)?;
        let writer = {
            let state = self.lock_state();
            match &*state {
                ConnState::Open { writer, .. } => writer.clone(),
                ConnState::Idle => return Err(TahtaError::NotInitialized),
                _ => return Err(TahtaError::NotConnected),
            }
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        writer
            .send(WriterCmd::Frame {
                text: frame,
                ack: ack_tx,
            })
            .map_err(|_| TahtaError::NotConnected)?;
        ack_rx.await.map_err(|_| TahtaError::NotConnected)?
    }

    fn is_reconnecting(&self, generation: u64) -> bool {
        matches!(
            &*self.lock_state(),
            ConnState::Reconnecting { generation: g, .. } if *g == generation
        )
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_url(&self) -> MutexGuard<'_, Option<String>> {
        self.url.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn run_writer(mut sink: Box<dyn FrameSink>, mut rx: mpsc::UnboundedReceiver<WriterCmd>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriterCmd::Frame { text, ack } => {
                let _ = ack.send(sink.send(text).await);
            }
            WriterCmd::Shutdown { ack } => {
                let _ = ack.send(sink.close().await);
                return;
            }
        }
    }
    // All senders dropped without an explicit shutdown (the connection was
    // superseded): best-effort close.
    let _ = sink.close().await;
}

/// Resolves once the stop flag is raised (or its sender is gone).
async fn stopped(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn connection_message(err: &TahtaError) -> String {
    match err {
        TahtaError::Connection { message } => message.clone(),
        other => other.to_string(),
    }
}
