#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use tahta::streaming::{Connection, FrameSink, StreamTransport};
use tahta_core::TahtaError;

/// Server-side handle to one accepted mock connection.
pub struct MockLink {
    sent: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<Result<String, TahtaError>>>,
}

impl MockLink {
    /// Push one inbound text frame to the client.
    pub fn push_text(&self, text: &str) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(text.to_string()));
        }
    }

    /// Surface a transport error on the client's read half.
    pub fn push_error(&self, message: &str) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(TahtaError::connection(message)));
        }
    }

    /// Simulate the server dropping the connection: the client's inbound
    /// stream ends.
    pub fn drop_connection(&mut self) {
        self.inbound.take();
    }

    /// Next frame the client wrote, or `None` once the client side is
    /// gone.
    pub async fn recv_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Non-blocking variant of [`MockLink::recv_sent`].
    pub fn try_recv_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Next client frame, spinning the scheduler without sleeping (safe
    /// under a paused clock). Panics if nothing shows up.
    pub async fn expect_sent(&mut self) -> String {
        for _ in 0..100 {
            if let Some(frame) = self.try_recv_sent() {
                return frame;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected the client to send a frame");
    }

    /// Assert the client wrote nothing (after letting pending tasks run).
    pub async fn expect_quiet(&mut self) {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert!(self.try_recv_sent().is_none(), "unexpected frame sent");
    }
}

struct MockSink {
    sent: mpsc::UnboundedSender<String>,
    closed: bool,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: String) -> Result<(), TahtaError> {
        if self.closed {
            return Err(TahtaError::connection("sink closed"));
        }
        self.sent
            .send(frame)
            .map_err(|_| TahtaError::connection("peer gone"))
    }

    async fn close(&mut self) -> Result<(), TahtaError> {
        self.closed = true;
        Ok(())
    }
}

/// Scriptable in-memory transport. Each successful `connect` emits a
/// [`MockLink`] on the receiver returned by [`MockTransport::new`].
pub struct MockTransport {
    connects: AtomicUsize,
    outcomes: Mutex<VecDeque<Result<(), String>>>,
    links: mpsc::UnboundedSender<MockLink>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockLink>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                outcomes: Mutex::new(VecDeque::new()),
                links: tx,
            }),
            rx,
        )
    }

    /// Queue `n` scripted handshake failures ahead of the default
    /// always-succeed behavior.
    pub fn fail_next(&self, n: usize) {
        let mut outcomes = self.outcomes.lock().unwrap();
        for _ in 0..n {
            outcomes.push_back(Err("scripted connect failure".to_string()));
        }
    }

    /// Queue one scripted successful handshake (only needed after
    /// `fail_next`, to interleave outcomes explicitly).
    pub fn succeed_next(&self) {
        self.outcomes.lock().unwrap().push_back(Ok(()));
    }

    /// Total `connect` calls observed, including failed ones.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn connect(&self, _url: &str) -> Result<Connection, TahtaError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()));
        if let Err(message) = outcome {
            return Err(TahtaError::connection(message));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let _ = self.links.send(MockLink {
            sent: sent_rx,
            inbound: Some(inbound_tx),
        });
        Ok(Connection {
            sink: Box::new(MockSink {
                sent: sent_tx,
                closed: false,
            }),
            frames: UnboundedReceiverStream::new(inbound_rx).boxed(),
        })
    }
}

/// A BIST-family data frame as the provider sends it.
pub fn bist_frame(feed: &str, symbol: &str, close: &str) -> String {
    format!(
        r#"{{"type":"data","feed":"{feed}","message":{{"_id":"65f1","symbol":"{symbol}","cl":{close},"_i":11,"d":1700000000000,"c":1.25}}}}"#
    )
}

/// A US-family data frame as the provider sends it.
pub fn us_frame(feed: &str, symbol: &str, price: &str) -> String {
    format!(r#"{{"type":"data","feed":"{feed}","message":{{"s":"{symbol}","p":{price},"t":1700000000000}}}}"#)
}

/// Decode an outbound command frame into (type, feed, sorted symbols).
pub fn parse_command(frame: &str) -> (String, String, Vec<String>) {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    let kind = value["type"].as_str().unwrap().to_string();
    let feed = value["feed"].as_str().unwrap().to_string();
    let mut symbols: Vec<String> = value["symbols"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap().to_string())
        .collect();
    symbols.sort();
    (kind, feed, symbols)
}

/// Spin the scheduler until `cond` holds (bounded; never sleeps, so the
/// paused clock does not auto-advance underneath the caller).
pub async fn yield_until(cond: impl Fn() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
}

/// Let every ready task run to quiescence without touching the clock.
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}
