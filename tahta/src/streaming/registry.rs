//! In-memory subscription table with reference-counted symbol coverage.
//!
//! Each `subscribe` call becomes one entry keyed by a strictly increasing
//! handle. A symbol is covered on a feed while at least one entry
//! references it; `add`/`remove` report the symbols whose coverage crossed
//! zero so the session knows exactly which wire subscribe/unsubscribe
//! frames to send.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tahta_core::{Feed, PriceUpdate};

/// Opaque subscription identifier, unique within one registry.
pub type Handle = u64;

/// Callback invoked with every tick matching a subscription.
pub type TickHandler = Arc<dyn Fn(PriceUpdate) + Send + Sync>;

struct Entry {
    feed: Feed,
    symbols: HashSet<String>,
    handler: TickHandler,
}

/// Registry of live subscriptions.
///
/// The registry owns every entry; the streaming session only reads
/// derived views of it (`handlers_for`, `aggregate_by_feed`).
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_handle: Handle,
    entries: BTreeMap<Handle, Entry>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription and return its handle together with the
    /// symbols that just transitioned from uncovered to covered on `feed`
    /// (sorted; only these need a wire subscribe).
    ///
    /// An empty symbol list yields a valid handle that controls nothing.
    pub fn add(
        &mut self,
        symbols: impl IntoIterator<Item = String>,
        feed: Feed,
        handler: TickHandler,
    ) -> (Handle, Vec<String>) {
        let symbols: HashSet<String> = symbols.into_iter().collect();

        let mut newly_covered: Vec<String> = symbols
            .iter()
            .filter(|sym| self.coverage(sym, feed) == 0)
            .cloned()
            .collect();
        newly_covered.sort_unstable();

        self.next_handle += 1;
        let handle = self.next_handle;
        self.entries.insert(
            handle,
            Entry {
                feed,
                symbols,
                handler,
            },
        );
        (handle, newly_covered)
    }

    /// Delete a subscription and return its feed plus the symbols whose
    /// coverage dropped to zero (sorted; only these need a wire
    /// unsubscribe). Removing an unknown handle is a no-op.
    pub fn remove(&mut self, handle: Handle) -> Option<(Feed, Vec<String>)> {
        let entry = self.entries.remove(&handle)?;
        let mut released: Vec<String> = entry
            .symbols
            .iter()
            .filter(|sym| self.coverage(sym, entry.feed) == 0)
            .cloned()
            .collect();
        released.sort_unstable();
        Some((entry.feed, released))
    }

    /// All handlers whose subscription covers `(symbol, feed)`, in handle
    /// order. The ordering is stable for test reproducibility but is not a
    /// public guarantee.
    #[must_use]
    pub fn handlers_for(&self, symbol: &str, feed: Feed) -> Vec<TickHandler> {
        self.entries
            .values()
            .filter(|e| e.feed == feed && e.symbols.contains(symbol))
            .map(|e| Arc::clone(&e.handler))
            .collect()
    }

    /// Union of subscribed symbols per feed. Derived on demand; this is
    /// the view replayed onto a fresh connection after a reconnect.
    #[must_use]
    pub fn aggregate_by_feed(&self) -> HashMap<Feed, BTreeSet<String>> {
        let mut aggregate: HashMap<Feed, BTreeSet<String>> = HashMap::new();
        for entry in self.entries.values() {
            if entry.symbols.is_empty() {
                continue;
            }
            aggregate
                .entry(entry.feed)
                .or_default()
                .extend(entry.symbols.iter().cloned());
        }
        aggregate
    }

    /// Drop every entry. Called on explicit close; subscriptions do not
    /// survive it.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no subscriptions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn coverage(&self, symbol: &str, feed: Feed) -> usize {
        self.entries
            .values()
            .filter(|e| e.feed == feed && e.symbols.contains(symbol))
            .count()
    }
}
