use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use proptest::prelude::*;

use tahta::streaming::registry::{Handle, SubscriptionRegistry};
use tahta_core::{Feed, PriceUpdate};

const POOL: [&str; 5] = ["THYAO", "GARAN", "AKBNK", "AAPL", "MSFT"];

#[derive(Debug, Clone)]
enum Op {
    Add { feed_idx: usize, mask: u8 },
    Remove { slot: usize },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..Feed::ALL.len(), any::<u8>()).prop_map(|(feed_idx, mask)| Op::Add { feed_idx, mask }),
        any::<usize>().prop_map(|slot| Op::Remove { slot }),
    ]
}

fn mask_symbols(mask: u8) -> BTreeSet<String> {
    POOL.iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, s)| (*s).to_string())
        .collect()
}

fn covered(model: &[(Handle, Feed, BTreeSet<String>)], symbol: &str, feed: Feed) -> bool {
    model
        .iter()
        .any(|(_, f, syms)| *f == feed && syms.contains(symbol))
}

fn model_aggregate(model: &[(Handle, Feed, BTreeSet<String>)]) -> HashMap<Feed, BTreeSet<String>> {
    let mut aggregate: HashMap<Feed, BTreeSet<String>> = HashMap::new();
    for (_, feed, syms) in model {
        if syms.is_empty() {
            continue;
        }
        aggregate.entry(*feed).or_default().extend(syms.iter().cloned());
    }
    aggregate
}

proptest! {
    // For any interleaving of subscribes and unsubscribes the aggregate
    // view equals the true union of live entries, and the zero-crossing
    // deltas reported by add/remove match a naive coverage model.
    #[test]
    fn aggregate_matches_live_union(ops in proptest::collection::vec(arb_op(), 0..60)) {
        let mut reg = SubscriptionRegistry::new();
        let mut model: Vec<(Handle, Feed, BTreeSet<String>)> = Vec::new();

        for op in ops {
            match op {
                Op::Add { feed_idx, mask } => {
                    let feed = Feed::ALL[feed_idx];
                    let symbols = mask_symbols(mask);
                    let expected: BTreeSet<String> = symbols
                        .iter()
                        .filter(|s| !covered(&model, s, feed))
                        .cloned()
                        .collect();

                    let (handle, newly) = reg.add(
                        symbols.iter().cloned().collect::<Vec<_>>(),
                        feed,
                        Arc::new(|_update: PriceUpdate| {}),
                    );
                    let newly: BTreeSet<String> = newly.into_iter().collect();
                    prop_assert_eq!(newly, expected);
                    model.push((handle, feed, symbols));
                }
                Op::Remove { slot } => {
                    if model.is_empty() {
                        continue;
                    }
                    let (handle, feed, symbols) = model.remove(slot % model.len());
                    let expected: BTreeSet<String> = symbols
                        .iter()
                        .filter(|s| !covered(&model, s, feed))
                        .cloned()
                        .collect();

                    let (removed_feed, released) = reg.remove(handle).unwrap();
                    prop_assert_eq!(removed_feed, feed);
                    let released: BTreeSet<String> = released.into_iter().collect();
                    prop_assert_eq!(released, expected);
                }
            }

            prop_assert_eq!(reg.aggregate_by_feed(), model_aggregate(&model));
        }
    }
}
