//! Folding a child writeset into a parent layer.

use super::*;
use crate::{CoinFlags, CoinsCacheEntry, CoinsMap, CoinsViewCache, MemoryCoinStore};
use coinstack_primitives::Coin;
use std::collections::BTreeMap;

fn entry(coin: Coin, flags: CoinFlags) -> CoinsCacheEntry {
    CoinsCacheEntry { coin, flags }
}

#[test]
fn test_parent_fresh_child_spent_erases() {
    let mut store = MemoryCoinStore::new();
    let mut parent = CoinsViewCache::new(&mut store);
    let op = outpoint(1);
    parent.add_coin(op, coin(1_000), false);

    {
        let mut child = CoinsViewCache::new(&mut parent);
        assert!(child.spend_coin(&op).unwrap().is_some());
        child.flush(false).unwrap();
    }

    // The spend annihilated the parent's FRESH entry; the store never hears
    // of the coin.
    assert_eq!(parent.cache_size(), 0);
    parent.sanity_check();
    parent.flush(false).unwrap();
    assert_eq!(store.coin_count(), 0);
}

#[test]
#[should_panic(expected = "FRESH flag misapplied")]
fn test_fresh_against_unspent_parent_panics() {
    let mut store = MemoryCoinStore::new();
    let mut parent = CoinsViewCache::new(&mut store);
    let op = outpoint(1);
    parent.add_coin(op, coin(1_000), true);

    let mut incoming: CoinsMap = CoinsMap::default();
    incoming.insert(op, entry(coin(2_000), CoinFlags::DIRTY | CoinFlags::FRESH));
    let _ = parent.batch_write(&mut incoming, Some(block_hash(1)), true, false);
}

#[test]
fn test_non_dirty_entries_are_ignored_but_consumed() {
    let mut store = MemoryCoinStore::new();
    let mut parent = CoinsViewCache::new(&mut store);
    let op = outpoint(1);

    let mut incoming: CoinsMap = CoinsMap::default();
    incoming.insert(op, entry(coin(1_000), CoinFlags::empty()));
    parent
        .batch_write(&mut incoming, Some(block_hash(1)), true, false)
        .unwrap();

    assert!(incoming.is_empty());
    assert_eq!(parent.cache_size(), 0);
}

#[test]
fn test_fresh_spent_annihilates_without_a_parent_entry() {
    let mut store = MemoryCoinStore::new();
    let mut parent = CoinsViewCache::new(&mut store);

    let mut incoming: CoinsMap = CoinsMap::default();
    incoming.insert(
        outpoint(1),
        entry(Coin::spent(), CoinFlags::DIRTY | CoinFlags::FRESH),
    );
    parent
        .batch_write(&mut incoming, Some(block_hash(1)), true, false)
        .unwrap();

    assert_eq!(parent.cache_size(), 0);
    parent.sanity_check();
}

#[test]
fn test_fold_preserves_fresh_and_flush_on_insert() {
    let mut store = MemoryCoinStore::new();
    let mut parent = CoinsViewCache::new(&mut store);
    let op = outpoint(1);

    let mut incoming: CoinsMap = CoinsMap::default();
    incoming.insert(
        op,
        entry(
            coin_with_size(1_000, 80),
            CoinFlags::DIRTY | CoinFlags::FRESH | CoinFlags::FLUSH,
        ),
    );
    parent
        .batch_write(&mut incoming, Some(block_hash(1)), true, false)
        .unwrap();

    assert_eq!(parent.cache_size(), 1);
    assert_eq!(parent.flush_memory_usage(), 80);
    assert_eq!(parent.flush_entry_count(), 1);
    parent.sanity_check();

    // FRESH survived the fold: spending in a fresh child layer and folding
    // again must erase rather than record the spend.
    {
        let mut child = CoinsViewCache::new(&mut parent);
        assert!(child.spend_coin(&op).unwrap().is_some());
        child.flush(false).unwrap();
    }
    assert_eq!(parent.cache_size(), 0);
    parent.sanity_check();
}

#[test]
fn test_fold_overwrite_replaces_flush_tag() {
    let mut store = MemoryCoinStore::new();
    let mut parent = CoinsViewCache::new(&mut store);
    let op = outpoint(1);
    parent.add_coin(op, coin_with_size(1_000, 40), true);
    parent.mark_flushable(&op);
    assert_eq!(parent.flush_memory_usage(), 40);

    // The incoming entry is not tagged, so the parent's tag clears.
    let mut incoming: CoinsMap = CoinsMap::default();
    incoming.insert(op, entry(coin_with_size(2_000, 60), CoinFlags::DIRTY));
    parent
        .batch_write(&mut incoming, Some(block_hash(1)), true, false)
        .unwrap();

    assert_eq!(parent.flush_memory_usage(), 0);
    assert_eq!(parent.flush_entry_count(), 0);
    assert_eq!(parent.dynamic_memory_usage(), 60);
    parent.sanity_check();
}

#[test]
fn test_batch_write_adopts_best_block() {
    let mut store = MemoryCoinStore::new();
    let mut parent = CoinsViewCache::new(&mut store);

    let mut incoming: CoinsMap = CoinsMap::default();
    parent
        .batch_write(&mut incoming, Some(block_hash(9)), true, false)
        .unwrap();
    assert_eq!(parent.best_block(), Some(block_hash(9)));
}

#[test]
fn test_partial_batch_write_consumes_only_tagged_entries() {
    let mut store = MemoryCoinStore::new();
    let mut parent = CoinsViewCache::new(&mut store);

    let tagged = outpoint(1);
    let untagged = outpoint(2);
    let mut incoming: CoinsMap = CoinsMap::default();
    incoming.insert(
        tagged,
        entry(coin(1_000), CoinFlags::DIRTY | CoinFlags::FLUSH),
    );
    incoming.insert(untagged, entry(coin(2_000), CoinFlags::DIRTY));

    parent
        .batch_write(&mut incoming, Some(block_hash(1)), true, true)
        .unwrap();

    assert_eq!(parent.cache_size(), 1);
    assert!(parent.have_coin(&tagged).unwrap());
    assert_eq!(incoming.len(), 1);
    assert!(incoming.contains_key(&untagged));
    parent.sanity_check();
}

/// The observable coin set must not depend on whether an intermediate layer
/// has been folded away.
#[test]
fn test_fold_is_transparent_to_readers() {
    let outpoints: Vec<_> = (1..=4).map(outpoint).collect();

    let run = |fold_before_read: bool| -> BTreeMap<bitcoin::OutPoint, Option<u64>> {
        let mut store = MemoryCoinStore::new();
        {
            let mut setup = CoinsViewCache::new(&mut store);
            setup.add_coin(outpoints[0], coin(100), false);
            setup.add_coin(outpoints[1], coin(200), false);
            setup.flush(false).unwrap();
        }

        let mut c1 = CoinsViewCache::new(&mut store);
        let mut c2 = CoinsViewCache::new(&mut c1);
        // Mutate through the top layer: spend a stored coin, add two new
        // ones, spend one of them again.
        assert!(c2.spend_coin(&outpoints[0]).unwrap().is_some());
        c2.add_coin(outpoints[2], coin(300), false);
        c2.add_coin(outpoints[3], coin(400), false);
        assert!(c2.spend_coin(&outpoints[3]).unwrap().is_some());

        if fold_before_read {
            c2.flush(false).unwrap();
            let mut observed = BTreeMap::new();
            for op in &outpoints {
                observed.insert(*op, c1.get_coin(op).unwrap().map(|c| c.amount));
            }
            c1.sanity_check();
            observed
        } else {
            let mut observed = BTreeMap::new();
            for op in &outpoints {
                observed.insert(*op, c2.get_coin(op).unwrap().map(|c| c.amount));
            }
            c2.sanity_check();
            observed
        }
    };

    assert_eq!(run(false), run(true));
}
