//! The write-back coins cache.

use crate::entry::{CoinFlags, CoinsCacheEntry, CoinsMap};
use crate::error::CoinsViewError;
use crate::view::{CoinsCursor, CoinsView};
use bitcoin::{BlockHash, OutPoint, Transaction};
use coinstack_primitives::Coin;
use std::collections::hash_map::Entry;
use std::sync::LazyLock;
use tracing::{debug, trace};

static SPENT_COIN: LazyLock<Coin> = LazyLock::new(Coin::spent);

/// Running memory totals of a cache layer.
///
/// `flush_coins_usage` and `flush_count` cover the FLUSH-tagged subset, so
/// `flush_coins_usage <= cached_coins_usage` at every observable step.
#[derive(Debug, Default)]
struct MemoryTotals {
    cached_coins_usage: usize,
    flush_coins_usage: usize,
    flush_count: usize,
}

impl MemoryTotals {
    fn add(&mut self, entry: &CoinsCacheEntry) {
        let usage = entry.coin.dynamic_memory_usage();
        self.cached_coins_usage += usage;
        if entry.flags.contains(CoinFlags::FLUSH) {
            self.flush_count += 1;
            self.flush_coins_usage += usage;
        }
        assert!(self.flush_coins_usage <= self.cached_coins_usage);
    }

    fn sub(&mut self, entry: &CoinsCacheEntry) {
        let usage = entry.coin.dynamic_memory_usage();
        assert!(self.cached_coins_usage >= usage);
        self.cached_coins_usage -= usage;
        if entry.flags.contains(CoinFlags::FLUSH) {
            assert!(self.flush_count > 0);
            self.flush_count -= 1;
            assert!(self.flush_coins_usage >= usage);
            self.flush_coins_usage -= usage;
        }
        assert!(self.flush_coins_usage <= self.cached_coins_usage);
    }
}

/// Write-back cache layer over a parent [`CoinsView`].
///
/// Reads pull entries up from the parent; all mutation stays local until
/// [`flush`](Self::flush) or [`sync`](Self::sync) folds it down. The owner
/// serializes every operation on a stack of these; there is no internal
/// locking.
pub struct CoinsViewCache<'a> {
    base: &'a mut dyn CoinsView,
    cache: CoinsMap,
    best_block: Option<BlockHash>,
    totals: MemoryTotals,
}

impl<'a> CoinsViewCache<'a> {
    pub fn new(base: &'a mut dyn CoinsView) -> Self {
        Self {
            base,
            cache: CoinsMap::default(),
            best_block: None,
            totals: MemoryTotals::default(),
        }
    }

    /// Swap the parent view.
    pub fn set_backend(&mut self, base: &'a mut dyn CoinsView) {
        self.base = base;
    }

    /// Number of entries currently held.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Heap memory attributed to all cached coins.
    pub fn dynamic_memory_usage(&self) -> usize {
        self.totals.cached_coins_usage
    }

    /// Heap memory attributed to the FLUSH-tagged subset.
    pub fn flush_memory_usage(&self) -> usize {
        self.totals.flush_coins_usage
    }

    /// Number of FLUSH-tagged entries.
    pub fn flush_entry_count(&self) -> usize {
        self.totals.flush_count
    }

    /// Locate the entry locally or pull it up from the parent. A spent coin
    /// reported by the parent proves the parent holds only an empty entry, so
    /// the pulled copy starts out FRESH.
    fn fetch_coin(
        &mut self,
        outpoint: &OutPoint,
    ) -> Result<Option<&mut CoinsCacheEntry>, CoinsViewError> {
        if !self.cache.contains_key(outpoint) {
            let Some(coin) = self.base.get_coin(outpoint)? else {
                return Ok(None);
            };
            let mut entry = CoinsCacheEntry::new(coin);
            if entry.coin.is_spent() {
                entry.flags = CoinFlags::FRESH;
            }
            self.totals.add(&entry);
            self.cache.insert(*outpoint, entry);
        }
        Ok(self.cache.get_mut(outpoint))
    }

    /// Reference to the fetched coin, or to the shared spent sentinel on a
    /// miss.
    pub fn access_coin(&mut self, outpoint: &OutPoint) -> Result<&Coin, CoinsViewError> {
        match self.fetch_coin(outpoint)? {
            Some(entry) => Ok(&entry.coin),
            None => Ok(&SPENT_COIN),
        }
    }

    /// Whether an unspent entry is already in this layer. Does not descend.
    pub fn have_coin_in_cache(&self, outpoint: &OutPoint) -> bool {
        self.cache
            .get(outpoint)
            .is_some_and(|entry| !entry.coin.is_spent())
    }

    /// Add a coin for the given outpoint.
    ///
    /// Unspendable scripts are skipped silently. Overwriting an unspent coin
    /// without `possible_overwrite` is a logic error and panics.
    pub fn add_coin(&mut self, outpoint: OutPoint, coin: Coin, possible_overwrite: bool) {
        assert!(!coin.is_spent(), "cannot add the spent sentinel");
        if coin.is_unspendable() {
            return;
        }
        let entry = self.cache.entry(outpoint).or_default();
        self.totals.sub(entry);
        let mut fresh = false;
        if !possible_overwrite {
            assert!(
                entry.coin.is_spent(),
                "attempted to overwrite an unspent coin without permission"
            );
            // A spent DIRTY entry records a spend the parent has not yet
            // seen. Re-adding the coin on top of it (a reorg re-connecting
            // the creating block) must not mark it FRESH, or a later spend
            // would erase the entry and the spend would never reach the
            // parent.
            fresh = !entry.flags.contains(CoinFlags::DIRTY);
        }
        entry.coin = coin;
        entry.flags.insert(CoinFlags::DIRTY);
        if fresh {
            entry.flags.insert(CoinFlags::FRESH);
        }
        entry.flags.remove(CoinFlags::FLUSH);
        trace!(%outpoint, height = entry.coin.height, amount = entry.coin.amount, "add coin");
        self.totals.add(entry);
    }

    /// Spend the coin at the given outpoint, returning it.
    ///
    /// `Ok(None)` when no unspent coin is visible; no side effects in that
    /// case beyond read-through caching. A FRESH entry is erased outright
    /// since the parent never saw it.
    pub fn spend_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsViewError> {
        if self.fetch_coin(outpoint)?.is_none() {
            return Ok(None);
        }
        let entry = self.cache.get_mut(outpoint).expect("entry fetched above");
        if entry.coin.is_spent() {
            return Ok(None);
        }
        self.totals.sub(entry);
        trace!(%outpoint, height = entry.coin.height, amount = entry.coin.amount, "spend coin");
        let coin = if entry.flags.contains(CoinFlags::FRESH) {
            self.cache.remove(outpoint).expect("entry present").coin
        } else {
            entry.flags.insert(CoinFlags::DIRTY);
            entry.flags.remove(CoinFlags::FLUSH);
            entry.coin.clear()
        };
        Ok(Some(coin))
    }

    /// Drop the entry if it is clean (all flags zero); otherwise a no-op.
    /// Lets a caller evict read-only pulls without losing pending work.
    pub fn uncache(&mut self, outpoint: &OutPoint) {
        if let Some(entry) = self.cache.get(outpoint) {
            if entry.flags.is_empty() {
                self.totals.sub(entry);
                trace!(%outpoint, "uncache coin");
                self.cache.remove(outpoint);
            }
        }
    }

    /// Tag an existing entry as a candidate for early write-out. Returns
    /// whether an entry was present.
    pub fn mark_flushable(&mut self, outpoint: &OutPoint) -> bool {
        match self.cache.get_mut(outpoint) {
            Some(entry) if !entry.flags.contains(CoinFlags::FLUSH) => {
                self.totals.sub(entry);
                entry.flags.insert(CoinFlags::FLUSH);
                self.totals.add(entry);
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Fold one child entry into this layer. See `batch_write` for the
    /// consumption rules; this is the per-entry merge.
    fn fold(&mut self, outpoint: OutPoint, incoming: CoinsCacheEntry) {
        // Non-dirty entries carry nothing the parent needs.
        if !incoming.flags.contains(CoinFlags::DIRTY) {
            return;
        }
        match self.cache.entry(outpoint) {
            Entry::Vacant(vacant) => {
                // Fresh and spent in the child: the coin never existed in
                // this layer or below, nothing to record.
                if incoming.flags.contains(CoinFlags::FRESH) && incoming.coin.is_spent() {
                    return;
                }
                let mut flags = CoinFlags::DIRTY;
                // FRESH survives the fold only if the child held it; this
                // layer may have flushed the entry before, in which case the
                // grandparent still knows the coin.
                if incoming.flags.contains(CoinFlags::FRESH) {
                    flags.insert(CoinFlags::FRESH);
                }
                flags.insert(incoming.flags & CoinFlags::FLUSH);
                let entry = CoinsCacheEntry {
                    coin: incoming.coin,
                    flags,
                };
                self.totals.add(&entry);
                vacant.insert(entry);
            }
            Entry::Occupied(mut occupied) => {
                assert!(
                    !(incoming.flags.contains(CoinFlags::FRESH)
                        && !occupied.get().coin.is_spent()),
                    "FRESH flag misapplied to coin that exists in parent cache"
                );
                if occupied.get().flags.contains(CoinFlags::FRESH) && incoming.coin.is_spent() {
                    // The grandparent has no entry and the coin is now
                    // spent; the whole history collapses.
                    self.totals.sub(occupied.get());
                    occupied.remove();
                } else {
                    let entry = occupied.get_mut();
                    self.totals.sub(entry);
                    entry.coin = incoming.coin;
                    entry.flags.remove(CoinFlags::FLUSH);
                    entry.flags.insert(incoming.flags & CoinFlags::FLUSH);
                    self.totals.add(entry);
                    entry.flags.insert(CoinFlags::DIRTY);
                    // FRESH is never set here: the entry may be spent below
                    // and that spentness still has to reach the grandparent.
                }
            }
        }
    }

    /// Persist to the parent with eviction.
    ///
    /// Goes partial only when `partial_ok` and the FLUSH-tagged share of
    /// memory lies strictly between 10% and 90%; outside that band a full
    /// flush is cheaper than tracking the split. A full flush must leave the
    /// map empty and rebuilds the backing table.
    pub fn flush(&mut self, partial_ok: bool) -> Result<(), CoinsViewError> {
        let partial = partial_ok
            && self.totals.flush_coins_usage * 10 > self.totals.cached_coins_usage
            && self.totals.flush_coins_usage * 10 < self.totals.cached_coins_usage * 9;
        debug!(
            cached_coins_usage = self.totals.cached_coins_usage,
            flush_coins_usage = self.totals.flush_coins_usage,
            flush_count = self.totals.flush_count,
            partial,
            "flushing coins cache"
        );
        self.base
            .batch_write(&mut self.cache, self.best_block, true, partial)?;
        if partial {
            assert!(self.totals.cached_coins_usage >= self.totals.flush_coins_usage);
            self.totals.cached_coins_usage -= self.totals.flush_coins_usage;
        } else {
            assert!(
                self.cache.is_empty(),
                "not all cached coins were erased on full flush"
            );
            self.reallocate_cache();
            self.totals.cached_coins_usage = 0;
        }
        self.totals.flush_coins_usage = 0;
        self.totals.flush_count = 0;
        Ok(())
    }

    /// Persist to the parent without eviction: the parent learns the whole
    /// writeset, surviving unspent entries demote to clean and spent entries
    /// drop.
    pub fn sync(&mut self) -> Result<(), CoinsViewError> {
        self.base
            .batch_write(&mut self.cache, self.best_block, false, false)?;
        let totals = &mut self.totals;
        self.cache.retain(|_, entry| {
            totals.sub(entry);
            if entry.coin.is_spent() {
                false
            } else {
                entry.flags = CoinFlags::empty();
                totals.add(entry);
                true
            }
        });
        Ok(())
    }

    /// Set the hash of the best block this cache's state corresponds to.
    pub fn set_best_block(&mut self, hash: BlockHash) {
        self.best_block = Some(hash);
    }

    /// Rebuild the backing table after a full flush, so memory reserved by
    /// the previous table size goes back to the allocator.
    pub fn reallocate_cache(&mut self) {
        assert!(self.cache.is_empty(), "cache must be empty to reallocate");
        self.cache = CoinsMap::default();
    }

    /// Whether every input of `tx` refers to a visible unspent coin.
    pub fn have_inputs(&mut self, tx: &Transaction) -> Result<bool, CoinsViewError> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        for input in &tx.input {
            if !self.have_coin(&input.previous_output)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Walk every entry, asserting flag legality and that the running totals
    /// match a recomputation.
    pub fn sanity_check(&self) {
        let mut usage = 0;
        let mut flush_usage = 0;
        let mut flush_count = 0;
        for entry in self.cache.values() {
            assert!(entry.is_legal_state(), "illegal cache entry state");
            usage += entry.coin.dynamic_memory_usage();
            if entry.flags.contains(CoinFlags::FLUSH) {
                flush_count += 1;
                flush_usage += entry.coin.dynamic_memory_usage();
            }
        }
        assert_eq!(usage, self.totals.cached_coins_usage);
        assert_eq!(flush_usage, self.totals.flush_coins_usage);
        assert_eq!(flush_count, self.totals.flush_count);
        assert!(self.totals.flush_coins_usage <= self.totals.cached_coins_usage);
    }
}

impl CoinsView for CoinsViewCache<'_> {
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsViewError> {
        Ok(self
            .fetch_coin(outpoint)?
            .map(|entry| entry.coin.clone())
            .filter(|coin| !coin.is_spent()))
    }

    fn have_coin(&mut self, outpoint: &OutPoint) -> Result<bool, CoinsViewError> {
        Ok(self
            .fetch_coin(outpoint)?
            .is_some_and(|entry| !entry.coin.is_spent()))
    }

    fn best_block(&mut self) -> Option<BlockHash> {
        if self.best_block.is_none() {
            self.best_block = self.base.best_block();
        }
        self.best_block
    }

    fn head_blocks(&mut self) -> Vec<BlockHash> {
        self.base.head_blocks()
    }

    /// Fold a child's writeset into this cache, then adopt its best block.
    ///
    /// `erase` consumes folded entries from `incoming`; with `partial` only
    /// the FLUSH-tagged entries are consumed and the rest stay in the child.
    fn batch_write(
        &mut self,
        incoming: &mut CoinsMap,
        best_block: Option<BlockHash>,
        erase: bool,
        partial: bool,
    ) -> Result<(), CoinsViewError> {
        if erase && partial {
            let tagged: Vec<OutPoint> = incoming
                .iter()
                .filter(|(_, entry)| entry.flags.contains(CoinFlags::FLUSH))
                .map(|(outpoint, _)| *outpoint)
                .collect();
            for outpoint in tagged {
                let entry = incoming.remove(&outpoint).expect("tagged above");
                self.fold(outpoint, entry);
            }
        } else if erase {
            for (outpoint, entry) in incoming.drain() {
                self.fold(outpoint, entry);
            }
        } else {
            for (outpoint, entry) in incoming.iter() {
                self.fold(*outpoint, entry.clone());
            }
        }
        self.best_block = best_block;
        Ok(())
    }

    fn cursor(&mut self) -> Option<CoinsCursor<'_>> {
        self.base.cursor()
    }

    fn estimate_size(&mut self) -> usize {
        self.base.estimate_size()
    }
}

/// Add every output of `tx` to the cache.
///
/// Coinbase outputs stay overwritable to handle the historic duplicate
/// coinbases being re-created after a reorg; with `check_for_overwrite` the
/// cache is probed per output instead.
pub fn add_coins(
    cache: &mut CoinsViewCache<'_>,
    tx: &Transaction,
    height: u32,
    check_for_overwrite: bool,
) -> Result<(), CoinsViewError> {
    let is_coinbase = tx.is_coinbase();
    let txid = tx.compute_txid();
    for (index, output) in tx.output.iter().enumerate() {
        let outpoint = OutPoint::new(txid, index as u32);
        let overwrite = if check_for_overwrite {
            cache.have_coin(&outpoint)?
        } else {
            is_coinbase
        };
        let coin = Coin::new(
            output.value.to_sat(),
            output.script_pubkey.to_bytes(),
            height,
            is_coinbase,
        );
        cache.add_coin(outpoint, coin, overwrite);
    }
    Ok(())
}
