//! Cache entries and their state flags.

use bitcoin::OutPoint;
use bitflags::bitflags;
use coinstack_primitives::Coin;
use std::collections::HashMap;

bitflags! {
    /// State of a cached coin relative to the parent view.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CoinFlags: u8 {
        /// The entry differs from the parent and must be written on flush.
        const DIRTY = 1 << 0;
        /// The parent has no unspent entry for this outpoint. If this entry
        /// becomes spent it can be dropped instead of written back.
        const FRESH = 1 << 1;
        /// Candidate for early write-out during a partial flush.
        const FLUSH = 1 << 2;
    }
}

/// A coin together with its cache-state flags.
#[derive(Debug, Clone)]
pub struct CoinsCacheEntry {
    pub coin: Coin,
    pub flags: CoinFlags,
}

impl CoinsCacheEntry {
    /// A clean entry holding the given coin.
    pub fn new(coin: Coin) -> Self {
        Self {
            coin,
            flags: CoinFlags::empty(),
        }
    }

    /// Whether the (DIRTY, FRESH, spent) combination is one of the five that
    /// can legally occur. FRESH without DIRTY, a clean spent entry, and
    /// dirty-fresh-spent are unreachable by construction.
    pub fn is_legal_state(&self) -> bool {
        let mut attr = 0u8;
        if self.flags.contains(CoinFlags::DIRTY) {
            attr |= 1;
        }
        if self.flags.contains(CoinFlags::FRESH) {
            attr |= 2;
        }
        if self.coin.is_spent() {
            attr |= 4;
        }
        attr != 2 && attr != 4 && attr != 7
    }
}

impl Default for CoinsCacheEntry {
    fn default() -> Self {
        Self {
            coin: Coin::spent(),
            flags: CoinFlags::empty(),
        }
    }
}

/// The map a cache layer keeps and a `batch_write` folds down.
pub type CoinsMap = HashMap<OutPoint, CoinsCacheEntry>;
