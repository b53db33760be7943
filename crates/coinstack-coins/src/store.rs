//! In-memory reference implementation of the backing-store contract.

use crate::entry::{CoinFlags, CoinsCacheEntry, CoinsMap};
use crate::error::CoinsViewError;
use crate::view::{CoinsCursor, CoinsView};
use bitcoin::{BlockHash, OutPoint};
use coinstack_primitives::{key_to_outpoint, outpoint_to_key, Coin};
use std::collections::HashMap;

/// Durable-store stand-in keeping encoded coins under 36-byte outpoint keys,
/// the same shape a key/value engine would see.
///
/// Honors the write-back contract: `batch_write` consumes the folded entries
/// from the incoming map per `erase`/`partial` and advances the best block;
/// being in-memory it cannot fail partway.
#[derive(Default)]
pub struct MemoryCoinStore {
    coins: HashMap<[u8; 36], Vec<u8>>,
    best_block: Option<BlockHash>,
}

impl MemoryCoinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unspent coins stored.
    pub fn coin_count(&self) -> usize {
        self.coins.len()
    }

    /// Whether a coin is stored for the outpoint.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.coins.contains_key(&outpoint_to_key(outpoint))
    }

    fn write_entry(&mut self, outpoint: &OutPoint, entry: &CoinsCacheEntry) {
        if !entry.flags.contains(CoinFlags::DIRTY) {
            return;
        }
        let key = outpoint_to_key(outpoint);
        if entry.coin.is_spent() {
            self.coins.remove(&key);
        } else {
            self.coins.insert(key, entry.coin.encode_for_storage());
        }
    }
}

impl CoinsView for MemoryCoinStore {
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsViewError> {
        match self.coins.get(&outpoint_to_key(outpoint)) {
            Some(bytes) => Ok(Some(Coin::decode_from_storage(bytes)?)),
            None => Ok(None),
        }
    }

    fn best_block(&mut self) -> Option<BlockHash> {
        self.best_block
    }

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
                self.write_entry(&outpoint, &entry);
            }
        } else if erase {
            for (outpoint, entry) in incoming.drain() {
                self.write_entry(&outpoint, &entry);
            }
        } else {
            for (outpoint, entry) in incoming.iter() {
                self.write_entry(outpoint, entry);
            }
        }
        self.best_block = best_block;
        Ok(())
    }

    fn cursor(&mut self) -> Option<CoinsCursor<'_>> {
        Some(Box::new(self.coins.iter().map(|(key, bytes)| {
            let coin = Coin::decode_from_storage(bytes).expect("stored coins decode");
            (key_to_outpoint(key), coin)
        })))
    }

    fn estimate_size(&mut self) -> usize {
        self.coins.values().map(|bytes| bytes.len() + 36).sum()
    }
}
