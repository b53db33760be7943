//! Shared value types for the hot chain-state layer.
//!
//! The central type is [`Coin`], one unspent transaction output together with
//! its creation context. A coin can additionally be in a *spent* state, a
//! sentinel distinct from "no entry at all": the caching layers above a
//! durable store use the sentinel to remember a spend that has not yet been
//! written back.

mod fee_rate;
pub mod tx_pool;

pub use self::fee_rate::FeeRate;

use bitcoin::hashes::Hash;
use bitcoin::OutPoint;
use serde::{Deserialize, Serialize};

/// Scripts larger than this are unspendable by policy.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Amount value of the spent sentinel. No real output can carry it since it
/// exceeds the total money supply.
const SPENT_AMOUNT: u64 = u64::MAX;

/// Unspent transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// Transfer value in satoshis.
    pub amount: u64,
    /// Spending condition of the output.
    pub script_pubkey: Vec<u8>,
    /// Block height at which the containing transaction was included.
    pub height: u32,
    /// Whether the coin is from a coinbase transaction.
    pub is_coinbase: bool,
}

impl Coin {
    /// Create a new unspent coin.
    pub fn new(amount: u64, script_pubkey: Vec<u8>, height: u32, is_coinbase: bool) -> Self {
        Self {
            amount,
            script_pubkey,
            height,
            is_coinbase,
        }
    }

    /// The spent sentinel: an empty entry standing in for a coin whose spend
    /// has not yet been propagated to the backing store.
    pub fn spent() -> Self {
        Self {
            amount: SPENT_AMOUNT,
            script_pubkey: Vec::new(),
            height: 0,
            is_coinbase: false,
        }
    }

    /// Whether this coin is the spent sentinel.
    pub fn is_spent(&self) -> bool {
        self.amount == SPENT_AMOUNT && self.script_pubkey.is_empty()
    }

    /// Clear this coin to the spent sentinel, returning the previous value.
    pub fn clear(&mut self) -> Coin {
        std::mem::replace(self, Coin::spent())
    }

    /// Whether the output is provably unspendable (OP_RETURN or oversized
    /// script) and therefore not worth tracking in the UTXO set.
    pub fn is_unspendable(&self) -> bool {
        self.script_pubkey.first() == Some(&0x6a) || self.script_pubkey.len() > MAX_SCRIPT_SIZE
    }

    /// Heap memory attributed to this coin, i.e. the script allocation.
    pub fn dynamic_memory_usage(&self) -> usize {
        self.script_pubkey.capacity()
    }

    /// Serialize for storage under an outpoint key.
    pub fn encode_for_storage(&self) -> Vec<u8> {
        bincode::serialize(self).expect("Coin serialization should not fail")
    }

    /// Deserialize from storage bytes.
    pub fn decode_from_storage(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Convert an outpoint to its storage key (36 bytes).
///
/// Format: txid (32 bytes, raw) || vout (4 bytes, little-endian)
pub fn outpoint_to_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(outpoint.txid.as_ref());
    key[32..].copy_from_slice(&outpoint.vout.to_le_bytes());
    key
}

/// Parse a storage key back to an outpoint.
pub fn key_to_outpoint(key: &[u8; 36]) -> OutPoint {
    let mut txid_bytes = [0u8; 32];
    txid_bytes.copy_from_slice(&key[..32]);
    let txid = bitcoin::Txid::from_byte_array(txid_bytes);
    let vout = u32::from_le_bytes(key[32..].try_into().expect("slice is 4 bytes"));
    OutPoint { txid, vout }
}
