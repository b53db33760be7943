//! Test helpers and mock collaborators for the view stack.

mod fold_tests;

use crate::{CoinsView, CoinsViewError};
use bitcoin::hashes::Hash;
use bitcoin::{Amount, BlockHash, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use coinstack_primitives::Coin;
use std::collections::HashSet;

pub fn txid(tag: u8) -> Txid {
    Txid::from_byte_array([tag; 32])
}

pub fn outpoint(tag: u8) -> OutPoint {
    OutPoint {
        txid: txid(tag),
        vout: 0,
    }
}

pub fn block_hash(tag: u8) -> BlockHash {
    BlockHash::from_byte_array([tag; 32])
}

/// An unspent coin whose script occupies `script_len` heap bytes, so memory
/// accounting can be steered precisely.
pub fn coin_with_size(amount: u64, script_len: usize) -> Coin {
    Coin::new(amount, vec![0x51; script_len], 1, false)
}

pub fn coin(amount: u64) -> Coin {
    coin_with_size(amount, 25)
}

/// A parent view that reports the spent sentinel for selected outpoints, the
/// way a backend that remembers erased entries would.
#[derive(Default)]
pub struct SpentSentinelView {
    pub spent: HashSet<OutPoint>,
}

impl CoinsView for SpentSentinelView {
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsViewError> {
        Ok(self.spent.contains(outpoint).then(Coin::spent))
    }
}

/// A view whose reads always fail.
pub struct FailingView;

impl CoinsView for FailingView {
    fn get_coin(&mut self, _outpoint: &OutPoint) -> Result<Option<Coin>, CoinsViewError> {
        Err(CoinsViewError::Backend("injected read failure".into()))
    }
}

/// Minimal transaction builder for input/output plumbing tests.
pub struct TxBuilder {
    inputs: Vec<OutPoint>,
    outputs: Vec<u64>,
}

impl TxBuilder {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, previous_output: OutPoint) -> Self {
        self.inputs.push(previous_output);
        self
    }

    pub fn output(mut self, amount: u64) -> Self {
        self.outputs.push(amount);
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: self
                .inputs
                .into_iter()
                .map(|previous_output| TxIn {
                    previous_output,
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output: self
                .outputs
                .into_iter()
                .map(|amount| TxOut {
                    value: Amount::from_sat(amount),
                    script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
                })
                .collect(),
        }
    }
}
