//! Mock transaction pool and helpers.


use bitcoin::hashes::Hash;
use bitcoin::{Amount, OutPoint, Txid};
use coinstack_primitives::tx_pool::{ClusterTx, TxPoolLock, TxPoolRead};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

pub fn txid(tag: u8) -> Txid {
    Txid::from_byte_array([tag; 32])
}

pub fn outpoint(tag: u8) -> OutPoint {
    OutPoint {
        txid: txid(tag),
        vout: 0,
    }
}

#[derive(Default)]
pub struct PoolInner {
    txs: HashMap<Txid, ClusterTx>,
}

impl PoolInner {
    /// Register a transaction; parents must already be present and get their
    /// child links wired up.
    fn add(&mut self, txid: Txid, fee: u64, vsize: u64, parents: &[Txid]) {
        for parent in parents {
            self.txs
                .get_mut(parent)
                .expect("parent added first")
                .children
                .push(txid);
        }
        self.txs.insert(
            txid,
            ClusterTx {
                txid,
                modified_fee: Amount::from_sat(fee),
                vsize,
                parents: parents.to_vec(),
                children: Vec::new(),
            },
        );
    }
}

impl TxPoolRead for PoolInner {
    fn exists(&self, txid: &Txid) -> bool {
        self.txs.contains_key(txid)
    }

    fn calculate_cluster(&self, seeds: &[Txid]) -> Vec<ClusterTx> {
        let mut member: HashSet<Txid> = HashSet::new();
        let mut todo: Vec<Txid> = seeds.to_vec();
        while let Some(at) = todo.pop() {
            if !member.insert(at) {
                continue;
            }
            let tx = &self.txs[&at];
            todo.extend(tx.parents.iter().copied());
            todo.extend(tx.children.iter().copied());
        }
        self.txs
            .values()
            .filter(|tx| member.contains(&tx.txid))
            .cloned()
            .collect()
    }
}

/// Lock-guarded mock pool implementing the snapshot contract.
#[derive(Default)]
pub struct MockTxPool {
    inner: RwLock<PoolInner>,
}

impl MockTxPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tx(&self, txid: Txid, fee: u64, vsize: u64, parents: &[Txid]) {
        self.inner.write().add(txid, fee, vsize, parents);
    }
}

impl TxPoolLock for MockTxPool {
    fn with_read<R>(&self, f: impl FnOnce(&dyn TxPoolRead) -> R) -> R {
        let guard = self.inner.read();
        f(&*guard)
    }
}

/// The diamond cluster used across tests:
///
/// ```text
///           B fee=200 vsize=100
///          /                    \
/// A fee=100 vsize=100          D fee=150 vsize=100
///          \                    /
///           C fee=300 vsize=100
/// ```
pub fn diamond_pool() -> MockTxPool {
    let pool = MockTxPool::new();
    pool.add_tx(txid(1), 100, 100, &[]);
    pool.add_tx(txid(2), 200, 100, &[txid(1)]);
    pool.add_tx(txid(3), 300, 100, &[txid(1)]);
    pool.add_tx(txid(4), 150, 100, &[txid(2), txid(3)]);
    pool
}
