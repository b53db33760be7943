//! Mempool read contract for package fee-rate evaluation.
//!
//! The evaluator needs a topology snapshot of the connected subgraph around a
//! set of transactions. It takes the pool lock exactly once, copies out what
//! it needs and releases; the contract below encodes that discipline: all
//! reads happen inside a single [`TxPoolLock::with_read`] scope.

use bitcoin::{Amount, Txid};

/// Snapshot of one in-pool transaction, copied out while the pool lock is
/// held. Parent and child lists only name transactions that are themselves in
/// the pool; confirmed parents are not represented.
#[derive(Debug, Clone)]
pub struct ClusterTx {
    /// Transaction id.
    pub txid: Txid,
    /// Fee including any prioritisation delta.
    pub modified_fee: Amount,
    /// Virtual size in vbytes.
    pub vsize: u64,
    /// In-pool parents.
    pub parents: Vec<Txid>,
    /// In-pool children.
    pub children: Vec<Txid>,
}

/// Read access to the pool's transaction graph, valid while the pool lock is
/// held.
pub trait TxPoolRead {
    /// Whether the pool contains a transaction with this id.
    fn exists(&self, txid: &Txid) -> bool;

    /// The cluster of the given seed transactions: the seeds together with
    /// their in-pool ancestors and descendants, transitively closed. Every
    /// parent or child named by a returned entry is itself in the result.
    fn calculate_cluster(&self, seeds: &[Txid]) -> Vec<ClusterTx>;
}

/// Scoped access to a locked transaction pool.
pub trait TxPoolLock {
    /// Run `f` with the pool lock held. The lock is released when `f`
    /// returns, on every exit path.
    fn with_read<R>(&self, f: impl FnOnce(&dyn TxPoolRead) -> R) -> R;
}
