//! A minimal stand-in for the block assembler.
//!
//! Runs the mining algorithm over one mempool cluster, ignoring consensus
//! rules, to answer "what extra fee would it cost to get these outpoints
//! confirmed at a target fee rate". Construction snapshots the cluster under
//! a single pool lock acquisition; the calculate methods are pure CPU work
//! afterwards, so independent evaluators can run in parallel over the same
//! pool.

#[cfg(test)]
mod tests;

use bitcoin::{Amount, OutPoint, SignedAmount, Txid};
use coinstack_primitives::tx_pool::TxPoolLock;
use coinstack_primitives::FeeRate;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// A very simplified representation of a mempool transaction.
#[derive(Debug, Default)]
struct MinerTx {
    /// Fee of this individual transaction, sats.
    fee: u64,
    /// Virtual size of this individual transaction.
    vsize: u64,
    /// Arena indices of our in-cluster parents (unordered).
    parents: Vec<usize>,
    /// Arena indices of our in-cluster children (unordered).
    children: Vec<usize>,
    /// This transaction has been "mined" into the mock template.
    mined: bool,
    /// Sum of our fee and all our unmined ancestors'.
    ancestor_fee: u64,
    /// Sum of our vsize and all our unmined ancestors'.
    ancestor_vsize: u64,
    /// Visitation stamp for ancestor walks.
    seen_epoch: u32,
}

/// Package fee-rate evaluator over a snapshot of one mempool cluster.
pub struct MiniMiner {
    /// Copy of the outpoints the caller asked about.
    requested_outpoints: Vec<OutPoint>,
    /// Arena of cluster transactions; all cross-references are indices.
    txs: Vec<MinerTx>,
    /// Arena index by txid.
    tx_index: HashMap<Txid, usize>,
    /// Arena indices in topological order, ancestors first.
    topo_order: Vec<usize>,
    /// Current ancestor-walk epoch.
    epoch: u32,
}

impl MiniMiner {
    /// Snapshot the cluster connected to the given outpoints.
    ///
    /// The pool lock is taken exactly once, for the duration of the closure;
    /// requested outpoints whose spender the pool does not know simply yield
    /// a zero bump later. The graph is never reshaped after construction.
    pub fn new(pool: &impl TxPoolLock, outpoints: Vec<OutPoint>) -> Self {
        let cluster = pool.with_read(|view| {
            let mut seeds: Vec<Txid> = Vec::new();
            for outpoint in &outpoints {
                if !view.exists(&outpoint.txid) {
                    // Confirmed, or never submitted: either way no bump is
                    // needed and there is nothing to model.
                    trace!(%outpoint, "spender not in the pool");
                    continue;
                }
                if !seeds.contains(&outpoint.txid) {
                    seeds.push(outpoint.txid);
                }
            }
            view.calculate_cluster(&seeds)
        });

        let mut txs: Vec<MinerTx> = Vec::with_capacity(cluster.len());
        let mut tx_index: HashMap<Txid, usize> = HashMap::with_capacity(cluster.len());
        for member in &cluster {
            let index = txs.len();
            if tx_index.insert(member.txid, index).is_some() {
                panic!("cluster contains duplicate transaction {}", member.txid);
            }
            txs.push(MinerTx {
                fee: member.modified_fee.to_sat(),
                vsize: member.vsize,
                ..MinerTx::default()
            });
            trace!(index, txid = %member.txid, fee = member.modified_fee.to_sat(),
                vsize = member.vsize, "cluster tx");
        }

        let mut in_degree = vec![0usize; txs.len()];
        for member in &cluster {
            let index = tx_index[&member.txid];
            for parent in &member.parents {
                let parent_index = *tx_index
                    .get(parent)
                    .expect("cluster parents stay within the cluster");
                txs[index].parents.push(parent_index);
            }
            for child in &member.children {
                let child_index = *tx_index
                    .get(child)
                    .expect("cluster children stay within the cluster");
                txs[index].children.push(child_index);
            }
            in_degree[index] = txs[index].parents.len();
        }

        // Kahn's sort; the pool graph is acyclic so every node gets a slot.
        let mut topo_order = Vec::with_capacity(txs.len());
        let mut ready: Vec<usize> = (0..txs.len()).filter(|&i| in_degree[i] == 0).collect();
        while let Some(index) = ready.pop() {
            topo_order.push(index);
            for position in 0..txs[index].children.len() {
                let child = txs[index].children[position];
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.push(child);
                }
            }
        }
        assert_eq!(
            topo_order.len(),
            txs.len(),
            "mempool cluster is not acyclic"
        );

        Self {
            requested_outpoints: outpoints,
            txs,
            tx_index,
            topo_order,
            epoch: 0,
        }
    }

    /// Recompute one node's ancestor fee and vsize over its unmined
    /// transitive ancestors, each counted once.
    fn calculate_ancestor_values(&mut self, index: usize) {
        self.epoch += 1;
        let epoch = self.epoch;
        let mut fee = 0u64;
        let mut vsize = 0u64;
        let mut todo = vec![index];
        self.txs[index].seen_epoch = epoch;
        while let Some(at) = todo.pop() {
            fee += self.txs[at].fee;
            vsize += self.txs[at].vsize;
            for position in 0..self.txs[at].parents.len() {
                let parent = self.txs[at].parents[position];
                if self.txs[parent].mined || self.txs[parent].seen_epoch == epoch {
                    continue;
                }
                self.txs[parent].seen_epoch = epoch;
                todo.push(parent);
            }
        }
        self.txs[index].ancestor_fee = fee;
        self.txs[index].ancestor_vsize = vsize;
    }

    /// Mark the node and every unmined transitive ancestor as mined.
    fn mine_with_ancestors(&mut self, index: usize) {
        let mut todo = vec![index];
        while let Some(at) = todo.pop() {
            if self.txs[at].mined {
                continue;
            }
            self.txs[at].mined = true;
            trace!(index = at, "mined");
            for position in 0..self.txs[at].parents.len() {
                let parent = self.txs[at].parents[position];
                if !self.txs[parent].mined {
                    todo.push(parent);
                }
            }
        }
    }

    /// Determine which transactions would be mined at the target fee rate.
    ///
    /// Walks the topological order recomputing each unmined node's ancestor
    /// package; a package at or above the target mines the node and its
    /// ancestors, which invalidates the aggregates of everything after it, so
    /// the walk restarts. Terminates when a full pass mines nothing. The
    /// surviving nodes' ancestor values are the other output of this pass;
    /// the calculate methods read them.
    pub fn build_mock_template(&mut self, target_feerate: FeeRate) {
        for tx in &mut self.txs {
            tx.mined = false;
        }
        trace!(
            target = target_feerate.to_sat_per_kvb(),
            "building mock template"
        );
        let mut progress = true;
        while progress {
            progress = false;
            for position in 0..self.topo_order.len() {
                let index = self.topo_order[position];
                if self.txs[index].mined {
                    continue;
                }
                self.calculate_ancestor_values(index);
                let tx = &self.txs[index];
                trace!(
                    index,
                    ancestor_fee = tx.ancestor_fee,
                    ancestor_vsize = tx.ancestor_vsize,
                    "considering package"
                );
                if !target_feerate.is_met_by(Amount::from_sat(tx.ancestor_fee), tx.ancestor_vsize)
                {
                    continue;
                }
                self.mine_with_ancestors(index);
                progress = true;
                break;
            }
        }
    }

    /// Per-outpoint cost of bumping the spending package to the target rate.
    ///
    /// Zero for outpoints whose spender is unknown to the pool and for
    /// transactions the mock template already mines.
    pub fn calculate_bump_fees(&mut self, target_feerate: FeeRate) -> BTreeMap<OutPoint, Amount> {
        self.build_mock_template(target_feerate);

        let mut bump_fees = BTreeMap::new();
        for outpoint in &self.requested_outpoints {
            let Some(&index) = self.tx_index.get(&outpoint.txid) else {
                bump_fees.insert(*outpoint, Amount::ZERO);
                continue;
            };
            let tx = &self.txs[index];
            if tx.mined {
                bump_fees.insert(*outpoint, Amount::ZERO);
                continue;
            }
            let target_fee = target_feerate.fee_for(tx.ancestor_vsize);
            let ancestor_fee = Amount::from_sat(tx.ancestor_fee);
            assert!(
                target_fee > ancestor_fee,
                "unmined package already meets the target feerate"
            );
            trace!(index, bump = %(target_fee - ancestor_fee), "bump fee");
            bump_fees.insert(*outpoint, target_fee - ancestor_fee);
        }
        bump_fees
    }

    /// Aggregate cost of bumping all requested spenders at once, counting
    /// shared ancestors a single time.
    ///
    /// Re-uses the mined flags as visited markers, so the template state is
    /// consumed; the next calculate call rebuilds it.
    pub fn calculate_total_bump_fees(&mut self, target_feerate: FeeRate) -> SignedAmount {
        self.build_mock_template(target_feerate);

        let mut todo = Vec::new();
        for position in 0..self.requested_outpoints.len() {
            let txid = self.requested_outpoints[position].txid;
            let Some(&index) = self.tx_index.get(&txid) else {
                continue;
            };
            if self.txs[index].mined {
                continue;
            }
            self.txs[index].mined = true;
            todo.push(index);
        }

        let mut total_fees = 0u64;
        let mut total_vsize = 0u64;
        while let Some(at) = todo.pop() {
            total_fees += self.txs[at].fee;
            total_vsize += self.txs[at].vsize;
            for position in 0..self.txs[at].parents.len() {
                let parent = self.txs[at].parents[position];
                if !self.txs[parent].mined {
                    self.txs[parent].mined = true;
                    todo.push(parent);
                }
            }
        }

        let bump = target_feerate.fee_for_signed(total_vsize)
            - SignedAmount::from_sat(total_fees as i64);
        trace!(total_fees, total_vsize, %bump, "total bump fee");
        bump
    }
}
