//! Read-failure trapping at the bottom of a view stack.

use crate::entry::CoinsMap;
use crate::error::CoinsViewError;
use crate::view::{CoinsCursor, CoinsView};
use bitcoin::{BlockHash, OutPoint};
use coinstack_primitives::Coin;
use tracing::error;

type ReadErrCallback = Box<dyn Fn() + Send + Sync>;

/// Wraps a view and turns read failures into process termination.
///
/// A failed read and a missing coin are indistinguishable to callers, and a
/// missing coin is an answer a validator acts on; the only safe reaction to a
/// fault is to run the registered callbacks and stop.
pub struct CoinsViewErrorCatcher<'a> {
    base: &'a mut dyn CoinsView,
    err_callbacks: Vec<ReadErrCallback>,
}

impl<'a> CoinsViewErrorCatcher<'a> {
    pub fn new(base: &'a mut dyn CoinsView) -> Self {
        Self {
            base,
            err_callbacks: Vec::new(),
        }
    }

    /// Register a callback to run, in insertion order, if a read fails.
    pub fn add_read_err_callback(&mut self, callback: impl Fn() + Send + Sync + 'static) {
        self.err_callbacks.push(Box::new(callback));
    }
}

impl CoinsView for CoinsViewErrorCatcher<'_> {
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsViewError> {
        match self.base.get_coin(outpoint) {
            Ok(coin) => Ok(coin),
            Err(err) => {
                for callback in &self.err_callbacks {
                    callback();
                }
                error!("fatal error reading from the coin database: {err}");
                std::process::abort();
            }
        }
    }

    fn best_block(&mut self) -> Option<BlockHash> {
        self.base.best_block()
    }

    fn head_blocks(&mut self) -> Vec<BlockHash> {
        self.base.head_blocks()
    }

    fn batch_write(
        &mut self,
        incoming: &mut CoinsMap,
        best_block: Option<BlockHash>,
        erase: bool,
        partial: bool,
    ) -> Result<(), CoinsViewError> {
        self.base.batch_write(incoming, best_block, erase, partial)
    }

    fn cursor(&mut self) -> Option<CoinsCursor<'_>> {
        self.base.cursor()
    }

    fn estimate_size(&mut self) -> usize {
        self.base.estimate_size()
    }
}
