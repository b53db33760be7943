//! The uniform read interface over any layer of the coin-state stack.

use crate::entry::CoinsMap;
use crate::error::CoinsViewError;
use bitcoin::{BlockHash, OutPoint};
use coinstack_primitives::Coin;

/// Iterator over the coins a view can enumerate, bottom layers only.
pub type CoinsCursor<'a> = Box<dyn Iterator<Item = (OutPoint, Coin)> + 'a>;

/// Read interface shared by every layer of the stack: caches, wrappers and
/// the durable store at the bottom.
///
/// The default implementations describe an empty view. `get_coin` may report
/// the spent sentinel as a hit; that is an assertion that the backend holds
/// only an empty entry for the outpoint, which a caching layer above turns
/// into a FRESH local entry. `Ok(None)` is a plain miss.
pub trait CoinsView {
    /// Retrieve the coin for the given outpoint, if any entry is visible.
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsViewError> {
        let _ = outpoint;
        Ok(None)
    }

    /// Whether an unspent coin for the outpoint is visible.
    fn have_coin(&mut self, outpoint: &OutPoint) -> Result<bool, CoinsViewError> {
        Ok(self.get_coin(outpoint)?.is_some_and(|coin| !coin.is_spent()))
    }

    /// Hash of the block up to which this view's state is current.
    fn best_block(&mut self) -> Option<BlockHash> {
        None
    }

    /// While a write-back is mid-flight, the blocks whose state the layer
    /// below may partially contain; otherwise empty.
    fn head_blocks(&mut self) -> Vec<BlockHash> {
        Vec::new()
    }

    /// Fold a child layer's modified entries into this view and adopt the
    /// given best block. `erase` consumes the folded entries from `incoming`;
    /// `partial` restricts consumption to the entries tagged for early
    /// write-out. Either the whole fold succeeds or the view is unchanged.
    fn batch_write(
        &mut self,
        incoming: &mut CoinsMap,
        best_block: Option<BlockHash>,
        erase: bool,
        partial: bool,
    ) -> Result<(), CoinsViewError> {
        let _ = (incoming, best_block, erase, partial);
        Err(CoinsViewError::BatchWriteUnsupported)
    }

    /// Enumerate the view's coins, if the layer supports it.
    fn cursor(&mut self) -> Option<CoinsCursor<'_>> {
        None
    }

    /// Rough byte size of the underlying state.
    fn estimate_size(&mut self) -> usize {
        0
    }
}

/// A view that forwards everything to a swappable inner view.
pub struct CoinsViewBacked<'a> {
    base: &'a mut dyn CoinsView,
}

impl<'a> CoinsViewBacked<'a> {
    pub fn new(base: &'a mut dyn CoinsView) -> Self {
        Self { base }
    }

    /// Swap the inner view this wrapper forwards to.
    pub fn set_backend(&mut self, base: &'a mut dyn CoinsView) {
        self.base = base;
    }
}

impl CoinsView for CoinsViewBacked<'_> {
    fn get_coin(&mut self, outpoint: &OutPoint) -> Result<Option<Coin>, CoinsViewError> {
        self.base.get_coin(outpoint)
    }

    fn have_coin(&mut self, outpoint: &OutPoint) -> Result<bool, CoinsViewError> {
        self.base.have_coin(outpoint)
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
