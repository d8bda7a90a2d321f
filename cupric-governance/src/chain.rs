//! The chain seam consumed by the governance engine.
//!
//! The engine never owns chain state; the host node implements
//! [`ChainAccess`] over its block storage, utxo view and mempool.

use cupric_shared_types::{Block, Hash, OutPoint, TxOutput};

/// Position of a block in the active chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    pub hash: Hash,
    pub height: i32,
    /// Block time; governance votes inherit this as their timestamp.
    pub time: i64,
}

/// An unspent output as seen by the chain's utxo view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub output: TxOutput,
    pub height: i32,
    pub is_coinbase: bool,
}

/// Read access to the active chain, implemented by the host.
///
/// Implementations take their own locks internally; the engine never holds
/// its state lock across these calls.
pub trait ChainAccess: Send + Sync {
    /// Height of the chain tip.
    fn height(&self) -> i32;

    /// The block index entry at the given height on the active chain.
    fn block_index(&self, height: i32) -> Option<BlockIndex>;

    /// Reads a full block from storage.
    fn read_block(&self, index: &BlockIndex) -> anyhow::Result<Block>;

    /// The unspent output at `outpoint`, if it exists as of the tip.
    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin>;

    /// Whether the mempool holds a transaction spending `outpoint`.
    fn is_spent_in_mempool(&self, outpoint: &OutPoint) -> bool;
}

/// Checks that a utxo isn't already spent. With `mempool_check` the mempool's
/// pending spends count as spent too.
pub fn is_utxo_spent(chain: &dyn ChainAccess, utxo: &OutPoint, mempool_check: bool) -> bool {
    if chain.get_coin(utxo).is_none() {
        return true;
    }
    mempool_check && chain.is_spent_in_mempool(utxo)
}
