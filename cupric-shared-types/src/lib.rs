//! Core chain data structures shared across the Cupric Coin crates.

use serde::{Deserialize, Serialize};

pub mod script;

/// 256-bit digest, the universal identifier type on the chain.
pub type Hash = [u8; 32];
/// 160-bit public key hash, the payload of a P2PKH destination.
pub type PubKeyHash = [u8; 20];
/// Monetary amount in base units. Signed, like fee arithmetic requires.
pub type Amount = i64;

/// Base units per coin.
pub const COIN: Amount = 100_000_000;

/// Formats an amount in whole-coin units, e.g. `12.50000000`.
pub fn format_money(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:08}", sign, abs / COIN as u64, abs % COIN as u64)
}

/// Represents a reference to a specific transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// The transaction ID (hash) of the transaction containing the output.
    pub txid: Hash,
    /// The index of the output within that transaction.
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        OutPoint { txid: [0u8; 32], vout: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.txid == [0u8; 32] && self.vout == u32::MAX
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.vout)
    }
}

/// Represents a transaction input, referencing a previous transaction's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// The `OutPoint` referencing the output being spent.
    pub previous_output: OutPoint,
    /// The script signature, providing proof of ownership.
    pub script_sig: Vec<u8>,
    /// A sequence number, typically used for replace-by-fee or relative lock-times.
    pub sequence: u32,
}

impl TxInput {
    pub fn new(previous_output: OutPoint, script_sig: Vec<u8>) -> Self {
        TxInput { previous_output, script_sig, sequence: 0xFFFF_FFFF }
    }
}

/// Represents a transaction output, specifying a value and a locking script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// The value of the output in base units.
    pub value: Amount,
    /// The locking script (scriptPubKey) that defines the conditions for spending this output.
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: Amount, script_pubkey: Vec<u8>) -> Self {
        TxOutput { value, script_pubkey }
    }

    /// Extracts the public key hash from a P2PKH script, if applicable.
    pub fn extract_public_key_hash(&self) -> Option<PubKeyHash> {
        script::extract_destination(&self.script_pubkey)
    }
}

/// A transaction in the Cupric Coin chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The version of the transaction format.
    pub version: u32,
    /// A list of transaction inputs.
    pub inputs: Vec<TxInput>,
    /// A list of transaction outputs.
    pub outputs: Vec<TxOutput>,
    /// The lock time of the transaction, specifying the earliest time or block
    /// height it can be included in a block.
    pub lock_time: u32,
}

impl Transaction {
    /// Returns the canonical byte representation of the transaction.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Box<bincode::ErrorKind>> {
        bincode::serialize(self)
    }

    /// Calculates and returns the transaction ID (hash) of the transaction.
    pub fn txid(&self) -> Hash {
        match self.to_bytes() {
            Ok(bytes) => blake3::hash(&bytes).into(),
            Err(_) => [0u8; 32],
        }
    }

    /// Checks if the transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }
}

/// Represents a block header in the blockchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub previous_block_hash: Hash,
    pub merkle_root: Hash,
    /// Unix timestamp of the block; governance votes inherit this as their time.
    pub timestamp: i64,
    pub nonce: u64,
    pub difficulty_target: u32,
}

impl BlockHeader {
    /// Calculates the hash of the block header.
    pub fn hash(&self) -> Hash {
        match bincode::serialize(self) {
            Ok(bytes) => blake3::hash(&bytes).into(),
            Err(_) => [0u8; 32],
        }
    }
}

/// Represents a block in the blockchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Calculates the hash of the block.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Block time, as stamped by the producer.
    pub fn time(&self) -> i64 {
        self.header.timestamp
    }
}

/// Defines the consensus parameters for the blockchain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Initial block reward (in base units), halving over time.
    pub initial_block_reward: Amount,
    /// Halving interval for block rewards (in blocks).
    pub subsidy_halving_interval: i32,

    // Governance parameters
    /// Superblock period: every `superblock` blocks the coinbase may pay out
    /// to approved proposals.
    pub superblock: i32,
    /// First block height at which governance records are recognized.
    pub governance_block: i32,
    /// Smallest amount a proposal may request.
    pub proposal_min_amount: Amount,
    /// Superblock budget, also the largest amount a proposal may request.
    pub proposal_max_amount: Amount,
    /// Fee burned into the OP_RETURN output when submitting a proposal.
    pub proposal_fee: Amount,
    /// Minimum lead time (in blocks) between a proposal's acceptance and its
    /// target superblock.
    pub proposal_cutoff: i32,
    /// Minimum lead time (in blocks) between a vote's acceptance and the
    /// superblock of its proposal.
    pub voting_cutoff: i32,
    /// Coin amount that counts as one whole vote in a tally.
    pub vote_balance: Amount,
    /// Smallest utxo value allowed to cast a vote.
    pub vote_min_utxo_amount: Amount,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            initial_block_reward: 50 * COIN,
            subsidy_halving_interval: 210_000,
            superblock: 1440,
            governance_block: 1,
            proposal_min_amount: 10 * COIN,
            proposal_max_amount: 4320 * COIN,
            proposal_fee: 10 * COIN,
            proposal_cutoff: 288,
            voting_cutoff: 60,
            vote_balance: 5000 * COIN,
            vote_min_utxo_amount: COIN,
        }
    }
}

impl ConsensusParams {
    pub fn regtest() -> Self {
        ConsensusParams {
            superblock: 10,
            proposal_cutoff: 2,
            voting_cutoff: 1,
            vote_balance: 100 * COIN,
            vote_min_utxo_amount: COIN / 10,
            proposal_fee: COIN,
            proposal_min_amount: COIN,
            proposal_max_amount: 500 * COIN,
            ..Default::default()
        }
    }

    /// Total subsidy minted at the given height. Superblocks carry the
    /// governance budget on top of the base reward.
    pub fn block_subsidy(&self, height: i32) -> Amount {
        let halvings = height / self.subsidy_halving_interval;
        if halvings >= 63 {
            return 0;
        }
        let base = self.initial_block_reward >> halvings;
        if height > 0 && height % self.superblock == 0 {
            base + self.proposal_max_amount
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_detection() {
        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxInput::new(OutPoint::null(), vec![])],
            outputs: vec![TxOutput::new(50 * COIN, vec![])],
            lock_time: 0,
        };
        assert!(coinbase.is_coinbase());

        let spend = Transaction {
            version: 1,
            inputs: vec![TxInput::new(OutPoint::new([7u8; 32], 0), vec![])],
            outputs: vec![],
            lock_time: 0,
        };
        assert!(!spend.is_coinbase());
    }

    #[test]
    fn txid_is_stable() {
        let tx = Transaction { version: 1, inputs: vec![], outputs: vec![], lock_time: 0 };
        assert_eq!(tx.txid(), tx.clone().txid());
    }

    #[test]
    fn superblock_subsidy_includes_budget() {
        let params = ConsensusParams::default();
        let base = params.block_subsidy(1439);
        let superblock = params.block_subsidy(1440);
        assert_eq!(superblock, base + params.proposal_max_amount);
    }
}
