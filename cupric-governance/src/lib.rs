//! Cupric Coin on-chain governance.
//!
//! A slice of every superblock reward is reserved for community proposals
//! chosen by coin-weighted voting. Proposals and votes ride the chain inside
//! `OP_RETURN` outputs; this crate extracts them from connected blocks,
//! validates them against consensus rules, maintains the authoritative
//! in-memory set, computes tallies for superblock payouts, and plans the
//! wallet transactions that cast votes.
//!
//! The engine holds no on-disk state of its own: it is rebuilt from the
//! chain on startup via [`GovernanceEngine::load_governance_data`].

pub mod chain;
pub mod engine;
pub mod error;
pub mod planner;
pub mod proposal;
pub mod tally;
pub mod vote;
pub mod wallet;
pub mod wire;

pub use chain::{is_utxo_spent, BlockIndex, ChainAccess, Coin};
pub use engine::GovernanceEngine;
pub use error::GovernanceError;
pub use planner::{submit_proposal, submit_votes, ProposalVote};
pub use proposal::Proposal;
pub use tally::{tally_votes, Tally};
pub use vote::{Vote, VoteChoice};
pub use wallet::{CoinControl, Recipient, WalletAccess, WalletOutput};

use cupric_shared_types::{Amount, ConsensusParams, COIN};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wire version carried in the first byte of every governance record.
pub const NETWORK_VERSION: u8 = 1;

/// Relay ceiling for OP_RETURN scripts; a proposal payload must fit in this
/// minus the OP_RETURN and pushdata opcodes.
pub const MAX_OP_RETURN_RELAY: usize = 1000;

/// Largest number of vote-carrying OP_RETURN outputs per transaction.
pub const MAX_OP_RETURN_IN_TRANSACTION: usize = 40;

/// Default value of the `vote_input_amount` setting.
pub const VOTING_UTXO_INPUT_AMOUNT: Amount = COIN / 10;

/// Governance record types, carried in the second byte of the OP_RETURN
/// payload to indicate how the record should be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    None = 0,
    Proposal = 1,
    Vote = 2,
}

impl RecordType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => RecordType::Proposal,
            2 => RecordType::Vote,
            _ => RecordType::None,
        }
    }
}

/// Returns the first superblock strictly after `from_block`.
pub fn next_superblock(params: &ConsensusParams, from_block: i32) -> i32 {
    from_block - from_block % params.superblock + params.superblock
}

/// Returns the superblock at or before `from_block`.
pub fn previous_superblock(params: &ConsensusParams, from_block: i32) -> i32 {
    next_superblock(params, from_block) - params.superblock
}

/// Node settings consumed by the submission surface.
#[derive(Debug, Clone)]
pub struct GovernanceSettings {
    /// When set, proposal submissions spend only from this address
    /// (`-proposaladdress`).
    pub proposal_address: Option<String>,
    /// Target value of the per-address input utxo in vote transactions
    /// (`-voteinputamount`).
    pub vote_input_amount: Amount,
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        GovernanceSettings {
            proposal_address: None,
            vote_input_amount: VOTING_UTXO_INPUT_AMOUNT,
        }
    }
}

/// Process-wide shutdown flag, polled by long-running scans between work
/// units so they can exit early without corrupting the store.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
