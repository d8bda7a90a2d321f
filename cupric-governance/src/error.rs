use cupric_shared_types::Amount;
use thiserror::Error;

/// Failures surfaced by the governance engine and submission surface.
///
/// The chain listener never propagates these to the chain: malformed or
/// invalid records are logged and dropped. The planner propagates the first
/// fatal error and stops; transactions committed before the failure stay in
/// flight.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// Truncated or version-mismatched OP_RETURN payload. The containing
    /// output is silently ignored.
    #[error("Malformed governance record")]
    MalformedRecord,

    #[error("Invalid proposal: {reason}")]
    InvalidProposal { reason: String },

    #[error("Invalid vote: {reason}")]
    InvalidVote { reason: String },

    /// Vote referencing a proposal that isn't in the store.
    #[error("No matching proposal found for vote")]
    NoMatchingProposal,

    /// The vote's backing utxo is spent as of the chain tip.
    #[error("Voting utxo is already spent")]
    UtxoSpent,

    #[error("No wallets were found")]
    WalletUnavailable,

    #[error("All wallets must be unlocked to vote")]
    WalletLocked,

    #[error("Not enough coin to cast a vote, {} is required", cupric_shared_types::format_money(*.0))]
    InsufficientFunds(Amount),

    /// The wallet's commit step rejected the transaction.
    #[error("Transaction was rejected: {0}")]
    BroadcastRejected(String),

    /// Wallet-level failure during transaction creation.
    #[error("{0}")]
    Wallet(String),

    /// Block-index lookup or block read failed during the initial scan;
    /// aggregated once per failing range.
    #[error("Failed to load governance data: {0}")]
    ChainRead(String),

    #[error("Shutdown requested")]
    ShutdownRequested,

    #[error("Failed to submit votes, no votes were created, is the wallet unlocked with sufficient funds? Funds required: {}", cupric_shared_types::format_money(*.0))]
    NoVotesCast(Amount),
}
