//! The wallet seam consumed by the vote planner and proposal submitter.
//!
//! Wallet failures are opaque to governance; methods return `anyhow` errors
//! which the planner folds into its own error taxonomy.

use cupric_shared_types::{Amount, OutPoint, PubKeyHash, Transaction, TxOutput};
use secp256k1::SecretKey;

/// A spendable output known to a wallet.
#[derive(Debug, Clone)]
pub struct WalletOutput {
    pub outpoint: OutPoint,
    pub output: TxOutput,
    pub spendable: bool,
}

/// An output requested from the wallet's transaction builder.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub script_pubkey: Vec<u8>,
    pub amount: Amount,
    pub subtract_fee: bool,
}

/// Constraints handed to the wallet's coin selection.
#[derive(Debug, Clone, Default)]
pub struct CoinControl {
    /// When false, only explicitly selected outpoints may fund the
    /// transaction.
    pub allow_other_inputs: bool,
    /// Destination for change, when the caller wants to pin it.
    pub change_destination: Option<PubKeyHash>,
    selected: Vec<OutPoint>,
}

impl CoinControl {
    pub fn select(&mut self, outpoint: OutPoint) {
        if !self.selected.contains(&outpoint) {
            self.selected.push(outpoint);
        }
    }

    pub fn selected(&self) -> &[OutPoint] {
        &self.selected
    }
}

/// Wallet operations the governance submission surface depends on,
/// implemented by the host wallet. Implementations follow their own lock
/// protocol; governance code never holds its state lock across these calls.
pub trait WalletAccess {
    /// True while the wallet's keys are encrypted and unavailable.
    fn is_locked(&self) -> bool;

    /// Confirmed spendable balance.
    fn balance(&self) -> Amount;

    /// All outputs currently available for spending.
    fn available_coins(&self) -> Vec<WalletOutput>;

    /// Resolves a destination to the key-id that can sign for it, when the
    /// wallet holds that key.
    fn key_for_destination(&self, dest: &PubKeyHash) -> Option<PubKeyHash>;

    /// The private key for a key-id, if held and unlocked.
    fn get_key(&self, keyid: &PubKeyHash) -> Option<SecretKey>;

    /// Minimum fee for a transaction of the given serialized size.
    fn minimum_fee(&self, tx_bytes: usize) -> Amount;

    /// Builds and signs a transaction paying `recipients` under the given
    /// coin-control constraints.
    fn create_transaction(
        &self,
        recipients: &[Recipient],
        coin_control: &CoinControl,
    ) -> anyhow::Result<Transaction>;

    /// Commits a created transaction to the wallet and broadcasts it.
    fn commit_transaction(&self, tx: &Transaction) -> anyhow::Result<()>;
}
