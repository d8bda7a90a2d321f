//! Builds and broadcasts the transactions that cast votes and submit
//! proposals.
//!
//! Each voting utxo needs its own OP_RETURN output per proposal, and each
//! unique address needs one real input to prove ownership, so casting a
//! batch of votes can take several transactions. The planner fans votes
//! across every eligible utxo of every wallet, filling transactions up to
//! the OP_RETURN ceiling.

use crate::chain::ChainAccess;
use crate::engine::GovernanceEngine;
use crate::error::GovernanceError;
use crate::proposal::Proposal;
use crate::vote::{Vote, VoteChoice};
use crate::wallet::{CoinControl, Recipient, WalletAccess, WalletOutput};
use crate::{GovernanceSettings, MAX_OP_RETURN_IN_TRANSACTION, MAX_OP_RETURN_RELAY};
use cupric_crypto::decode_address;
use cupric_shared_types::{
    format_money, script, Amount, ConsensusParams, Hash, OutPoint, PubKeyHash, Transaction,
};
use log::warn;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A proposal paired with the choice to cast on it.
#[derive(Debug, Clone)]
pub struct ProposalVote {
    pub proposal: Proposal,
    pub choice: VoteChoice,
}

/// Casts votes on the given proposals from every eligible utxo across the
/// given wallets. Returns the committed transactions.
///
/// Wallet-level failures are fatal for the whole batch; transactions
/// committed before the failure stay in flight.
pub fn submit_votes(
    engine: &GovernanceEngine,
    proposals: &[ProposalVote],
    wallets: &[&dyn WalletAccess],
    chain: &dyn ChainAccess,
    settings: &GovernanceSettings,
) -> Result<Vec<Transaction>, GovernanceError> {
    let params = engine.params();
    if proposals.is_empty() {
        return Err(GovernanceError::InvalidProposal { reason: "no proposals specified".into() });
    }
    for pv in proposals {
        if let Err(e) = pv.proposal.validate(params) {
            warn!("governance: refusing to vote on {}: {e}", pv.proposal.name);
            return Err(e);
        }
    }

    if wallets.is_empty() {
        return Err(GovernanceError::WalletUnavailable);
    }
    // Every wallet must be able to sign, and together they must carry at
    // least one whole vote's balance.
    let mut total_balance: Amount = 0;
    for wallet in wallets {
        if wallet.is_locked() {
            return Err(GovernanceError::WalletLocked);
        }
        total_balance += wallet.balance();
    }
    if total_balance < params.vote_balance {
        return Err(GovernanceError::InsufficientFunds(params.vote_balance));
    }

    let input_floor = (settings.vote_input_amount as f64 * 0.6) as Amount;
    // Utxos that already voted on a proposal during this planning pass.
    let mut used_utxos: HashMap<OutPoint, HashSet<Hash>> = HashMap::new();
    let mut txs: Vec<Transaction> = Vec::new();

    for wallet in wallets {
        let mut completely_done = false; // no votes left for this wallet
        loop {
            let mut coins = wallet.available_coins();
            // Smallest first: sentinel inputs consume the least valuable
            // coin per address that still clears the input floor.
            coins.sort_by_key(|c| c.output.value);
            if coins.is_empty() {
                break;
            }

            // One real input per address proves ownership of that address's
            // voting utxos. The chosen input must not itself vote.
            let mut input_coins: BTreeMap<PubKeyHash, WalletOutput> = BTreeMap::new();
            let mut filtered: Vec<WalletOutput> = Vec::new();
            for coin in coins {
                if !coin.spendable {
                    continue;
                }
                let Some(dest) = script::extract_destination(&coin.output.script_pubkey) else {
                    continue;
                };
                if !input_coins.contains_key(&dest) && coin.output.value >= input_floor {
                    input_coins.insert(dest, coin);
                    continue;
                }
                if coin.output.value < params.vote_min_utxo_amount {
                    continue;
                }
                filtered.push(coin);
            }
            if filtered.is_empty() || input_coins.is_empty() {
                break;
            }

            // Queue as many votes as fit in a single transaction.
            let mut vote_outs: Vec<Recipient> = Vec::new();
            'coins: for (i, coin) in filtered.iter().enumerate() {
                let Some(dest) = script::extract_destination(&coin.output.script_pubkey) else {
                    continue;
                };
                let Some(keyid) = wallet.key_for_destination(&dest) else {
                    continue;
                };
                let Some(key) = wallet.get_key(&keyid) else {
                    continue;
                };

                for (j, pv) in proposals.iter().enumerate() {
                    let proposal_hash = pv.proposal.hash();
                    if used_utxos
                        .get(&coin.outpoint)
                        .is_some_and(|set| set.contains(&proposal_hash))
                    {
                        continue;
                    }
                    if engine.has_vote_by(&proposal_hash, &coin.outpoint) {
                        continue; // already voted
                    }

                    let mut vote = Vote::new(proposal_hash, pv.choice, coin.outpoint, chain);
                    if let Err(e) = vote.sign(&key) {
                        warn!(
                            "governance: failed to vote on {{{}}}, utxo signing failed {}: {e}",
                            pv.proposal.name, coin.outpoint
                        );
                        continue;
                    }
                    if let Err(e) = vote.validate(params, chain) {
                        warn!(
                            "governance: failed to vote on {{{}}}, validation failed: {e}",
                            pv.proposal.name
                        );
                        continue;
                    }
                    vote_outs.push(Recipient {
                        script_pubkey: script::op_return_script(&vote.to_payload()),
                        amount: 0,
                        subtract_fee: false,
                    });
                    used_utxos.entry(coin.outpoint).or_default().insert(proposal_hash);
                    completely_done = i == filtered.len() - 1 && j == proposals.len() - 1;

                    // Transaction is full; finalize it unless this was the
                    // very last vote anyway.
                    if vote_outs.len() == MAX_OP_RETURN_IN_TRANSACTION && !completely_done {
                        break 'coins;
                    }
                }
            }
            if vote_outs.is_empty() {
                break; // nothing new to cast from this wallet
            }

            // Fund with the per-address inputs and pay each one back to its
            // own address as change, splitting the fee equally.
            let mut coin_control = CoinControl::default();
            coin_control.allow_other_inputs = false;
            coin_control.change_destination = input_coins.keys().next().copied();
            let fee_bytes = input_coins.len() * 150 + vote_outs.len() * MAX_OP_RETURN_RELAY;
            let pay_fee = wallet.minimum_fee(fee_bytes);
            let fee_per_input = pay_fee / input_coins.len() as Amount;

            let mut recipients = vote_outs;
            for (dest, coin) in &input_coins {
                coin_control.select(coin.outpoint);
                recipients.push(Recipient {
                    script_pubkey: script::p2pkh_script(dest),
                    amount: coin.output.value - fee_per_input,
                    subtract_fee: false,
                });
            }

            let tx = wallet.create_transaction(&recipients, &coin_control).map_err(|e| {
                GovernanceError::Wallet(format!(
                    "Failed to create the vote submission transaction: {e}"
                ))
            })?;
            wallet
                .commit_transaction(&tx)
                .map_err(|e| GovernanceError::BroadcastRejected(e.to_string()))?;
            txs.push(tx);

            if completely_done {
                break;
            }
        }
    }

    if txs.is_empty() {
        return Err(GovernanceError::NoVotesCast(params.vote_balance));
    }
    Ok(txs)
}

/// Submits a proposal to the network: funds an OP_RETURN output carrying the
/// serialized proposal with the proposal fee and broadcasts it from the
/// first wallet that can pay.
pub fn submit_proposal(
    proposal: &Proposal,
    params: &ConsensusParams,
    wallets: &[&dyn WalletAccess],
    settings: &GovernanceSettings,
) -> Result<Transaction, GovernanceError> {
    proposal.validate(params)?;
    let payload = proposal.to_payload();

    // When a proposal address is configured, only its coin funds the
    // submission and change returns to it.
    let proposal_address: Option<PubKeyHash> = match settings.proposal_address.as_deref() {
        Some(s) if !s.is_empty() => Some(decode_address(s).map_err(|_| {
            GovernanceError::InvalidProposal {
                reason: "Bad proposal address specified in the proposaladdress option, \
                         only P2PKH addresses are accepted"
                    .into(),
            }
        })?),
        _ => None,
    };

    if wallets.is_empty() {
        return Err(GovernanceError::WalletUnavailable);
    }

    for wallet in wallets {
        if wallet.is_locked() || wallet.balance() <= params.proposal_fee {
            continue;
        }
        let mut coins = wallet.available_coins();
        coins.retain(|c| c.spendable);
        if coins.is_empty() {
            continue;
        }

        let mut coin_control = CoinControl::default();
        if let Some(address) = proposal_address {
            // Use up the least valuable utxos of the proposal address first.
            coins.sort_by_key(|c| c.output.value);
            let mut selected: Amount = 0;
            for coin in &coins {
                if script::extract_destination(&coin.output.script_pubkey) != Some(address) {
                    continue;
                }
                coin_control.select(coin.outpoint);
                selected += coin.output.value;
                if selected > params.proposal_fee {
                    break;
                }
            }
            // Need headroom over the fee for the network fee itself.
            if selected <= params.proposal_fee {
                continue;
            }
            coin_control.change_destination = Some(address);
        } else {
            // Change goes to the address of the largest utxo.
            coins.sort_by(|a, b| b.output.value.cmp(&a.output.value));
            let Some(dest) = coins
                .iter()
                .find_map(|c| script::extract_destination(&c.output.script_pubkey))
            else {
                continue;
            };
            coin_control.allow_other_inputs = true;
            coin_control.change_destination = Some(dest);
        }

        let recipient = Recipient {
            script_pubkey: script::op_return_script(&payload),
            amount: params.proposal_fee,
            subtract_fee: false,
        };
        let tx = wallet.create_transaction(&[recipient], &coin_control).map_err(|e| {
            GovernanceError::Wallet(format!(
                "Failed to create the proposal submission transaction: {e}"
            ))
        })?;
        wallet
            .commit_transaction(&tx)
            .map_err(|e| GovernanceError::BroadcastRejected(e.to_string()))?;
        return Ok(tx);
    }

    Err(GovernanceError::Wallet(format!(
        "Failed to create proposal, check that your wallet is unlocked with a balance of at least {}",
        format_money(params.proposal_fee)
    )))
}
