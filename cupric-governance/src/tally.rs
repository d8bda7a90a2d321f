//! Coin-weighted vote tallies with anti-double-counting.
//!
//! Votes sharing a carrying transaction were signed by one party, and votes
//! sharing a destination key belong to one party, so both relations merge
//! votes into a single "signer cluster". Each cluster's coin weight is
//! summed and truncated to whole votes independently; a holder sharding
//! utxos across many transactions gains nothing.

use crate::vote::{Vote, VoteChoice};
use cupric_shared_types::{Amount, ConsensusParams, Hash, PubKeyHash};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Per-proposal result: whole-vote counts and the raw coin amounts behind
/// them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub yes: i64,
    pub no: i64,
    pub abstain: i64,
    pub cyes: Amount,
    pub cno: Amount,
    pub cabstain: Amount,
}

/// Computes the tally for one proposal over a flat vote set.
///
/// Clusters are visited in sorted transaction order so repeated runs over
/// the same set produce identical intermediate tallies; the `counted` set
/// guarantees each vote contributes exactly once regardless.
pub fn tally_votes(proposal: &Hash, votes: &[Vote], params: &ConsensusParams) -> Tally {
    let proposal_votes: Vec<&Vote> = votes.iter().filter(|v| &v.proposal == proposal).collect();

    // Group by carrying tx and by recovered destination.
    let mut by_tx: BTreeMap<Hash, Vec<usize>> = BTreeMap::new();
    let mut by_dest: HashMap<PubKeyHash, Vec<usize>> = HashMap::new();
    for (i, vote) in proposal_votes.iter().enumerate() {
        by_tx.entry(vote.outpoint.txid).or_default().push(i);
        by_dest.entry(vote.keyid).or_default().push(i);
    }

    let mut counted: HashSet<Hash> = HashSet::new();
    let mut tallies: Vec<Tally> = Vec::new();
    for members in by_tx.values() {
        // The cluster: every vote in this tx plus every vote sharing a
        // destination with one of them.
        let mut cluster: BTreeMap<Hash, usize> = BTreeMap::new();
        for &i in members {
            cluster.insert(proposal_votes[i].hash(), i);
            if let Some(shared) = by_dest.get(&proposal_votes[i].keyid) {
                for &j in shared {
                    cluster.insert(proposal_votes[j].hash(), j);
                }
            }
        }
        cluster.retain(|hash, _| !counted.contains(hash));
        if cluster.is_empty() {
            continue; // nothing left to count
        }

        let mut tally = Tally::default();
        for (hash, &i) in &cluster {
            counted.insert(*hash);
            let vote = proposal_votes[i];
            match vote.vote_choice() {
                Some(VoteChoice::Yes) => tally.cyes += vote.amount,
                Some(VoteChoice::No) => tally.cno += vote.amount,
                Some(VoteChoice::Abstain) => tally.cabstain += vote.amount,
                None => {}
            }
        }
        tally.yes = tally.cyes / params.vote_balance;
        tally.no = tally.cno / params.vote_balance;
        tally.abstain = tally.cabstain / params.vote_balance;
        tallies.push(tally);
    }

    // Sum across all clusters that voted on this proposal.
    let mut total = Tally::default();
    for tally in tallies {
        total.yes += tally.yes;
        total.no += tally.no;
        total.abstain += tally.abstain;
        total.cyes += tally.cyes;
        total.cno += tally.cno;
        total.cabstain += tally.cabstain;
    }
    total
}
