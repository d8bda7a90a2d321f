//! The governance engine: authoritative in-memory proposal and vote sets,
//! fed by block-connected / block-disconnected notifications.
//!
//! A single mutex guards both maps. It is held only across the final
//! insert/erase steps, never across block reads, signature recovery or
//! chain-state lookups, and the chain's own locks are always taken first.

use crate::chain::{is_utxo_spent, BlockIndex, ChainAccess};
use crate::error::GovernanceError;
use crate::proposal::Proposal;
use crate::tally::{tally_votes, Tally};
use crate::vote::Vote;
use crate::{RecordType, ShutdownToken, NETWORK_VERSION};
use cupric_shared_types::{script, Block, ConsensusParams, Hash, OutPoint};
use log::{debug, warn};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

#[derive(Default)]
struct EngineState {
    proposals: HashMap<Hash, Proposal>,
    votes: HashMap<Hash, Vote>,
}

/// Owns the governance state for one chain. The host creates one engine and
/// routes its validation callbacks here; tests create as many isolated
/// engines as they need.
pub struct GovernanceEngine {
    params: ConsensusParams,
    state: Mutex<EngineState>,
}

impl GovernanceEngine {
    pub fn new(params: ConsensusParams) -> Self {
        GovernanceEngine { params, state: Mutex::new(EngineState::default()) }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Returns true if the proposal with the specified hash exists.
    pub fn has_proposal(&self, hash: &Hash) -> bool {
        self.state.lock().unwrap().proposals.contains_key(hash)
    }

    /// Returns true if the vote with the specified hash exists.
    pub fn has_vote(&self, hash: &Hash) -> bool {
        self.state.lock().unwrap().votes.contains_key(hash)
    }

    /// Returns true if any known vote matches the specified proposal and
    /// voting utxo.
    pub fn has_vote_by(&self, proposal: &Hash, utxo: &OutPoint) -> bool {
        let state = self.state.lock().unwrap();
        state.votes.values().any(|v| &v.utxo == utxo && &v.proposal == proposal)
    }

    /// Fetch the specified proposal.
    pub fn get_proposal(&self, hash: &Hash) -> Option<Proposal> {
        self.state.lock().unwrap().proposals.get(hash).cloned()
    }

    /// Fetch the specified vote.
    pub fn get_vote(&self, hash: &Hash) -> Option<Vote> {
        self.state.lock().unwrap().votes.get(hash).cloned()
    }

    /// Fetch the list of all known proposals.
    pub fn proposals(&self) -> Vec<Proposal> {
        self.state.lock().unwrap().proposals.values().cloned().collect()
    }

    /// Fetch the list of all known votes.
    pub fn votes(&self) -> Vec<Vote> {
        self.state.lock().unwrap().votes.values().cloned().collect()
    }

    /// Fetch all votes for the specified proposal.
    pub fn votes_for(&self, proposal: &Hash) -> Vec<Vote> {
        let state = self.state.lock().unwrap();
        state.votes.values().filter(|v| &v.proposal == proposal).cloned().collect()
    }

    /// Proposals and votes observed at or after the given height.
    pub fn proposals_since(&self, height: i32) -> (Vec<Proposal>, Vec<Vote>) {
        let state = self.state.lock().unwrap();
        let proposals =
            state.proposals.values().filter(|p| p.block_number >= height).cloned().collect();
        let votes = state.votes.values().filter(|v| v.block_number >= height).cloned().collect();
        (proposals, votes)
    }

    /// Coin-weighted tally for the specified proposal over the current vote
    /// set.
    pub fn tally_for(&self, proposal: &Hash) -> Tally {
        tally_votes(proposal, &self.votes(), &self.params)
    }

    /// Drops all governance state.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.proposals.clear();
        state.votes.clear();
    }

    /// Ingests a newly connected block: stores accepted proposals, applies
    /// the vote supersession rule, then invalidates any stored vote whose
    /// utxo was spent by this block.
    pub fn block_connected(&self, block: &Block, index: &BlockIndex, chain: &dyn ChainAccess) {
        let (proposals, votes) = self.data_from_block(block, Some(index), chain);

        let mut state = self.state.lock().unwrap();
        for (hash, proposal) in proposals {
            state.proposals.insert(hash, proposal);
        }
        for (hash, vote) in votes {
            if !state.proposals.contains_key(&vote.proposal) {
                debug!("governance: dropping vote {} without proposal", hex::encode(hash));
                continue;
            }
            // A changed vote only counts if it is more recent than the stored
            // one. Votes landing at the same time fall back to the larger
            // sig-hash so every node picks the same winner.
            let supersedes = match state.votes.get(&hash) {
                Some(stored) => {
                    vote.time > stored.time
                        || (vote.time == stored.time && vote.sig_hash() > stored.sig_hash())
                }
                None => true,
            };
            if supersedes {
                state.votes.insert(hash, vote);
            }
        }

        // Any vote whose utxo is consumed by this block loses its authority.
        let mut prevouts: HashSet<OutPoint> = HashSet::new();
        for tx in &block.transactions {
            for vin in &tx.inputs {
                prevouts.insert(vin.previous_output);
            }
        }
        state.votes.retain(|_, vote| !prevouts.contains(&vote.utxo));
    }

    /// Rolls back a disconnected block by erasing its records. Votes that
    /// were superseded by this block are NOT restored; deep reorgs rely on a
    /// host-triggered rescan.
    pub fn block_disconnected(&self, block: &Block, chain: &dyn ChainAccess) {
        // Cutoff checks are disabled here: the records were valid when the
        // block connected.
        let (proposals, votes) = self.data_from_block(block, None, chain);
        let mut state = self.state.lock().unwrap();
        for hash in proposals.keys() {
            state.proposals.remove(hash);
        }
        for hash in votes.keys() {
            state.votes.remove(hash);
        }
    }

    /// Rebuilds the governance state from the chain. Blocks from the
    /// governance activation height to the tip are sharded across one range
    /// per core and replayed through the block-connected path; afterwards
    /// every stored vote is re-checked against the utxo set (without the
    /// mempool) and spent ones are dropped, sharded the same way.
    pub fn load_governance_data(
        &self,
        chain: &dyn ChainAccess,
        shutdown: &ShutdownToken,
    ) -> Result<(), GovernanceError> {
        let block_height = chain.height();
        // Nothing to load on the genesis block or before governance activates.
        if block_height == 0 || block_height < self.params.governance_block {
            return Ok(());
        }

        let cores = num_cpus::get().max(1) as i32;
        let failed = AtomicBool::new(false);
        let fail_reason: Mutex<String> = Mutex::new(String::new());

        let total_blocks = block_height - self.params.governance_block;
        let slice = total_blocks / cores;
        thread::scope(|scope| {
            for k in 0..cores {
                let start = self.params.governance_block + k * slice;
                // +1 on the last range so the tip itself is included
                let end = if k == cores - 1 { block_height + 1 } else { start + slice };
                let failed = &failed;
                let fail_reason = &fail_reason;
                scope.spawn(move || {
                    for block_number in start..end {
                        if shutdown.requested() {
                            failed.store(true, Ordering::Relaxed);
                            break;
                        }
                        let Some(index) = chain.block_index(block_number) else {
                            failed.store(true, Ordering::Relaxed);
                            let mut reason = fail_reason.lock().unwrap();
                            reason.push_str(&format!(
                                "Failed to read block index for block {block_number}\n"
                            ));
                            return;
                        };
                        match chain.read_block(&index) {
                            Ok(block) => self.block_connected(&block, &index, chain),
                            Err(e) => {
                                failed.store(true, Ordering::Relaxed);
                                let mut reason = fail_reason.lock().unwrap();
                                reason.push_str(&format!(
                                    "Failed to read block from disk for block {block_number}: {e}\n"
                                ));
                                return;
                            }
                        }
                    }
                });
            }
        });

        if shutdown.requested() {
            return Err(GovernanceError::ShutdownRequested);
        }
        if failed.load(Ordering::Relaxed) {
            return Err(GovernanceError::ChainRead(fail_reason.into_inner().unwrap()));
        }

        // All votes are loaded; drop the ones whose utxos were spent later in
        // the chain. The full set is in memory so the check shards cleanly.
        let snapshot = self.votes();
        if snapshot.is_empty() {
            return Ok(());
        }
        let cores = cores as usize;
        let slice = snapshot.len() / cores;
        thread::scope(|scope| {
            for k in 0..cores {
                let start = k * slice;
                let end = if k == cores - 1 { snapshot.len() } else { start + slice };
                let votes = &snapshot[start..end];
                let failed = &failed;
                scope.spawn(move || {
                    for vote in votes {
                        if shutdown.requested() {
                            failed.store(true, Ordering::Relaxed);
                            break;
                        }
                        // No mempool check here; it might not be loaded yet.
                        if is_utxo_spent(chain, &vote.utxo, false) {
                            self.state.lock().unwrap().votes.remove(&vote.hash());
                        }
                    }
                });
            }
        });

        if shutdown.requested() {
            return Err(GovernanceError::ShutdownRequested);
        }
        Ok(())
    }

    /// Extracts accepted proposals and votes from a block.
    ///
    /// With a block index present, cutoffs apply at that height and a vote's
    /// proposal must be known, either from this same block or from the
    /// store. Without one (initial decode, disconnect) the cutoff checks are
    /// skipped.
    fn data_from_block(
        &self,
        block: &Block,
        index: Option<&BlockIndex>,
        chain: &dyn ChainAccess,
    ) -> (BTreeMap<Hash, Proposal>, BTreeMap<Hash, Vote>) {
        let block_number = index.map(|i| i.height).unwrap_or(0);
        let time = block.time();
        let mut proposals: BTreeMap<Hash, Proposal> = BTreeMap::new();
        let mut votes: BTreeMap<Hash, Vote> = BTreeMap::new();

        for tx in &block.transactions {
            if tx.is_coinbase() {
                continue;
            }
            let txid = tx.txid();
            for (n, out) in tx.outputs.iter().enumerate() {
                if out.script_pubkey.first() != Some(&script::OP_RETURN) {
                    continue; // no governance data
                }
                let Some(payload) = script::first_push(&out.script_pubkey) else {
                    continue;
                };
                if payload.len() < 2 || payload[0] != NETWORK_VERSION {
                    continue; // must match expected version
                }
                match RecordType::from_u8(payload[1]) {
                    RecordType::Proposal => {
                        let proposal = match Proposal::from_payload(payload, block_number) {
                            Ok(p) => p,
                            Err(_) => continue,
                        };
                        if let Err(e) = proposal.validate(&self.params) {
                            debug!("governance: {e}");
                            continue;
                        }
                        if index.is_some() && !proposal.meets_cutoff(block_number, &self.params) {
                            debug!(
                                "governance: proposal {} past submission cutoff",
                                proposal.name
                            );
                            continue;
                        }
                        proposals.insert(proposal.hash(), proposal);
                    }
                    RecordType::Vote => {
                        let vote = match Vote::from_payload(
                            payload,
                            OutPoint::new(txid, n as u32),
                            time,
                            block_number,
                            chain,
                        ) {
                            Ok(v) => v,
                            Err(_) => continue,
                        };
                        if let Err(e) = vote.validate(&self.params, chain) {
                            debug!("governance: {e}");
                            continue;
                        }
                        if index.is_some() && !self.vote_meets_cutoff(&vote, &proposals, block_number) {
                            continue;
                        }
                        // The carrying transaction must itself reveal the
                        // voter's key in a scriptSig; a copied vote
                        // rebroadcast by a non-owner doesn't count.
                        if !tx.inputs.iter().any(|vin| vote.matches_vin_pubkey(vin)) {
                            warn!(
                                "governance: vote {} has no matching vin pubkey",
                                hex::encode(vote.hash())
                            );
                            continue;
                        }
                        // Votes on the same utxo within one block share a
                        // time; the larger sig-hash wins deterministically.
                        match votes.entry(vote.hash()) {
                            Entry::Occupied(mut e) => {
                                if vote.sig_hash() > e.get().sig_hash() {
                                    e.insert(vote);
                                }
                            }
                            Entry::Vacant(e) => {
                                e.insert(vote);
                            }
                        }
                    }
                    RecordType::None => {}
                }
            }
        }
        (proposals, votes)
    }

    /// Votes can arrive multiple superblocks in advance if their proposal
    /// targets a future superblock; the cutoff is relative to the proposal's
    /// superblock. The proposal may come from the same block.
    fn vote_meets_cutoff(
        &self,
        vote: &Vote,
        same_block: &BTreeMap<Hash, Proposal>,
        block_number: i32,
    ) -> bool {
        let superblock = match same_block.get(&vote.proposal) {
            Some(p) => p.superblock,
            None => match self.get_proposal(&vote.proposal) {
                Some(p) => p.superblock,
                None => return false, // no proposal found
            },
        };
        block_number <= superblock - self.params.voting_cutoff
    }
}
