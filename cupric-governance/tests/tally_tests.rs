//! Tally engine tests: coin weighting, clustering and double-count
//! prevention.

mod common;

use common::{new_voter, rand_outpoint, MockChain, Voter};
use cupric_governance::{tally_votes, Vote, VoteChoice};
use cupric_shared_types::{Amount, ConsensusParams, Hash, OutPoint, COIN};

/// Builds a hydrated, signed vote and pins the outpoint of the OP_RETURN
/// output that would carry it.
fn make_vote(
    proposal: &Hash,
    choice: VoteChoice,
    amount: Amount,
    voter: &Voter,
    carrying_txid: Hash,
    carrying_vout: u32,
    chain: &mut MockChain,
) -> Vote {
    let utxo = rand_outpoint();
    chain.fund(utxo, amount, &voter.keyid);
    let mut vote = Vote::new(*proposal, choice, utxo, &*chain);
    vote.sign(&voter.secret).unwrap();
    vote.outpoint = OutPoint::new(carrying_txid, carrying_vout);
    vote
}

/// One signer votes YES from two utxos in a single transaction, a second
/// signer votes NO from another. Amounts sum per cluster before the
/// whole-vote truncation.
#[test]
fn coin_weighted_tally_with_clustering() {
    let params = ConsensusParams::default(); // vote_balance = 5000 COIN
    let mut chain = MockChain::new();
    let proposal = [0x11u8; 32];

    let alice = new_voter();
    let bob = new_voter();
    let tx1 = [0xa1u8; 32];
    let tx2 = [0xb2u8; 32];

    let votes = vec![
        make_vote(&proposal, VoteChoice::Yes, 6000 * COIN, &alice, tx1, 0, &mut chain),
        make_vote(&proposal, VoteChoice::Yes, 5000 * COIN, &alice, tx1, 1, &mut chain),
        make_vote(&proposal, VoteChoice::No, 5000 * COIN, &bob, tx2, 0, &mut chain),
    ];

    let tally = tally_votes(&proposal, &votes, &params);
    assert_eq!(tally.yes, 2);
    assert_eq!(tally.no, 1);
    assert_eq!(tally.abstain, 0);
    assert_eq!(tally.cyes, 11_000 * COIN);
    assert_eq!(tally.cno, 5000 * COIN);
    assert_eq!(tally.cabstain, 0);
}

/// Votes from the same destination in different transactions merge into one
/// cluster: two sub-threshold utxos still add up to a whole vote.
#[test]
fn same_destination_clusters_across_transactions() {
    let params = ConsensusParams::default();
    let mut chain = MockChain::new();
    let proposal = [0x22u8; 32];

    let alice = new_voter();
    let votes = vec![
        make_vote(&proposal, VoteChoice::Yes, 3000 * COIN, &alice, [0xc1u8; 32], 0, &mut chain),
        make_vote(&proposal, VoteChoice::Yes, 3000 * COIN, &alice, [0xd2u8; 32], 0, &mut chain),
    ];

    let tally = tally_votes(&proposal, &votes, &params);
    assert_eq!(tally.cyes, 6000 * COIN);
    assert_eq!(tally.yes, 1, "cluster sums before truncation");
    // Each vote counted exactly once even though both tx groups reach the
    // same destination cluster.
    assert_eq!(tally.cyes + tally.cno + tally.cabstain, 6000 * COIN);
}

/// Unrelated signers truncate independently: two 3000-coin holders don't
/// pool into one whole vote.
#[test]
fn separate_signers_truncate_separately() {
    let params = ConsensusParams::default();
    let mut chain = MockChain::new();
    let proposal = [0x33u8; 32];

    let alice = new_voter();
    let bob = new_voter();
    let votes = vec![
        make_vote(&proposal, VoteChoice::Yes, 3000 * COIN, &alice, [0xe1u8; 32], 0, &mut chain),
        make_vote(&proposal, VoteChoice::Yes, 3000 * COIN, &bob, [0xf2u8; 32], 0, &mut chain),
    ];

    let tally = tally_votes(&proposal, &votes, &params);
    assert_eq!(tally.cyes, 6000 * COIN);
    assert_eq!(tally.yes, 0);
}

/// Votes for other proposals never leak into a tally.
#[test]
fn tally_filters_by_proposal() {
    let params = ConsensusParams::default();
    let mut chain = MockChain::new();
    let target = [0x44u8; 32];
    let other = [0x55u8; 32];

    let alice = new_voter();
    let votes = vec![
        make_vote(&target, VoteChoice::Yes, 5000 * COIN, &alice, [0x61u8; 32], 0, &mut chain),
        make_vote(&other, VoteChoice::No, 5000 * COIN, &alice, [0x62u8; 32], 0, &mut chain),
    ];

    let tally = tally_votes(&target, &votes, &params);
    assert_eq!(tally.yes, 1);
    assert_eq!(tally.no, 0);
    assert_eq!(tally.cno, 0);
}

/// P6: adding YES votes never decreases the YES coin total.
#[test]
fn adding_yes_votes_is_monotonic() {
    let params = ConsensusParams::default();
    let mut chain = MockChain::new();
    let proposal = [0x66u8; 32];

    let mut votes = Vec::new();
    let mut last_cyes = 0;
    for i in 0..6u8 {
        let voter = new_voter();
        votes.push(make_vote(
            &proposal,
            VoteChoice::Yes,
            1500 * COIN,
            &voter,
            [i; 32],
            0,
            &mut chain,
        ));
        let tally = tally_votes(&proposal, &votes, &params);
        assert!(tally.cyes >= last_cyes);
        last_cyes = tally.cyes;
    }
    assert_eq!(last_cyes, 9000 * COIN);
}

/// P7: counted coin never exceeds the sum of the unique voting utxos.
#[test]
fn tally_never_double_counts() {
    let params = ConsensusParams::default();
    let mut chain = MockChain::new();
    let proposal = [0x77u8; 32];

    // A tangled set: one signer spread over three transactions, one
    // transaction shared between two signers.
    let alice = new_voter();
    let bob = new_voter();
    let votes = vec![
        make_vote(&proposal, VoteChoice::Yes, 2000 * COIN, &alice, [0x01u8; 32], 0, &mut chain),
        make_vote(&proposal, VoteChoice::Yes, 2500 * COIN, &alice, [0x02u8; 32], 0, &mut chain),
        make_vote(&proposal, VoteChoice::No, 1000 * COIN, &alice, [0x03u8; 32], 0, &mut chain),
        make_vote(&proposal, VoteChoice::No, 4000 * COIN, &bob, [0x03u8; 32], 1, &mut chain),
        make_vote(&proposal, VoteChoice::Abstain, 500 * COIN, &bob, [0x04u8; 32], 0, &mut chain),
    ];
    let unique_total: Amount = votes.iter().map(|v| v.amount).sum();

    let tally = tally_votes(&proposal, &votes, &params);
    assert_eq!(tally.cyes + tally.cno + tally.cabstain, unique_total);
}

/// Repeated tallies over the same set are identical.
#[test]
fn tally_is_deterministic() {
    let params = ConsensusParams::default();
    let mut chain = MockChain::new();
    let proposal = [0x88u8; 32];

    let mut votes = Vec::new();
    for i in 0..8u8 {
        let voter = new_voter();
        let choice = match i % 3 {
            0 => VoteChoice::Yes,
            1 => VoteChoice::No,
            _ => VoteChoice::Abstain,
        };
        votes.push(make_vote(
            &proposal,
            choice,
            (1000 + i as Amount * 700) * COIN,
            &voter,
            [i; 32],
            0,
            &mut chain,
        ));
    }

    let first = tally_votes(&proposal, &votes, &params);
    for _ in 0..5 {
        assert_eq!(tally_votes(&proposal, &votes, &params), first);
    }
}

#[test]
fn empty_vote_set_tallies_to_zero() {
    let params = ConsensusParams::default();
    let tally = tally_votes(&[0x99u8; 32], &[], &params);
    assert_eq!(tally, Default::default());
}
