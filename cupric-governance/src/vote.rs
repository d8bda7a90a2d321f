//! Vote records.
//!
//! A vote is cast *on behalf of* a utxo: the utxo is not spent, its owner
//! signs the vote with the utxo's key, and the utxo's value is the vote's
//! coin weight. The vote's identity deliberately excludes the choice so a
//! later vote from the same utxo on the same proposal supersedes the old one.

use crate::chain::{is_utxo_spent, ChainAccess};
use crate::error::GovernanceError;
use crate::wire::{Reader, Writer};
use crate::{RecordType, NETWORK_VERSION};
use cupric_crypto::{key_id, recover_compact, sign_compact};
use cupric_shared_types::{script, Amount, ConsensusParams, Hash, OutPoint, PubKeyHash, TxInput};
use secp256k1::{PublicKey, SecretKey};
use std::str::FromStr;

/// The three vote choices, as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VoteChoice {
    No = 0,
    Yes = 1,
    Abstain = 2,
}

impl VoteChoice {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(VoteChoice::No),
            1 => Some(VoteChoice::Yes),
            2 => Some(VoteChoice::Abstain),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VoteChoice::No => "no",
            VoteChoice::Yes => "yes",
            VoteChoice::Abstain => "abstain",
        }
    }
}

impl FromStr for VoteChoice {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yes" => Ok(VoteChoice::Yes),
            "no" => Ok(VoteChoice::No),
            "abstain" => Ok(VoteChoice::Abstain),
            _ => Err(GovernanceError::InvalidVote { reason: format!("Unknown vote type {s}") }),
        }
    }
}

impl std::fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coin-weighted vote on a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// Record version as observed on the wire.
    pub version: u8,
    /// Hash of the proposal being voted on.
    pub proposal: Hash,
    /// Raw choice byte; values outside [`VoteChoice`] fail validation.
    pub choice: u8,
    /// The utxo casting this vote. Not spent by the vote transaction.
    pub utxo: OutPoint,
    /// Compact recoverable signature over [`Vote::sig_hash`].
    pub signature: Vec<u8>,

    // Memory-only fields, never serialized.
    /// Public key recovered from the signature.
    pub pubkey: Option<PublicKey>,
    /// Location of the OP_RETURN output that carried this vote.
    pub outpoint: OutPoint,
    /// Time of the containing block.
    pub time: i64,
    /// Value of the voting utxo (not the OP_RETURN output, which is zero).
    pub amount: Amount,
    /// Key-id of the voting utxo's destination.
    pub keyid: PubKeyHash,
    /// Height of the containing block.
    pub block_number: i32,
}

impl Vote {
    /// Creates an unsigned vote for the given utxo, resolving the utxo's
    /// destination and value through the chain's utxo view.
    pub fn new(proposal: Hash, choice: VoteChoice, utxo: OutPoint, chain: &dyn ChainAccess) -> Self {
        let mut vote = Vote {
            version: NETWORK_VERSION,
            proposal,
            choice: choice.to_u8(),
            utxo,
            signature: Vec::new(),
            pubkey: None,
            outpoint: OutPoint::null(),
            time: 0,
            amount: 0,
            keyid: [0u8; 20],
            block_number: 0,
        };
        vote.load_destination(chain);
        vote
    }

    /// Decodes a vote from an OP_RETURN payload, recovering the signer and
    /// resolving the utxo. `outpoint` locates the carrying output, `time` is
    /// the block time and `block_number` the containing height (zero when
    /// unknown).
    pub fn from_payload(
        payload: &[u8],
        outpoint: OutPoint,
        time: i64,
        block_number: i32,
        chain: &dyn ChainAccess,
    ) -> Result<Self, GovernanceError> {
        let mut r = Reader::new(payload);
        let version = r.u8()?;
        if r.u8()? != RecordType::Vote as u8 {
            return Err(GovernanceError::MalformedRecord);
        }
        let proposal = r.hash()?;
        let choice = r.u8()?;
        let utxo = r.outpoint()?;
        let signature = r.var_bytes()?;

        let mut vote = Vote {
            version,
            proposal,
            choice,
            utxo,
            signature,
            pubkey: None,
            outpoint,
            time,
            amount: 0,
            keyid: [0u8; 20],
            block_number,
        };
        vote.pubkey = recover_compact(&vote.sig_hash(), &vote.signature).ok();
        vote.load_destination(chain);
        Ok(vote)
    }

    /// The vote's identity: excludes the choice so a changed vote from the
    /// same utxo on the same proposal collides with, and supersedes, the old
    /// one.
    pub fn hash(&self) -> Hash {
        let mut w = Writer::new();
        w.put_u8(self.version);
        w.put_u8(RecordType::Vote as u8);
        w.put_hash(&self.proposal);
        w.put_outpoint(&self.utxo);
        cupric_crypto::sha256d(&w.into_bytes())
    }

    /// The signed digest; unlike [`Vote::hash`] this covers the choice.
    pub fn sig_hash(&self) -> Hash {
        let mut w = Writer::new();
        w.put_u8(self.version);
        w.put_u8(RecordType::Vote as u8);
        w.put_hash(&self.proposal);
        w.put_u8(self.choice);
        w.put_outpoint(&self.utxo);
        cupric_crypto::sha256d(&w.into_bytes())
    }

    /// Serializes the vote into its OP_RETURN payload form.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u8(self.version);
        w.put_u8(RecordType::Vote as u8);
        w.put_hash(&self.proposal);
        w.put_u8(self.choice);
        w.put_outpoint(&self.utxo);
        w.put_var_bytes(&self.signature);
        w.into_bytes()
    }

    /// Signs the vote with the voting utxo's private key.
    pub fn sign(&mut self, key: &SecretKey) -> Result<(), GovernanceError> {
        self.signature.clear();
        let sig = sign_compact(key, &self.sig_hash())
            .map_err(|e| GovernanceError::InvalidVote { reason: format!("signing failed: {e}") })?;
        self.signature = sig.to_vec();
        self.pubkey = Some(
            recover_compact(&self.sig_hash(), &self.signature)
                .map_err(|e| GovernanceError::InvalidVote { reason: format!("recovery failed: {e}") })?,
        );
        Ok(())
    }

    /// The parsed choice, when the raw byte is a known value.
    pub fn vote_choice(&self) -> Option<VoteChoice> {
        VoteChoice::from_u8(self.choice)
    }

    /// Checks every consensus rule for this vote, reporting the first
    /// violation. The utxo binding is the heart of it: the recovered signer
    /// must own the script at the voting utxo, and that utxo must still be
    /// unspent.
    pub fn validate(&self, params: &ConsensusParams, chain: &dyn ChainAccess) -> Result<(), GovernanceError> {
        if self.version != NETWORK_VERSION {
            return Err(GovernanceError::InvalidVote {
                reason: format!("Bad vote network version, expected {}", NETWORK_VERSION),
            });
        }
        if self.vote_choice().is_none() {
            return Err(GovernanceError::InvalidVote {
                reason: format!("Unknown vote type {}", self.choice),
            });
        }
        if self.amount < params.vote_min_utxo_amount {
            return Err(GovernanceError::InvalidVote {
                reason: "Voting utxo amount is below the minimum".into(),
            });
        }
        if self.keyid == [0u8; 20] {
            return Err(GovernanceError::InvalidVote {
                reason: "Voting utxo destination is unknown".into(),
            });
        }
        match self.pubkey {
            Some(pubkey) if key_id(&pubkey) == self.keyid => {}
            _ => {
                return Err(GovernanceError::InvalidVote {
                    reason: "Vote signature does not match the utxo owner".into(),
                })
            }
        }
        if is_utxo_spent(chain, &self.utxo, true) {
            return Err(GovernanceError::UtxoSpent);
        }
        Ok(())
    }

    pub fn is_valid(&self, params: &ConsensusParams, chain: &dyn ChainAccess) -> bool {
        self.validate(params, chain).is_ok()
    }

    /// True if the input's scriptSig reveals a public key whose key-id
    /// matches this vote's signer. Scans only the first pubkey-sized push;
    /// exotic script types intentionally never match.
    pub fn matches_vin_pubkey(&self, vin: &TxInput) -> bool {
        let Some(data) = script::first_pubkey_push(&vin.script_sig) else {
            return false;
        };
        let Ok(vin_pubkey) = PublicKey::from_slice(data) else {
            return false;
        };
        match self.pubkey {
            Some(pubkey) => key_id(&vin_pubkey) == key_id(&pubkey),
            None => false,
        }
    }

    /// Resolves the key-id and value of the voting utxo.
    fn load_destination(&mut self, chain: &dyn ChainAccess) {
        if let Some(coin) = chain.get_coin(&self.utxo) {
            if let Some(keyid) = script::extract_destination(&coin.output.script_pubkey) {
                self.keyid = keyid;
                self.amount = coin.output.value;
            }
        }
    }
}
