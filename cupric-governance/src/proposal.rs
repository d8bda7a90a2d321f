//! Proposal records.
//!
//! Proposals request a payout from a future superblock. Anyone willing to
//! burn the submission fee can create one; acceptance is purely rule-based.

use crate::error::GovernanceError;
use crate::wire::{Reader, Writer};
use crate::{RecordType, MAX_OP_RETURN_RELAY, NETWORK_VERSION};
use cupric_crypto::{is_valid_address, sha256d};
use cupric_shared_types::{format_money, Amount, ConsensusParams, Hash};

/// A community payout proposal targeting a specific superblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Record version as observed on the wire.
    pub version: u8,
    /// Display name; alphanumerics, underscores, spaces and dashes, with a
    /// word character at both ends.
    pub name: String,
    /// Target payout height; a positive multiple of the superblock period.
    pub superblock: i32,
    /// Requested payout in base units.
    pub amount: Amount,
    /// P2PKH payout destination, base58check encoded.
    pub address: String,
    /// Link to supporting material.
    pub url: String,
    pub description: String,
    /// Height of the block this proposal was observed in. Memory only, never
    /// serialized and excluded from the hash.
    pub block_number: i32,
}

impl Proposal {
    pub fn new(
        name: impl Into<String>,
        superblock: i32,
        amount: Amount,
        address: impl Into<String>,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Proposal {
            version: NETWORK_VERSION,
            name: name.into(),
            superblock,
            amount,
            address: address.into(),
            url: url.into(),
            description: description.into(),
            block_number: 0,
        }
    }

    /// The proposal's identity: sha256d over the hash-order serialization.
    /// Note `name` precedes `superblock` here, unlike the wire payload.
    pub fn hash(&self) -> Hash {
        let mut w = Writer::new();
        w.put_u8(self.version);
        w.put_u8(RecordType::Proposal as u8);
        w.put_var_string(&self.name);
        w.put_i32(self.superblock);
        w.put_i64(self.amount);
        w.put_var_string(&self.address);
        w.put_var_string(&self.url);
        w.put_var_string(&self.description);
        sha256d(&w.into_bytes())
    }

    /// Serializes the proposal into its OP_RETURN payload form.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u8(self.version);
        w.put_u8(RecordType::Proposal as u8);
        w.put_i32(self.superblock);
        w.put_i64(self.amount);
        w.put_var_string(&self.address);
        w.put_var_string(&self.name);
        w.put_var_string(&self.url);
        w.put_var_string(&self.description);
        w.into_bytes()
    }

    /// Decodes a proposal from an OP_RETURN payload. `block_number` is the
    /// height of the containing block, zero when unknown.
    pub fn from_payload(payload: &[u8], block_number: i32) -> Result<Self, GovernanceError> {
        let mut r = Reader::new(payload);
        let version = r.u8()?;
        if r.u8()? != RecordType::Proposal as u8 {
            return Err(GovernanceError::MalformedRecord);
        }
        let superblock = r.i32()?;
        let amount = r.i64()?;
        let address = r.var_string()?;
        let name = r.var_string()?;
        let url = r.var_string()?;
        let description = r.var_string()?;
        Ok(Proposal { version, name, superblock, amount, address, url, description, block_number })
    }

    /// Checks every consensus rule, reporting the first violation.
    pub fn validate(&self, params: &ConsensusParams) -> Result<(), GovernanceError> {
        if !is_valid_name(&self.name) {
            return Err(GovernanceError::InvalidProposal {
                reason: format!(
                    "Proposal name {} is invalid, only alphanumeric characters, spaces, dashes and underscores are accepted",
                    self.name
                ),
            });
        }
        if self.superblock <= 0 || self.superblock % params.superblock != 0 {
            return Err(GovernanceError::InvalidProposal {
                reason: format!("Bad superblock number {}", self.superblock),
            });
        }
        let max_amount = params.block_subsidy(self.superblock);
        if self.amount < params.proposal_min_amount || self.amount > max_amount {
            return Err(GovernanceError::InvalidProposal {
                reason: format!(
                    "Bad proposal amount, specify amount between {} - {}",
                    format_money(params.proposal_min_amount),
                    format_money(params.proposal_max_amount)
                ),
            });
        }
        if !is_valid_address(&self.address) {
            return Err(GovernanceError::InvalidProposal {
                reason: format!("Bad payment address {}", self.address),
            });
        }
        if self.version != NETWORK_VERSION {
            return Err(GovernanceError::InvalidProposal {
                reason: format!("Bad proposal network version, expected {}", NETWORK_VERSION),
            });
        }
        // -1 for OP_RETURN, -2 for pushdata opcodes
        let max_bytes = MAX_OP_RETURN_RELAY - 3;
        let size = self.to_payload().len();
        if size > max_bytes {
            return Err(GovernanceError::InvalidProposal {
                reason: format!(
                    "Proposal data is too long, try reducing the description by {} characters, expected total of {} bytes, received {}",
                    size - max_bytes,
                    max_bytes,
                    size
                ),
            });
        }
        Ok(())
    }

    pub fn is_valid(&self, params: &ConsensusParams) -> bool {
        self.validate(params).is_ok()
    }

    /// Proposals can be submitted multiple superblocks in advance, so the
    /// cutoff is relative to the proposal's own superblock.
    pub fn meets_cutoff(&self, block_number: i32, params: &ConsensusParams) -> bool {
        block_number <= self.superblock - params.proposal_cutoff
    }
}

/// Matches `^[A-Za-z0-9_][A-Za-z0-9_ -]*[A-Za-z0-9_]$`.
fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() < 2 {
        return false;
    }
    let word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    word(bytes[0])
        && word(bytes[bytes.len() - 1])
        && bytes[1..bytes.len() - 1]
            .iter()
            .all(|&b| word(b) || b == b' ' || b == b'-')
}
