//! In-memory chain and wallet doubles backing the governance suites.
#![allow(dead_code)] // each test binary uses its own subset

use cupric_crypto::{generate_keypair, key_id};
use cupric_governance::{BlockIndex, ChainAccess, Coin, CoinControl, Recipient, Vote, VoteChoice, WalletAccess, WalletOutput};
use cupric_shared_types::{
    script, Amount, Block, BlockHeader, Hash, OutPoint, PubKeyHash, Transaction, TxInput, TxOutput,
};
use secp256k1::{PublicKey, SecretKey};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

/// A keypair acting as one coin holder.
pub struct Voter {
    pub secret: SecretKey,
    pub pubkey: PublicKey,
    pub keyid: PubKeyHash,
}

pub fn new_voter() -> Voter {
    let (secret, pubkey) = generate_keypair();
    Voter { secret, pubkey, keyid: key_id(&pubkey) }
}

pub fn rand_outpoint() -> OutPoint {
    OutPoint::new(rand::random::<[u8; 32]>(), 0)
}

/// Minimal in-memory chain: a block list plus a utxo view kept in sync as
/// blocks are appended.
pub struct MockChain {
    blocks: Vec<Block>,
    coins: HashMap<OutPoint, Coin>,
    pub mempool_spent: HashSet<OutPoint>,
}

impl MockChain {
    pub fn new() -> Self {
        let genesis = Block {
            header: BlockHeader {
                version: 1,
                previous_block_hash: [0u8; 32],
                merkle_root: [0u8; 32],
                timestamp: 0,
                nonce: 0,
                difficulty_target: 0,
            },
            transactions: vec![],
        };
        MockChain { blocks: vec![genesis], coins: HashMap::new(), mempool_spent: HashSet::new() }
    }

    /// Seeds an unspent P2PKH output outside any block.
    pub fn fund(&mut self, outpoint: OutPoint, value: Amount, keyid: &PubKeyHash) {
        self.coins.insert(
            outpoint,
            Coin { output: TxOutput::new(value, script::p2pkh_script(keyid)), height: 0, is_coinbase: false },
        );
    }

    /// Appends a block holding `transactions`, applying its spends and new
    /// outputs to the utxo view. Returns the block and its index entry.
    pub fn connect_block(&mut self, transactions: Vec<Transaction>, time: i64) -> (Block, BlockIndex) {
        let height = self.blocks.len() as i32;
        let block = Block {
            header: BlockHeader {
                version: 1,
                previous_block_hash: self.blocks.last().unwrap().hash(),
                merkle_root: [0u8; 32],
                timestamp: time,
                nonce: 0,
                difficulty_target: 0,
            },
            transactions,
        };
        for tx in &block.transactions {
            let txid = tx.txid();
            for vin in &tx.inputs {
                if !vin.previous_output.is_null() {
                    self.coins.remove(&vin.previous_output);
                }
            }
            for (n, out) in tx.outputs.iter().enumerate() {
                self.coins.insert(
                    OutPoint::new(txid, n as u32),
                    Coin { output: out.clone(), height, is_coinbase: tx.is_coinbase() },
                );
            }
        }
        let index = BlockIndex { hash: block.hash(), height, time };
        self.blocks.push(block.clone());
        (block, index)
    }

    /// Appends empty blocks until the tip sits at `height`.
    pub fn mine_to(&mut self, height: i32) {
        while self.height() < height {
            self.connect_block(vec![], 0);
        }
    }
}

impl ChainAccess for MockChain {
    fn height(&self) -> i32 {
        self.blocks.len() as i32 - 1
    }

    fn block_index(&self, height: i32) -> Option<BlockIndex> {
        let block = self.blocks.get(usize::try_from(height).ok()?)?;
        Some(BlockIndex { hash: block.hash(), height, time: block.time() })
    }

    fn read_block(&self, index: &BlockIndex) -> anyhow::Result<Block> {
        self.blocks
            .get(index.height as usize)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no block at height {}", index.height))
    }

    fn get_coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).cloned()
    }

    fn is_spent_in_mempool(&self, outpoint: &OutPoint) -> bool {
        self.mempool_spent.contains(outpoint)
    }
}

/// A transaction carrying a proposal record. The input spends an arbitrary
/// outpoint; proposals don't bind to their funding.
pub fn proposal_tx(proposal: &cupric_governance::Proposal) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput::new(rand_outpoint(), vec![])],
        outputs: vec![TxOutput::new(0, script::op_return_script(&proposal.to_payload()))],
        lock_time: 0,
    }
}

/// A transaction casting a signed vote on behalf of `voting_utxo`. The input
/// spends `input_utxo` (a separate coin, the voting utxo must stay unspent)
/// and reveals the voter's pubkey in its scriptSig, satisfying the vin
/// binding rule.
pub fn vote_tx(
    proposal: &Hash,
    choice: VoteChoice,
    voting_utxo: OutPoint,
    voter: &Voter,
    input_utxo: OutPoint,
    chain: &MockChain,
) -> Transaction {
    let mut vote = Vote::new(*proposal, choice, voting_utxo, chain);
    vote.sign(&voter.secret).expect("vote signing");
    Transaction {
        version: 1,
        inputs: vec![TxInput::new(input_utxo, script::push_data(&voter.pubkey.serialize()))],
        outputs: vec![TxOutput::new(0, script::op_return_script(&vote.to_payload()))],
        lock_time: 0,
    }
}

/// Decodes every governance vote payload carried by a transaction.
pub fn votes_in_tx(tx: &Transaction, chain: &MockChain) -> Vec<Vote> {
    let txid = tx.txid();
    tx.outputs
        .iter()
        .enumerate()
        .filter(|(_, out)| out.script_pubkey.first() == Some(&script::OP_RETURN))
        .filter_map(|(n, out)| {
            let payload = script::first_push(&out.script_pubkey)?;
            Vote::from_payload(payload, OutPoint::new(txid, n as u32), 0, 0, chain).ok()
        })
        .collect()
}

/// Single-address wallet double. Coins are shared with the chain fixture by
/// funding both with the same outpoints.
pub struct MockWallet {
    pub voter: Voter,
    pub locked: bool,
    pub flat_fee: Amount,
    coins: RefCell<Vec<WalletOutput>>,
    pub committed: RefCell<Vec<Transaction>>,
}

impl MockWallet {
    pub fn new(voter: Voter) -> Self {
        MockWallet {
            voter,
            locked: false,
            flat_fee: 10_000,
            coins: RefCell::new(Vec::new()),
            committed: RefCell::new(Vec::new()),
        }
    }

    /// Adds a coin to the wallet (the caller funds the chain separately).
    pub fn add_coin(&self, outpoint: OutPoint, value: Amount) {
        self.coins.borrow_mut().push(WalletOutput {
            outpoint,
            output: TxOutput::new(value, script::p2pkh_script(&self.voter.keyid)),
            spendable: true,
        });
    }
}

impl WalletAccess for MockWallet {
    fn is_locked(&self) -> bool {
        self.locked
    }

    fn balance(&self) -> Amount {
        self.coins.borrow().iter().map(|c| c.output.value).sum()
    }

    fn available_coins(&self) -> Vec<WalletOutput> {
        self.coins.borrow().clone()
    }

    fn key_for_destination(&self, dest: &PubKeyHash) -> Option<PubKeyHash> {
        (dest == &self.voter.keyid).then_some(*dest)
    }

    fn get_key(&self, keyid: &PubKeyHash) -> Option<SecretKey> {
        (keyid == &self.voter.keyid).then_some(self.voter.secret)
    }

    fn minimum_fee(&self, _tx_bytes: usize) -> Amount {
        self.flat_fee
    }

    fn create_transaction(
        &self,
        recipients: &[Recipient],
        coin_control: &CoinControl,
    ) -> anyhow::Result<Transaction> {
        let coins = self.coins.borrow();
        let outputs_total: Amount = recipients.iter().map(|r| r.amount).sum();

        let mut selected: Vec<&WalletOutput> = Vec::new();
        if coin_control.selected().is_empty() {
            if !coin_control.allow_other_inputs {
                anyhow::bail!("no inputs selected");
            }
            let mut total = 0;
            for coin in coins.iter() {
                selected.push(coin);
                total += coin.output.value;
                if total >= outputs_total + self.flat_fee {
                    break;
                }
            }
            if total < outputs_total + self.flat_fee {
                anyhow::bail!("insufficient funds");
            }
        } else {
            for outpoint in coin_control.selected() {
                let coin = coins
                    .iter()
                    .find(|c| &c.outpoint == outpoint)
                    .ok_or_else(|| anyhow::anyhow!("selected coin not found"))?;
                selected.push(coin);
            }
        }

        let inputs_total: Amount = selected.iter().map(|c| c.output.value).sum();
        let inputs = selected
            .iter()
            .map(|c| TxInput::new(c.outpoint, script::push_data(&self.voter.pubkey.serialize())))
            .collect();

        let mut outputs: Vec<TxOutput> =
            recipients.iter().map(|r| TxOutput::new(r.amount, r.script_pubkey.clone())).collect();
        let surplus = inputs_total - outputs_total - self.flat_fee;
        if surplus > 0 {
            let change_dest = coin_control.change_destination.unwrap_or(self.voter.keyid);
            outputs.push(TxOutput::new(surplus, script::p2pkh_script(&change_dest)));
        }

        Ok(Transaction { version: 1, inputs, outputs, lock_time: 0 })
    }

    fn commit_transaction(&self, tx: &Transaction) -> anyhow::Result<()> {
        let mut coins = self.coins.borrow_mut();
        for vin in &tx.inputs {
            coins.retain(|c| c.outpoint != vin.previous_output);
        }
        self.committed.borrow_mut().push(tx.clone());
        Ok(())
    }
}
