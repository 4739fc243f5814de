use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use super::block::Block;
use super::pool::TransactionPool;
use super::pow::{CancelFlag, MiningError, ProofOfWork};
use super::transaction::Transaction;

/// Errors that can occur during ledger operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Chain is empty")]
    EmptyChain,

    #[error("Mining error: {0}")]
    MiningError(#[from] MiningError),
}

/// Chain and pool live behind one lock so sealing a block and draining the
/// pool can never interleave with another writer
#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pool: TransactionPool,
}

/// The authoritative local chain together with its pending transactions
#[derive(Debug)]
pub struct Ledger {
    state: Mutex<LedgerState>,

    /// Proof-of-work puzzle used when mining
    pow: ProofOfWork,

    /// Bumped on every change of the chain; lets a running proof search
    /// notice that the tip it works on is gone
    epoch: AtomicU64,
}

impl Ledger {
    /// Creates a new ledger holding only the genesis block
    pub fn new(pow: ProofOfWork) -> Self {
        Ledger {
            state: Mutex::new(LedgerState {
                chain: vec![Block::genesis()],
                pool: TransactionPool::new(),
            }),
            pow,
            epoch: AtomicU64::new(0),
        }
    }

    /// Gets the proof-of-work puzzle this ledger mines with
    pub fn pow(&self) -> ProofOfWork {
        self.pow
    }

    /// Gets the last block in the chain
    pub fn tip(&self) -> Result<Block, LedgerError> {
        self.state
            .lock()
            .chain
            .last()
            .cloned()
            .ok_or(LedgerError::EmptyChain)
    }

    /// Gets a copy of the entire chain
    pub fn chain(&self) -> Vec<Block> {
        self.state.lock().chain.clone()
    }

    /// Gets the number of blocks in the chain
    pub fn len(&self) -> usize {
        self.state.lock().chain.len()
    }

    /// Checks if the chain has no blocks (only after replacing it with an empty one)
    pub fn is_empty(&self) -> bool {
        self.state.lock().chain.is_empty()
    }

    /// Gets all transactions waiting for the next block
    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.state.lock().pool.transactions().to_vec()
    }

    /// Adds a transaction to the pool
    ///
    /// # Returns
    ///
    /// The index of the block expected to include it. Another block may be
    /// sealed first, so this is a prediction only.
    pub fn record_transaction(&self, transaction: Transaction) -> u64 {
        let mut state = self.state.lock();
        state.pool.add(transaction);
        state.chain.len() as u64 + 1
    }

    /// Seals the pooled transactions into a new block and appends it
    ///
    /// # Arguments
    ///
    /// * `proof` - The proof found for the current tip
    /// * `previous_hash` - Explicit link to the predecessor; defaults to the
    ///   hash of the current tip
    ///
    /// # Returns
    ///
    /// The appended block
    pub fn append_block(&self, proof: u64, previous_hash: Option<String>) -> Result<Block, LedgerError> {
        let mut state = self.state.lock();
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => Self::tip_hash(&state)?,
        };

        Ok(self.seal(&mut state, proof, previous_hash, Vec::new()))
    }

    /// Appends a block only if the tip still hashes to `previous_hash`
    ///
    /// `leading` transactions are placed ahead of the drained pool. The tip
    /// check and the append happen under one lock.
    ///
    /// # Arguments
    ///
    /// * `proof` - The proof found for the expected tip
    /// * `previous_hash` - Hash of the tip the proof was searched against
    /// * `leading` - Transactions sealed before the pooled ones
    ///
    /// # Returns
    ///
    /// The appended block, or `None` if the tip moved and nothing was appended
    pub fn append_block_on(
        &self,
        proof: u64,
        previous_hash: &str,
        leading: Vec<Transaction>,
    ) -> Result<Option<Block>, LedgerError> {
        let mut state = self.state.lock();
        if Self::tip_hash(&state)? != previous_hash {
            return Ok(None);
        }

        Ok(Some(self.seal(&mut state, proof, previous_hash.to_string(), leading)))
    }

    /// Mines a new block paying the mining reward to `miner`
    ///
    /// The proof search runs without holding the ledger lock. If the tip
    /// changes meanwhile (a local block or an adopted peer chain) the search
    /// starts over against the new tip, so a block is never sealed onto a
    /// stale predecessor.
    ///
    /// # Arguments
    ///
    /// * `miner` - Identifier credited with the mining reward
    /// * `cancel` - Flag that aborts the search with `MiningError::Cancelled`
    pub fn mine(&self, miner: &str, cancel: &CancelFlag) -> Result<Block, LedgerError> {
        loop {
            let epoch = self.epoch();
            let tip = self.tip()?;
            let previous_hash = tip.calculate_hash();

            let found = self.pow.find_proof_until(tip.proof, || {
                cancel.is_cancelled() || self.epoch() != epoch
            });

            let Some(proof) = found else {
                if cancel.is_cancelled() {
                    return Err(MiningError::Cancelled.into());
                }
                warn!("Tip changed during proof search, restarting");
                continue;
            };

            let reward = Transaction::new_reward(miner);
            match self.append_block_on(proof, &previous_hash, vec![reward])? {
                Some(block) => return Ok(block),
                None => warn!("Tip changed before sealing, restarting proof search"),
            }
        }
    }

    /// Overwrites the local chain unconditionally
    ///
    /// The caller is responsible for validating `chain` first. Consensus
    /// uses [`Ledger::replace_if_longer`], which installs through the same
    /// path after its length check.
    pub fn replace_chain(&self, chain: Vec<Block>) {
        let mut state = self.state.lock();
        self.install(&mut state, chain);
    }

    /// Replaces the local chain only if `chain` is strictly longer
    ///
    /// The length check and the swap happen under the same lock, so a block
    /// mined locally in the meantime is never discarded for a chain that is
    /// no longer longer than ours.
    ///
    /// # Returns
    ///
    /// Whether the chain was replaced
    pub fn replace_if_longer(&self, chain: Vec<Block>) -> bool {
        let mut state = self.state.lock();
        if chain.len() <= state.chain.len() {
            return false;
        }
        self.install(&mut state, chain);
        true
    }

    /// Counter bumped on every chain mutation
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn tip_hash(state: &LedgerState) -> Result<String, LedgerError> {
        state
            .chain
            .last()
            .map(Block::calculate_hash)
            .ok_or(LedgerError::EmptyChain)
    }

    fn seal(
        &self,
        state: &mut LedgerState,
        proof: u64,
        previous_hash: String,
        mut transactions: Vec<Transaction>,
    ) -> Block {
        debug!("Draining {} pending transactions", state.pool.len());
        transactions.extend(state.pool.drain());
        let block = Block::new(state.chain.len() as u64 + 1, transactions, proof, previous_hash);

        state.chain.push(block.clone());
        self.epoch.fetch_add(1, Ordering::SeqCst);

        info!(
            "Sealed block {} with {} transactions",
            block.index,
            block.transactions.len()
        );
        block
    }

    fn install(&self, state: &mut LedgerState, chain: Vec<Block>) {
        info!("Replacing chain of length {} with chain of length {}", state.chain.len(), chain.len());
        state.chain = chain;
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}
