use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use super::crypto::sha256_hex;

/// Default number of leading hex zeros a proof digest must have
pub const DEFAULT_DIFFICULTY: usize = 4;

/// How many candidates are tried between two checks of the stop condition
const STOP_CHECK_INTERVAL: u64 = 1024;

/// Errors that can occur while searching for a proof
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MiningError {
    #[error("Proof search cancelled")]
    Cancelled,
}

/// Shared flag used to abort long-running proof searches
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag that is not raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag; every clone observes it
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Checks if the flag has been raised
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Proof-of-work puzzle: find `p` such that `sha256("{previous}{p}")`
/// starts with `difficulty` zero hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWork {
    difficulty: usize,
}

impl Default for ProofOfWork {
    fn default() -> Self {
        ProofOfWork::new(DEFAULT_DIFFICULTY)
    }
}

impl ProofOfWork {
    /// Creates a new puzzle
    ///
    /// # Arguments
    ///
    /// * `difficulty` - Number of leading zero hex digits a valid digest needs
    pub fn new(difficulty: usize) -> Self {
        ProofOfWork { difficulty }
    }

    /// Gets the number of leading zero hex digits required
    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Checks whether `proof` solves the puzzle for `previous_proof`
    pub fn is_valid(&self, previous_proof: u64, proof: u64) -> bool {
        let guess = format!("{}{}", previous_proof, proof);
        let digest = sha256_hex(guess.as_bytes());

        digest.len() >= self.difficulty && digest.bytes().take(self.difficulty).all(|b| b == b'0')
    }

    /// Searches proofs 0, 1, 2, ... until one is valid
    ///
    /// Blocks the calling thread and is unbounded; use
    /// [`ProofOfWork::find_proof_until`] when the search must be abortable.
    pub fn find_proof(&self, previous_proof: u64) -> u64 {
        let mut proof = 0;
        while !self.is_valid(previous_proof, proof) {
            proof += 1;
        }
        proof
    }

    /// Same search as [`ProofOfWork::find_proof`], polling `stop` every
    /// few candidates
    ///
    /// Returns `None` once `stop` reports true.
    pub fn find_proof_until<F>(&self, previous_proof: u64, stop: F) -> Option<u64>
    where
        F: Fn() -> bool,
    {
        let mut proof = 0;
        loop {
            if proof % STOP_CHECK_INTERVAL == 0 && stop() {
                return None;
            }
            if self.is_valid(previous_proof, proof) {
                return Some(proof);
            }
            proof += 1;
        }
    }

    /// Searches for a proof until found or `cancel` is raised
    pub fn find_proof_cancellable(
        &self,
        previous_proof: u64,
        cancel: &CancelFlag,
    ) -> Result<u64, MiningError> {
        self.find_proof_until(previous_proof, || cancel.is_cancelled())
            .ok_or(MiningError::Cancelled)
    }
}
