use std::str::FromStr;

use log::debug;
use thiserror::Error;

use super::block::{Block, GENESIS_INDEX};
use super::pow::ProofOfWork;

/// Reasons a candidate chain is rejected
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Chain is empty")]
    Empty,

    #[error("Chain has no block after genesis")]
    TooShort,

    #[error("Block {position} has index {found}, expected {expected}")]
    BadIndex { position: usize, expected: u64, found: u64 },

    #[error("Block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },

    #[error("Block {index} carries an invalid proof of work")]
    InvalidProof { index: u64 },
}

/// How much of a chain the validator walks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Every adjacent pair is checked, and indices must run 1..=N
    #[default]
    Full,

    /// Only the first pair after genesis is checked; chains shorter than two
    /// blocks are rejected. Kept for compatibility with older nodes.
    Legacy,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ValidationMode::Full),
            "legacy" => Ok(ValidationMode::Legacy),
            other => Err(format!("unknown validation mode '{}'", other)),
        }
    }
}

/// Checks structural and proof-of-work integrity of candidate chains
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainValidator {
    pow: ProofOfWork,
    mode: ValidationMode,
}

impl ChainValidator {
    /// Creates a validator checking proofs against `pow`
    pub fn new(pow: ProofOfWork, mode: ValidationMode) -> Self {
        ChainValidator { pow, mode }
    }

    /// Gets how much of a chain is walked
    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn is_valid(&self, chain: &[Block]) -> bool {
        match self.validate(chain) {
            Ok(()) => true,
            Err(err) => {
                debug!("Chain rejected: {}", err);
                false
            }
        }
    }

    /// Validates `chain`, reporting the first problem found
    pub fn validate(&self, chain: &[Block]) -> Result<(), ValidationError> {
        if chain.is_empty() {
            return Err(ValidationError::Empty);
        }

        match self.mode {
            ValidationMode::Full => {
                for (position, block) in chain.iter().enumerate() {
                    let expected = GENESIS_INDEX + position as u64;
                    if block.index != expected {
                        return Err(ValidationError::BadIndex {
                            position,
                            expected,
                            found: block.index,
                        });
                    }
                }
                chain
                    .windows(2)
                    .try_for_each(|pair| self.check_pair(&pair[0], &pair[1]))
            }
            ValidationMode::Legacy => match chain {
                [first, second, ..] => self.check_pair(first, second),
                _ => Err(ValidationError::TooShort),
            },
        }
    }

    fn check_pair(&self, previous: &Block, current: &Block) -> Result<(), ValidationError> {
        if current.previous_hash != previous.calculate_hash() {
            return Err(ValidationError::BrokenLink { index: current.index });
        }

        if !self.pow.is_valid(previous.proof, current.proof) {
            return Err(ValidationError::InvalidProof { index: current.index });
        }

        Ok(())
    }
}
