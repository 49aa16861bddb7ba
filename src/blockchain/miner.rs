use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::chain::{AppendOutcome, Ledger};

/// Errors that stop a proof search before a block is accepted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },

    #[error("No valid proof within {attempts} attempts")]
    AttemptsExhausted { attempts: u64 },

    #[error("Mining deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u64 },
}

impl MiningError {
    pub fn attempts(&self) -> u64 {
        match self {
            MiningError::Cancelled { attempts }
            | MiningError::AttemptsExhausted { attempts }
            | MiningError::DeadlineExceeded { attempts } => *attempts,
        }
    }
}

/// Shared flag used to abort a running search
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the search to stop. Once set the flag stays set.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Attempt counter readable while a search runs
#[derive(Debug, Clone, Default)]
pub struct MiningProgress(Arc<AtomicU64>);

impl MiningProgress {
    pub fn attempts(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn record(&self, attempts: u64) {
        self.0.store(attempts, Ordering::Relaxed);
    }
}

/// Bounds applied to a single search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MiningLimits {
    pub max_attempts: Option<u64>,
    pub timeout: Option<Duration>,
}

/// A block found by the miner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedBlock {
    pub index: u64,
    pub proof: u64,
    pub hash: String,
    pub attempts: u64,
}

/// Drives the proof search against a ledger
#[derive(Debug, Clone)]
pub struct Miner {
    ledger: Ledger,
    limits: MiningLimits,
}

impl Miner {
    pub fn new(ledger: Ledger, limits: MiningLimits) -> Self {
        Miner { ledger, limits }
    }

    /// Searches proofs 0, 1, 2, ... until the ledger accepts a block
    ///
    /// Every attempt goes through `Ledger::try_append`, so each candidate is
    /// built from the tail and pending items at that moment and gets a fresh
    /// timestamp. The flag, attempt cap and deadline are checked before each
    /// attempt; with none of them set the search only ends on success.
    pub fn mine(
        &self,
        cancel: &CancelFlag,
        progress: &MiningProgress,
    ) -> Result<MinedBlock, MiningError> {
        let deadline = self.limits.timeout.map(|timeout| Instant::now() + timeout);
        let mut attempts = 0u64;
        let mut proof = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(MiningError::Cancelled { attempts });
            }
            if self.limits.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(MiningError::AttemptsExhausted { attempts });
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(MiningError::DeadlineExceeded { attempts });
            }

            attempts += 1;
            progress.record(attempts);

            if let AppendOutcome::Accepted(block) = self.ledger.try_append(proof) {
                return Ok(MinedBlock {
                    index: block.index(),
                    proof,
                    hash: block.hash().to_string(),
                    attempts,
                });
            }

            proof = proof.wrapping_add(1);
        }
    }
}
