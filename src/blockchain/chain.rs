use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use super::block::{Block, GENESIS_DATA};
use super::digest::{meets_difficulty, DIGEST_HEX_LEN};
use super::events::{LedgerEvent, LedgerObserver, LogObserver};
use super::validator::{self, ValidationReport};

/// Errors that can occur during ledger operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockchainError {
    #[error("Block {index} is out of range (chain length {length})")]
    OutOfRange { index: u64, length: usize },

    #[error("Invalid difficulty: {0} (must be between 1 and 64)")]
    InvalidDifficulty(u32),
}

/// Result of offering a proof to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// The candidate met the difficulty and is now the chain tail
    Accepted(Block),
    /// The candidate's hash lacked the required leading zeros
    Rejected { hash: String },
}

/// Projection of a committed block used when listing the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChainEntry {
    pub index: u64,
    pub hash: String,
    pub proof: u64,
}

#[derive(Debug)]
struct LedgerState {
    chain: Vec<Block>,
    pending: Vec<Value>,
}

impl LedgerState {
    fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("chain always holds the genesis block")
    }
}

/// Represents the ledger
///
/// Chain and pending buffer sit behind one mutex so a commit and its drain of
/// the pending buffer are a single step. Cloning the ledger clones the handle,
/// not the data.
#[derive(Clone)]
pub struct Ledger {
    state: Arc<Mutex<LedgerState>>,

    /// Mining difficulty (number of leading zeros required in hash)
    difficulty: u32,

    observer: Arc<dyn LedgerObserver>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("difficulty", &self.difficulty)
            .finish()
    }
}

impl Ledger {
    /// Creates a new ledger with the default genesis block
    ///
    /// # Arguments
    ///
    /// * `difficulty` - Leading zero hex characters required of mined blocks
    pub fn new(difficulty: u32) -> Result<Self, BlockchainError> {
        Self::with_observer(
            difficulty,
            vec![Value::from(GENESIS_DATA)],
            Arc::new(LogObserver),
        )
    }

    /// Creates a new ledger with an explicit genesis payload and observer
    pub fn with_observer(
        difficulty: u32,
        genesis_payload: Vec<Value>,
        observer: Arc<dyn LedgerObserver>,
    ) -> Result<Self, BlockchainError> {
        if difficulty == 0 || difficulty as usize > DIGEST_HEX_LEN {
            return Err(BlockchainError::InvalidDifficulty(difficulty));
        }

        let state = LedgerState {
            chain: vec![Block::genesis(genesis_payload)],
            pending: Vec::new(),
        };

        Ok(Ledger {
            state: Arc::new(Mutex::new(state)),
            difficulty,
            observer,
        })
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // A poisoned lock means a panic mid-commit; nothing after that is trustworthy.
        self.state.lock().expect("ledger state mutex poisoned")
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Number of committed blocks, genesis included
    pub fn len(&self) -> usize {
        self.state().chain.len()
    }

    /// Queues a data item for the next mined block
    ///
    /// # Returns
    ///
    /// A position hint: the current chain length plus one. Only accurate when
    /// nothing else submits or mines in between.
    pub fn submit_data(&self, item: Value) -> u64 {
        let (hint, pending) = {
            let mut state = self.state();
            state.pending.push(item);
            (state.chain.len() as u64 + 1, state.pending.len())
        };

        self.observer
            .on_event(&LedgerEvent::DataSubmitted { hint, pending });
        hint
    }

    /// Offers a proof for the next block
    ///
    /// Builds a candidate from the current tail and pending items, stamped now.
    /// If its hash meets the difficulty the candidate is committed and the
    /// pending buffer is cleared; otherwise nothing changes.
    pub fn try_append(&self, proof: u64) -> AppendOutcome {
        let (index, outcome) = {
            let mut state = self.state();
            let tail = state.last_block();
            let candidate = Block::new(
                tail.index() + 1,
                state.pending.clone(),
                proof,
                tail.hash().to_string(),
            );
            let index = candidate.index();

            if meets_difficulty(candidate.hash(), self.difficulty) {
                state.chain.push(candidate.clone());
                state.pending.clear();
                (index, AppendOutcome::Accepted(candidate))
            } else {
                let hash = candidate.hash().to_string();
                (index, AppendOutcome::Rejected { hash })
            }
        };

        let event = match &outcome {
            AppendOutcome::Accepted(block) => LedgerEvent::BlockAccepted {
                index,
                hash: block.hash().to_string(),
                proof,
            },
            AppendOutcome::Rejected { hash } => LedgerEvent::BlockRejected {
                index,
                hash: hash.clone(),
                proof,
            },
        };
        self.observer.on_event(&event);

        outcome
    }

    /// Point-in-time copy of the whole chain
    pub fn get_chain(&self) -> Vec<Block> {
        self.state().chain.clone()
    }

    /// Gets all pending data items
    pub fn get_pending(&self) -> Vec<Value> {
        self.state().pending.clone()
    }

    /// Lists `{index, hash, proof}` for every committed block
    pub fn list_chain(&self) -> Vec<ChainEntry> {
        self.state()
            .chain
            .iter()
            .map(|block| ChainEntry {
                index: block.index(),
                hash: block.hash().to_string(),
                proof: block.proof(),
            })
            .collect()
    }

    /// Gets a committed block by index
    pub fn get_block(&self, index: u64) -> Result<Block, BlockchainError> {
        let state = self.state();

        usize::try_from(index)
            .ok()
            .and_then(|position| state.chain.get(position))
            .cloned()
            .ok_or(BlockchainError::OutOfRange {
                index,
                length: state.chain.len(),
            })
    }

    /// Validates a snapshot of the chain
    pub fn validate(&self) -> ValidationReport {
        let snapshot = self.get_chain();
        let report = validator::validate(&snapshot, self.difficulty);

        let event = match report {
            ValidationReport::Passed { length } => LedgerEvent::ValidationPassed { length },
            ValidationReport::Failed { index, reason } => {
                LedgerEvent::ValidationFailed { index, reason }
            }
        };
        self.observer.on_event(&event);

        report
    }
}

#[cfg(test)]
impl Ledger {
    /// Swaps a committed block for an edited copy, bypassing the accept path.
    pub(crate) fn tamper_block(&self, index: usize, edit: impl FnOnce(&Block) -> Block) {
        let mut state = self.state();
        let edited = edit(&state.chain[index]);
        state.chain[index] = edited;
    }
}
