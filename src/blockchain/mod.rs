// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block digest
// - Block structure
// - Ledger (chain plus pending data)
// - Proof of work search and background mining jobs
// - Chain validation
// - Ledger events

pub mod block;
pub mod chain;
pub mod digest;
pub mod events;
pub mod jobs;
pub mod miner;
pub mod validator;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{BlockchainError, ChainEntry, Ledger};
pub use jobs::{JobStatus, MiningJobs};
pub use miner::{Miner, MiningLimits};
pub use validator::{FailureReason, ValidationReport};
