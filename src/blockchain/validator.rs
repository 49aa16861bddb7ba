use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

use super::block::Block;
use super::digest::meets_difficulty;

/// Why a block failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The block's fields no longer hash to its sealed hash
    HashMismatch,
    /// The block's previous hash is not the digest of its predecessor
    BrokenLink,
    /// The block's index is not its position in the chain
    IndexMismatch,
    /// The block's digest lacks the required leading zeros
    InsufficientWork,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::HashMismatch => "block contents do not match its hash",
            FailureReason::BrokenLink => "previous hash does not match predecessor",
            FailureReason::IndexMismatch => "index does not match chain position",
            FailureReason::InsufficientWork => "hash does not meet difficulty",
        };
        f.write_str(text)
    }
}

/// Outcome of walking a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReport {
    Passed { length: usize },
    Failed { index: u64, reason: FailureReason },
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationReport::Passed { .. })
    }
}

/// Validates a chain snapshot
///
/// Blocks are checked in order and the first offender is reported. For each
/// block the seal is checked before the link to its predecessor, so an edited
/// block is reported at its own index rather than at its successor's.
pub fn validate(chain: &[Block], difficulty: u32) -> ValidationReport {
    let mut previous: Option<&Block> = None;

    for (position, block) in chain.iter().enumerate() {
        let position = position as u64;
        let hash = block.calculate_hash();

        if hash != block.hash() {
            return failed(position, FailureReason::HashMismatch);
        }

        if block.index() != position {
            return failed(position, FailureReason::IndexMismatch);
        }

        if let Some(previous) = previous {
            if block.previous_hash() != previous.calculate_hash() {
                return failed(position, FailureReason::BrokenLink);
            }

            // genesis is seeded, not mined
            if !meets_difficulty(&hash, difficulty) {
                return failed(position, FailureReason::InsufficientWork);
            }
        }

        previous = Some(block);
    }

    ValidationReport::Passed {
        length: chain.len(),
    }
}

fn failed(index: u64, reason: FailureReason) -> ValidationReport {
    ValidationReport::Failed { index, reason }
}
