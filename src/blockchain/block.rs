use chrono::{DateTime, Utc};
use serde_json::Value;

use super::digest::digest;

/// Proof recorded in the genesis block
pub const GENESIS_PROOF: u64 = 47;

/// Previous-hash sentinel recorded in the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Payload committed in the genesis block when none is configured
pub const GENESIS_DATA: &str = "This is the just the beginning";

/// Represents a block in the ledger
///
/// Blocks are sealed at construction: `hash` is the digest of the other five
/// fields at the moment the block was built and is never recomputed in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Index of the block in the chain
    index: u64,

    /// Timestamp when the block was created
    timestamp: DateTime<Utc>,

    /// Data items committed in this block
    payload: Vec<Value>,

    /// Proof of work (nonce)
    proof: u64,

    /// Hash of the previous block
    previous_hash: String,

    /// Hash of this block, computed when it was built
    hash: String,
}

impl Block {
    /// Creates a new block stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `payload` - The data items to commit
    /// * `proof` - The proof of work (nonce)
    /// * `previous_hash` - The hash of the previous block
    pub fn new(index: u64, payload: Vec<Value>, proof: u64, previous_hash: String) -> Self {
        Self::with_timestamp(index, Utc::now(), payload, proof, previous_hash)
    }

    /// Creates a new block with an explicit timestamp
    pub fn with_timestamp(
        index: u64,
        timestamp: DateTime<Utc>,
        payload: Vec<Value>,
        proof: u64,
        previous_hash: String,
    ) -> Self {
        let hash = digest(index, &timestamp, &payload, proof, &previous_hash);

        Block {
            index,
            timestamp,
            payload,
            proof,
            previous_hash,
            hash,
        }
    }

    /// Creates the genesis block (first block in the chain)
    pub fn genesis(payload: Vec<Value>) -> Self {
        Self::new(0, payload, GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string())
    }

    /// Recomputes the digest from the block's current fields
    pub fn calculate_hash(&self) -> String {
        digest(
            self.index,
            &self.timestamp,
            &self.payload,
            self.proof,
            &self.previous_hash,
        )
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &[Value] {
        &self.payload
    }

    pub fn proof(&self) -> u64 {
        self.proof
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    /// The hash sealed into the block at construction
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

#[cfg(test)]
impl Block {
    /// Copy of this block with a different proof but the original seal,
    /// simulating an in-place edit of a committed block.
    pub(crate) fn tampered_proof(&self, proof: u64) -> Self {
        Block {
            proof,
            ..self.clone()
        }
    }

    /// Copy of this block with different payload but the original seal.
    pub(crate) fn tampered_payload(&self, payload: Vec<Value>) -> Self {
        Block {
            payload,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_block() {
        let block = Block::new(1, vec![json!("a"), json!(2)], 100, "previous_hash".to_string());

        assert_eq!(block.index(), 1);
        assert_eq!(block.proof(), 100);
        assert_eq!(block.previous_hash(), "previous_hash");
        assert_eq!(block.payload(), &[json!("a"), json!(2)]);
        assert_eq!(block.hash().len(), 64);
    }

    #[test]
    fn test_seal_matches_calculated_hash() {
        let block = Block::new(3, vec![json!({"k": 1})], 9, "prev".to_string());
        assert_eq!(block.hash(), block.calculate_hash());
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis(vec![json!(GENESIS_DATA)]);

        assert_eq!(genesis.index(), 0);
        assert_eq!(genesis.proof(), GENESIS_PROOF);
        assert_eq!(genesis.previous_hash(), GENESIS_PREVIOUS_HASH);
        assert_eq!(genesis.payload(), &[json!(GENESIS_DATA)]);
    }

    #[test]
    fn test_tampering_breaks_seal() {
        let block = Block::new(1, vec![json!("x")], 5, "prev".to_string());

        let edited = block.tampered_proof(6);
        assert_eq!(edited.hash(), block.hash());
        assert_ne!(edited.calculate_hash(), edited.hash());

        let edited = block.tampered_payload(vec![json!("y")]);
        assert_ne!(edited.calculate_hash(), edited.hash());
    }
}
