use log::{debug, info, warn};

use super::validator::FailureReason;

/// Something observable that happened to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    DataSubmitted { hint: u64, pending: usize },
    BlockAccepted { index: u64, hash: String, proof: u64 },
    BlockRejected { index: u64, hash: String, proof: u64 },
    ValidationPassed { length: usize },
    ValidationFailed { index: u64, reason: FailureReason },
}

/// Receives ledger events
///
/// Observers are called after the ledger lock is released, so an observer may
/// read from the ledger but should stay cheap: rejected proofs are reported on
/// every mining attempt.
pub trait LedgerObserver: Send + Sync {
    fn on_event(&self, event: &LedgerEvent);
}

/// Writes ledger events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LedgerObserver for LogObserver {
    fn on_event(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::DataSubmitted { hint, pending } => {
                debug!("Data queued for block {} ({} pending)", hint, pending);
            }
            LedgerEvent::BlockAccepted { index, hash, proof } => {
                info!("Block {} accepted! hash={} proof={}", index, hash, proof);
            }
            LedgerEvent::BlockRejected { index, hash, proof } => {
                debug!("Block {} rejected! hash={} proof={}", index, hash, proof);
            }
            LedgerEvent::ValidationPassed { length } => {
                info!("Validation passed! {} blocks in order", length);
            }
            LedgerEvent::ValidationFailed { index, reason } => {
                warn!("Validation failed at block {}: {}", index, reason);
            }
        }
    }
}
