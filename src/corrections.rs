//! Bounded hand-off of external position corrections to the control loop.
//!
//! Producers may run on any thread and never block. When the loop falls behind, the oldest
//! pending corrections are overwritten and the loss is reported at the next drain.

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{trace, warn};

use crate::domain::Correction;

#[derive(Clone, Debug)]
pub struct CorrectionSender {
    tx: broadcast::Sender<Correction>,
}

impl CorrectionSender {
    /// Returns `false` when the receiving side is gone.
    pub fn send(&self, correction: Correction) -> bool {
        self.tx.send(correction).is_ok()
    }
}

#[derive(Debug)]
pub struct CorrectionReceiver {
    rx: broadcast::Receiver<Correction>,
}

impl CorrectionReceiver {
    /// Takes all pending corrections, oldest observation first.
    pub fn drain(&mut self) -> Vec<Correction> {
        let mut corrections = Vec::new();

        loop {
            match self.rx.try_recv() {
                Ok(correction) => corrections.push(correction),
                Err(TryRecvError::Lagged(dropped)) => {
                    warn!(dropped, "Correction queue overflowed, dropped oldest corrections");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        corrections.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        if !corrections.is_empty() {
            trace!(count = corrections.len(), "Drained corrections");
        }
        corrections
    }
}

/// Creates a queue holding at most `capacity` pending corrections.
pub fn correction_queue(capacity: usize) -> (CorrectionSender, CorrectionReceiver) {
    let (tx, rx) = broadcast::channel(capacity.max(1));
    (CorrectionSender { tx }, CorrectionReceiver { rx })
}
