//! # Tag Writer Boundary
//!
//! Platform drivers (a phone's NFC stack, a PN532 on a node) implement
//! [`TagWriter`]. The core never talks to radios directly; it hands over
//! NDEF bytes and gets back one of three outcomes.
//!
//! [`write_with_deadline`] wraps any writer with a hard deadline and an
//! optional cancellation signal. A write that is cut off by either is
//! reported as such, and callers treat it as not having happened.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::ErrorKind;

/// What a driver reports for one write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Success,
    Failure(String),
    Timeout,
}

/// A platform NFC write driver.
#[async_trait]
pub trait TagWriter: Send + Sync {
    async fn write(&self, ndef: &[u8]) -> WriteOutcome;
}

/// Errors from a deadline-bounded write.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HardwareError {
    #[error("tag write failed: {0}")]
    WriteFailed(String),

    #[error("tag write timed out after {0:?}")]
    Timeout(Duration),

    #[error("tag write cancelled")]
    Cancelled,
}

impl HardwareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HardwareError::WriteFailed(_) => ErrorKind::HardwareFailure,
            HardwareError::Timeout(_) => ErrorKind::Timeout,
            HardwareError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Sender half of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    pub fn cancel(&self) {
        // No receivers left means nobody is waiting; nothing to do.
        let _ = self.0.send(true);
    }
}

/// Create a cancellation handle and the receiver to pass to writes.
pub fn cancellation() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), rx)
}

/// Resolves once the signal flips to `true`. Never resolves if the
/// sender goes away without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Write `ndef` through `writer`, giving up after `deadline` or when
/// `cancel` fires, whichever comes first.
pub async fn write_with_deadline(
    writer: &dyn TagWriter,
    ndef: &[u8],
    deadline: Duration,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<(), HardwareError> {
    let attempt = tokio::time::timeout(deadline, writer.write(ndef));
    let outcome = match cancel {
        Some(mut rx) => {
            if *rx.borrow() {
                return Err(HardwareError::Cancelled);
            }
            tokio::select! {
                result = attempt => result,
                _ = cancelled(&mut rx) => {
                    warn!("tag write cancelled by caller");
                    return Err(HardwareError::Cancelled);
                }
            }
        }
        None => attempt.await,
    };

    match outcome {
        Ok(WriteOutcome::Success) => {
            debug!(bytes = ndef.len(), "tag written");
            Ok(())
        }
        Ok(WriteOutcome::Failure(reason)) => Err(HardwareError::WriteFailed(reason)),
        Ok(WriteOutcome::Timeout) | Err(_) => {
            warn!(deadline_ms = deadline.as_millis() as u64, "tag write timed out");
            Err(HardwareError::Timeout(deadline))
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated writer
// ---------------------------------------------------------------------------

/// Scripted behaviour for one write on a [`SimulatedTagWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedWrite {
    Succeed,
    Fail(String),
    ReportTimeout,
    /// Sleep this long, then succeed.
    Delay(Duration),
}

#[derive(Debug, Default)]
struct SimulatorState {
    script: VecDeque<SimulatedWrite>,
    written: Vec<Vec<u8>>,
}

/// In-memory writer for tests and the node's dry-run mode. Writes follow
/// the queued script; once it runs out every write succeeds.
#[derive(Debug, Default)]
pub struct SimulatedTagWriter {
    capacity: Option<usize>,
    state: Mutex<SimulatorState>,
}

impl SimulatedTagWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer that fails any message longer than `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Queue the behaviour of the next write.
    pub fn push(&self, behaviour: SimulatedWrite) -> &Self {
        self.state.lock().script.push_back(behaviour);
        self
    }

    /// Every message that was successfully written, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }

    pub fn last_written(&self) -> Option<Vec<u8>> {
        self.state.lock().written.last().cloned()
    }
}

#[async_trait]
impl TagWriter for SimulatedTagWriter {
    async fn write(&self, ndef: &[u8]) -> WriteOutcome {
        let next = self.state.lock().script.pop_front();
        match next {
            Some(SimulatedWrite::Fail(reason)) => return WriteOutcome::Failure(reason),
            Some(SimulatedWrite::ReportTimeout) => return WriteOutcome::Timeout,
            Some(SimulatedWrite::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(SimulatedWrite::Succeed) | None => {}
        }
        if let Some(capacity) = self.capacity {
            if ndef.len() > capacity {
                return WriteOutcome::Failure(format!(
                    "{} bytes exceed tag capacity of {}",
                    ndef.len(),
                    capacity
                ));
            }
        }
        self.state.lock().written.push(ndef.to_vec());
        WriteOutcome::Success
    }
}
