//! Error taxonomy shared by every MELD module.
//!
//! Each module keeps its own `thiserror` enum close to the code that raises
//! it. This module maps those enums onto the five kinds callers actually
//! branch on, and wraps them in [`MeldError`] for code that crosses module
//! boundaries (the registry, the CLI).
//!
//! Cryptographic mismatch is deliberately absent: a bad signature is an
//! expected outcome and comes back as `false`, not as an error.

use thiserror::Error;

use crate::crypto::KeyError;
use crate::hardware::HardwareError;
use crate::identity::DidError;
use crate::moment::MomentError;
use crate::nfc::NfcError;
use crate::proof::ProofError;
use crate::registry::RegistryError;
use crate::storage::StoreError;

/// The coarse failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed DID, signature, shape, or empty input.
    Validation,
    /// No wire-format tier fits the target chip.
    CapacityExceeded,
    /// The local persistence provider could not be reached.
    StorageUnavailable,
    /// A hardware write or network call exceeded its deadline.
    Timeout,
    /// The caller cancelled a hardware operation.
    Cancelled,
    /// The tag writer reported a failed write.
    HardwareFailure,
}

impl ErrorKind {
    /// Storage and timeout failures get exactly one retry with backoff.
    /// Everything else is surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::StorageUnavailable | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::CapacityExceeded => "capacity-exceeded",
            ErrorKind::StorageUnavailable => "storage-unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::HardwareFailure => "hardware-failure",
        };
        f.write_str(name)
    }
}

/// Implemented by every error that maps onto an [`ErrorKind`]. Generic
/// helpers such as [`crate::storage::retry_once`] use it to decide whether
/// a failure deserves another attempt.
pub trait Classify {
    fn error_kind(&self) -> ErrorKind;
}

macro_rules! classify_via_kind {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Classify for $ty {
                fn error_kind(&self) -> ErrorKind {
                    self.kind()
                }
            }
        )*
    };
}

classify_via_kind!(
    MomentError,
    ProofError,
    NfcError,
    StoreError,
    HardwareError,
    RegistryError,
    MeldError,
);

/// Umbrella error for operations that span modules.
#[derive(Debug, Error)]
pub enum MeldError {
    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Did(#[from] DidError),

    #[error(transparent)]
    Moment(#[from] MomentError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Nfc(#[from] NfcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl MeldError {
    /// The taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeldError::Key(_) | MeldError::Did(_) => ErrorKind::Validation,
            MeldError::Moment(e) => e.kind(),
            MeldError::Proof(e) => e.kind(),
            MeldError::Nfc(e) => e.kind(),
            MeldError::Store(e) => e.kind(),
            MeldError::Hardware(e) => e.kind(),
            MeldError::Registry(e) => e.kind(),
        }
    }

    /// A remediation hint suitable for showing to an operator, if one exists.
    pub fn hint(&self) -> Option<&str> {
        match self {
            MeldError::Nfc(e) => e.hint(),
            MeldError::Registry(e) => e.hint(),
            _ => None,
        }
    }
}

/// Convenience alias used across module boundaries.
pub type MeldResult<T> = Result<T, MeldError>;
