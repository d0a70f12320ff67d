//! # Protocol Configuration & Constants
//!
//! Every magic number in MELD lives here. Chip budgets, clock tolerances,
//! field-length floors, storage keys: if a value shows up in more than one
//! module, or if someone will want to tune it for a new tag vendor, it
//! belongs in this file.
//!
//! The chip capacities are conservative *safe* limits, not the vendor
//! datasheet numbers. Datasheets count raw user memory; we count what
//! survives NDEF framing and lock bytes on real hardware.

use std::time::Duration;

use crate::nfc::ChipClass;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the identity/wire protocol.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Ed25519 for every signature in the system: moments, proofs, tag challenges.
pub const SIGNING_ALGORITHM: &str = "Ed25519";

/// Ed25519 secret seed length in bytes.
pub const SIGNING_KEY_LENGTH: usize = 32;

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

/// Hex length of a public key. A wire field shorter than this has been
/// truncated and must be rejected.
pub const MIN_PUBLIC_KEY_HEX_LENGTH: usize = PUBLIC_KEY_LENGTH * 2;

/// Hex length of a signature. Same rule as above: never shortened.
pub const MIN_SIGNATURE_HEX_LENGTH: usize = SIGNATURE_LENGTH * 2;

/// Master seed length held by the local secret store.
pub const MASTER_SEED_LENGTH: usize = 32;

/// BLAKE3 key-derivation context for the identity signing key.
pub const IDENTITY_KEY_CONTEXT: &str = "meld 2026 identity signing key v1";

// ---------------------------------------------------------------------------
// DID Parameters
// ---------------------------------------------------------------------------

/// DID method used for every identifier MELD produces.
pub const DID_METHOD: &str = "key";

/// Prefix of every DID string: `did:key:` plus the multibase `z` (base58btc).
pub const DID_KEY_PREFIX: &str = "did:key:z";

/// Multicodec varint prefix for an Ed25519 public key (0xed, varint-encoded).
pub const ED25519_MULTICODEC_PREFIX: [u8; 2] = [0xed, 0x01];

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// Maximum distance between a moment's timestamp and local wall-clock time
/// for it to be considered fresh. Inclusive on both sides.
pub const MOMENT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Deadline for a single NFC write attempt.
pub const NFC_WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Backoff before the single retry permitted for storage/timeout failures.
pub const RETRY_BACKOFF: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// NFC Chip Capacities (bytes)
// ---------------------------------------------------------------------------

/// NTAG210/Ultralight-class tags.
pub const CHIP_CAPACITY_ULTRA_SMALL: usize = 120;

/// NTAG213/215-class tags.
pub const CHIP_CAPACITY_MEDIUM: usize = 450;

/// NTAG216-class tags.
pub const CHIP_CAPACITY_LARGE: usize = 850;

/// Secure (SUN/SDM-capable) tags; the secure messaging area eats the rest.
pub const CHIP_CAPACITY_SECURE: usize = 220;

/// Largest NDEF message a node reader buffers. Reads beyond this are
/// rejected before parsing.
pub const MAX_NDEF_MESSAGE_LENGTH: usize = 512;

/// Valid ISO 14443-3 UID lengths: single, double and triple size.
pub const CHIP_UID_LENGTHS: [usize; 3] = [4, 7, 10];

/// Default resolver base that NFC URLs point at.
pub const DEFAULT_NFC_BASE_URL: &str = "https://meld.link";

/// Path segment appended to the base URL.
pub const NFC_PATH: &str = "/nfc";

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// How many times to re-draw a device id when a collision is detected
/// before giving up.
pub const DEVICE_ID_MAX_ATTEMPTS: usize = 8;

/// Maximum length of a human-readable device name.
pub const MAX_DEVICE_NAME_LENGTH: usize = 64;

/// Storage key for the serialized identity record.
pub const STORAGE_KEY_IDENTITY: &str = "meld.identity";

/// Storage key for the hex-encoded master seed.
pub const STORAGE_KEY_MASTER_SEED: &str = "meld.master-seed";

/// Storage key prefix for per-device secret keys.
pub const STORAGE_KEY_DEVICE_SECRET_PREFIX: &str = "meld.device-secret.";

/// Maximum moment description length in bytes.
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Tunables for tag provisioning. Defaults match the constants above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    /// Base URL written in front of every NFC payload.
    pub base_url: String,
    /// Deadline for a single hardware write.
    pub write_timeout: Duration,
    /// Backoff before retrying a failed storage call.
    pub retry_backoff: Duration,
    /// Chip class assumed when a provisioning request names none.
    pub default_chip: ChipClass,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NFC_BASE_URL.to_string(),
            write_timeout: NFC_WRITE_TIMEOUT,
            retry_backoff: RETRY_BACKOFF,
            default_chip: ChipClass::Medium,
        }
    }
}

impl ProvisioningConfig {
    /// Override the base URL. Trailing slashes are trimmed so the `/nfc`
    /// path never doubles up.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Override the write deadline.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_default_chip(mut self, chip: ChipClass) -> Self {
        self.default_chip = chip;
        self
    }

    /// Override the storage retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}
