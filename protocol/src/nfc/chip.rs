//! Chip classes and their writable budgets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{
    CHIP_CAPACITY_LARGE, CHIP_CAPACITY_MEDIUM, CHIP_CAPACITY_SECURE, CHIP_CAPACITY_ULTRA_SMALL,
};

use super::NfcError;

/// Families of tags we provision, by usable capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChipClass {
    /// Ultralight / NTAG210 class.
    UltraSmall,
    /// NTAG213 / NTAG215 class.
    Medium,
    /// NTAG216 class.
    Large,
    /// Secure-messaging tags (NTAG 424 DNA and similar).
    Secure,
}

impl ChipClass {
    pub const ALL: [ChipClass; 4] = [
        ChipClass::UltraSmall,
        ChipClass::Secure,
        ChipClass::Medium,
        ChipClass::Large,
    ];

    /// Conservative writable budget in bytes.
    pub fn budget(&self) -> usize {
        match self {
            ChipClass::UltraSmall => CHIP_CAPACITY_ULTRA_SMALL,
            ChipClass::Medium => CHIP_CAPACITY_MEDIUM,
            ChipClass::Large => CHIP_CAPACITY_LARGE,
            ChipClass::Secure => CHIP_CAPACITY_SECURE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChipClass::UltraSmall => "ultra-small",
            ChipClass::Medium => "medium",
            ChipClass::Large => "large",
            ChipClass::Secure => "secure",
        }
    }

    /// The smallest class whose budget holds `bytes`.
    pub fn smallest_fitting(bytes: usize) -> Option<ChipClass> {
        Self::ALL.into_iter().find(|c| c.budget() >= bytes)
    }
}

impl fmt::Display for ChipClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.as_str(), self.budget())
    }
}

impl FromStr for ChipClass {
    type Err = NfcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "ultra-small" | "ultrasmall" | "small" => Ok(ChipClass::UltraSmall),
            "medium" => Ok(ChipClass::Medium),
            "large" => Ok(ChipClass::Large),
            "secure" => Ok(ChipClass::Secure),
            _ => Err(NfcError::UnknownChipClass(s.to_string())),
        }
    }
}
