//! Reader-side helpers: presentation debouncing and tag authentication.
//!
//! A reader polls for tags (every 100 ms on node hardware). The same tag
//! sitting on the antenna must only be acted on once, and lifting it off
//! re-arms the reader.

use tracing::debug;

use super::codec::NfcCodec;
use super::payload::{DeviceDirectory, TagCredentials};
use super::uid::ChipUid;
use super::NfcError;

/// Reports each tag once per presentation.
#[derive(Debug, Default, Clone)]
pub struct TagDebouncer {
    current: Option<ChipUid>,
}

impl TagDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one poll result. Returns the UID when a new presentation
    /// starts, `None` while the same tag stays put or no tag is present.
    pub fn observe(&mut self, seen: Option<&ChipUid>) -> Option<ChipUid> {
        match seen {
            None => {
                self.current = None;
                None
            }
            Some(uid) if self.current.as_ref() == Some(uid) => None,
            Some(uid) => {
                debug!(uid = %uid, "tag presented");
                self.current = Some(uid.clone());
                Some(uid.clone())
            }
        }
    }

    /// The tag currently on the antenna, if any.
    pub fn current(&self) -> Option<&ChipUid> {
        self.current.as_ref()
    }
}

/// The result of reading and checking one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedTag {
    /// UID reported by the reader hardware.
    pub physical_uid: ChipUid,
    pub credentials: TagCredentials,
    /// The signature verifies and the signed UID is the chip's own.
    pub authentic: bool,
}

/// Decode a tag's NDEF contents and check them against the UID the
/// reader saw. A payload copied onto a different chip decodes fine but is
/// not authentic.
pub fn scan_tag(
    codec: &NfcCodec,
    physical_uid: &[u8],
    ndef: &[u8],
    directory: Option<&dyn DeviceDirectory>,
) -> Result<ScannedTag, NfcError> {
    let physical_uid = ChipUid::from_bytes(physical_uid)?;
    let credentials = codec.decode_ndef(ndef)?.resolve(directory)?;
    let authentic = credentials.chip_uid == physical_uid && credentials.verify();
    debug!(uid = %physical_uid, authentic, "tag scanned");
    Ok(ScannedTag {
        physical_uid,
        credentials,
        authentic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MeldKeypair;
    use crate::identity::Did;
    use crate::nfc::ChipClass;

    fn uid(s: &str) -> ChipUid {
        s.parse().unwrap()
    }

    #[test]
    fn same_tag_reported_once() {
        let mut debouncer = TagDebouncer::new();
        let a = uid("04:01:02:03");
        assert_eq!(debouncer.observe(Some(&a)), Some(a.clone()));
        assert_eq!(debouncer.observe(Some(&a)), None);
        assert_eq!(debouncer.observe(Some(&a)), None);
        assert_eq!(debouncer.current(), Some(&a));
    }

    #[test]
    fn removal_rearms() {
        let mut debouncer = TagDebouncer::new();
        let a = uid("04:01:02:03");
        debouncer.observe(Some(&a));
        assert_eq!(debouncer.observe(None), None);
        assert!(debouncer.current().is_none());
        assert_eq!(debouncer.observe(Some(&a)), Some(a));
    }

    #[test]
    fn swapping_tags_reports_new_one() {
        let mut debouncer = TagDebouncer::new();
        let (a, b) = (uid("04:01:02:03"), uid("04:01:02:04"));
        debouncer.observe(Some(&a));
        assert_eq!(debouncer.observe(Some(&b)), Some(b));
    }

    fn written_tag(chip: &ChipUid) -> Vec<u8> {
        let kp = MeldKeypair::generate();
        let credentials = TagCredentials {
            chip_uid: chip.clone(),
            did: Did::from_public_key(&kp.public_key()),
            public_key: kp.public_key(),
            signature: kp.sign(chip.challenge().as_bytes()),
            device_id: None,
        };
        NfcCodec::default()
            .encode(&credentials, ChipClass::Medium, None)
            .unwrap()
            .ndef
    }

    #[test]
    fn genuine_tag_is_authentic() {
        let chip = uid("04:A2:3B:1C:5D:6E:80");
        let ndef = written_tag(&chip);
        let scanned = scan_tag(&NfcCodec::default(), chip.as_bytes(), &ndef, None).unwrap();
        assert!(scanned.authentic);
    }

    #[test]
    fn cloned_payload_on_other_chip_is_not_authentic() {
        let chip = uid("04:A2:3B:1C:5D:6E:80");
        let ndef = written_tag(&chip);
        let other = uid("04:A2:3B:1C:5D:6E:99");
        let scanned = scan_tag(&NfcCodec::default(), other.as_bytes(), &ndef, None).unwrap();
        assert!(!scanned.authentic);
        assert!(scanned.credentials.verify());
    }
}
