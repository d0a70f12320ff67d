//! # IdentityStore
//!
//! The one object that owns an identity at runtime. Every operation takes
//! `&self`; mutation goes through a `tokio::sync::Mutex`, so two device
//! registrations can never interleave and lose an update to the device
//! list, even across await points on storage or hardware.
//!
//! ## Commit protocol
//!
//! Adding a device touches two storage entries: the device secret and the
//! identity record. The secret is written first, then the record. If the
//! record write fails the secret is removed again, and the in-memory state
//! is only replaced after both writes succeed. A failure at any step
//! leaves the identity exactly as it was.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{
    ProvisioningConfig, DEVICE_ID_MAX_ATTEMPTS, MASTER_SEED_LENGTH, MAX_DEVICE_NAME_LENGTH,
    STORAGE_KEY_IDENTITY, STORAGE_KEY_MASTER_SEED,
};
use crate::crypto::hash::{derive_identity_keypair, key_fingerprint};
use crate::crypto::keys::{MeldKeypair, MeldPublicKey, MeldSignature};
use crate::identity::{secret_storage_key, Device, DeviceId, DeviceType, Did};
use crate::moment::{issue_moment, Moment};
use crate::nfc::ChipUid;
use crate::proof::ThresholdProver;
use crate::storage::{retry_once, KeyValueStore, StoreError};

use super::identity::{IdentityRecord, LoadedIdentity, SeedSource};
use super::RegistryError;

/// Runtime owner of one identity and its devices.
pub struct IdentityStore {
    kv: Arc<dyn KeyValueStore>,
    pub(super) config: ProvisioningConfig,
    pub(super) state: Mutex<Option<LoadedIdentity>>,
}

impl IdentityStore {
    /// Wrap a persistence provider. Nothing is read until the identity is
    /// initialized or loaded.
    pub fn open(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(kv, ProvisioningConfig::default())
    }

    pub fn with_config(kv: Arc<dyn KeyValueStore>, config: ProvisioningConfig) -> Self {
        Self {
            kv,
            config,
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    // -- Identity lifecycle -------------------------------------------------

    /// Create the identity, or load it if one already exists.
    ///
    /// With an existing identity a `Provided` seed must match the stored
    /// one; `Random` simply loads.
    pub async fn initialize_identity(&self, source: SeedSource) -> Result<Did, RegistryError> {
        let mut state = self.state.lock().await;

        if let Some(existing) = self.read_persisted().await? {
            if let SeedSource::Provided(seed) = &source {
                if derive_identity_keypair(seed).public_key() != existing.keypair.public_key() {
                    return Err(RegistryError::SeedMismatch);
                }
            }
            let did = existing.record.did.clone();
            info!(did = %did, devices = existing.record.device_count(), "identity loaded");
            *state = Some(existing);
            return Ok(did);
        }

        let seed = source.materialize();
        let keypair = derive_identity_keypair(&seed);
        let record = IdentityRecord::new(Did::from_public_key(&keypair.public_key()));
        let record_json = record.to_json()?;

        self.kv_set(STORAGE_KEY_MASTER_SEED, &hex::encode(seed)).await?;
        if let Err(err) = self.kv_set(STORAGE_KEY_IDENTITY, &record_json).await {
            self.rollback(STORAGE_KEY_MASTER_SEED).await;
            return Err(err.into());
        }

        let did = record.did.clone();
        info!(did = %did, "identity created");
        *state = Some(LoadedIdentity { keypair, record });
        Ok(did)
    }

    /// Load an existing identity. Fails with `NotInitialized` if none.
    pub async fn load_identity(&self) -> Result<Did, RegistryError> {
        let mut state = self.state.lock().await;
        let loaded = self.ensure_loaded(&mut state).await?;
        Ok(loaded.record.did.clone())
    }

    /// The identity's DID.
    pub async fn identity_did(&self) -> Result<Did, RegistryError> {
        self.load_identity().await
    }

    /// A snapshot of the identity record. Implements `DeviceDirectory`, so
    /// it can resolve reference tags.
    pub async fn identity(&self) -> Result<IdentityRecord, RegistryError> {
        let mut state = self.state.lock().await;
        Ok(self.ensure_loaded(&mut state).await?.record.clone())
    }

    // -- Devices ------------------------------------------------------------

    /// Register a new device with a fresh keypair. Returns its id.
    pub async fn register_device(
        &self,
        name: &str,
        device_type: DeviceType,
    ) -> Result<DeviceId, RegistryError> {
        validate_device_name(name)?;
        let mut state = self.state.lock().await;
        let loaded = self.ensure_loaded(&mut state).await?;

        let device_id = self.draw_device_id(&loaded.record).await?;
        let keypair = MeldKeypair::generate();
        let device = Device::new(device_id, name.trim(), device_type, keypair.public_key());

        let next = loaded.record.with_device(device.clone());
        loaded.record = self.commit_device(next, &keypair, &device).await?;

        info!(
            device_id = %device_id,
            device_type = %device_type,
            key = %key_fingerprint(&device.public_key),
            "device registered"
        );
        Ok(device_id)
    }

    pub async fn devices(&self) -> Result<Vec<Device>, RegistryError> {
        Ok(self.identity().await?.devices)
    }

    pub async fn device_count(&self) -> Result<usize, RegistryError> {
        Ok(self.identity().await?.device_count())
    }

    pub async fn device(&self, device_id: &DeviceId) -> Result<Device, RegistryError> {
        self.identity()
            .await?
            .find(device_id)
            .cloned()
            .ok_or(RegistryError::UnknownDevice(*device_id))
    }

    /// Bind a device to its physical chip. Allowed once, or again with the
    /// same UID.
    pub async fn bind_chip(
        &self,
        device_id: &DeviceId,
        chip_uid: ChipUid,
    ) -> Result<Device, RegistryError> {
        let mut state = self.state.lock().await;
        let loaded = self.ensure_loaded(&mut state).await?;

        let device = loaded
            .record
            .find(device_id)
            .cloned()
            .ok_or(RegistryError::UnknownDevice(*device_id))?;
        if !device.can_bind(&chip_uid) {
            return Err(RegistryError::ChipAlreadyBound {
                device_id: *device_id,
                bound: device
                    .chip_uid
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            });
        }
        if let Some(holder) = loaded.record.holder_of(&chip_uid) {
            if holder.device_id != *device_id {
                return Err(RegistryError::ChipInUse {
                    chip_uid: chip_uid.to_string(),
                    holder: holder.device_id,
                });
            }
        }

        let keypair = self.device_keypair(&device).await?;
        let signature = keypair.sign(chip_uid.challenge().as_bytes());
        let bound = device.bound_to(chip_uid, signature);
        let next = loaded.record.with_replaced(bound.clone());
        self.kv_set(STORAGE_KEY_IDENTITY, &next.to_json()?).await?;
        loaded.record = next;

        info!(device_id = %device_id, chip_uid = ?bound.chip_uid, "chip bound");
        Ok(bound)
    }

    /// Sign `challenge` with a device's private key.
    pub async fn authenticate_locally(
        &self,
        device_id: &DeviceId,
        challenge: &[u8],
    ) -> Result<MeldSignature, RegistryError> {
        let device = self.device(device_id).await?;
        let keypair = self.device_keypair(&device).await?;
        debug!(device_id = %device_id, "challenge signed");
        Ok(keypair.sign(challenge))
    }

    /// Check a device signature. A plain boolean, like every verification.
    pub fn verify_locally(
        signature: &MeldSignature,
        challenge: &[u8],
        public_key: &MeldPublicKey,
    ) -> bool {
        public_key.verify(challenge, signature)
    }

    // -- Identity key operations -------------------------------------------

    /// Issue a moment about `subject`, signed by the identity key.
    pub async fn sign_moment(
        &self,
        subject: Did,
        description: &str,
    ) -> Result<Moment, RegistryError> {
        let mut state = self.state.lock().await;
        let loaded = self.ensure_loaded(&mut state).await?;
        Ok(issue_moment(&loaded.keypair, subject, description)?)
    }

    /// A threshold prover bound to the identity key.
    pub async fn prover(&self) -> Result<ThresholdProver, RegistryError> {
        let mut state = self.state.lock().await;
        let loaded = self.ensure_loaded(&mut state).await?;
        Ok(ThresholdProver::new(loaded.keypair.clone()))
    }

    // -- Internals ----------------------------------------------------------

    /// Return the loaded identity, reading it from storage on first use.
    pub(super) async fn ensure_loaded<'a>(
        &self,
        state: &'a mut Option<LoadedIdentity>,
    ) -> Result<&'a mut LoadedIdentity, RegistryError> {
        if state.is_none() {
            let loaded = self
                .read_persisted()
                .await?
                .ok_or(RegistryError::NotInitialized)?;
            *state = Some(loaded);
        }
        state.as_mut().ok_or(RegistryError::NotInitialized)
    }

    async fn read_persisted(&self) -> Result<Option<LoadedIdentity>, RegistryError> {
        let Some(record_json) = self.kv_get(STORAGE_KEY_IDENTITY).await? else {
            return Ok(None);
        };
        let record = IdentityRecord::from_json(&record_json)?;
        let seed_hex = self
            .kv_get(STORAGE_KEY_MASTER_SEED)
            .await?
            .ok_or_else(|| RegistryError::Corrupt("identity record without master seed".into()))?;
        let seed: [u8; MASTER_SEED_LENGTH] = hex::decode(seed_hex.trim())
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| RegistryError::Corrupt("master seed is not 32 bytes of hex".into()))?;
        LoadedIdentity::from_parts(&seed, record).map(Some)
    }

    /// Draw a fresh device id, re-drawing on collision with an existing
    /// device or a leftover secret.
    pub(super) async fn draw_device_id(
        &self,
        record: &IdentityRecord,
    ) -> Result<DeviceId, RegistryError> {
        self.draw_device_id_with(record, DeviceId::random).await
    }

    async fn draw_device_id_with(
        &self,
        record: &IdentityRecord,
        mut next_id: impl FnMut() -> DeviceId,
    ) -> Result<DeviceId, RegistryError> {
        for attempt in 1..=DEVICE_ID_MAX_ATTEMPTS {
            let candidate = next_id();
            let in_record = record.find(&candidate).is_some();
            let in_store = self.kv_get(&secret_storage_key(&candidate)).await?.is_some();
            if !in_record && !in_store {
                return Ok(candidate);
            }
            warn!(attempt, device_id = %candidate, "device id collision, drawing again");
        }
        Err(RegistryError::DeviceIdExhausted(DEVICE_ID_MAX_ATTEMPTS))
    }

    /// Persist a new device: secret first, then the record that references
    /// it. Returns the committed record.
    pub(super) async fn commit_device(
        &self,
        next: IdentityRecord,
        keypair: &MeldKeypair,
        device: &Device,
    ) -> Result<IdentityRecord, RegistryError> {
        let record_json = next.to_json()?;
        self.kv_set(&device.key_ref, &keypair.secret_key_hex()).await?;
        if let Err(err) = self.kv_set(STORAGE_KEY_IDENTITY, &record_json).await {
            self.rollback(&device.key_ref).await;
            return Err(err.into());
        }
        Ok(next)
    }

    async fn device_keypair(&self, device: &Device) -> Result<MeldKeypair, RegistryError> {
        let secret = self.kv_get(&device.key_ref).await?.ok_or_else(|| {
            RegistryError::Corrupt(format!("no secret stored for device {}", device.device_id))
        })?;
        let keypair = MeldKeypair::from_hex(secret.trim())?;
        if keypair.public_key() != device.public_key {
            return Err(RegistryError::Corrupt(format!(
                "stored secret does not match device {}",
                device.device_id
            )));
        }
        Ok(keypair)
    }

    async fn rollback(&self, key: &str) {
        if let Err(err) = retry_once(|| self.kv.remove(key), self.config.retry_backoff).await {
            // The entry is unreferenced, so leaving it is harmless.
            warn!(key, error = %err, "rollback could not remove entry");
        }
    }

    async fn kv_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        retry_once(|| self.kv.get(key), self.config.retry_backoff).await
    }

    async fn kv_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        retry_once(|| self.kv.set(key, value), self.config.retry_backoff).await
    }
}

/// Device names are shown to people: non-empty, bounded, printable.
pub fn validate_device_name(name: &str) -> Result<(), RegistryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::InvalidDeviceName("name is empty".into()));
    }
    if trimmed.chars().count() > MAX_DEVICE_NAME_LENGTH {
        return Err(RegistryError::InvalidDeviceName(format!(
            "name is longer than {} characters",
            MAX_DEVICE_NAME_LENGTH
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(RegistryError::InvalidDeviceName(
            "name contains control characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn store_with(kv: Arc<MemoryStore>) -> IdentityStore {
        let config = ProvisioningConfig::default().with_retry_backoff(Duration::from_millis(1));
        IdentityStore::with_config(kv, config)
    }

    async fn fresh() -> (Arc<MemoryStore>, IdentityStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = store_with(kv.clone());
        store.initialize_identity(SeedSource::Random).await.unwrap();
        (kv, store)
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let kv = Arc::new(MemoryStore::new());
        let store = store_with(kv.clone());
        let first = store.initialize_identity(SeedSource::Random).await.unwrap();
        let second = store.initialize_identity(SeedSource::Random).await.unwrap();
        assert_eq!(first, second);

        // A second store over the same persistence loads the same identity.
        let other = store_with(kv);
        assert_eq!(other.load_identity().await.unwrap(), first);
    }

    #[tokio::test]
    async fn provided_seed_is_deterministic_and_checked() {
        let seed = [5u8; 32];
        let store = store_with(Arc::new(MemoryStore::new()));
        let did = store
            .initialize_identity(SeedSource::Provided(seed))
            .await
            .unwrap();
        assert_eq!(
            did,
            Did::from_public_key(&derive_identity_keypair(&seed).public_key())
        );
        assert!(matches!(
            store
                .initialize_identity(SeedSource::Provided([6u8; 32]))
                .await,
            Err(RegistryError::SeedMismatch)
        ));
    }

    #[tokio::test]
    async fn load_without_identity_fails() {
        let store = store_with(Arc::new(MemoryStore::new()));
        assert!(matches!(
            store.load_identity().await,
            Err(RegistryError::NotInitialized)
        ));
        assert!(store.register_device("tag1", DeviceType::Passive).await.is_err());
    }

    #[tokio::test]
    async fn failed_init_leaves_nothing_behind() {
        let kv = Arc::new(MemoryStore::new());
        kv.fail_writes_to(STORAGE_KEY_IDENTITY);
        let store = store_with(kv.clone());
        let err = store.initialize_identity(SeedSource::Random).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn register_first_device() {
        let (kv, store) = fresh().await;
        assert_eq!(store.device_count().await.unwrap(), 0);

        let id = store.register_device("tag1", DeviceType::Passive).await.unwrap();
        let devices = store.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, id);
        assert_eq!(devices[0].name, "tag1");
        assert!(devices[0].chip_uid.is_none());
        assert!(kv.get(&secret_storage_key(&id)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn devices_get_distinct_keys() {
        let (_, store) = fresh().await;
        let a = store.register_device("a", DeviceType::Passive).await.unwrap();
        let b = store.register_device("b", DeviceType::Wearable).await.unwrap();
        assert_ne!(
            store.device(&a).await.unwrap().public_key,
            store.device(&b).await.unwrap().public_key
        );
    }

    #[tokio::test]
    async fn failed_record_write_rolls_back_registration() {
        let (kv, store) = fresh().await;
        let before = kv.keys();
        kv.fail_writes_to(STORAGE_KEY_IDENTITY);

        let err = store
            .register_device("tag1", DeviceType::Passive)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert_eq!(kv.keys(), before, "device secret must be rolled back");
        assert_eq!(store.device_count().await.unwrap(), 0);

        kv.clear_faults();
        let reloaded = store_with(kv);
        assert_eq!(reloaded.device_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_registrations_are_serialized() {
        let (_, store) = fresh().await;
        let store = Arc::new(store);
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .register_device(&format!("tag{}", i), DeviceType::Passive)
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }
        assert_eq!(store.device_count().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn device_id_collisions_are_redrawn() {
        let (_, store) = fresh().await;
        let taken = store.register_device("a", DeviceType::Card).await.unwrap();
        let record = store.identity().await.unwrap();

        let fresh_id = DeviceId::random();
        let mut script = vec![fresh_id, taken, taken].into_iter().rev().collect::<Vec<_>>();
        let drawn = store
            .draw_device_id_with(&record, || script.pop().unwrap_or_else(DeviceId::random))
            .await
            .unwrap();
        assert_eq!(drawn, fresh_id);

        let err = store
            .draw_device_id_with(&record, || taken)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DeviceIdExhausted(n) if n == DEVICE_ID_MAX_ATTEMPTS));
    }

    #[tokio::test]
    async fn authenticate_and_verify_locally() {
        let (_, store) = fresh().await;
        let id = store.register_device("tag1", DeviceType::Passive).await.unwrap();
        let public_key = store.device(&id).await.unwrap().public_key;

        let sig = store.authenticate_locally(&id, b"challenge").await.unwrap();
        assert!(IdentityStore::verify_locally(&sig, b"challenge", &public_key));
        assert!(!IdentityStore::verify_locally(&sig, b"other", &public_key));

        let unknown = DeviceId::random();
        let err = store.authenticate_locally(&unknown, b"x").await.unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDevice(id) if id == unknown));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn bind_chip_once() {
        let (_, store) = fresh().await;
        let id = store.register_device("tag1", DeviceType::Passive).await.unwrap();
        let uid: ChipUid = "04:A2:3B:1C:5D:6E:80".parse().unwrap();

        let bound = store.bind_chip(&id, uid.clone()).await.unwrap();
        assert_eq!(bound.chip_uid.as_ref(), Some(&uid));
        let sig = bound.chip_signature.clone().unwrap();
        assert!(bound.public_key.verify(uid.challenge().as_bytes(), &sig));

        // Rebinding the same chip is fine, another chip is not.
        assert!(store.bind_chip(&id, uid).await.is_ok());
        let other: ChipUid = "04:A2:3B:1C:5D:6E:81".parse().unwrap();
        assert!(matches!(
            store.bind_chip(&id, other).await,
            Err(RegistryError::ChipAlreadyBound { .. })
        ));
    }

    #[tokio::test]
    async fn chip_cannot_back_two_devices() {
        let (_, store) = fresh().await;
        let first = store.register_device("tag1", DeviceType::Passive).await.unwrap();
        let second = store.register_device("tag2", DeviceType::Passive).await.unwrap();
        let uid: ChipUid = "04:A2:3B:1C:5D:6E:80".parse().unwrap();
        store.bind_chip(&first, uid.clone()).await.unwrap();

        let err = store.bind_chip(&second, uid.clone()).await.unwrap_err();
        match &err {
            RegistryError::ChipInUse { holder, .. } => assert_eq!(holder, &first),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.hint().is_some());
        assert!(store.device(&second).await.unwrap().chip_uid.is_none());
    }

    #[tokio::test]
    async fn identity_signs_moments_and_proofs() {
        let (_, store) = fresh().await;
        let me = store.identity_did().await.unwrap();
        let subject = Did::from_public_key(&MeldKeypair::generate().public_key());

        let moment = store.sign_moment(subject, "high five").await.unwrap();
        assert_eq!(moment.issuer, me);
        assert!(moment.verify_with_issuer());

        let proof = store.prover().await.unwrap().generate(&[moment], 1).unwrap();
        assert_eq!(&proof.signer_public_key, me.public_key());
        assert!(proof.verify());
    }

    #[tokio::test]
    async fn storage_outage_is_reported() {
        let (kv, _) = fresh().await;
        let store = store_with(kv.clone());
        kv.set_offline(true);
        let err = store.load_identity().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert!(err.hint().is_some());
    }

    #[test]
    fn device_name_rules() {
        assert!(validate_device_name("tag1").is_ok());
        assert!(validate_device_name("   ").is_err());
        assert!(validate_device_name(&"x".repeat(65)).is_err());
        assert!(validate_device_name("bad\u{7}").is_err());
    }
}
