//! End-to-end integration tests for the MELD protocol.
//!
//! These tests drive the core the way an application would: create an
//! identity, register and provision devices, read tags back, issue
//! moments and prove thresholds over them. Storage and hardware are the
//! in-memory collaborators, except where persistence itself is under test.
//!
//! Each test stands alone with its own store. No shared state.

use std::sync::Arc;
use std::time::Duration;

use meld_protocol::config::{ProvisioningConfig, STORAGE_KEY_IDENTITY};
use meld_protocol::crypto::keys::{MeldKeypair, MeldSignature};
use meld_protocol::error::ErrorKind;
use meld_protocol::hardware::{cancellation, SimulatedTagWriter, SimulatedWrite};
use meld_protocol::identity::{DeviceType, Did};
use meld_protocol::moment::{issue_moment, Moment};
use meld_protocol::nfc::{
    scan_tag, ChipClass, ChipUid, DeviceDirectory, NfcCodec, NfcError, PayloadTier,
    TagCredentials, TagDebouncer,
};
use meld_protocol::proof::{recommended_thresholds, verify_proof_json, ThresholdProof};
use meld_protocol::registry::{IdentityStore, ProvisionRequest, RegistryError, SeedSource};
use meld_protocol::storage::{MemoryArchive, MemoryStore, MomentArchive, SledStore};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const UID: [u8; 7] = [0x04, 0xA2, 0x3B, 0x1C, 0x5D, 0x6E, 0x80];

fn uid() -> ChipUid {
    ChipUid::from_bytes(&UID).unwrap()
}

fn fast_config() -> ProvisioningConfig {
    ProvisioningConfig::default().with_retry_backoff(Duration::from_millis(1))
}

/// A fresh identity over an in-memory store.
async fn setup() -> (Arc<MemoryStore>, IdentityStore) {
    let kv = Arc::new(MemoryStore::new());
    let store = IdentityStore::with_config(kv.clone(), fast_config());
    store.initialize_identity(SeedSource::Random).await.unwrap();
    (kv, store)
}

fn stranger() -> Did {
    Did::from_public_key(&MeldKeypair::generate().public_key())
}

async fn issue_many(store: &IdentityStore, n: usize) -> Vec<Moment> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        out.push(
            store
                .sign_moment(stranger(), &format!("moment {}", i))
                .await
                .unwrap(),
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_first_passive_tag() {
    let (_, store) = setup().await;
    let id = store.register_device("tag1", "passive".parse().unwrap()).await.unwrap();

    assert_eq!(store.device_count().await.unwrap(), 1);
    let device = store.device(&id).await.unwrap();
    assert_eq!(device.name, "tag1");
    assert_eq!(device.device_type, DeviceType::Passive);
    assert!(device.did().as_str().starts_with("did:key:z6Mk"));
}

#[tokio::test]
async fn failed_registration_leaves_prior_state_untouched() {
    let (kv, store) = setup().await;
    store.register_device("first", DeviceType::Card).await.unwrap();
    let keys_before = kv.keys();
    let record_before = store.identity().await.unwrap();

    kv.fail_writes_to(STORAGE_KEY_IDENTITY);
    let err = store
        .register_device("second", DeviceType::Card)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageUnavailable);

    assert_eq!(kv.keys(), keys_before);
    assert_eq!(store.identity().await.unwrap(), record_before);
}

#[tokio::test]
async fn identity_survives_restart_on_sled() {
    let dir = tempfile::tempdir().unwrap();
    let (did, device_id) = {
        let kv = Arc::new(SledStore::open(dir.path()).unwrap());
        let store = IdentityStore::with_config(kv, fast_config());
        let did = store.initialize_identity(SeedSource::Random).await.unwrap();
        let id = store.register_device("band", DeviceType::Wearable).await.unwrap();
        (did, id)
    };

    let kv = Arc::new(SledStore::open(dir.path()).unwrap());
    let store = IdentityStore::with_config(kv, fast_config());
    assert_eq!(store.load_identity().await.unwrap(), did);

    let sig = store.authenticate_locally(&device_id, b"hello").await.unwrap();
    let device = store.device(&device_id).await.unwrap();
    assert!(IdentityStore::verify_locally(&sig, b"hello", &device.public_key));
}

// ---------------------------------------------------------------------------
// Moments & proofs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn threshold_five_over_ten_moments() {
    let (_, store) = setup().await;
    let moments = issue_many(&store, 10).await;

    let proof = store.prover().await.unwrap().generate(&moments, 5).unwrap();
    assert_eq!(proof.threshold, 5);
    assert_eq!(proof.actual_count, 10);
    assert!(proof.verify());
    assert!(proof.passes());

    let mut bytes = *proof.proof.as_bytes();
    bytes[0] ^= 0x01;
    let tampered = ThresholdProof {
        proof: MeldSignature::from_bytes(bytes),
        ..proof.clone()
    };
    assert!(!tampered.verify());

    let inflated = ThresholdProof {
        actual_count: 11,
        ..proof
    };
    assert!(!inflated.verify());
}

#[tokio::test]
async fn proof_errors_on_degenerate_input() {
    let (_, store) = setup().await;
    let prover = store.prover().await.unwrap();
    let moments = issue_many(&store, 2).await;

    assert!(prover.generate(&[], 1).is_err());
    assert!(prover.generate(&moments, 0).is_err());

    // Below threshold still yields a valid proof that does not pass.
    let proof = prover.generate(&moments, 3).unwrap();
    assert!(proof.verify());
    assert!(!proof.passes());
}

#[tokio::test]
async fn moments_travel_through_the_archive() {
    let (_, store) = setup().await;
    let archive = MemoryArchive::new();
    let moments = issue_many(&store, 3).await;

    for m in &moments {
        archive.post_moment("party-42", m).await.unwrap();
        // Posting twice is harmless.
        archive.post_moment("party-42", m).await.unwrap();
    }
    let fetched = archive.moments_by_session("party-42").await.unwrap();
    assert_eq!(fetched, moments);
    assert!(fetched.iter().all(|m| m.verify_with_issuer() && m.is_fresh()));

    // A moment edited after signing never makes it in.
    let mut forged = moments[0].clone();
    forged.description = "something else".into();
    assert!(archive.post_moment("party-42", &forged).await.is_err());

    let thresholds = recommended_thresholds(fetched.len() as u64);
    assert_eq!(thresholds, vec![1, 3]);
    let proofs = store
        .prover()
        .await
        .unwrap()
        .generate_many(&fetched, &thresholds)
        .unwrap();
    let wire: Vec<String> = proofs.iter().map(|p| p.to_json().unwrap()).collect();
    assert!(wire.iter().all(|json| verify_proof_json(json)));
}

#[test]
fn moment_wire_roundtrip_keeps_signature_valid() {
    let me = MeldKeypair::generate();
    let moment = issue_moment(&me, stranger(), "café \"quoted\" ✓").unwrap();
    let back = Moment::from_json(&moment.to_json().unwrap()).unwrap();
    assert_eq!(back, moment);
    assert!(back.verify(&me.public_key()));
}

// ---------------------------------------------------------------------------
// NFC wire codec
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tier_selection_by_chip_class() {
    let (_, store) = setup().await;
    let id = store.register_device("tag1", DeviceType::Passive).await.unwrap();
    let device = store.bind_chip(&id, uid()).await.unwrap();
    let credentials = TagCredentials::for_device(&device).unwrap();
    let directory = store.identity().await.unwrap();
    let dir: Option<&dyn DeviceDirectory> = Some(&directory);
    let codec = NfcCodec::default();

    let large = codec.encode(&credentials, ChipClass::Large, dir).unwrap();
    assert_eq!(large.tier(), PayloadTier::Full);
    assert_eq!(large.size(), 325);

    let medium = codec.encode(&credentials, ChipClass::Medium, dir).unwrap();
    assert_eq!(medium.tier(), PayloadTier::Full);

    let compact = codec.encode_with_budget(&credentials, 240, dir).unwrap();
    assert_eq!(compact.tier(), PayloadTier::Compact);
    assert_eq!(compact.size(), 236);

    let secure = codec.encode(&credentials, ChipClass::Secure, dir).unwrap();
    assert_eq!(secure.tier(), PayloadTier::DecentralizedReference);
    assert_eq!(secure.size(), 77);

    let tiny = codec.encode(&credentials, ChipClass::UltraSmall, dir).unwrap();
    assert_eq!(tiny.tier(), PayloadTier::DecentralizedReference);

    // Without a directory the small chips have nowhere to go.
    let err = codec.encode(&credentials, ChipClass::Secure, None).unwrap_err();
    assert!(matches!(err, NfcError::CapacityExceeded { budget: 220, .. }));
    assert!(err.hint().is_some());
}

#[tokio::test]
async fn provision_then_scan_full_roundtrip() {
    let (_, store) = setup().await;
    let writer = SimulatedTagWriter::new();
    let request =
        ProvisionRequest::new("tag1", DeviceType::Passive, uid()).for_chip(ChipClass::Large);
    let tag = store.provision_tag(request, &writer, None).await.unwrap();

    let ndef = writer.last_written().unwrap();
    let scanned = scan_tag(&NfcCodec::default(), &UID, &ndef, None).unwrap();
    assert!(scanned.authentic);
    assert_eq!(scanned.credentials.did, tag.device.did());
    assert_eq!(scanned.credentials.public_key, tag.device.public_key);

    // The same bytes on another chip decode but are not authentic.
    let mut other = UID;
    other[6] ^= 0xFF;
    let cloned = scan_tag(&NfcCodec::default(), &other, &ndef, None).unwrap();
    assert!(!cloned.authentic);

    let mut debouncer = TagDebouncer::new();
    assert!(debouncer.observe(Some(&scanned.physical_uid)).is_some());
    assert!(debouncer.observe(Some(&scanned.physical_uid)).is_none());
}

#[tokio::test]
async fn reference_tag_needs_the_registry() {
    let (_, store) = setup().await;
    let writer = SimulatedTagWriter::new();
    let request =
        ProvisionRequest::new("band", DeviceType::Wearable, uid()).for_chip(ChipClass::Secure);
    store.provision_tag(request, &writer, None).await.unwrap();
    let ndef = writer.last_written().unwrap();

    let codec = NfcCodec::default();
    assert!(matches!(
        scan_tag(&codec, &UID, &ndef, None),
        Err(NfcError::UnknownDevice(_))
    ));

    let directory = store.identity().await.unwrap();
    let scanned = scan_tag(&codec, &UID, &ndef, Some(&directory)).unwrap();
    assert!(scanned.authentic);
}

// ---------------------------------------------------------------------------
// Hardware deadlines
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slow_writer_times_out_and_commits_nothing() {
    let (kv, store) = setup().await;
    let before = kv.keys();
    let writer = SimulatedTagWriter::new();
    // Both the attempt and its single retry overrun the 15 s deadline.
    writer.push(SimulatedWrite::Delay(Duration::from_secs(20)));
    writer.push(SimulatedWrite::Delay(Duration::from_secs(20)));

    let err = store
        .provision_tag(
            ProvisionRequest::new("tag1", DeviceType::Passive, uid()),
            &writer,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.hint().is_some());
    assert_eq!(kv.keys(), before);
    assert_eq!(store.device_count().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_write_commits_nothing() {
    let (kv, store) = setup().await;
    let before = kv.keys();
    let writer = SimulatedTagWriter::new();
    writer.push(SimulatedWrite::Delay(Duration::from_secs(10)));
    let (handle, rx) = cancellation();

    let cancel_later = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
    };
    let provision = store.provision_tag(
        ProvisionRequest::new("tag1", DeviceType::Passive, uid()),
        &writer,
        Some(rx),
    );
    let (result, ()) = tokio::join!(provision, cancel_later);

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(matches!(err, RegistryError::Hardware(_)));
    assert_eq!(kv.keys(), before);
    assert!(writer.written().is_empty());
}
