// NFC wire codec benchmarks for the MELD protocol.
//
// Covers tier selection for every chip class, URL and NDEF decoding, and
// full tag scans including signature verification.

use std::collections::HashMap;

use criterion::{criterion_group, criterion_main, Criterion};

use meld_protocol::crypto::keys::MeldKeypair;
use meld_protocol::identity::{Device, DeviceId, DeviceType, Did};
use meld_protocol::nfc::{scan_tag, ChipClass, ChipUid, DeviceDirectory, NfcCodec, TagCredentials};

const UID: [u8; 7] = [0x04, 0xA2, 0x3B, 0x1C, 0x5D, 0x6E, 0x80];

/// A bound device, its credentials and a directory holding it.
fn fixture() -> (TagCredentials, HashMap<DeviceId, Device>) {
    let keypair = MeldKeypair::generate();
    let uid = ChipUid::from_bytes(&UID).unwrap();
    let signature = keypair.sign(uid.challenge().as_bytes());
    let device_id = DeviceId::random();
    let credentials = TagCredentials {
        chip_uid: uid.clone(),
        did: Did::from_public_key(&keypair.public_key()),
        public_key: keypair.public_key(),
        signature: signature.clone(),
        device_id: Some(device_id),
    };

    // Bind through the public record shape, as a loaded registry would.
    let mut device = Device::new(device_id, "bench", DeviceType::Passive, keypair.public_key());
    device.chip_uid = Some(uid);
    device.chip_signature = Some(signature);
    let directory = HashMap::from([(device_id, device)]);
    (credentials, directory)
}

fn bench_encode(c: &mut Criterion) {
    let (credentials, directory) = fixture();
    let codec = NfcCodec::default();
    let mut group = c.benchmark_group("nfc/encode");

    for chip in ChipClass::ALL {
        group.bench_function(chip.as_str(), |b| {
            b.iter(|| {
                codec
                    .encode(&credentials, chip, Some(&directory as &dyn DeviceDirectory))
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let (credentials, directory) = fixture();
    let codec = NfcCodec::default();
    let full = codec.encode(&credentials, ChipClass::Large, None).unwrap();
    let reference = codec
        .encode(&credentials, ChipClass::Secure, Some(&directory as &dyn DeviceDirectory))
        .unwrap();

    c.bench_function("nfc/decode_url_full", |b| {
        b.iter(|| codec.decode(&full.url).unwrap());
    });
    c.bench_function("nfc/decode_ndef_full", |b| {
        b.iter(|| codec.decode_ndef(&full.ndef).unwrap());
    });
    c.bench_function("nfc/scan_reference", |b| {
        b.iter(|| {
            scan_tag(
                &codec,
                &UID,
                &reference.ndef,
                Some(&directory as &dyn DeviceDirectory),
            )
            .unwrap()
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
