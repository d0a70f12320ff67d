// Signing & verification benchmarks for the MELD protocol.
//
// Covers Ed25519 keypair generation, moment signing and verification,
// threshold proof generation, and batch verification at various sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use meld_protocol::crypto::keys::MeldKeypair;
use meld_protocol::crypto::signatures::{batch_verify, sign};
use meld_protocol::identity::Did;
use meld_protocol::moment::{issue_moment, Moment};
use meld_protocol::proof::ThresholdProver;

fn moments(issuer: &MeldKeypair, n: usize) -> Vec<Moment> {
    (0..n)
        .map(|i| {
            let subject = Did::from_public_key(&MeldKeypair::generate().public_key());
            issue_moment(issuer, subject, &format!("moment {:04}", i)).unwrap()
        })
        .collect()
}

fn bench_keypair_generation(c: &mut Criterion) {
    c.bench_function("ed25519/keypair_generate", |b| {
        b.iter(MeldKeypair::generate);
    });
}

fn bench_issue_moment(c: &mut Criterion) {
    let keypair = MeldKeypair::generate();
    let subject = Did::from_public_key(&MeldKeypair::generate().public_key());

    c.bench_function("moment/issue", |b| {
        b.iter(|| issue_moment(&keypair, subject.clone(), "shared a dance at stage left").unwrap());
    });
}

fn bench_verify_moment(c: &mut Criterion) {
    let keypair = MeldKeypair::generate();
    let moment = moments(&keypair, 1).remove(0);

    c.bench_function("moment/verify_with_issuer", |b| {
        b.iter(|| moment.verify_with_issuer());
    });
}

fn bench_threshold_proof(c: &mut Criterion) {
    let keypair = MeldKeypair::generate();
    let prover = ThresholdProver::new(keypair.clone());
    let mut group = c.benchmark_group("proof/generate");

    for size in [10, 100, 1_000] {
        let list = moments(&keypair, size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("plain", size), &list, |b, list| {
            b.iter(|| prover.generate(list, 5).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("verified", size), &list, |b, list| {
            b.iter(|| prover.generate_verified(list, 5).unwrap());
        });
    }

    group.finish();
}

fn bench_batch_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("ed25519/batch_verify");

    for size in [10, 50, 100, 500] {
        let items: Vec<_> = (0..size)
            .map(|i| {
                let kp = MeldKeypair::generate();
                let msg = format!("challenge-{:06}", i).into_bytes();
                let sig = sign(&kp, &msg);
                (kp.public_key(), msg, sig)
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| assert!(batch_verify(items)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_keypair_generation,
    bench_issue_moment,
    bench_verify_moment,
    bench_threshold_proof,
    bench_batch_verify,
);
criterion_main!(benches);
