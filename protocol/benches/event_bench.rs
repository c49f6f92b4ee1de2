// Event hashing, signing and verification benchmarks.
//
// Covers key generation, canonical ID computation, Schnorr signing,
// full event verification, and the challenge issue/redeem round trip.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use nostr_auth::challenge::{ChallengeVerifier, MemoryChallengeStore};
use nostr_auth::config::AuthConfig;
use nostr_auth::event::{verify, EventBuilder, Keys};

fn bench_keys_generate(c: &mut Criterion) {
    c.bench_function("schnorr/keys_generate", |b| {
        b.iter(Keys::generate);
    });
}

fn bench_compute_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("event/compute_id");

    for size in [0usize, 256, 4096] {
        let event = EventBuilder::new(1)
            .created_at(1_700_000_000)
            .tag(["t", "bench"])
            .content(&"x".repeat(size))
            .build()
            .sign(&Keys::generate())
            .unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &event, |b, event| {
            b.iter(|| event.compute_id());
        });
    }

    group.finish();
}

fn bench_sign_event(c: &mut Criterion) {
    let keys = Keys::generate();

    c.bench_function("schnorr/sign_event", |b| {
        b.iter(|| {
            EventBuilder::auth_response(&"ab".repeat(32), Some("wss://relay.example"))
                .created_at(1_700_000_000)
                .build()
                .sign(&keys)
                .unwrap()
        });
    });
}

fn bench_verify_event(c: &mut Criterion) {
    let event = EventBuilder::new(1)
        .created_at(1_700_000_000)
        .content("gm")
        .build()
        .sign(&Keys::generate())
        .unwrap();

    c.bench_function("schnorr/verify_event", |b| {
        b.iter(|| verify(&event));
    });
}

fn bench_challenge_round_trip(c: &mut Criterion) {
    let verifier = ChallengeVerifier::new(
        Arc::new(MemoryChallengeStore::new()),
        &AuthConfig::default(),
    );
    let keys = Keys::generate();

    c.bench_function("challenge/issue_and_redeem", |b| {
        b.iter(|| {
            let challenge = verifier.issue_challenge_at(None, 1_700_000_000).unwrap();
            let event = EventBuilder::auth_response(&challenge.challenge, None)
                .created_at(1_700_000_000)
                .build()
                .sign(&keys)
                .unwrap();
            verifier.verify_challenge_response_at(&event, 1_700_000_001)
        });
    });
}

criterion_group!(
    benches,
    bench_keys_generate,
    bench_compute_id,
    bench_sign_event,
    bench_verify_event,
    bench_challenge_round_trip,
);
criterion_main!(benches);
