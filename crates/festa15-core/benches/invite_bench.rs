//! Benchmarks for the engine's pure hot paths
//!
//! Run with: cargo bench -p festa15-core
//!
//! These benchmarks establish performance baselines for:
//! - Invite code allocation over growing tables
//! - Guest input normalization and code parsing
//! - Chat feed ordering (the per-row insert the live feed pays)
//! - Row serialization at the backend boundary

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use festa15_core::invite::{allocate_codes, code_number, format_code, next_number, normalize_code};
use festa15_core::{
    from_row, sanitize_filename, to_row, ChatFeed, ChatMessage, Segment, UserId,
    CHAT_HISTORY_LIMIT,
};

fn existing_codes(count: u32) -> Vec<String> {
    (1..=count).map(|n| format_code("G15-J", n)).collect()
}

fn message(id: i64) -> ChatMessage {
    ChatMessage::new(id, UserId::new("u-bench"), format!("mensagem {id}"), id * 10)
}

// ============================================================================
// Invite Allocation Benchmarks
// ============================================================================

fn bench_allocate_codes(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_codes");

    for size in [10, 100, 1000].iter() {
        let existing = existing_codes(*size);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("existing", size), &existing, |b, existing| {
            b.iter(|| black_box(allocate_codes(existing, Segment::Young, 10).unwrap()))
        });
    }

    group.finish();
}

fn bench_next_number(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_number");

    for size in [10, 100, 1000].iter() {
        let existing = existing_codes(*size);

        group.bench_with_input(BenchmarkId::new("codes", size), &existing, |b, existing| {
            b.iter(|| black_box(next_number(existing.iter().map(String::as_str), "G15-J")))
        });
    }

    group.finish();
}

// ============================================================================
// Code Parsing Benchmarks
// ============================================================================

fn bench_code_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("code_parsing");

    group.bench_function("normalize", |b| {
        b.iter(|| black_box(normalize_code("  g15-j07 ")))
    });

    group.bench_function("parse_number", |b| {
        b.iter(|| black_box(code_number("G15-J123", "G15-J")))
    });

    group.bench_function("format", |b| b.iter(|| black_box(format_code("G15-A", 42))));

    group.finish();
}

fn bench_sanitize_filename(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize_filename");

    group.bench_function("clean_name", |b| {
        b.iter(|| black_box(sanitize_filename("festa.png")))
    });

    group.bench_function("messy_name", |b| {
        b.iter(|| black_box(sanitize_filename("IMG 2026-11-21 (1) cópia!.jpeg")))
    });

    group.finish();
}

// ============================================================================
// Chat Feed Benchmarks
// ============================================================================

fn bench_chat_feed_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("chat_feed_push");

    // A fresh live row landing in a feed that already holds the login
    // history fetch.
    for size in [10, CHAT_HISTORY_LIMIT as i64].iter() {
        group.bench_with_input(BenchmarkId::new("into", size), size, |b, &size| {
            b.iter_batched(
                || {
                    let mut feed = ChatFeed::new();
                    for id in 1..=size {
                        feed.push(message(id));
                    }
                    feed
                },
                |mut feed| black_box(feed.push(message(9_999))),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_chat_feed_from_history(c: &mut Criterion) {
    c.bench_function("chat_feed_from_history", |b| {
        // Newest-first, the order the history fetch returns
        let history: Vec<ChatMessage> = (1..=CHAT_HISTORY_LIMIT as i64).rev().map(message).collect();

        b.iter_batched(
            || history.clone(),
            |history| black_box(ChatFeed::from_history(history)),
            criterion::BatchSize::SmallInput,
        )
    });
}

// ============================================================================
// Row Codec Benchmarks
// ============================================================================

fn bench_row_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_codec");

    let msg = message(7);
    group.bench_function("message_to_row", |b| {
        b.iter(|| black_box(to_row(&msg).unwrap()))
    });

    let row = to_row(&msg).unwrap();
    group.bench_function("message_from_row", |b| {
        b.iter_batched(
            || row.clone(),
            |row| black_box(from_row::<ChatMessage>(row).unwrap()),
            criterion::BatchSize::SmallInput,
        )
    });

    group.finish();
}

// ============================================================================
// Criterion Groups
// ============================================================================

criterion_group!(invite_benches, bench_allocate_codes, bench_next_number,);

criterion_group!(parsing_benches, bench_code_parsing, bench_sanitize_filename,);

criterion_group!(chat_benches, bench_chat_feed_push, bench_chat_feed_from_history,);

criterion_group!(codec_benches, bench_row_codec,);

criterion_main!(invite_benches, parsing_benches, chat_benches, codec_benches,);
