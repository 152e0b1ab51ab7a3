//! Determinism - golden-master verification.
//!
//! The same command sequence must produce a byte-identical rendered event
//! stream and the same final book state on every run.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tickmatch::{Command, OrderBook, Side, TickFormat};

/// Deterministic mix of adds, cancels, and replaces.
fn generate_commands(seed: u64, count: usize) -> Vec<Command> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut commands = Vec::with_capacity(count);
    let mut active: Vec<i64> = Vec::new();
    let mut next_id = 1i64;

    for _ in 0..count {
        let roll: f64 = rng.gen();
        if active.is_empty() || roll < 0.6 {
            let id = next_id;
            next_id += 1;
            commands.push(Command::New {
                side: if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell },
                qty: rng.gen_range(1..500),
                price_ticks: rng.gen_range(4800..5200),
                id,
            });
            active.push(id);
        } else if roll < 0.85 {
            let idx = rng.gen_range(0..active.len());
            let id = active.swap_remove(idx);
            commands.push(Command::Cancel { id });
        } else {
            let idx = rng.gen_range(0..active.len());
            let old_id = active.swap_remove(idx);
            let new_id = next_id;
            next_id += 1;
            commands.push(Command::Replace {
                old_id,
                new_qty: rng.gen_range(1..500),
                new_price_ticks: rng.gen_range(4800..5200),
                new_id,
            });
            active.push(new_id);
        }
    }

    commands
}

fn apply(book: &mut OrderBook, cmd: Command) -> Vec<tickmatch::BookEvent> {
    match cmd {
        Command::New { side, qty, price_ticks, id } => book.process_new(side, qty, price_ticks, id),
        Command::Cancel { id } => book.cancel(id),
        Command::Replace { old_id, new_qty, new_price_ticks, new_id } => {
            book.replace(old_id, new_qty, new_price_ticks, new_id)
        }
    }
}

/// Run the whole sequence; hash every rendered line plus the final state.
fn run_book(commands: &[Command]) -> (u64, u64) {
    let fmt = TickFormat::default();
    let mut book = OrderBook::new(1 << 20);
    let mut hasher = DefaultHasher::new();

    for &cmd in commands {
        for event in apply(&mut book, cmd) {
            event.render(&fmt).hash(&mut hasher);
        }
    }

    (hasher.finish(), book.state_hash())
}

#[test]
fn test_determinism_small() {
    const SEED: u64 = 0xDEADBEEF;
    const COUNT: usize = 1_000;
    const RUNS: usize = 10;

    let commands = generate_commands(SEED, COUNT);
    let (first_event_hash, first_state_hash) = run_book(&commands);

    for run in 1..RUNS {
        let (event_hash, state_hash) = run_book(&commands);
        assert_eq!(event_hash, first_event_hash, "event hash mismatch on run {}", run);
        assert_eq!(state_hash, first_state_hash, "state hash mismatch on run {}", run);
    }
}

#[test]
fn test_determinism_large() {
    const SEED: u64 = 0xCAFEBABE;
    const COUNT: usize = 100_000;
    const RUNS: usize = 3;

    let commands = generate_commands(SEED, COUNT);
    let (first_event_hash, first_state_hash) = run_book(&commands);

    for run in 1..RUNS {
        let (event_hash, state_hash) = run_book(&commands);
        assert_eq!(event_hash, first_event_hash, "event hash mismatch on run {}", run);
        assert_eq!(state_hash, first_state_hash, "state hash mismatch on run {}", run);
    }
}

#[test]
fn test_different_seeds_produce_different_results() {
    let commands1 = generate_commands(1, 1_000);
    let commands2 = generate_commands(2, 1_000);

    let (hash1, _) = run_book(&commands1);
    let (hash2, _) = run_book(&commands2);

    assert_ne!(hash1, hash2, "different seeds should produce different streams");
}

#[test]
fn test_rendered_stream_is_stable_across_books() {
    // Two books fed the same commands emit identical lines in identical order.
    let fmt = TickFormat::default();
    let commands = generate_commands(0x5EED, 5_000);

    let mut book1 = OrderBook::new(1 << 16);
    let mut book2 = OrderBook::new(1 << 16);

    for &cmd in &commands {
        let lines1: Vec<String> = apply(&mut book1, cmd).iter().map(|e| e.render(&fmt)).collect();
        let lines2: Vec<String> = apply(&mut book2, cmd).iter().map(|e| e.render(&fmt)).collect();
        assert_eq!(lines1, lines2);
    }
}
