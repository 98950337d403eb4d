//! Performance benchmarks for critical game systems

use bincode::{deserialize, serialize};
use client::game::ClientGameState;
use server::game::GameState;
use shared::{Board, GameEvent, Mark, MatchState, Packet, Scores, LINES};
use std::time::Instant;

/// Benchmarks win detection over every line
#[test]
fn benchmark_win_detection() {
    let mut board = Board::new();
    board.place(0, 2, Mark::Circle);
    board.place(1, 1, Mark::Circle);
    board.place(2, 0, Mark::Circle);

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        // The falling diagonal is scanned last.
        let (line, mark) = board.winning_line().unwrap();
        assert_eq!(mark, Mark::Circle);
        assert_eq!(*line, LINES[7]);
    }

    let duration = start.elapsed();
    println!(
        "Win detection: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 500);
}

/// Benchmarks full authoritative games, including replication outbox draining
#[test]
fn benchmark_authoritative_games() {
    // Cross wins on the fifth move.
    let moves = [
        (0, 0, Mark::Cross),
        (0, 1, Mark::Circle),
        (1, 0, Mark::Cross),
        (1, 1, Mark::Circle),
        (2, 0, Mark::Cross),
    ];

    let mut game = GameState::new();
    game.start();

    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        for (x, y, mark) in moves {
            assert!(game.attempt_move(x, y, mark));
        }
        assert!(game.rematch());
        let _ = game.drain_events();
        let _ = game.take_state_update();
    }

    let duration = start.elapsed();
    println!(
        "Authoritative games: {} games in {:?} ({:.2} µs/game)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(game.scores().cross, iterations);
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks packet serialization for the per-tick state resync
#[test]
fn benchmark_state_sync_serialization() {
    let packet = Packet::StateSync {
        version: 42,
        state: MatchState {
            current_turn: Some(Mark::Circle),
            scores: Scores {
                cross: 3,
                circle: 2,
            },
        },
    };

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = serialize(&packet).unwrap();
        let _: Packet = deserialize(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "StateSync round trip: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(serialize(&packet).unwrap().len() < 64);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks participant-side application of a stream of resyncs and events
#[test]
fn benchmark_participant_apply() {
    let mut participant = ClientGameState::new();
    participant.apply_connected(1, Mark::Cross);

    let iterations: u32 = 100_000;
    let start = Instant::now();

    for i in 1..=iterations {
        let turn = if i % 2 == 0 { Mark::Cross } else { Mark::Circle };
        participant.apply_state(
            i,
            MatchState {
                current_turn: Some(turn),
                scores: Scores::default(),
            },
        );
        // Duplicate resync of the same version is dropped cheaply.
        participant.apply_state(
            i,
            MatchState {
                current_turn: Some(turn),
                scores: Scores::default(),
            },
        );
        participant.apply_event(i, GameEvent::Rematch);
    }

    let duration = start.elapsed();
    println!(
        "Participant apply: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(participant.current_turn(), Some(Mark::Cross));
    assert!(duration.as_millis() < 1000);
}
