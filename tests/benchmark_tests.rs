//! Performance benchmarks for the session hot paths

use rand::rngs::StdRng;
use rand::SeedableRng;
use server::broadcast::GameMessage;
use server::coordinator::{MatchCoordinator, SessionConfig};
use server::roles;
use server::win;
use shared::{decode_packet, encode_packet, MatchPhase, Packet, Role, ServerEvent, Team};
use std::time::Instant;
use tokio::sync::mpsc;

/// Benchmarks role shuffling for every supported table size
#[test]
fn benchmark_role_distribution() {
    let mut rng = StdRng::seed_from_u64(1);
    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let player_count = roles::MIN_TABLE_PLAYERS + i % 4;
        let dealt = roles::distribute(player_count, &mut rng);
        assert_eq!(dealt.len(), player_count);
    }

    let duration = start.elapsed();
    println!(
        "Role distribution: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Generous bound to stay stable on slow CI machines
    assert!(duration.as_secs() < 5);
}

/// Benchmarks win evaluation over a mix of alive sets
#[test]
fn benchmark_win_evaluation() {
    let snapshots: Vec<Vec<Role>> = vec![
        vec![Role::Sheriff, Role::Outlaw, Role::Renegade, Role::Deputy],
        vec![Role::Renegade],
        vec![Role::Sheriff, Role::Deputy],
        vec![Role::Outlaw, Role::Outlaw, Role::Renegade],
    ];

    let iterations = 250_000;
    let start = Instant::now();
    let mut decided = 0;

    for i in 0..iterations {
        if win::evaluate(&snapshots[i % snapshots.len()]).is_some() {
            decided += 1;
        }
    }

    let duration = start.elapsed();
    println!(
        "Win evaluation: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(decided, iterations / 4 * 3);
    assert!(duration.as_secs() < 5);
}

/// Benchmarks encoding and decoding the largest packet the server sends
#[test]
fn benchmark_packet_serialization() {
    let packet = Packet::Event {
        sequence: u64::MAX,
        event: ServerEvent::MatchEnded {
            winning_team: Team::Sheriff,
            revealed_roles: (0..roles::MAX_TABLE_PLAYERS)
                .map(|i| (format!("player-with-a-long-name-{}", i), Role::Deputy))
                .collect(),
        },
    };

    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let bytes = encode_packet(&packet).unwrap();
        let decoded = decode_packet(&bytes).unwrap();
        assert!(matches!(decoded, Packet::Event { .. }));
    }

    let duration = start.elapsed();
    println!(
        "Packet serialization: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_secs() < 5);
}

/// Stress test: many full sessions on one coordinator instance
#[test]
fn stress_test_repeated_sessions() {
    let (tx, mut rx) = mpsc::unbounded_channel::<GameMessage>();
    let mut coordinator = MatchCoordinator::with_seed(SessionConfig::default(), tx, 99);

    let sessions = 1_000;
    let start = Instant::now();

    for session in 0..sessions {
        let player_count = 4 + session % 4;
        for id in 0..player_count {
            coordinator
                .register_player(id as u32 + 1, format!("p{}", id))
                .unwrap();
        }
        coordinator.notify_all_players_ready().unwrap();
        for id in 0..player_count {
            coordinator.notify_ready(id as u32 + 1).unwrap();
        }
        assert_eq!(coordinator.phase(), MatchPhase::InProgress);

        let sheriff = coordinator
            .players()
            .into_iter()
            .find(|player| player.role == Role::Sheriff)
            .map(|player| player.connection_id)
            .unwrap();
        coordinator.notify_death(sheriff).unwrap();
        assert_eq!(coordinator.winner(), Some(Team::Outlaws));

        coordinator.reset_session();
        while rx.try_recv().is_ok() {}
    }

    let duration = start.elapsed();
    println!(
        "Repeated sessions: {} sessions in {:?} ({:.2} us/session)",
        sessions,
        duration,
        duration.as_micros() as f64 / sessions as f64
    );

    assert!(duration.as_secs() < 10);
}
