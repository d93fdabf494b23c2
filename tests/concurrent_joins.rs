//! Concurrency tests for join processing
//!
//! Many joins and leaves race each other; the queues and sessions must stay
//! consistent no matter how the attempts interleave.

mod fixtures;

use fixtures::{create_test_system, TestSystem};
use meeting_matcher::types::{Gender, Identity};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Every identity in a SessionReady event
fn matched_identities(system: &TestSystem) -> Vec<Identity> {
    system
        .events
        .ready_events()
        .into_iter()
        .flat_map(|event| event.males.into_iter().chain(event.females))
        .map(|p| p.identity)
        .collect()
}

async fn spawn_joins(system: &Arc<TestSystem>, count: usize) {
    let mut handles = Vec::new();
    for i in 0..count {
        for (prefix, gender) in [("m", Gender::Male), ("f", Gender::Female)] {
            let system = system.clone();
            let identity = format!("{}{}", prefix, i);
            handles.push(tokio::spawn(async move {
                system.join(&identity, gender).await;
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_never_double_match() {
    let system = Arc::new(create_test_system(2, &[]));
    let start = Instant::now();

    spawn_joins(&system, 40).await;

    let matched = matched_identities(&system);
    let unique: HashSet<&Identity> = matched.iter().collect();
    assert_eq!(unique.len(), matched.len(), "an identity was matched twice");

    // Matched participants are gone from both queues
    let males = system.queued(Gender::Male).await;
    let females = system.queued(Gender::Female).await;
    for identity in males.iter().chain(females.iter()) {
        assert!(!unique.contains(identity), "{} is matched and queued", identity);
    }

    // Nobody was lost
    assert_eq!(matched.len() + males.len() + females.len(), 80);
    assert_eq!(
        system.sessions.session_count(),
        system.events.ready_events().len()
    );

    println!(
        "80 concurrent joins -> {} sessions in {:?}",
        system.sessions.session_count(),
        start.elapsed()
    );
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leaves_never_produce_partial_sessions() {
    let system = Arc::new(create_test_system(3, &[]));

    let mut handles = Vec::new();
    for i in 0..30 {
        let gender = if i % 2 == 0 { Gender::Male } else { Gender::Female };
        let identity = format!("p{}", i);

        let joiner = system.clone();
        let joined = identity.clone();
        handles.push(tokio::spawn(async move {
            joiner.join(&joined, gender).await;
        }));

        if i % 3 == 0 {
            let leaver = system.clone();
            handles.push(tokio::spawn(async move {
                leaver.leave(&identity, gender).await;
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for event in system.events.ready_events() {
        assert_eq!(event.males.len(), 3);
        assert_eq!(event.females.len(), 3);

        let roster = system.sessions.participants(event.session_id).await.unwrap();
        assert_eq!(roster.len(), 6);
    }

    let matched = matched_identities(&system);
    let unique: HashSet<&Identity> = matched.iter().collect();
    assert_eq!(unique.len(), matched.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_rejoins_hold_one_slot() {
    let system = Arc::new(create_test_system(5, &[]));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let system = system.clone();
        handles.push(tokio::spawn(async move {
            system.join("same", Gender::Female).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(system.queued(Gender::Female).await, vec!["same".to_string()]);
    assert_eq!(system.service.get_stats().await.unwrap().joins, 20);
}
