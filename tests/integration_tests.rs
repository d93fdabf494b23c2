//! Integration tests for the meeting matcher
//!
//! These tests drive the meeting service end to end through the public API:
//! - Group formation with and without cross-side friendships
//! - Leaves racing an in-flight matching attempt
//! - Queue dedup and the admission threshold
//! - Provider and friend lookup failures

mod fixtures;

use fixtures::{
    create_test_system, create_test_system_with, create_test_system_with_settings, sorted,
    CountingSocialGraph, FailingSocialGraph, GatedSocialGraph, RejectingVideoProvider,
};
use meeting_matcher::config::MatchingSettings;
use meeting_matcher::error::MeetingError;
use meeting_matcher::friends::StaticSocialGraph;
use meeting_matcher::session::{InMemoryVideoProvider, SessionState};
use meeting_matcher::types::{Gender, MeetingEvent};
use std::sync::Arc;
use std::time::Duration;

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn test_friendless_six_form_a_session() {
    let system = create_test_system(3, &[]);

    for male in ["A", "B", "C"] {
        assert!(system.join(male, Gender::Male).await.session.is_none());
    }
    system.join("X", Gender::Female).await;
    system.join("Y", Gender::Female).await;
    let outcome = system.join("Z", Gender::Female).await;

    let session = outcome.session.expect("six friendless participants should match");
    assert_eq!(
        sorted(session.males.iter().map(|p| p.identity.clone())),
        ids(&["A", "B", "C"])
    );
    assert_eq!(
        sorted(session.females.iter().map(|p| p.identity.clone())),
        ids(&["X", "Y", "Z"])
    );
    assert_eq!(outcome.queue.position, None);

    // All six registered on the session with their connections
    let roster = system.sessions.participants(session.session_id).await.unwrap();
    assert_eq!(roster.len(), 6);
    let a = roster.iter().find(|p| p.identity == "A").unwrap();
    assert_eq!(a.connection_handle.as_str(), "conn-A");

    let tracked = system.sessions.get(session.session_id).await.unwrap().unwrap();
    assert_eq!(tracked.state, SessionState::Active);

    assert!(system.queued(Gender::Male).await.is_empty());
    assert!(system.queued(Gender::Female).await.is_empty());
    assert_eq!(system.events.ready_events().len(), 1);
}

#[tokio::test]
async fn test_one_friendship_blocks_the_only_group() {
    let system = create_test_system(3, &[("A", "X")]);

    for male in ["A", "B", "C"] {
        system.join(male, Gender::Male).await;
    }
    for female in ["X", "Y", "Z"] {
        let outcome = system.join(female, Gender::Female).await;
        assert!(outcome.session.is_none());
    }

    assert_eq!(system.queued(Gender::Male).await, ids(&["A", "B", "C"]));
    assert_eq!(system.queued(Gender::Female).await, ids(&["X", "Y", "Z"]));
    assert_eq!(system.sessions.session_count(), 0);

    let stats = system.service.get_stats().await.unwrap();
    assert_eq!(stats.no_match_attempts, 1);
    assert_eq!(stats.matches_made, 0);
}

#[tokio::test]
async fn test_fourth_male_unblocks_group_without_friend() {
    let system = create_test_system(3, &[("A", "X")]);

    for male in ["A", "B", "C"] {
        system.join(male, Gender::Male).await;
    }
    for female in ["X", "Y", "Z"] {
        system.join(female, Gender::Female).await;
    }

    let outcome = system.join("D", Gender::Male).await;
    let session = outcome.session.expect("B, C and D are compatible with X, Y and Z");

    assert_eq!(
        sorted(session.males.iter().map(|p| p.identity.clone())),
        ids(&["B", "C", "D"])
    );
    assert_eq!(
        sorted(session.females.iter().map(|p| p.identity.clone())),
        ids(&["X", "Y", "Z"])
    );

    // A stays queued
    assert_eq!(system.queued(Gender::Male).await, ids(&["A"]));
    assert!(system.queued(Gender::Female).await.is_empty());
}

#[tokio::test]
async fn test_leave_during_attempt_discards_result() {
    let graph = Arc::new(GatedSocialGraph::new(StaticSocialGraph::new()));
    let system = Arc::new(create_test_system_with(
        3,
        graph.clone(),
        Arc::new(InMemoryVideoProvider::new()),
    ));

    for male in ["A", "B", "C"] {
        system.join(male, Gender::Male).await;
    }
    system.join("X", Gender::Female).await;
    system.join("Y", Gender::Female).await;

    // Z's join snapshots all six, then blocks on friend lookups
    let joining = {
        let system = system.clone();
        tokio::spawn(async move { system.join("Z", Gender::Female).await })
    };
    graph.wait_until_entered().await;

    system.leave("A", Gender::Male).await;
    graph.open();

    let outcome = joining.await.unwrap();
    assert!(outcome.session.is_none());
    assert_eq!(outcome.queue.position, Some(2));

    assert_eq!(system.sessions.session_count(), 0);
    assert!(system.events.ready_events().is_empty());
    assert_eq!(system.queued(Gender::Male).await, ids(&["B", "C"]));
    assert_eq!(system.queued(Gender::Female).await, ids(&["X", "Y", "Z"]));

    let stats = system.service.get_stats().await.unwrap();
    assert_eq!(stats.stale_attempts, 1);
    assert_eq!(stats.matches_made, 0);
}

#[tokio::test]
async fn test_leave_is_not_held_up_by_a_full_worker_buffer() {
    let graph = Arc::new(GatedSocialGraph::new(StaticSocialGraph::new()));
    let settings = MatchingSettings {
        group_size: 1,
        worker_queue_capacity: 1,
        ..MatchingSettings::default()
    };
    let system = Arc::new(create_test_system_with_settings(
        settings,
        graph.clone(),
        Arc::new(InMemoryVideoProvider::new()),
    ));

    system.join("m0", Gender::Male).await;

    // f0's attempt occupies the worker, f1's fills the buffer, f2's waits
    let mut joining = Vec::new();
    for female in ["f0", "f1", "f2"] {
        let system = system.clone();
        joining.push(tokio::spawn(async move {
            system.join(female, Gender::Female).await
        }));
        if female == "f0" {
            graph.wait_until_entered().await;
        }
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let left = tokio::time::timeout(
        Duration::from_secs(1),
        system.service.leave_queue("m0", Gender::Male),
    )
    .await;
    assert!(left.is_ok(), "leave waited on the match worker");
    left.unwrap().unwrap();

    graph.open();
    for handle in joining {
        assert!(handle.await.unwrap().session.is_none());
    }

    assert!(system.queued(Gender::Male).await.is_empty());
    assert_eq!(
        sorted(system.queued(Gender::Female).await),
        ids(&["f0", "f1", "f2"])
    );
    assert_eq!(system.sessions.session_count(), 0);
}

#[tokio::test]
async fn test_rejoin_moves_to_tail_without_growing_queue() {
    let system = create_test_system(3, &[]);

    for female in ["X", "Y", "Z"] {
        system.join(female, Gender::Female).await;
    }
    let outcome = system.join("X", Gender::Female).await;

    assert_eq!(outcome.queue.queue_length, 3);
    assert_eq!(outcome.queue.position, Some(2));
    assert_eq!(system.queued(Gender::Female).await, ids(&["Y", "Z", "X"]));
}

#[tokio::test]
async fn test_switching_queues_keeps_one_slot() {
    let system = create_test_system(3, &[]);

    system.join("P", Gender::Male).await;
    system.join("P", Gender::Female).await;

    assert!(system.queued(Gender::Male).await.is_empty());
    assert_eq!(system.queued(Gender::Female).await, ids(&["P"]));
}

#[tokio::test]
async fn test_no_attempt_below_admission_threshold() {
    let graph = Arc::new(CountingSocialGraph::new(StaticSocialGraph::new()));
    let system = create_test_system_with(3, graph.clone(), Arc::new(InMemoryVideoProvider::new()));

    system.join("A", Gender::Male).await;
    system.join("B", Gender::Male).await;
    for female in ["T", "U", "V", "W", "X"] {
        system.join(female, Gender::Female).await;
    }

    // Never hydrated, so the worker never ran
    assert_eq!(graph.lookups(), 0);
    let stats = system.service.get_stats().await.unwrap();
    assert_eq!(stats.no_match_attempts, 0);
    assert_eq!(stats.males_waiting, 2);
    assert_eq!(stats.females_waiting, 5);
}

#[tokio::test]
async fn test_leave_then_rejoin_reaches_threshold() {
    let system = create_test_system(1, &[]);

    system.join("A", Gender::Male).await;
    system.leave("A", Gender::Male).await;
    assert!(system.join("X", Gender::Female).await.session.is_none());

    // Leaving an identity that is not queued is a no-op
    system.leave("nobody", Gender::Male).await;

    let outcome = system.join("A", Gender::Male).await;
    assert!(outcome.session.is_some());
}

#[tokio::test]
async fn test_identical_queues_give_identical_groups() {
    let friendships = [("M1", "F1"), ("M2", "F3"), ("M4", "F2")];
    let joins = [
        ("M1", Gender::Male),
        ("M2", Gender::Male),
        ("M3", Gender::Male),
        ("F1", Gender::Female),
        ("F2", Gender::Female),
        ("F3", Gender::Female),
        ("M4", Gender::Male),
        ("F4", Gender::Female),
    ];

    let mut groups = Vec::new();
    for _ in 0..2 {
        let system = create_test_system(2, &friendships);
        let mut formed = Vec::new();
        for (identity, gender) in joins {
            if let Some(session) = system.join(identity, gender).await.session {
                formed.push((
                    sorted(session.males.iter().map(|p| p.identity.clone())),
                    sorted(session.females.iter().map(|p| p.identity.clone())),
                ));
            }
        }
        groups.push(formed);
    }

    assert!(!groups[0].is_empty());
    assert_eq!(groups[0], groups[1]);
}

#[tokio::test]
async fn test_matched_groups_respect_friendships() {
    let friendships = [("M1", "F1"), ("M1", "F2"), ("M2", "F1"), ("M3", "F3")];
    let system = create_test_system(2, &friendships);

    for male in ["M1", "M2", "M3", "M4"] {
        system.join(male, Gender::Male).await;
    }
    for female in ["F1", "F2", "F3", "F4"] {
        system.join(female, Gender::Female).await;
    }

    let ready = system.events.ready_events();
    assert!(!ready.is_empty());
    for event in ready {
        for male in &event.males {
            for female in &event.females {
                assert!(
                    !friendships.contains(&(male.identity.as_str(), female.identity.as_str())),
                    "{} and {} are friends",
                    male.identity,
                    female.identity
                );
            }
        }
    }
}

#[tokio::test]
async fn test_provider_failure_requeues_group() {
    let system = create_test_system_with(
        1,
        Arc::new(StaticSocialGraph::new()),
        Arc::new(RejectingVideoProvider),
    );

    system.join("Q", Gender::Male).await;
    system.join("A", Gender::Male).await;
    let error = system
        .service
        .join_queue("X", fixtures::connection("X"), Gender::Female)
        .await
        .unwrap_err();

    assert!(matches!(
        MeetingError::find(&error),
        Some(MeetingError::ProviderFailure { .. })
    ));

    // Q was matched, then put back behind A
    assert_eq!(system.queued(Gender::Male).await, ids(&["A", "Q"]));
    assert_eq!(system.queued(Gender::Female).await, ids(&["X"]));
    assert_eq!(system.sessions.session_count(), 0);
    assert!(system.events.get_published_events().is_empty());
}

#[tokio::test]
async fn test_friend_lookup_failure_leaves_queues_untouched() {
    let graph = Arc::new(FailingSocialGraph::new(StaticSocialGraph::new(), "B"));
    let system = create_test_system_with(2, graph, Arc::new(InMemoryVideoProvider::new()));

    system.join("A", Gender::Male).await;
    system.join("B", Gender::Male).await;
    system.join("X", Gender::Female).await;
    let error = system
        .service
        .join_queue("Y", fixtures::connection("Y"), Gender::Female)
        .await
        .unwrap_err();

    assert!(matches!(
        MeetingError::find(&error),
        Some(MeetingError::FriendLookupFailure { identity, .. }) if identity == "B"
    ));
    assert_eq!(system.queued(Gender::Male).await, ids(&["A", "B"]));
    assert_eq!(system.queued(Gender::Female).await, ids(&["X", "Y"]));

    let stats = system.service.get_stats().await.unwrap();
    assert_eq!(stats.failed_attempts, 1);
}

#[tokio::test]
async fn test_close_session_publishes_once() {
    let system = create_test_system(1, &[]);

    system.join("A", Gender::Male).await;
    let session = system
        .join("X", Gender::Female)
        .await
        .session
        .expect("one per side should match");

    system.service.close_session(session.session_id).await.unwrap();
    system.service.close_session(session.session_id).await.unwrap();

    let closed: Vec<_> = system
        .events
        .get_published_events()
        .into_iter()
        .filter(|event| matches!(event, MeetingEvent::SessionClosed(_)))
        .collect();
    assert_eq!(closed.len(), 1);
    assert!(system.sessions.get(session.session_id).await.unwrap().is_none());

    let stats = system.service.get_stats().await.unwrap();
    assert_eq!(stats.sessions_closed, 1);
    assert_eq!(stats.active_sessions, 0);
}
