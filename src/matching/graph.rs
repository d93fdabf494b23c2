//! Bipartite compatibility graph between the two queues
//!
//! Vertices are the snapshot's participants, in snapshot order. An edge joins a
//! male and a female when neither lists the other as a friend. Once built, the
//! graph is the only thing the matcher consults.

use crate::friends::index::FriendSet;
use crate::types::{Identity, Participant, QueueSnapshot};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CompatibilityGraph {
    males: Vec<Participant>,
    females: Vec<Participant>,
    /// `adjacency[m][f]` for male index `m`, female index `f`
    adjacency: Vec<Vec<bool>>,
}

impl CompatibilityGraph {
    /// Build the graph. Identities with no entry in `friends` have no friends.
    pub fn build(snapshot: &QueueSnapshot, friends: &HashMap<Identity, FriendSet>) -> Self {
        let is_friend_of = |owner: &str, other: &str| {
            friends
                .get(owner)
                .map(|set| set.contains(other))
                .unwrap_or(false)
        };

        let adjacency = snapshot
            .males
            .iter()
            .map(|male| {
                snapshot
                    .females
                    .iter()
                    .map(|female| {
                        !is_friend_of(&male.identity, &female.identity)
                            && !is_friend_of(&female.identity, &male.identity)
                    })
                    .collect()
            })
            .collect();

        Self {
            males: snapshot.males.clone(),
            females: snapshot.females.clone(),
            adjacency,
        }
    }

    pub fn males(&self) -> &[Participant] {
        &self.males
    }

    pub fn females(&self) -> &[Participant] {
        &self.females
    }

    pub fn compatible(&self, male: usize, female: usize) -> bool {
        self.adjacency[male][female]
    }

    pub fn male_degree(&self, male: usize) -> usize {
        self.adjacency[male].iter().filter(|edge| **edge).count()
    }

    pub fn female_degree(&self, female: usize) -> usize {
        self.adjacency.iter().filter(|row| row[female]).count()
    }

    pub fn edge_count(&self) -> usize {
        (0..self.males.len()).map(|m| self.male_degree(m)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionHandle;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn snapshot(males: &[&str], females: &[&str]) -> QueueSnapshot {
        let make = |ids: &[&str]| {
            ids.iter()
                .map(|id| Participant::new(*id, ConnectionHandle::new(*id)))
                .collect()
        };
        QueueSnapshot {
            males: make(males),
            females: make(females),
        }
    }

    #[test]
    fn test_complete_graph_without_friends() {
        let graph = CompatibilityGraph::build(&snapshot(&["a", "b"], &["x", "y", "z"]), &HashMap::new());
        assert_eq!(graph.edge_count(), 6);
        assert_eq!(graph.male_degree(0), 3);
        assert_eq!(graph.female_degree(2), 2);
    }

    #[test]
    fn test_one_sided_friendship_removes_edge() {
        let mut friends: HashMap<Identity, FriendSet> = HashMap::new();
        friends.insert("y".to_string(), Arc::new(HashSet::from(["a".to_string()])));

        let graph = CompatibilityGraph::build(&snapshot(&["a", "b"], &["x", "y"]), &friends);

        assert!(!graph.compatible(0, 1));
        assert!(graph.compatible(0, 0));
        assert!(graph.compatible(1, 1));
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_same_side_friendships_are_irrelevant() {
        let mut friends: HashMap<Identity, FriendSet> = HashMap::new();
        friends.insert("a".to_string(), Arc::new(HashSet::from(["b".to_string()])));

        let graph = CompatibilityGraph::build(&snapshot(&["a", "b"], &["x"]), &friends);
        assert_eq!(graph.edge_count(), 2);
    }
}
