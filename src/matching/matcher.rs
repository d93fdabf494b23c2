//! Group matching algorithms
//!
//! The matcher looks for `K` males and `K` females such that every cross pair
//! is an edge of the compatibility graph. It returns the first such pair of
//! groups, with male groups in the outer loop and female groups in the inner
//! loop, each enumerated lexicographically over snapshot position.

use crate::matching::combinations::Combinations;
use crate::matching::graph::CompatibilityGraph;
use crate::types::MatchResult;
use tracing::debug;

/// Trait for group search algorithms
pub trait GroupMatcher: Send + Sync {
    /// First valid pair of groups in the graph, if any
    fn find_group(&self, graph: &CompatibilityGraph) -> Option<MatchResult>;

    /// Participants per side
    fn group_size(&self) -> usize;
}

/// First-valid search over lexicographic combinations.
///
/// Vertices that cannot take part in any valid group (fewer than `K`
/// surviving neighbours) are pruned first. Enumerating combinations of the
/// survivors in their original order visits valid groups in the same order as
/// enumerating over everyone, so the returned group is unchanged.
#[derive(Debug, Clone)]
pub struct FirstValidMatcher {
    group_size: usize,
}

impl FirstValidMatcher {
    pub fn new(group_size: usize) -> Self {
        Self { group_size }
    }

    /// Indices of males and females that survive iterative degree pruning
    fn prune(&self, graph: &CompatibilityGraph) -> (Vec<usize>, Vec<usize>) {
        let k = self.group_size;
        let mut male_alive = vec![true; graph.males().len()];
        let mut female_alive = vec![true; graph.females().len()];

        loop {
            let mut changed = false;

            for m in 0..male_alive.len() {
                if !male_alive[m] {
                    continue;
                }
                let degree = (0..female_alive.len())
                    .filter(|&f| female_alive[f] && graph.compatible(m, f))
                    .count();
                if degree < k {
                    male_alive[m] = false;
                    changed = true;
                }
            }

            for f in 0..female_alive.len() {
                if !female_alive[f] {
                    continue;
                }
                let degree = (0..male_alive.len())
                    .filter(|&m| male_alive[m] && graph.compatible(m, f))
                    .count();
                if degree < k {
                    female_alive[f] = false;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }

        let alive = |flags: &[bool]| {
            flags
                .iter()
                .enumerate()
                .filter_map(|(i, alive)| alive.then_some(i))
                .collect::<Vec<_>>()
        };
        (alive(&male_alive), alive(&female_alive))
    }
}

impl GroupMatcher for FirstValidMatcher {
    fn find_group(&self, graph: &CompatibilityGraph) -> Option<MatchResult> {
        let k = self.group_size;
        if k == 0 {
            return None;
        }

        let (males, females) = self.prune(graph);
        debug!(
            "Group search - males: {}/{}, females: {}/{} after pruning, group size: {}",
            males.len(),
            graph.males().len(),
            females.len(),
            graph.females().len(),
            k
        );
        if males.len() < k || females.len() < k {
            return None;
        }

        for combination in Combinations::new(males.len(), k) {
            let male_group: Vec<usize> = combination.iter().map(|&i| males[i]).collect();

            // A female group is valid for this male group iff every member is a
            // common neighbour, so the first valid one in lexicographic order is
            // the first K common neighbours.
            let common: Vec<usize> = females
                .iter()
                .copied()
                .filter(|&f| male_group.iter().all(|&m| graph.compatible(m, f)))
                .take(k)
                .collect();

            if common.len() == k {
                return Some(MatchResult {
                    males: male_group
                        .iter()
                        .map(|&m| graph.males()[m].clone())
                        .collect(),
                    females: common
                        .iter()
                        .map(|&f| graph.females()[f].clone())
                        .collect(),
                });
            }
        }

        None
    }

    fn group_size(&self) -> usize {
        self.group_size
    }
}
