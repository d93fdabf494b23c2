//! Lazy fixed-size index combinations in lexicographic order

use crate::utils;

/// Iterator over every `k`-element subset of `0..n`, as sorted index vectors,
/// in lexicographic order. `reset` starts the enumeration over.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    k: usize,
    indices: Vec<usize>,
    started: bool,
    exhausted: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            indices: (0..k).collect(),
            started: false,
            exhausted: k > n,
        }
    }

    /// Restart from the first combination
    pub fn reset(&mut self) {
        self.indices = (0..self.k).collect();
        self.started = false;
        self.exhausted = self.k > self.n;
    }

    /// Total number of combinations, saturating
    pub fn total(&self) -> u128 {
        utils::binomial(self.n, self.k)
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if !self.started {
            self.started = true;
            return Some(self.indices.clone());
        }

        // Rightmost index that can still move up
        let mut i = self.k;
        loop {
            if i == 0 {
                self.exhausted = true;
                return None;
            }
            i -= 1;
            if self.indices[i] < self.n - self.k + i {
                break;
            }
        }

        self.indices[i] += 1;
        for j in i + 1..self.k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
        Some(self.indices.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicographic_order() {
        let all: Vec<_> = Combinations::new(4, 2).collect();
        assert_eq!(
            all,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
    }

    #[test]
    fn test_count_matches_binomial() {
        let combinations = Combinations::new(9, 3);
        let total = combinations.total();
        assert_eq!(combinations.count() as u128, total);
    }

    #[test]
    fn test_edge_sizes() {
        assert_eq!(Combinations::new(2, 3).count(), 0);
        assert_eq!(Combinations::new(3, 3).collect::<Vec<_>>(), vec![vec![0, 1, 2]]);
        assert_eq!(Combinations::new(5, 0).collect::<Vec<_>>(), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_reset_restarts() {
        let mut combinations = Combinations::new(5, 3);
        let first = combinations.next();
        combinations.nth(3);
        combinations.reset();
        assert_eq!(combinations.next(), first);
    }
}
