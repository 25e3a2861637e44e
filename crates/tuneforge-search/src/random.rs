//! Random-subset search.

use crate::searcher::Searcher;
use tuneforge_core::{KernelConfiguration, Result, TunerError};

/// Shuffles the valid configurations with a seeded generator and visits the
/// first `ceil(fraction * N)` of them, clamped to `[1, N]`.
pub struct RandomSearcher {
    configurations: Vec<KernelConfiguration>,
    index: usize,
    count: usize,
}

impl RandomSearcher {
    pub fn new(
        mut configurations: Vec<KernelConfiguration>,
        fraction: f64,
        seed: u64,
    ) -> Result<Self> {
        if configurations.is_empty() {
            return Err(TunerError::InvalidArgument(
                "configuration sequence provided for searcher is empty".into(),
            ));
        }
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(TunerError::InvalidArgument(format!(
                "random search fraction must lie in (0, 1], got {}",
                fraction
            )));
        }

        let mut rng = fastrand::Rng::with_seed(seed);
        rng.shuffle(&mut configurations);

        let total = configurations.len();
        let count = ((fraction * total as f64).ceil() as usize).clamp(1, total);

        Ok(Self {
            configurations,
            index: 0,
            count,
        })
    }
}

impl Searcher for RandomSearcher {
    fn next_configuration(&self) -> &KernelConfiguration {
        &self.configurations[self.index]
    }

    fn advance(&mut self, _last_duration_ns: f64) {
        if self.index < self.count {
            self.index += 1;
        }
    }

    fn remaining(&self) -> usize {
        self.count - self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuneforge_core::{DimensionVector, LaunchGeometry, ParameterValue};

    fn configurations(n: u64) -> Vec<KernelConfiguration> {
        let geometry = LaunchGeometry::new(
            DimensionVector::new(8, 1, 1),
            DimensionVector::new(1, 1, 1),
        );
        (0..n)
            .map(|i| KernelConfiguration::single(vec![ParameterValue::new("A", i)], geometry))
            .collect()
    }

    #[test]
    fn fraction_bounds_are_enforced() {
        assert!(RandomSearcher::new(configurations(4), 0.0, 1).is_err());
        assert!(RandomSearcher::new(configurations(4), 1.5, 1).is_err());
    }

    #[test]
    fn visits_ceil_of_fraction_without_repeats() {
        let mut searcher = RandomSearcher::new(configurations(10), 0.25, 7).unwrap();
        assert_eq!(searcher.remaining(), 3);

        let mut seen = Vec::new();
        while searcher.remaining() > 0 {
            seen.push(searcher.next_configuration().value_of("A").unwrap());
            searcher.advance(0.0);
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn tiny_fraction_still_visits_one() {
        let searcher = RandomSearcher::new(configurations(4), 0.01, 7).unwrap();
        assert_eq!(searcher.remaining(), 1);
    }

    #[test]
    fn same_seed_gives_same_order() {
        let order = |seed| {
            let mut searcher = RandomSearcher::new(configurations(8), 1.0, seed).unwrap();
            let mut seen = Vec::new();
            while searcher.remaining() > 0 {
                seen.push(searcher.next_configuration().value_of("A").unwrap());
                searcher.advance(0.0);
            }
            seen
        };

        assert_eq!(order(3), order(3));
    }
}
