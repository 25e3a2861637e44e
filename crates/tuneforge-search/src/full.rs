//! Exhaustive search.

use crate::searcher::Searcher;
use tuneforge_core::KernelConfiguration;

/// Visits every valid configuration once, in generator order. Duration
/// feedback is ignored.
pub struct FullSearcher {
    configurations: Vec<KernelConfiguration>,
    index: usize,
}

impl FullSearcher {
    pub fn new(configurations: Vec<KernelConfiguration>) -> Self {
        Self {
            configurations,
            index: 0,
        }
    }
}

impl Searcher for FullSearcher {
    fn next_configuration(&self) -> &KernelConfiguration {
        &self.configurations[self.index]
    }

    fn advance(&mut self, _last_duration_ns: f64) {
        if self.index < self.configurations.len() {
            self.index += 1;
        }
    }

    fn remaining(&self) -> usize {
        self.configurations.len() - self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuneforge_core::{DimensionVector, LaunchGeometry, ParameterValue};

    #[test]
    fn visits_everything_in_order() {
        let geometry = LaunchGeometry::new(
            DimensionVector::new(8, 1, 1),
            DimensionVector::new(1, 1, 1),
        );
        let configurations: Vec<_> = (0..4)
            .map(|i| KernelConfiguration::single(vec![ParameterValue::new("A", i)], geometry))
            .collect();

        let mut searcher = FullSearcher::new(configurations);
        let mut seen = Vec::new();
        while searcher.remaining() > 0 {
            seen.push(searcher.next_configuration().value_of("A").unwrap());
            searcher.advance(0.0);
        }

        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
