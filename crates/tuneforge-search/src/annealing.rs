//! Simulated annealing search.

use crate::searcher::Searcher;
use std::collections::HashMap;
use tuneforge_core::{KernelConfiguration, KernelParameter, Result, TunerError};

/// Attempts at drawing a valid neighbour before keeping the current
/// configuration for another round.
const NEIGHBOUR_RESAMPLE_LIMIT: usize = 32;

/// Metropolis-style walk over the valid configurations.
///
/// A neighbour differs from the current configuration in one randomly chosen
/// parameter. Worse neighbours are accepted with probability
/// `exp(-delta / temperature)`; the temperature is multiplied by the cooling
/// factor after every step. The walk stops after as many evaluations as
/// there are valid configurations.
pub struct AnnealingSearcher {
    configurations: Vec<KernelConfiguration>,
    index_by_values: HashMap<Vec<u64>, usize>,
    parameters: Vec<KernelParameter>,
    rng: fastrand::Rng,
    temperature: f64,
    cooling_factor: f64,
    current: usize,
    candidate: usize,
    current_duration: f64,
    best: usize,
    best_duration: f64,
    visited: usize,
    budget: usize,
}

impl AnnealingSearcher {
    pub fn new(
        configurations: Vec<KernelConfiguration>,
        parameters: &[KernelParameter],
        initial_temperature: f64,
        cooling_factor: f64,
        seed: u64,
    ) -> Result<Self> {
        if configurations.is_empty() {
            return Err(TunerError::InvalidArgument(
                "configuration sequence provided for searcher is empty".into(),
            ));
        }
        if initial_temperature <= 0.0 {
            return Err(TunerError::InvalidArgument(format!(
                "initial temperature must be positive, got {}",
                initial_temperature
            )));
        }
        if !(cooling_factor > 0.0 && cooling_factor < 1.0) {
            return Err(TunerError::InvalidArgument(format!(
                "cooling factor must lie in (0, 1), got {}",
                cooling_factor
            )));
        }

        let index_by_values = configurations
            .iter()
            .enumerate()
            .map(|(index, configuration)| (value_key(configuration), index))
            .collect();

        let mut rng = fastrand::Rng::with_seed(seed);
        let start = rng.usize(..configurations.len());
        let budget = configurations.len();

        Ok(Self {
            configurations,
            index_by_values,
            parameters: parameters.to_vec(),
            rng,
            temperature: initial_temperature,
            cooling_factor,
            current: start,
            candidate: start,
            current_duration: f64::INFINITY,
            best: start,
            best_duration: f64::INFINITY,
            visited: 0,
            budget,
        })
    }

    /// Index of the best configuration observed so far.
    pub fn best_configuration(&self) -> &KernelConfiguration {
        &self.configurations[self.best]
    }

    /// Draws a configuration differing from `from` in exactly one parameter,
    /// resampling when the mutated values do not name a valid configuration.
    fn neighbour_of(&mut self, from: usize) -> usize {
        let mutable: Vec<usize> = self
            .parameters
            .iter()
            .enumerate()
            .filter(|(_, parameter)| parameter.values().len() > 1)
            .map(|(position, _)| position)
            .collect();
        if mutable.is_empty() {
            return from;
        }

        let key = value_key(&self.configurations[from]);
        for _ in 0..NEIGHBOUR_RESAMPLE_LIMIT {
            let position = mutable[self.rng.usize(..mutable.len())];
            let values = self.parameters[position].values();
            let replacement = values[self.rng.usize(..values.len())];
            if replacement == key[position] {
                continue;
            }

            let mut mutated = key.clone();
            mutated[position] = replacement;
            if let Some(index) = self.index_by_values.get(&mutated) {
                return *index;
            }
        }
        from
    }
}

impl Searcher for AnnealingSearcher {
    fn next_configuration(&self) -> &KernelConfiguration {
        &self.configurations[self.candidate]
    }

    fn advance(&mut self, last_duration_ns: f64) {
        self.visited += 1;

        let delta = last_duration_ns - self.current_duration;
        let accept = delta <= 0.0 || self.rng.f64() < (-delta / self.temperature).exp();
        if accept {
            tracing::debug!(
                duration_ns = last_duration_ns,
                temperature = self.temperature,
                "accepting configuration"
            );
            self.current = self.candidate;
            self.current_duration = last_duration_ns;
        }
        if last_duration_ns < self.best_duration {
            self.best = self.candidate;
            self.best_duration = last_duration_ns;
        }

        self.temperature *= self.cooling_factor;
        self.candidate = self.neighbour_of(self.current);
    }

    fn remaining(&self) -> usize {
        self.budget - self.visited
    }
}

fn value_key(configuration: &KernelConfiguration) -> Vec<u64> {
    configuration.values().iter().map(|pair| pair.value).collect()
}
