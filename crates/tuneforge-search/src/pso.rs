//! Particle swarm optimisation search.

use crate::searcher::Searcher;
use std::collections::HashMap;
use tuneforge_core::{KernelConfiguration, KernelParameter, Result, TunerError};

struct Particle {
    /// Index into the valid-configuration list.
    configuration: usize,
    velocity: Vec<f64>,
    best_position: Vec<usize>,
    best_duration: f64,
}

/// Particle swarm over configuration index space.
///
/// Positions are value-list indices, one per parameter. After the velocity
/// update a position is rounded and clamped into the admissible index range;
/// if the result does not name a valid configuration it snaps to the nearest
/// valid one by Hamming distance.
pub struct PsoSearcher {
    configurations: Vec<KernelConfiguration>,
    positions: Vec<Vec<usize>>,
    index_by_position: HashMap<Vec<usize>, usize>,
    dimension_sizes: Vec<usize>,
    rng: fastrand::Rng,
    inertia: f64,
    cognitive: f64,
    social: f64,
    velocity_clamp: f64,
    particles: Vec<Particle>,
    global_best_position: Vec<usize>,
    global_best_duration: f64,
    active: usize,
    visited: usize,
    budget: usize,
}

impl PsoSearcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        configurations: Vec<KernelConfiguration>,
        parameters: &[KernelParameter],
        swarm_size: usize,
        inertia: f64,
        cognitive: f64,
        social: f64,
        velocity_clamp: f64,
        seed: u64,
    ) -> Result<Self> {
        if configurations.is_empty() {
            return Err(TunerError::InvalidArgument(
                "configuration sequence provided for searcher is empty".into(),
            ));
        }
        if swarm_size == 0 {
            return Err(TunerError::InvalidArgument(
                "swarm size must be at least one".into(),
            ));
        }
        if velocity_clamp <= 0.0 {
            return Err(TunerError::InvalidArgument(format!(
                "velocity clamp must be positive, got {}",
                velocity_clamp
            )));
        }

        let positions: Vec<Vec<usize>> = configurations
            .iter()
            .map(|configuration| {
                configuration
                    .values()
                    .iter()
                    .zip(parameters)
                    .map(|(pair, parameter)| {
                        parameter
                            .values()
                            .iter()
                            .position(|value| *value == pair.value)
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        let index_by_position: HashMap<Vec<usize>, usize> = positions
            .iter()
            .enumerate()
            .map(|(index, position)| (position.clone(), index))
            .collect();

        let dimension_sizes = parameters
            .iter()
            .map(|parameter| parameter.values().len())
            .collect();

        let mut rng = fastrand::Rng::with_seed(seed);
        let particles: Vec<Particle> = (0..swarm_size)
            .map(|_| {
                let configuration = rng.usize(..configurations.len());
                Particle {
                    configuration,
                    velocity: vec![0.0; parameters.len()],
                    best_position: positions[configuration].clone(),
                    best_duration: f64::INFINITY,
                }
            })
            .collect();

        let global_best_position = particles[0].best_position.clone();
        let budget = configurations.len();

        Ok(Self {
            configurations,
            positions,
            index_by_position,
            dimension_sizes,
            rng,
            inertia,
            cognitive,
            social,
            velocity_clamp,
            particles,
            global_best_position,
            global_best_duration: f64::INFINITY,
            active: 0,
            visited: 0,
            budget,
        })
    }

    /// Nearest valid configuration to `target` by Hamming distance over
    /// index vectors.
    fn snap_to_valid(&self, target: &[usize]) -> usize {
        let mut best_index = 0;
        let mut best_distance = usize::MAX;
        for (index, position) in self.positions.iter().enumerate() {
            let distance = position
                .iter()
                .zip(target)
                .filter(|(lhs, rhs)| lhs != rhs)
                .count();
            if distance < best_distance {
                best_distance = distance;
                best_index = index;
            }
        }
        best_index
    }
}

impl Searcher for PsoSearcher {
    fn next_configuration(&self) -> &KernelConfiguration {
        &self.configurations[self.particles[self.active].configuration]
    }

    fn advance(&mut self, last_duration_ns: f64) {
        self.visited += 1;

        let position = self.positions[self.particles[self.active].configuration].clone();
        {
            let particle = &mut self.particles[self.active];
            if last_duration_ns < particle.best_duration {
                particle.best_duration = last_duration_ns;
                particle.best_position = position.clone();
            }
        }
        if last_duration_ns < self.global_best_duration {
            self.global_best_duration = last_duration_ns;
            self.global_best_position = position.clone();
        }

        let mut target = Vec::with_capacity(position.len());
        for dimension in 0..position.len() {
            let particle = &self.particles[self.active];
            let r1 = self.rng.f64();
            let r2 = self.rng.f64();
            let x = position[dimension] as f64;
            let velocity = self.inertia * particle.velocity[dimension]
                + self.cognitive * r1 * (particle.best_position[dimension] as f64 - x)
                + self.social * r2 * (self.global_best_position[dimension] as f64 - x);
            let velocity = velocity.clamp(-self.velocity_clamp, self.velocity_clamp);
            self.particles[self.active].velocity[dimension] = velocity;

            let upper = (self.dimension_sizes[dimension] - 1) as f64;
            target.push((x + velocity).round().clamp(0.0, upper) as usize);
        }

        let next = match self.index_by_position.get(&target) {
            Some(index) => *index,
            None => self.snap_to_valid(&target),
        };
        self.particles[self.active].configuration = next;
        self.active = (self.active + 1) % self.particles.len();
    }

    fn remaining(&self) -> usize {
        self.budget - self.visited
    }
}
