//! Search strategy interface and construction.

use crate::annealing::AnnealingSearcher;
use crate::full::FullSearcher;
use crate::pso::PsoSearcher;
use crate::random::RandomSearcher;
use tuneforge_core::{
    KernelConfiguration, KernelParameter, Result, SearchMethod, SearchPolicy, TunerError,
};

/// Strategy choosing the order and subset of configurations to evaluate.
///
/// The tuning loop pulls the current candidate with [`next_configuration`],
/// runs it, and reports the measured duration through [`advance`], which
/// moves the strategy to its next candidate. `next_configuration` must not
/// be called once [`remaining`] reaches zero.
///
/// [`next_configuration`]: Searcher::next_configuration
/// [`advance`]: Searcher::advance
/// [`remaining`]: Searcher::remaining
pub trait Searcher {
    /// The configuration to evaluate next.
    fn next_configuration(&self) -> &KernelConfiguration;

    /// Feeds back the duration of the last evaluated configuration in
    /// nanoseconds (`f64::INFINITY` for a failed run) and advances.
    fn advance(&mut self, last_duration_ns: f64);

    /// Number of evaluations left; monotonically non-increasing and zero
    /// after finitely many [`advance`](Searcher::advance) calls.
    fn remaining(&self) -> usize;
}

/// Builds the searcher for a kernel's search policy.
///
/// `configurations` is the valid-configuration sequence of the kernel and
/// must not be empty; `parameters` is the kernel's parameter list, needed by
/// the neighbourhood-based strategies.
pub fn create_searcher(
    policy: &SearchPolicy,
    configurations: Vec<KernelConfiguration>,
    parameters: &[KernelParameter],
    seed: u64,
) -> Result<Box<dyn Searcher>> {
    if configurations.is_empty() {
        return Err(TunerError::InvalidArgument(
            "configuration sequence provided for searcher is empty".into(),
        ));
    }
    if policy.arguments.len() < policy.method.required_arguments() {
        return Err(TunerError::InvalidArgument(format!(
            "insufficient number of arguments for {}: got {}, need {}",
            policy.method,
            policy.arguments.len(),
            policy.method.required_arguments()
        )));
    }

    let args = &policy.arguments;
    let searcher: Box<dyn Searcher> = match policy.method {
        SearchMethod::FullSearch => Box::new(FullSearcher::new(configurations)),
        SearchMethod::RandomSearch => {
            Box::new(RandomSearcher::new(configurations, args[0], seed)?)
        }
        SearchMethod::SimulatedAnnealing => Box::new(AnnealingSearcher::new(
            configurations,
            parameters,
            args[0],
            args[1],
            seed,
        )?),
        SearchMethod::ParticleSwarm => Box::new(PsoSearcher::new(
            configurations,
            parameters,
            args[0] as usize,
            args[1],
            args[2],
            args[3],
            args[4],
            seed,
        )?),
    };
    Ok(searcher)
}
