//! Search strategies for TuneForge.
//!
//! A [`Searcher`] decides the order in which valid configurations are
//! visited and when to stop. Every strategy owns its random generator,
//! seeded at construction, so runs are reproducible.

pub mod annealing;
pub mod full;
pub mod pso;
pub mod random;
pub mod searcher;

pub use annealing::AnnealingSearcher;
pub use full::FullSearcher;
pub use pso::PsoSearcher;
pub use random::RandomSearcher;
pub use searcher::{create_searcher, Searcher};
