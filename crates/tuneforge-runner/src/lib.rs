//! Tuning execution for TuneForge.
//!
//! Ties the core model, the search strategies and a compute engine into an
//! end-to-end tuning loop:
//!
//! ```text
//! ┌──────────────┐    ┌───────────────┐    ┌─────────────────┐
//! │  Searcher    │───▶│  KernelRunner │───▶│ ResultValidator │
//! │  (order)     │    │  (one config) │    │ (vs reference)  │
//! └──────────────┘    └───────────────┘    └─────────────────┘
//!         ▲                                        │
//!         └──────────── TuningRunner ◀─────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`tuning::TuningRunner`]: drives searcher, runner and validator
//! - [`kernel_runner::KernelRunner`]: executes one configuration, directly
//!   or through a user launch orchestrator
//! - [`validator::ResultValidator`]: caches reference outputs and compares
//! - [`results::ResultStore`] / [`report::Reporter`]: outcome collection and
//!   verbose/CSV printing

pub mod kernel_runner;
pub mod orchestrator;
pub mod report;
pub mod results;
pub mod tuning;
pub mod validator;

pub use kernel_runner::{KernelRun, KernelRunner};
pub use orchestrator::{LaunchOrchestrator, ManipulatorContext};
pub use report::{Reporter, ReportOptions, TimeUnit};
pub use results::{ResultStore, TuningResult, ValidationStatus};
pub use tuning::{RunMode, TuningRunner};
pub use validator::{ReferenceComputer, ResultValidator, ValidationMethod};
