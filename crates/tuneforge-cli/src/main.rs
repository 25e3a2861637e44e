//! Developer CLI for TuneForge.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tuneforge_core::{
    AccessMode, ArgumentId, DimensionVector, KernelConstraint, KernelParameter, ModifierAction,
    ModifierDimension, ModifierTarget, SearchMethod, ThreadModifier,
};
use tuneforge_engine::{ComputeEngine, HostBuffer, HostEngine, HostLaunch};
use tuneforge_runner::{
    ReferenceComputer, Reporter, ReportOptions, TimeUnit, TuningRunner, ValidationMethod,
};

#[derive(Parser, Debug)]
#[command(name = "tuneforge", about = "TuneForge developer toolkit")]
struct Cli {
    /// Logging verbosity.
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Off,
    Error,
    Warning,
    Info,
    Debug,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> LevelFilter {
        match value {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MethodArg {
    Full,
    Random,
    Annealing,
    Pso,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TimeUnitArg {
    Ns,
    Us,
    Ms,
    S,
}

impl From<TimeUnitArg> for TimeUnit {
    fn from(value: TimeUnitArg) -> TimeUnit {
        match value {
            TimeUnitArg::Ns => TimeUnit::Nanoseconds,
            TimeUnitArg::Us => TimeUnit::Microseconds,
            TimeUnitArg::Ms => TimeUnit::Milliseconds,
            TimeUnitArg::S => TimeUnit::Seconds,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print platform and device information of the host engine.
    Info,
    /// Tune a built-in vector-scale kernel on the host engine.
    Demo {
        /// Number of input elements.
        #[arg(long, default_value_t = 4096)]
        size: usize,
        /// Search strategy.
        #[arg(long, value_enum, default_value = "full")]
        method: MethodArg,
        /// Fraction of the space visited by random search.
        #[arg(long, default_value_t = 0.5)]
        fraction: f64,
        /// Swarm size for particle swarm search.
        #[arg(long, default_value_t = 4)]
        swarm_size: usize,
        /// Searcher seed, for reproducible sessions.
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Write results as CSV to this path.
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Unit for printed durations.
        #[arg(long, value_enum, default_value = "ms")]
        time_unit: TimeUnitArg,
        /// Leave invalid and failed results out of the report.
        #[arg(long, default_value_t = false)]
        hide_invalid: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(cli.log_level))
        .init();

    match cli.command {
        Command::Info => print_info(),
        Command::Demo {
            size,
            method,
            fraction,
            swarm_size,
            seed,
            csv,
            time_unit,
            hide_invalid,
        } => run_demo(DemoOptions {
            size,
            method,
            fraction,
            swarm_size,
            seed,
            csv,
            time_unit: time_unit.into(),
            hide_invalid,
        }),
    }
}

fn print_info() -> Result<()> {
    let engine = HostEngine::new();
    for platform in engine.platform_info() {
        println!("platform {}: {} ({})", platform.index, platform.name, platform.vendor);
        for device in engine.device_info(platform.index)? {
            println!("  device {}: {}", device.index, device);
        }
    }
    Ok(())
}

struct DemoOptions {
    size: usize,
    method: MethodArg,
    fraction: f64,
    swarm_size: usize,
    seed: u64,
    csv: Option<PathBuf>,
    time_unit: TimeUnit,
    hide_invalid: bool,
}

/// Expected output of the demo kernel, computed on the host.
struct ScaleReference {
    input: Vec<f32>,
    factor: f32,
}

impl ReferenceComputer for ScaleReference {
    fn compute_reference(
        &mut self,
        _argument_id: ArgumentId,
        buffer: &mut [u8],
    ) -> tuneforge_core::Result<()> {
        let expected: Vec<f32> = self.input.iter().map(|value| value * self.factor).collect();
        buffer.copy_from_slice(bytemuck::cast_slice(&expected));
        Ok(())
    }
}

fn run_demo(options: DemoOptions) -> Result<()> {
    let mut engine = HostEngine::new();
    engine.register_kernel(
        "vector_scale",
        |launch: &HostLaunch, buffers: &mut [HostBuffer]| {
            let factor = launch.define("FACTOR").unwrap_or(2) as f32;
            let vector_width = launch.define("VEC").unwrap_or(1) as usize;
            let input: Vec<f32> = buffers[0].as_slice::<f32>()?.to_vec();
            let output = buffers[1].as_mut_slice::<f32>()?;

            // One work-item handles VEC consecutive elements.
            let items = launch.global_size.total_size();
            for item in 0..items {
                for lane in 0..vector_width {
                    let index = item * vector_width + lane;
                    if index < output.len() {
                        output[index] = input[index] * factor;
                    }
                }
            }
            Ok(())
        },
    );

    let mut runner = TuningRunner::new(Box::new(engine));
    runner.set_searcher_seed(options.seed);

    let input_data: Vec<f32> = (0..options.size).map(|value| value as f32).collect();
    let input = runner
        .arguments_mut()
        .add_vector(&input_data, AccessMode::ReadOnly)?;
    let output = runner
        .arguments_mut()
        .add_vector(&vec![0.0f32; options.size], AccessMode::WriteOnly)?;

    let kernel = runner.registry_mut().add_kernel(
        "BODY",
        "vector_scale",
        DimensionVector::new(options.size, 1, 1),
        DimensionVector::new(1, 1, 1),
    );
    runner.registry_mut().bind_arguments(kernel, vec![input, output])?;

    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("FACTOR", vec![2])?)?;
    runner.registry_mut().add_parameter(
        kernel,
        KernelParameter::new("WG", vec![8, 16, 32, 64])?.with_modifier(ThreadModifier::new(
            ModifierTarget::Local,
            ModifierAction::Multiply,
            ModifierDimension::X,
        )),
    )?;
    runner.registry_mut().add_parameter(
        kernel,
        KernelParameter::new("VEC", vec![1, 2, 4])?.with_modifier(ThreadModifier::new(
            ModifierTarget::Global,
            ModifierAction::Divide,
            ModifierDimension::X,
        )),
    )?;
    runner.registry_mut().add_constraint(
        kernel,
        KernelConstraint::new(vec!["WG".into(), "VEC".into()], |values| {
            values[0] >= 8 * values[1]
        })?,
    )?;

    let (method, arguments) = match options.method {
        MethodArg::Full => (SearchMethod::FullSearch, vec![]),
        MethodArg::Random => (SearchMethod::RandomSearch, vec![options.fraction]),
        MethodArg::Annealing => (SearchMethod::SimulatedAnnealing, vec![1_000_000.0, 0.9]),
        MethodArg::Pso => (
            SearchMethod::ParticleSwarm,
            vec![options.swarm_size as f64, 0.7, 1.5, 1.5, 2.0],
        ),
    };
    runner.registry_mut().set_search_method(kernel, method, arguments)?;

    runner.set_validation_method(ValidationMethod::SideBySideComparison, 1e-4)?;
    runner.set_reference_computer(
        kernel,
        Box::new(ScaleReference {
            input: input_data,
            factor: 2.0,
        }),
        vec![output],
    )?;

    let results = runner.tune(kernel)?.to_vec();
    info!(count = results.len(), "tuning finished");

    let reporter = Reporter::new(ReportOptions {
        time_unit: options.time_unit,
        print_invalid: !options.hide_invalid,
    });
    let mut stdout = std::io::stdout();
    reporter.write_verbose(&mut stdout, &results)?;

    if let Some(path) = options.csv {
        let mut file = File::create(&path)?;
        reporter.write_csv(&mut file, &results)?;
        println!("results written to {}", path.display());
    }

    match runner.results().best(kernel) {
        Some(best) => println!(
            "best configuration: {} ({} ns)",
            best.configuration, best.duration_ns
        ),
        None => println!("no valid configuration found"),
    }
    Ok(())
}
