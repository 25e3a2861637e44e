//! End-to-end tuning scenarios against the host engine.

use std::time::Duration;
use tuneforge_core::{
    AccessMode, ArgumentId, DimensionVector, KernelConstraint, KernelId, KernelParameter,
    ModifierAction, ModifierDimension, ModifierTarget, ParameterScope, ParameterValue,
    SearchMethod, ThreadModifier, TunerError,
};
use tuneforge_engine::{HostBuffer, HostEngine, HostLaunch, OutputDescriptor};
use tuneforge_runner::{
    LaunchOrchestrator, ManipulatorContext, ReferenceComputer, RunMode, TuningRunner,
    ValidationMethod, ValidationStatus,
};

const INPUT: [f32; 4] = [1.0, 2.0, 3.0, 4.0];

/// `output[i] = input[i] * FACTOR`, with the factor taken from the define
/// prefix of the configured source.
fn scale_kernel(launch: &HostLaunch, buffers: &mut [HostBuffer]) -> tuneforge_core::Result<()> {
    let factor = launch.define("FACTOR").unwrap_or(2) as f32;
    let input: Vec<f32> = buffers[0].as_slice::<f32>()?.to_vec();
    let output = buffers[1].as_mut_slice::<f32>()?;
    for (slot, value) in output.iter_mut().zip(input) {
        *slot = value * factor;
    }
    Ok(())
}

/// Session with a registered scale kernel bound to an input and an output
/// vector. Returns `(runner, kernel_id, input_id, output_id)`.
fn scale_session() -> (TuningRunner, KernelId, ArgumentId, ArgumentId) {
    let mut engine = HostEngine::new();
    engine.register_kernel("scale", scale_kernel);

    let mut runner = TuningRunner::new(Box::new(engine));
    let input = runner
        .arguments_mut()
        .add_vector(&INPUT, AccessMode::ReadOnly)
        .unwrap();
    let output = runner
        .arguments_mut()
        .add_vector(&[0.0f32; 4], AccessMode::WriteOnly)
        .unwrap();

    let kernel = runner.registry_mut().add_kernel(
        "BODY",
        "scale",
        DimensionVector::new(4, 1, 1),
        DimensionVector::new(1, 1, 1),
    );
    runner
        .registry_mut()
        .bind_arguments(kernel, vec![input, output])
        .unwrap();

    (runner, kernel, input, output)
}

struct ExpectedScale {
    factor: f32,
}

impl ReferenceComputer for ExpectedScale {
    fn compute_reference(
        &mut self,
        _argument_id: ArgumentId,
        buffer: &mut [u8],
    ) -> tuneforge_core::Result<()> {
        let expected: Vec<f32> = INPUT.iter().map(|value| value * self.factor).collect();
        buffer.copy_from_slice(bytemuck::cast_slice(&expected));
        Ok(())
    }
}

// S1: a parameter name is unique within a kernel.
#[test]
fn duplicate_parameter_registration_fails() {
    let (mut runner, kernel, _, _) = scale_session();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("p", vec![1, 2]).unwrap())
        .unwrap();

    let result = runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("p", vec![3]).unwrap());
    assert!(matches!(result, Err(TunerError::InvalidArgument(_))));
}

// S2: constraint filtering reduces the Cartesian product.
#[test]
fn constraint_filters_configuration_count() {
    let (mut runner, kernel, _, _) = scale_session();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("A", vec![1, 2, 3]).unwrap())
        .unwrap();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("B", vec![5, 10]).unwrap())
        .unwrap();

    let settings = Default::default();
    assert_eq!(
        runner.registry().configuration_count(kernel, settings).unwrap(),
        6
    );

    runner
        .registry_mut()
        .add_constraint(
            kernel,
            KernelConstraint::new(vec!["A".into(), "B".into()], |values| {
                values[0] + values[1] <= 11
            })
            .unwrap(),
        )
        .unwrap();
    assert_eq!(
        runner.registry().configuration_count(kernel, settings).unwrap(),
        4
    );
}

// S3: the define prefix follows parameter declaration order.
#[test]
fn source_with_defines_prefixes_the_body() {
    let (mut runner, kernel, _, _) = scale_session();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("A", vec![2]).unwrap())
        .unwrap();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("B", vec![5]).unwrap())
        .unwrap();

    let configuration = runner
        .registry()
        .configuration_for(
            kernel,
            &[ParameterValue::new("A", 2), ParameterValue::new("B", 5)],
            Default::default(),
        )
        .unwrap();
    let source = runner
        .registry()
        .kernel_source_with_defines(kernel, &configuration)
        .unwrap();
    assert_eq!(source, "#define A 2\n#define B 5\nBODY");
}

// S5: a reference kernel with identical output validates every run.
#[test]
fn reference_kernel_validates_all_configurations() {
    let mut engine = HostEngine::new();
    engine.register_kernel("scale", scale_kernel);
    engine.register_kernel("scale_reference", |_launch: &HostLaunch, buffers: &mut [HostBuffer]| {
        let input: Vec<f32> = buffers[0].as_slice::<f32>()?.to_vec();
        let output = buffers[1].as_mut_slice::<f32>()?;
        for (slot, value) in output.iter_mut().zip(input) {
            *slot = value * 2.0;
        }
        Ok(())
    });

    let mut runner = TuningRunner::new(Box::new(engine));
    let input = runner
        .arguments_mut()
        .add_vector(&INPUT, AccessMode::ReadOnly)
        .unwrap();
    let output = runner
        .arguments_mut()
        .add_vector(&[0.0f32; 4], AccessMode::WriteOnly)
        .unwrap();

    let tuned = runner.registry_mut().add_kernel(
        "BODY",
        "scale",
        DimensionVector::new(4, 1, 1),
        DimensionVector::new(1, 1, 1),
    );
    let reference = runner.registry_mut().add_kernel(
        "BODY",
        "scale_reference",
        DimensionVector::new(4, 1, 1),
        DimensionVector::new(1, 1, 1),
    );
    for id in [tuned, reference] {
        runner
            .registry_mut()
            .bind_arguments(id, vec![input, output])
            .unwrap();
    }

    // FACTOR is fixed at the reference's multiplier; BLOCK only perturbs the
    // define prefix.
    runner
        .registry_mut()
        .add_parameter(tuned, KernelParameter::new("FACTOR", vec![2]).unwrap())
        .unwrap();
    runner
        .registry_mut()
        .add_parameter(tuned, KernelParameter::new("BLOCK", vec![1, 2, 4]).unwrap())
        .unwrap();

    runner
        .set_validation_method(ValidationMethod::SideBySideComparison, 0.01)
        .unwrap();
    runner
        .set_reference_kernel(tuned, reference, vec![], vec![output])
        .unwrap();

    let results = runner.tune(tuned).unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|result| result.status == ValidationStatus::Valid));
    assert!(runner.results().best(tuned).is_some());
}

// A reference computer catches a wrong configuration.
#[test]
fn reference_computer_flags_mismatching_factor() {
    let (mut runner, kernel, _, output) = scale_session();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("FACTOR", vec![2, 3]).unwrap())
        .unwrap();

    runner
        .set_validation_method(ValidationMethod::SideBySideComparison, 0.01)
        .unwrap();
    runner
        .set_reference_computer(kernel, Box::new(ExpectedScale { factor: 2.0 }), vec![output])
        .unwrap();

    let results = runner.tune(kernel).unwrap();
    assert_eq!(results.len(), 2);

    for result in results {
        let factor = result.configuration.value_of("FACTOR").unwrap();
        match factor {
            2 => assert_eq!(result.status, ValidationStatus::Valid),
            3 => {
                assert_eq!(result.status, ValidationStatus::Invalid);
                assert!(!result.error_message.as_ref().unwrap().is_empty());
            }
            _ => unreachable!(),
        }
    }

    let best = runner.results().best(kernel).unwrap();
    assert_eq!(best.configuration.value_of("FACTOR"), Some(2));
}

// S6: orchestrator failures are isolated per run.
#[test]
fn orchestrator_failures_do_not_stop_the_session() {
    struct FailingEveryThird {
        calls: usize,
    }

    impl LaunchOrchestrator for FailingEveryThird {
        fn launch_computation(
            &mut self,
            kernel_id: KernelId,
            ctx: &mut ManipulatorContext<'_>,
        ) -> tuneforge_core::Result<()> {
            let call = self.calls;
            self.calls += 1;
            if call % 3 == 0 {
                return Err(TunerError::EngineFailure("orchestrator fault".into()));
            }
            ctx.run_kernel(kernel_id)?;
            Ok(())
        }
    }

    let (mut runner, kernel, _, _) = scale_session();
    runner
        .registry_mut()
        .add_parameter(
            kernel,
            KernelParameter::new("V", (0..10).collect()).unwrap(),
        )
        .unwrap();
    runner.set_launch_orchestrator(kernel, Box::new(FailingEveryThird { calls: 0 }));

    let results = runner.tune(kernel).unwrap();
    assert_eq!(results.len(), 10);

    let failed = results
        .iter()
        .filter(|result| result.status == ValidationStatus::Failed)
        .count();
    assert_eq!(failed, 4);
    for result in results {
        if result.status == ValidationStatus::Failed {
            assert!(result.error_message.as_ref().unwrap().contains("orchestrator fault"));
        }
    }
}

// The orchestrator's wall time minus device time is reported as overhead.
#[test]
fn orchestrator_overhead_is_reported() {
    struct DoubleLaunch;

    impl LaunchOrchestrator for DoubleLaunch {
        fn launch_computation(
            &mut self,
            kernel_id: KernelId,
            ctx: &mut ManipulatorContext<'_>,
        ) -> tuneforge_core::Result<()> {
            ctx.run_kernel(kernel_id)?;
            std::thread::sleep(Duration::from_millis(2));
            ctx.run_kernel(kernel_id)?;
            Ok(())
        }
    }

    let (mut runner, kernel, _, _) = scale_session();
    runner.set_launch_orchestrator(kernel, Box::new(DoubleLaunch));

    let results = runner.tune(kernel).unwrap();
    assert_eq!(results.len(), 1);
    let overhead = results[0].overhead_ns.unwrap();
    assert!(overhead >= Duration::from_millis(2).as_nanos() as u64);
}

// The manipulator context reflects argument mutations on the next launch.
#[test]
fn orchestrator_argument_updates_are_visible() {
    struct ReplaceInput {
        input: ArgumentId,
    }

    impl LaunchOrchestrator for ReplaceInput {
        fn launch_computation(
            &mut self,
            kernel_id: KernelId,
            ctx: &mut ManipulatorContext<'_>,
        ) -> tuneforge_core::Result<()> {
            assert_eq!(ctx.parameter_value("FACTOR")?, 2);
            assert_eq!(
                ctx.current_global_size(kernel_id)?,
                DimensionVector::new(4, 1, 1)
            );
            ctx.update_argument_vector(self.input, &[1.0f32; 4])?;
            ctx.run_kernel(kernel_id)?;
            Ok(())
        }
    }

    let (mut runner, kernel, input, output) = scale_session();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("FACTOR", vec![2]).unwrap())
        .unwrap();
    runner.set_launch_orchestrator(kernel, Box::new(ReplaceInput { input }));

    let mut downloaded = [0.0f32; 4];
    runner
        .run_kernel(
            kernel,
            &[ParameterValue::new("FACTOR", 2)],
            &mut [OutputDescriptor::new(
                output,
                bytemuck::cast_slice_mut(&mut downloaded),
            )],
        )
        .unwrap();

    assert_eq!(downloaded, [2.0, 2.0, 2.0, 2.0]);
}

// Compositions run through the orchestrator path with per-member geometry.
#[test]
fn composition_members_run_in_sequence() {
    struct Pipeline {
        first: KernelId,
        second: KernelId,
    }

    impl LaunchOrchestrator for Pipeline {
        fn launch_computation(
            &mut self,
            _kernel_id: KernelId,
            ctx: &mut ManipulatorContext<'_>,
        ) -> tuneforge_core::Result<()> {
            assert_eq!(
                ctx.current_local_size(self.first)?,
                DimensionVector::new(8, 1, 1)
            );
            assert_eq!(
                ctx.current_local_size(self.second)?,
                DimensionVector::new(1, 1, 1)
            );
            ctx.run_kernel(self.first)?;
            ctx.run_kernel(self.second)?;
            Ok(())
        }
    }

    let mut engine = HostEngine::new();
    engine.register_kernel("double", |_launch: &HostLaunch, buffers: &mut [HostBuffer]| {
        let input: Vec<f32> = buffers[0].as_slice::<f32>()?.to_vec();
        let output = buffers[1].as_mut_slice::<f32>()?;
        for (slot, value) in output.iter_mut().zip(input) {
            *slot = value * 2.0;
        }
        Ok(())
    });
    engine.register_kernel("increment", |_launch: &HostLaunch, buffers: &mut [HostBuffer]| {
        let input: Vec<f32> = buffers[0].as_slice::<f32>()?.to_vec();
        let output = buffers[1].as_mut_slice::<f32>()?;
        for (slot, value) in output.iter_mut().zip(input) {
            *slot = value + 1.0;
        }
        Ok(())
    });

    let mut runner = TuningRunner::new(Box::new(engine));
    let a = runner
        .arguments_mut()
        .add_vector(&INPUT, AccessMode::ReadOnly)
        .unwrap();
    let b = runner
        .arguments_mut()
        .add_vector(&[0.0f32; 4], AccessMode::ReadWrite)
        .unwrap();
    let c = runner
        .arguments_mut()
        .add_vector(&[0.0f32; 4], AccessMode::WriteOnly)
        .unwrap();

    let first = runner.registry_mut().add_kernel(
        "BODY",
        "double",
        DimensionVector::new(8, 1, 1),
        DimensionVector::new(1, 1, 1),
    );
    let second = runner.registry_mut().add_kernel(
        "BODY",
        "increment",
        DimensionVector::new(4, 1, 1),
        DimensionVector::new(1, 1, 1),
    );
    runner.registry_mut().bind_arguments(first, vec![a, b]).unwrap();
    runner.registry_mut().bind_arguments(second, vec![b, c]).unwrap();

    let composition = runner
        .registry_mut()
        .add_composition("pipeline", vec![first, second])
        .unwrap();

    // The work-group parameter only rewrites the first member's geometry.
    runner
        .registry_mut()
        .add_composition_parameter(
            composition,
            KernelParameter::new("WG", vec![8]).unwrap().with_modifier(
                ThreadModifier::new(
                    ModifierTarget::Local,
                    ModifierAction::Multiply,
                    ModifierDimension::X,
                ),
            ),
            ParameterScope::Kernels(vec![first]),
        )
        .unwrap();

    runner.set_launch_orchestrator(composition, Box::new(Pipeline { first, second }));

    let results = runner.tune(composition).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ValidationStatus::Valid);
    assert!(results[0].overhead_ns.is_some());
}

// A composition without an orchestrator cannot run.
#[test]
fn composition_without_orchestrator_fails_each_run() {
    let (mut runner, kernel, input, output) = scale_session();
    runner.registry_mut().bind_arguments(kernel, vec![input, output]).unwrap();
    let composition = runner
        .registry_mut()
        .add_composition("lonely", vec![kernel])
        .unwrap();

    let results = runner.tune(composition).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ValidationStatus::Failed);
    assert!(results[0]
        .error_message
        .as_ref()
        .unwrap()
        .contains("orchestrator"));
}

// Validation and reference APIs are rejected in computation mode.
#[test]
fn computation_mode_rejects_validation() {
    let mut engine = HostEngine::new();
    engine.register_kernel("scale", scale_kernel);
    let mut runner = TuningRunner::with_mode(Box::new(engine), RunMode::Computation);

    assert!(matches!(
        runner.set_validation_method(ValidationMethod::AbsoluteDifference, 0.01),
        Err(TunerError::InvalidMode { .. })
    ));
    assert!(matches!(
        runner.set_validation_range(0, 16),
        Err(TunerError::InvalidMode { .. })
    ));
    assert!(matches!(runner.tune(0), Err(TunerError::InvalidMode { .. })));
}

// The stop flag halts the session at an iteration boundary.
#[test]
fn cancellation_stops_before_the_next_iteration() {
    let (mut runner, kernel, _, _) = scale_session();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("V", vec![1, 2, 3, 4]).unwrap())
        .unwrap();

    runner.cancellation_token().store(true, std::sync::atomic::Ordering::Relaxed);
    let results = runner.tune(kernel).unwrap();
    assert!(results.is_empty());
}

// An exhausted soft budget records the remaining runs as failed.
#[test]
fn exhausted_time_budget_marks_runs_failed() {
    let (mut runner, kernel, _, _) = scale_session();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("V", vec![1, 2, 3]).unwrap())
        .unwrap();
    runner.set_time_budget(kernel, Duration::ZERO);

    let results = runner.tune(kernel).unwrap();
    assert_eq!(results.len(), 3);
    for result in results {
        assert_eq!(result.status, ValidationStatus::Failed);
        assert!(result.error_message.as_ref().unwrap().contains("time budget"));
    }
}

// A local-memory argument is resized from the configuration's parameter
// values before every direct launch.
#[test]
fn local_memory_tracks_parameter_values() {
    let mut engine = HostEngine::new();
    engine.register_kernel("probe", |_launch: &HostLaunch, buffers: &mut [HostBuffer]| {
        let scratch_len = buffers[0].as_slice::<f32>()?.len();
        buffers[1].as_mut_slice::<f32>()?[0] = scratch_len as f32;
        Ok(())
    });

    let mut runner = TuningRunner::new(Box::new(engine));
    let scratch = runner
        .arguments_mut()
        .add_local(tuneforge_core::ElementKind::F32, 4)
        .unwrap();
    let output = runner
        .arguments_mut()
        .add_vector(&[0.0f32], AccessMode::WriteOnly)
        .unwrap();

    let kernel = runner.registry_mut().add_kernel(
        "BODY",
        "probe",
        DimensionVector::new(1, 1, 1),
        DimensionVector::new(1, 1, 1),
    );
    runner
        .registry_mut()
        .bind_arguments(kernel, vec![scratch, output])
        .unwrap();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("TILE", vec![4, 8]).unwrap())
        .unwrap();
    runner
        .registry_mut()
        .set_local_memory_modifier(kernel, scratch, vec!["TILE".into()], |_, values| {
            values[0] as usize * 2
        })
        .unwrap();

    for (tile, expected) in [(4u64, 8.0f32), (8, 16.0)] {
        let mut observed = [0.0f32];
        runner
            .run_kernel(
                kernel,
                &[ParameterValue::new("TILE", tile)],
                &mut [OutputDescriptor::new(
                    output,
                    bytemuck::cast_slice_mut(&mut observed),
                )],
            )
            .unwrap();
        assert_eq!(observed[0], expected);
    }
}

// Composition-scoped local-memory modifiers size a member's scratch space.
#[test]
fn composition_local_memory_is_scoped_to_members() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RunMember {
        member: KernelId,
    }

    impl LaunchOrchestrator for RunMember {
        fn launch_computation(
            &mut self,
            _kernel_id: KernelId,
            ctx: &mut ManipulatorContext<'_>,
        ) -> tuneforge_core::Result<()> {
            ctx.run_kernel(self.member)?;
            Ok(())
        }
    }

    let observed = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&observed);

    let mut engine = HostEngine::new();
    engine.register_kernel("probe", move |_launch: &HostLaunch, buffers: &mut [HostBuffer]| {
        seen.store(buffers[0].as_slice::<f32>()?.len(), Ordering::SeqCst);
        Ok(())
    });

    let mut runner = TuningRunner::new(Box::new(engine));
    let scratch = runner
        .arguments_mut()
        .add_local(tuneforge_core::ElementKind::F32, 4)
        .unwrap();

    let member = runner.registry_mut().add_kernel(
        "BODY",
        "probe",
        DimensionVector::new(1, 1, 1),
        DimensionVector::new(1, 1, 1),
    );
    runner
        .registry_mut()
        .bind_arguments(member, vec![scratch])
        .unwrap();

    let composition = runner
        .registry_mut()
        .add_composition("scoped", vec![member])
        .unwrap();
    runner
        .registry_mut()
        .add_composition_parameter(
            composition,
            KernelParameter::new("TILE", vec![8]).unwrap(),
            ParameterScope::AllKernels,
        )
        .unwrap();
    runner
        .registry_mut()
        .set_composition_local_memory_modifier(
            composition,
            member,
            scratch,
            vec!["TILE".into()],
            |_, values| values[0] as usize * 3,
        )
        .unwrap();
    runner.set_launch_orchestrator(composition, Box::new(RunMember { member }));

    let results = runner.tune(composition).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ValidationStatus::Valid);
    assert_eq!(observed.load(Ordering::SeqCst), 24);
}

// Random search visits the configured fraction, reproducibly.
#[test]
fn random_search_visits_a_fraction() {
    let (mut runner, kernel, _, _) = scale_session();
    runner
        .registry_mut()
        .add_parameter(
            kernel,
            KernelParameter::new("V", (0..8).collect()).unwrap(),
        )
        .unwrap();
    runner
        .registry_mut()
        .set_search_method(kernel, SearchMethod::RandomSearch, vec![0.5])
        .unwrap();
    runner.set_searcher_seed(1234);

    let results = runner.tune(kernel).unwrap();
    assert_eq!(results.len(), 4);

    let mut visited: Vec<u64> = results
        .iter()
        .map(|result| result.configuration.value_of("V").unwrap())
        .collect();
    visited.sort_unstable();
    visited.dedup();
    assert_eq!(visited.len(), 4);
}

// Annealing terminates and every visited configuration is valid.
#[test]
fn annealing_search_terminates_on_the_valid_space() {
    let (mut runner, kernel, _, _) = scale_session();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("A", vec![1, 2, 3]).unwrap())
        .unwrap();
    runner
        .registry_mut()
        .add_parameter(kernel, KernelParameter::new("B", vec![5, 10]).unwrap())
        .unwrap();
    runner
        .registry_mut()
        .add_constraint(
            kernel,
            KernelConstraint::new(vec!["A".into(), "B".into()], |values| {
                values[0] + values[1] <= 12
            })
            .unwrap(),
        )
        .unwrap();
    runner
        .registry_mut()
        .set_search_method(kernel, SearchMethod::SimulatedAnnealing, vec![1000.0, 0.9])
        .unwrap();

    let results = runner.tune(kernel).unwrap();
    assert_eq!(results.len(), 5); // six combinations, one filtered out
    for result in results {
        let a = result.configuration.value_of("A").unwrap();
        let b = result.configuration.value_of("B").unwrap();
        assert!(a + b <= 12);
    }
}
