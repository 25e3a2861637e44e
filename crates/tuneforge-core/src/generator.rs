//! Enumerates valid kernel configurations.
//!
//! The generator walks the Cartesian product of parameter value lists in
//! lexicographic declaration-by-value-index order, filters out combinations
//! violating a constraint and derives the launch geometry for the rest.
//! Geometry derivation happens lazily, per yielded configuration.

use crate::composition::KernelComposition;
use crate::configuration::{KernelConfiguration, LaunchGeometry, ParameterValue};
use crate::constraint::KernelConstraint;
use crate::dimensions::GlobalSizeType;
use crate::error::{Result, TunerError};
use crate::kernel::{Kernel, KernelId};
use crate::parameter::{ModifierTarget, ThreadModifier};

/// Knobs the generator inherits from the compute engine.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorSettings {
    /// Convention the engine expects for the rendered global size.
    pub global_size_type: GlobalSizeType,
    /// Round a mis-divisible global size up to the nearest multiple of the
    /// local size instead of rejecting the configuration.
    pub automatic_size_correction: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            global_size_type: GlobalSizeType::OpenCl,
            automatic_size_correction: true,
        }
    }
}

struct SpaceParameter {
    name: String,
    values: Vec<u64>,
    modifier: Option<ThreadModifier>,
    /// Member kernels the modifier rewrites; `None` means all of them.
    scope: Option<Vec<KernelId>>,
}

impl SpaceParameter {
    fn applies_to(&self, kernel_id: KernelId) -> bool {
        match &self.scope {
            None => true,
            Some(ids) => ids.contains(&kernel_id),
        }
    }
}

struct BaseGeometry {
    kernel_id: KernelId,
    geometry: LaunchGeometry,
}

/// The parameter space of one tunable unit, detached from the registry.
struct Space {
    parameters: Vec<SpaceParameter>,
    constraints: Vec<KernelConstraint>,
    bases: Vec<BaseGeometry>,
    composite: bool,
    settings: GeneratorSettings,
}

impl Space {
    fn constraints_hold(&self, values: &[u64]) -> bool {
        self.constraints.iter().all(|constraint| {
            let projected: Vec<u64> = constraint
                .parameter_names()
                .iter()
                .map(|name| {
                    self.parameters
                        .iter()
                        .position(|parameter| parameter.name == *name)
                        .map(|index| values[index])
                        .unwrap_or_default()
                })
                .collect();
            constraint.is_satisfied(&projected)
        })
    }

    /// Derives per-kernel geometry for one value assignment. Modifiers are
    /// applied in parameter declaration order.
    fn derive(&self, values: &[u64]) -> Result<KernelConfiguration> {
        let mut geometries = Vec::with_capacity(self.bases.len());

        for base in &self.bases {
            let mut global = base.geometry.global;
            let mut local = base.geometry.local;

            for (parameter, value) in self.parameters.iter().zip(values) {
                let Some(modifier) = parameter.modifier else {
                    continue;
                };
                if !parameter.applies_to(base.kernel_id) {
                    continue;
                }
                match modifier.target {
                    ModifierTarget::Global => {
                        global.apply(modifier.action, modifier.dimension, *value)?
                    }
                    ModifierTarget::Local => {
                        local.apply(modifier.action, modifier.dimension, *value)?
                    }
                }
            }

            if global.total_size() == 0 || local.total_size() == 0 {
                return Err(TunerError::ConfigurationInvalid(format!(
                    "launch sizes must be positive, got global {} and local {}",
                    global, local
                )));
            }

            if !local.divides(&global) {
                if self.settings.automatic_size_correction {
                    global.round_up_to_multiple(&local);
                } else {
                    return Err(TunerError::ConfigurationInvalid(format!(
                        "global size {} is not divisible by local size {}",
                        global, local
                    )));
                }
            }

            let rendered = match self.settings.global_size_type {
                GlobalSizeType::OpenCl => global,
                GlobalSizeType::Cuda => global.divided_by(&local),
            };
            geometries.push((base.kernel_id, LaunchGeometry::new(rendered, local)));
        }

        let pairs: Vec<ParameterValue> = self
            .parameters
            .iter()
            .zip(values)
            .map(|(parameter, value)| ParameterValue::new(parameter.name.clone(), *value))
            .collect();

        if self.composite {
            Ok(KernelConfiguration::composite(pairs, geometries))
        } else {
            let (_, geometry) = geometries[0];
            Ok(KernelConfiguration::single(pairs, geometry))
        }
    }
}

/// Lazy sequence of valid configurations for one kernel or composition.
pub struct ConfigurationGenerator {
    space: Space,
    indices: Vec<usize>,
    exhausted: bool,
}

impl ConfigurationGenerator {
    pub fn for_kernel(kernel: &Kernel, settings: GeneratorSettings) -> Self {
        let parameters = kernel
            .parameters()
            .iter()
            .map(|parameter| SpaceParameter {
                name: parameter.name().to_string(),
                values: parameter.values().to_vec(),
                modifier: parameter.modifier().copied(),
                scope: None,
            })
            .collect();

        Self::new(Space {
            parameters,
            constraints: kernel.constraints().to_vec(),
            bases: vec![BaseGeometry {
                kernel_id: kernel.id(),
                geometry: LaunchGeometry::new(kernel.global_size(), kernel.local_size()),
            }],
            composite: false,
            settings,
        })
    }

    /// Generator for a composition; `members` must resolve the composition's
    /// kernel ids in order.
    pub fn for_composition(
        composition: &KernelComposition,
        members: &[&Kernel],
        settings: GeneratorSettings,
    ) -> Self {
        let parameters = composition
            .parameters()
            .iter()
            .map(|entry| SpaceParameter {
                name: entry.parameter.name().to_string(),
                values: entry.parameter.values().to_vec(),
                modifier: entry.parameter.modifier().copied(),
                scope: match &entry.scope {
                    crate::composition::ParameterScope::AllKernels => None,
                    crate::composition::ParameterScope::Kernels(ids) => Some(ids.clone()),
                },
            })
            .collect();

        let bases = members
            .iter()
            .map(|kernel| BaseGeometry {
                kernel_id: kernel.id(),
                geometry: LaunchGeometry::new(kernel.global_size(), kernel.local_size()),
            })
            .collect();

        Self::new(Space {
            parameters,
            constraints: composition.constraints().to_vec(),
            bases,
            composite: true,
            settings,
        })
    }

    fn new(space: Space) -> Self {
        let indices = vec![0; space.parameters.len()];
        Self {
            space,
            indices,
            exhausted: false,
        }
    }

    /// Advances the odometer; the last-declared parameter varies fastest.
    fn step(&mut self) {
        for position in (0..self.indices.len()).rev() {
            self.indices[position] += 1;
            if self.indices[position] < self.space.parameters[position].values.len() {
                return;
            }
            self.indices[position] = 0;
        }
        self.exhausted = true;
    }
}

impl Iterator for ConfigurationGenerator {
    type Item = KernelConfiguration;

    fn next(&mut self) -> Option<KernelConfiguration> {
        loop {
            if self.exhausted {
                return None;
            }

            let values: Vec<u64> = self
                .indices
                .iter()
                .zip(&self.space.parameters)
                .map(|(index, parameter)| parameter.values[*index])
                .collect();
            self.step();

            if !self.space.constraints_hold(&values) {
                continue;
            }
            match self.space.derive(&values) {
                Ok(configuration) => return Some(configuration),
                Err(err) => {
                    tracing::trace!(error = %err, "configuration rejected");
                    continue;
                }
            }
        }
    }
}

/// Builds the configuration for an explicit value assignment, validating
/// that every declared parameter receives one admissible value and that all
/// constraints hold.
pub fn configuration_for_values(
    kernel: &Kernel,
    values: &[ParameterValue],
    settings: GeneratorSettings,
) -> Result<KernelConfiguration> {
    let generator = ConfigurationGenerator::for_kernel(kernel, settings);
    let space = generator.space;

    let mut ordered = Vec::with_capacity(space.parameters.len());
    for parameter in &space.parameters {
        let pair = values
            .iter()
            .find(|pair| pair.name == parameter.name)
            .ok_or_else(|| {
                TunerError::InvalidArgument(format!(
                    "no value provided for parameter {}",
                    parameter.name
                ))
            })?;
        if !parameter.values.contains(&pair.value) {
            return Err(TunerError::InvalidArgument(format!(
                "{} is not an admissible value of parameter {}",
                pair.value, parameter.name
            )));
        }
        ordered.push(pair.value);
    }

    if !space.constraints_hold(&ordered) {
        return Err(TunerError::ConfigurationInvalid(
            "provided values violate a constraint".into(),
        ));
    }
    space.derive(&ordered)
}
