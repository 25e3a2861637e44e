//! Kernel metadata: source, launch geometry, parameters, constraints and
//! tuning policy.

use crate::argument::ArgumentId;
use crate::configuration::ParameterValue;
use crate::constraint::KernelConstraint;
use crate::dimensions::DimensionVector;
use crate::error::{Result, TunerError};
use crate::local_memory::LocalMemoryModifier;
use crate::parameter::KernelParameter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier shared by kernels and compositions within one registry.
pub type KernelId = usize;

/// Strategy used to walk the configuration space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMethod {
    FullSearch,
    RandomSearch,
    SimulatedAnnealing,
    ParticleSwarm,
}

impl SearchMethod {
    /// Number of numeric arguments the strategy requires.
    pub fn required_arguments(&self) -> usize {
        match self {
            SearchMethod::FullSearch => 0,
            SearchMethod::RandomSearch => 1,
            SearchMethod::SimulatedAnnealing => 2,
            SearchMethod::ParticleSwarm => 5,
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMethod::FullSearch => "FullSearch",
            SearchMethod::RandomSearch => "RandomSearch",
            SearchMethod::SimulatedAnnealing => "SimulatedAnnealing",
            SearchMethod::ParticleSwarm => "ParticleSwarm",
        };
        f.write_str(name)
    }
}

/// Search method plus its numeric arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPolicy {
    pub method: SearchMethod,
    pub arguments: Vec<f64>,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            method: SearchMethod::FullSearch,
            arguments: Vec::new(),
        }
    }
}

/// Where the authoritative expected output comes from.
#[derive(Debug, Clone)]
pub enum ReferenceSpec {
    /// Another registered kernel, run once at a fixed configuration.
    Kernel {
        reference_id: KernelId,
        values: Vec<ParameterValue>,
        argument_ids: Vec<ArgumentId>,
    },
    /// A host-side reference computer fills a buffer per argument.
    Computer { argument_ids: Vec<ArgumentId> },
}

impl ReferenceSpec {
    /// Argument ids whose contents are compared against the reference.
    pub fn argument_ids(&self) -> &[ArgumentId] {
        match self {
            ReferenceSpec::Kernel { argument_ids, .. } => argument_ids,
            ReferenceSpec::Computer { argument_ids } => argument_ids,
        }
    }
}

/// A registered tunable kernel.
#[derive(Debug, Clone)]
pub struct Kernel {
    id: KernelId,
    name: String,
    source: String,
    global_size: DimensionVector,
    local_size: DimensionVector,
    argument_ids: Vec<ArgumentId>,
    parameters: Vec<KernelParameter>,
    constraints: Vec<KernelConstraint>,
    local_memory_modifiers: Vec<LocalMemoryModifier>,
    search_policy: SearchPolicy,
    reference: Option<ReferenceSpec>,
}

impl Kernel {
    pub(crate) fn new(
        id: KernelId,
        name: impl Into<String>,
        source: impl Into<String>,
        global_size: DimensionVector,
        local_size: DimensionVector,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            source: source.into(),
            global_size,
            local_size,
            argument_ids: Vec::new(),
            parameters: Vec::new(),
            constraints: Vec::new(),
            local_memory_modifiers: Vec::new(),
            search_policy: SearchPolicy::default(),
            reference: None,
        }
    }

    pub fn id(&self) -> KernelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn global_size(&self) -> DimensionVector {
        self.global_size
    }

    pub fn local_size(&self) -> DimensionVector {
        self.local_size
    }

    pub fn argument_ids(&self) -> &[ArgumentId] {
        &self.argument_ids
    }

    pub fn parameters(&self) -> &[KernelParameter] {
        &self.parameters
    }

    pub fn constraints(&self) -> &[KernelConstraint] {
        &self.constraints
    }

    pub fn local_memory_modifiers(&self) -> &[LocalMemoryModifier] {
        &self.local_memory_modifiers
    }

    pub fn search_policy(&self) -> &SearchPolicy {
        &self.search_policy
    }

    pub fn reference(&self) -> Option<&ReferenceSpec> {
        self.reference.as_ref()
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|parameter| parameter.name() == name)
    }

    pub(crate) fn add_parameter(&mut self, parameter: KernelParameter) -> Result<()> {
        if self.has_parameter(parameter.name()) {
            return Err(TunerError::InvalidArgument(format!(
                "parameter with name {} already exists on kernel {}",
                parameter.name(),
                self.name
            )));
        }
        self.parameters.push(parameter);
        Ok(())
    }

    pub(crate) fn add_constraint(&mut self, constraint: KernelConstraint) -> Result<()> {
        for name in constraint.parameter_names() {
            if !self.has_parameter(name) {
                return Err(TunerError::InvalidArgument(format!(
                    "constraint references unknown parameter {} on kernel {}",
                    name, self.name
                )));
            }
        }
        self.constraints.push(constraint);
        Ok(())
    }

    /// Attaches a local-memory modifier, replacing any earlier one for the
    /// same argument.
    pub(crate) fn add_local_memory_modifier(
        &mut self,
        modifier: LocalMemoryModifier,
    ) -> Result<()> {
        for name in modifier.parameter_names() {
            if !self.has_parameter(name) {
                return Err(TunerError::InvalidArgument(format!(
                    "local-memory modifier references unknown parameter {} on kernel {}",
                    name, self.name
                )));
            }
        }
        self.local_memory_modifiers
            .retain(|existing| existing.argument_id() != modifier.argument_id());
        self.local_memory_modifiers.push(modifier);
        Ok(())
    }

    pub(crate) fn set_argument_ids(&mut self, argument_ids: Vec<ArgumentId>) {
        self.argument_ids = argument_ids;
    }

    pub(crate) fn set_search_policy(&mut self, policy: SearchPolicy) {
        self.search_policy = policy;
    }

    pub(crate) fn set_reference(&mut self, reference: ReferenceSpec) {
        self.reference = Some(reference);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> Kernel {
        Kernel::new(
            0,
            "vector_add",
            "BODY",
            DimensionVector::new(64, 1, 1),
            DimensionVector::new(1, 1, 1),
        )
    }

    #[test]
    fn duplicate_parameter_is_rejected() {
        let mut kernel = kernel();
        kernel
            .add_parameter(KernelParameter::new("p", vec![1, 2]).unwrap())
            .unwrap();

        let result = kernel.add_parameter(KernelParameter::new("p", vec![3]).unwrap());
        assert!(matches!(result, Err(TunerError::InvalidArgument(_))));
    }

    #[test]
    fn constraint_must_reference_known_parameters() {
        let mut kernel = kernel();
        kernel
            .add_parameter(KernelParameter::new("A", vec![1]).unwrap())
            .unwrap();

        let constraint =
            KernelConstraint::new(vec!["A".into(), "missing".into()], |_| true).unwrap();
        assert!(kernel.add_constraint(constraint).is_err());
    }
}
