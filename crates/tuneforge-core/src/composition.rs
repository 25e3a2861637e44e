//! Kernel compositions: several kernels tuned together as one unit.

use crate::argument::ArgumentId;
use crate::constraint::KernelConstraint;
use crate::error::{Result, TunerError};
use crate::kernel::{KernelId, ReferenceSpec, SearchPolicy};
use crate::local_memory::LocalMemoryModifier;
use crate::parameter::KernelParameter;

/// Which member kernels a composition parameter's thread modifier rewrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterScope {
    AllKernels,
    Kernels(Vec<KernelId>),
}

impl ParameterScope {
    pub fn includes(&self, kernel_id: KernelId) -> bool {
        match self {
            ParameterScope::AllKernels => true,
            ParameterScope::Kernels(ids) => ids.contains(&kernel_id),
        }
    }
}

/// A composition-level parameter together with its modifier scope.
#[derive(Debug, Clone)]
pub struct CompositionParameter {
    pub parameter: KernelParameter,
    pub scope: ParameterScope,
}

/// A bundle of kernels sharing one parameter space.
///
/// The composition owns its own parameters and constraints; member kernels
/// contribute only their source, base geometry and argument bindings. A
/// member's binding can be overridden per composition, and shared arguments
/// are visible to the launch orchestrator of every member.
#[derive(Debug, Clone)]
pub struct KernelComposition {
    id: KernelId,
    name: String,
    kernel_ids: Vec<KernelId>,
    shared_argument_ids: Vec<ArgumentId>,
    kernel_argument_ids: Vec<(KernelId, Vec<ArgumentId>)>,
    parameters: Vec<CompositionParameter>,
    constraints: Vec<KernelConstraint>,
    local_memory_modifiers: Vec<(KernelId, LocalMemoryModifier)>,
    search_policy: SearchPolicy,
    reference: Option<ReferenceSpec>,
}

impl KernelComposition {
    pub(crate) fn new(id: KernelId, name: impl Into<String>, kernel_ids: Vec<KernelId>) -> Self {
        Self {
            id,
            name: name.into(),
            kernel_ids,
            shared_argument_ids: Vec::new(),
            kernel_argument_ids: Vec::new(),
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

    pub fn kernel_ids(&self) -> &[KernelId] {
        &self.kernel_ids
    }

    pub fn shared_argument_ids(&self) -> &[ArgumentId] {
        &self.shared_argument_ids
    }

    pub fn parameters(&self) -> &[CompositionParameter] {
        &self.parameters
    }

    pub fn constraints(&self) -> &[KernelConstraint] {
        &self.constraints
    }

    pub fn search_policy(&self) -> &SearchPolicy {
        &self.search_policy
    }

    pub fn reference(&self) -> Option<&ReferenceSpec> {
        self.reference.as_ref()
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters
            .iter()
            .any(|entry| entry.parameter.name() == name)
    }

    /// Argument binding for one member: the per-composition override when
    /// set, the member's own binding otherwise.
    pub fn argument_ids_for(&self, kernel_id: KernelId) -> Option<&[ArgumentId]> {
        self.kernel_argument_ids
            .iter()
            .find(|(id, _)| *id == kernel_id)
            .map(|(_, ids)| ids.as_slice())
    }

    /// Local-memory modifiers scoped to one member kernel.
    pub fn local_memory_modifiers_for(
        &self,
        kernel_id: KernelId,
    ) -> impl Iterator<Item = &LocalMemoryModifier> {
        self.local_memory_modifiers
            .iter()
            .filter(move |(id, _)| *id == kernel_id)
            .map(|(_, modifier)| modifier)
    }

    pub(crate) fn add_parameter(
        &mut self,
        parameter: KernelParameter,
        scope: ParameterScope,
    ) -> Result<()> {
        if self.has_parameter(parameter.name()) {
            return Err(TunerError::InvalidArgument(format!(
                "parameter with name {} already exists on composition {}",
                parameter.name(),
                self.name
            )));
        }
        if let ParameterScope::Kernels(ids) = &scope {
            for id in ids {
                if !self.kernel_ids.contains(id) {
                    return Err(TunerError::InvalidArgument(format!(
                        "modifier scope references kernel {} outside composition {}",
                        id, self.name
                    )));
                }
            }
        }
        self.parameters.push(CompositionParameter { parameter, scope });
        Ok(())
    }

    pub(crate) fn add_constraint(&mut self, constraint: KernelConstraint) -> Result<()> {
        for name in constraint.parameter_names() {
            if !self.has_parameter(name) {
                return Err(TunerError::InvalidArgument(format!(
                    "constraint references unknown parameter {} on composition {}",
                    name, self.name
                )));
            }
        }
        self.constraints.push(constraint);
        Ok(())
    }

    /// Attaches a local-memory modifier to one member kernel, replacing any
    /// earlier one for the same member and argument.
    pub(crate) fn add_local_memory_modifier(
        &mut self,
        kernel_id: KernelId,
        modifier: LocalMemoryModifier,
    ) -> Result<()> {
        if !self.kernel_ids.contains(&kernel_id) {
            return Err(TunerError::InvalidKernelId(kernel_id));
        }
        for name in modifier.parameter_names() {
            if !self.has_parameter(name) {
                return Err(TunerError::InvalidArgument(format!(
                    "local-memory modifier references unknown parameter {} on composition {}",
                    name, self.name
                )));
            }
        }
        self.local_memory_modifiers.retain(|(id, existing)| {
            *id != kernel_id || existing.argument_id() != modifier.argument_id()
        });
        self.local_memory_modifiers.push((kernel_id, modifier));
        Ok(())
    }

    pub(crate) fn set_shared_argument_ids(&mut self, argument_ids: Vec<ArgumentId>) {
        self.shared_argument_ids = argument_ids;
    }

    pub(crate) fn set_kernel_argument_ids(
        &mut self,
        kernel_id: KernelId,
        argument_ids: Vec<ArgumentId>,
    ) -> Result<()> {
        if !self.kernel_ids.contains(&kernel_id) {
            return Err(TunerError::InvalidKernelId(kernel_id));
        }
        self.kernel_argument_ids.retain(|(id, _)| *id != kernel_id);
        self.kernel_argument_ids.push((kernel_id, argument_ids));
        Ok(())
    }

    pub(crate) fn set_search_policy(&mut self, policy: SearchPolicy) {
        self.search_policy = policy;
    }

    pub(crate) fn set_reference(&mut self, reference: ReferenceSpec) {
        self.reference = Some(reference);
    }
}
