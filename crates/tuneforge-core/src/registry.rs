//! Registry of kernels and compositions.
//!
//! Kernels and compositions share one id space; every mutation of kernel
//! metadata goes through the registry so uniqueness and arity rules are
//! enforced in one place.

use crate::argument::ArgumentId;
use crate::composition::{KernelComposition, ParameterScope};
use crate::configuration::{KernelConfiguration, ParameterValue};
use crate::constraint::KernelConstraint;
use crate::dimensions::DimensionVector;
use crate::error::{Result, TunerError};
use crate::generator::{configuration_for_values, ConfigurationGenerator, GeneratorSettings};
use crate::kernel::{Kernel, KernelId, ReferenceSpec, SearchMethod, SearchPolicy};
use crate::local_memory::LocalMemoryModifier;
use crate::parameter::KernelParameter;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
enum RegistryEntry {
    Kernel(Kernel),
    Composition(KernelComposition),
}

/// Stores kernel and composition metadata and hands out configurations.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    entries: Vec<RegistryEntry>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_kernel(
        &mut self,
        source: impl Into<String>,
        name: impl Into<String>,
        global_size: DimensionVector,
        local_size: DimensionVector,
    ) -> KernelId {
        let id = self.entries.len();
        self.entries.push(RegistryEntry::Kernel(Kernel::new(
            id,
            name,
            source,
            global_size,
            local_size,
        )));
        id
    }

    pub fn add_kernel_from_file(
        &mut self,
        path: impl AsRef<Path>,
        name: impl Into<String>,
        global_size: DimensionVector,
        local_size: DimensionVector,
    ) -> Result<KernelId> {
        let source = fs::read_to_string(path)?;
        Ok(self.add_kernel(source, name, global_size, local_size))
    }

    /// Registers a composition over previously registered kernels.
    pub fn add_composition(
        &mut self,
        name: impl Into<String>,
        kernel_ids: Vec<KernelId>,
    ) -> Result<KernelId> {
        if kernel_ids.is_empty() {
            return Err(TunerError::InvalidArgument(
                "composition must reference at least one kernel".into(),
            ));
        }
        for kernel_id in &kernel_ids {
            self.kernel(*kernel_id)?;
        }

        let id = self.entries.len();
        self.entries.push(RegistryEntry::Composition(KernelComposition::new(
            id,
            name,
            kernel_ids,
        )));
        Ok(id)
    }

    pub fn kernel(&self, id: KernelId) -> Result<&Kernel> {
        match self.entries.get(id) {
            Some(RegistryEntry::Kernel(kernel)) => Ok(kernel),
            _ => Err(TunerError::InvalidKernelId(id)),
        }
    }

    pub fn composition(&self, id: KernelId) -> Result<&KernelComposition> {
        match self.entries.get(id) {
            Some(RegistryEntry::Composition(composition)) => Ok(composition),
            _ => Err(TunerError::InvalidKernelId(id)),
        }
    }

    pub fn is_composition(&self, id: KernelId) -> bool {
        matches!(self.entries.get(id), Some(RegistryEntry::Composition(_)))
    }

    /// Display name of a kernel or composition.
    pub fn name(&self, id: KernelId) -> Result<&str> {
        match self.entries.get(id) {
            Some(RegistryEntry::Kernel(kernel)) => Ok(kernel.name()),
            Some(RegistryEntry::Composition(composition)) => Ok(composition.name()),
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    pub fn add_parameter(&mut self, id: KernelId, parameter: KernelParameter) -> Result<()> {
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Kernel(kernel)) => kernel.add_parameter(parameter),
            Some(RegistryEntry::Composition(composition)) => {
                composition.add_parameter(parameter, ParameterScope::AllKernels)
            }
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Adds a composition parameter whose thread modifier only rewrites the
    /// named member kernels.
    pub fn add_composition_parameter(
        &mut self,
        id: KernelId,
        parameter: KernelParameter,
        scope: ParameterScope,
    ) -> Result<()> {
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Composition(composition)) => {
                composition.add_parameter(parameter, scope)
            }
            _ => Err(TunerError::InvalidKernelId(id)),
        }
    }

    pub fn add_constraint(&mut self, id: KernelId, constraint: KernelConstraint) -> Result<()> {
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Kernel(kernel)) => kernel.add_constraint(constraint),
            Some(RegistryEntry::Composition(composition)) => composition.add_constraint(constraint),
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Binds argument ids to a kernel in declaration order, or replaces a
    /// composition's shared arguments.
    pub fn bind_arguments(&mut self, id: KernelId, argument_ids: Vec<ArgumentId>) -> Result<()> {
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Kernel(kernel)) => {
                kernel.set_argument_ids(argument_ids);
                Ok(())
            }
            Some(RegistryEntry::Composition(composition)) => {
                composition.set_shared_argument_ids(argument_ids);
                Ok(())
            }
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Overrides the argument binding of one composition member.
    pub fn bind_composition_arguments(
        &mut self,
        id: KernelId,
        kernel_id: KernelId,
        argument_ids: Vec<ArgumentId>,
    ) -> Result<()> {
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Composition(composition)) => {
                composition.set_kernel_argument_ids(kernel_id, argument_ids)
            }
            _ => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Recomputes a local-memory argument's element count from the current
    /// parameter values before every launch of the kernel.
    pub fn set_local_memory_modifier(
        &mut self,
        id: KernelId,
        argument_id: ArgumentId,
        parameter_names: Vec<String>,
        function: impl Fn(usize, &[u64]) -> usize + Send + Sync + 'static,
    ) -> Result<()> {
        let modifier = LocalMemoryModifier::new(argument_id, parameter_names, function)?;
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Kernel(kernel)) => kernel.add_local_memory_modifier(modifier),
            _ => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Local-memory sizing scoped to one member of a composition.
    pub fn set_composition_local_memory_modifier(
        &mut self,
        id: KernelId,
        kernel_id: KernelId,
        argument_id: ArgumentId,
        parameter_names: Vec<String>,
        function: impl Fn(usize, &[u64]) -> usize + Send + Sync + 'static,
    ) -> Result<()> {
        let modifier = LocalMemoryModifier::new(argument_id, parameter_names, function)?;
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Composition(composition)) => {
                composition.add_local_memory_modifier(kernel_id, modifier)
            }
            _ => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Selects the search strategy, validating argument arity.
    pub fn set_search_method(
        &mut self,
        id: KernelId,
        method: SearchMethod,
        arguments: Vec<f64>,
    ) -> Result<()> {
        if arguments.len() < method.required_arguments() {
            return Err(TunerError::InvalidArgument(format!(
                "insufficient number of arguments for {}: got {}, need {}",
                method,
                arguments.len(),
                method.required_arguments()
            )));
        }

        let policy = SearchPolicy { method, arguments };
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Kernel(kernel)) => {
                kernel.set_search_policy(policy);
                Ok(())
            }
            Some(RegistryEntry::Composition(composition)) => {
                composition.set_search_policy(policy);
                Ok(())
            }
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Marks another registered kernel, at a fixed configuration, as the
    /// reference for `id`.
    pub fn set_reference_kernel(
        &mut self,
        id: KernelId,
        reference_id: KernelId,
        values: Vec<ParameterValue>,
        argument_ids: Vec<ArgumentId>,
    ) -> Result<()> {
        if id == reference_id {
            return Err(TunerError::InvalidArgument(
                "kernel cannot act as its own reference".into(),
            ));
        }
        self.kernel(reference_id)?;
        self.set_reference(
            id,
            ReferenceSpec::Kernel {
                reference_id,
                values,
                argument_ids,
            },
        )
    }

    /// Marks `id` as validated by an external reference computer. The
    /// computer capability itself is owned by the validator.
    pub fn set_reference_computer(
        &mut self,
        id: KernelId,
        argument_ids: Vec<ArgumentId>,
    ) -> Result<()> {
        self.set_reference(id, ReferenceSpec::Computer { argument_ids })
    }

    fn set_reference(&mut self, id: KernelId, reference: ReferenceSpec) -> Result<()> {
        match self.entries.get_mut(id) {
            Some(RegistryEntry::Kernel(kernel)) => {
                kernel.set_reference(reference);
                Ok(())
            }
            Some(RegistryEntry::Composition(composition)) => {
                composition.set_reference(reference);
                Ok(())
            }
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Kernel source prefixed by one `#define NAME VALUE` line per parameter
    /// in declaration order. This is the only channel through which tunable
    /// parameters reach the kernel program.
    ///
    /// The prefix is built from the configuration's value list, so a member
    /// of a composition receives the composition's parameters.
    pub fn kernel_source_with_defines(
        &self,
        id: KernelId,
        configuration: &KernelConfiguration,
    ) -> Result<String> {
        let kernel = self.kernel(id)?;
        for parameter in kernel.parameters() {
            if configuration.value_of(parameter.name()).is_none() {
                return Err(TunerError::InvalidArgument(format!(
                    "configuration carries no value for parameter {}",
                    parameter.name()
                )));
            }
        }

        let mut source = String::new();
        for pair in configuration.values() {
            source.push_str(&format!("#define {} {}\n", pair.name, pair.value));
        }
        source.push_str(kernel.source());
        Ok(source)
    }

    /// Lazy sequence of valid configurations for a kernel or composition.
    pub fn configurations(
        &self,
        id: KernelId,
        settings: GeneratorSettings,
    ) -> Result<ConfigurationGenerator> {
        match self.entries.get(id) {
            Some(RegistryEntry::Kernel(kernel)) => {
                Ok(ConfigurationGenerator::for_kernel(kernel, settings))
            }
            Some(RegistryEntry::Composition(composition)) => {
                let members: Vec<&Kernel> = composition
                    .kernel_ids()
                    .iter()
                    .map(|kernel_id| self.kernel(*kernel_id))
                    .collect::<Result<_>>()?;
                Ok(ConfigurationGenerator::for_composition(
                    composition,
                    &members,
                    settings,
                ))
            }
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    pub fn configuration_count(&self, id: KernelId, settings: GeneratorSettings) -> Result<usize> {
        Ok(self.configurations(id, settings)?.count())
    }

    /// Configuration for an explicit value assignment on a plain kernel.
    pub fn configuration_for(
        &self,
        id: KernelId,
        values: &[ParameterValue],
        settings: GeneratorSettings,
    ) -> Result<KernelConfiguration> {
        configuration_for_values(self.kernel(id)?, values, settings)
    }

    /// Search policy of a kernel or composition.
    pub fn search_policy(&self, id: KernelId) -> Result<&SearchPolicy> {
        match self.entries.get(id) {
            Some(RegistryEntry::Kernel(kernel)) => Ok(kernel.search_policy()),
            Some(RegistryEntry::Composition(composition)) => Ok(composition.search_policy()),
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    /// Reference specification of a kernel or composition.
    pub fn reference(&self, id: KernelId) -> Result<Option<&ReferenceSpec>> {
        match self.entries.get(id) {
            Some(RegistryEntry::Kernel(kernel)) => Ok(kernel.reference()),
            Some(RegistryEntry::Composition(composition)) => Ok(composition.reference()),
            None => Err(TunerError::InvalidKernelId(id)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_kernel() -> (KernelRegistry, KernelId) {
        let mut registry = KernelRegistry::new();
        let id = registry.add_kernel(
            "BODY",
            "test",
            DimensionVector::new(1024, 1, 1),
            DimensionVector::new(16, 16, 1),
        );
        (registry, id)
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let (mut registry, first) = registry_with_kernel();
        let second = registry.add_kernel(
            "BODY",
            "other",
            DimensionVector::new(1, 1, 1),
            DimensionVector::new(1, 1, 1),
        );

        assert_eq!(first, 0);
        assert_eq!(second, 1);
    }

    #[test]
    fn duplicate_parameter_name_is_rejected() {
        let (mut registry, id) = registry_with_kernel();
        registry
            .add_parameter(id, KernelParameter::new("param", vec![1, 2, 3]).unwrap())
            .unwrap();

        let result = registry.add_parameter(id, KernelParameter::new("param", vec![3]).unwrap());
        assert!(matches!(result, Err(TunerError::InvalidArgument(_))));
    }

    #[test]
    fn source_with_defines_follows_declaration_order() {
        let (mut registry, id) = registry_with_kernel();
        registry
            .add_parameter(id, KernelParameter::new("A", vec![1, 2, 3]).unwrap())
            .unwrap();
        registry
            .add_parameter(id, KernelParameter::new("B", vec![5, 10]).unwrap())
            .unwrap();

        let configuration = registry
            .configuration_for(
                id,
                &[ParameterValue::new("B", 5), ParameterValue::new("A", 2)],
                GeneratorSettings::default(),
            )
            .unwrap();
        let source = registry.kernel_source_with_defines(id, &configuration).unwrap();
        assert_eq!(source, "#define A 2\n#define B 5\nBODY");
    }

    #[test]
    fn search_method_arity_is_validated() {
        let (mut registry, id) = registry_with_kernel();

        assert!(registry
            .set_search_method(id, SearchMethod::RandomSearch, vec![])
            .is_err());
        assert!(registry
            .set_search_method(id, SearchMethod::SimulatedAnnealing, vec![10.0])
            .is_err());
        assert!(registry
            .set_search_method(id, SearchMethod::ParticleSwarm, vec![4.0, 0.7, 1.5])
            .is_err());
        assert!(registry
            .set_search_method(id, SearchMethod::RandomSearch, vec![0.5])
            .is_ok());
    }

    #[test]
    fn local_memory_modifier_requires_known_parameters() {
        let (mut registry, id) = registry_with_kernel();
        registry
            .add_parameter(id, KernelParameter::new("TILE", vec![4, 8]).unwrap())
            .unwrap();

        let result = registry.set_local_memory_modifier(id, 0, vec!["missing".into()], |_, v| {
            v[0] as usize
        });
        assert!(matches!(result, Err(TunerError::InvalidArgument(_))));

        registry
            .set_local_memory_modifier(id, 0, vec!["TILE".into()], |_, values| {
                values[0] as usize * 2
            })
            .unwrap();

        let modifiers = registry.kernel(id).unwrap().local_memory_modifiers();
        assert_eq!(modifiers.len(), 1);
        assert_eq!(modifiers[0].resolved_count(1, &[8]), 16);
    }

    #[test]
    fn local_memory_modifier_replaces_earlier_binding() {
        let (mut registry, id) = registry_with_kernel();
        registry
            .set_local_memory_modifier(id, 2, vec![], |count, _| count)
            .unwrap();
        registry
            .set_local_memory_modifier(id, 2, vec![], |count, _| count * 4)
            .unwrap();

        let modifiers = registry.kernel(id).unwrap().local_memory_modifiers();
        assert_eq!(modifiers.len(), 1);
        assert_eq!(modifiers[0].resolved_count(8, &[]), 32);
    }

    #[test]
    fn composition_requires_registered_members() {
        let (mut registry, id) = registry_with_kernel();
        assert!(registry.add_composition("pipeline", vec![id, 42]).is_err());

        let composition = registry.add_composition("pipeline", vec![id]).unwrap();
        assert!(registry.is_composition(composition));
        assert!(registry.kernel(composition).is_err());
    }

    #[test]
    fn reference_kernel_must_exist_and_differ() {
        let (mut registry, id) = registry_with_kernel();
        assert!(registry.set_reference_kernel(id, id, vec![], vec![0]).is_err());
        assert!(registry.set_reference_kernel(id, 9, vec![], vec![0]).is_err());

        let other = registry.add_kernel(
            "BODY",
            "reference",
            DimensionVector::new(1, 1, 1),
            DimensionVector::new(1, 1, 1),
        );
        assert!(registry.set_reference_kernel(id, other, vec![], vec![0]).is_ok());
    }
}
