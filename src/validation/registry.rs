use super::validators::builtin_validators;
use super::{ValidationOptions, ValidationResult, ValidationTier, Validator};
use crate::scheduler::yield_now;
use crate::symbol::SymbolTable;
use std::rc::Rc;

/// Holds the registered validators and runs them by tier.
#[derive(Default, Clone)]
pub struct ValidatorRegistry {
    validators: Vec<Rc<dyn Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with every built-in validator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for validator in builtin_validators() {
            registry.register(validator);
        }
        registry
    }

    /// Returns false if a validator with the same id is already registered.
    pub fn register(&mut self, validator: Rc<dyn Validator>) -> bool {
        if self.validators.iter().any(|v| v.id() == validator.id()) {
            tracing::warn!(target: "validation", "validator '{}' already registered", validator.id());
            return false;
        }
        self.validators.push(validator);
        true
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validators that run at `tier`, cheaper tiers first, then by priority.
    pub fn validators_for(&self, tier: ValidationTier) -> Vec<Rc<dyn Validator>> {
        let mut selected: Vec<Rc<dyn Validator>> = self
            .validators
            .iter()
            .filter(|v| tier.includes(v.tier()))
            .cloned()
            .collect();
        selected.sort_by_key(|v| (v.tier(), v.priority()));
        selected
    }

    /// Run every applicable validator and merge the results.
    pub fn run(&self, table: &SymbolTable, options: &ValidationOptions) -> ValidationResult {
        let mut merged = ValidationResult::ok();
        for validator in self.validators_for(options.tier) {
            if let Some(result) = self.run_one(validator.as_ref(), table, options) {
                merged.merge(result);
            }
        }
        merged
    }

    /// Like [`run`](Self::run), yielding to the scheduler between validators.
    pub async fn run_cooperative(
        &self,
        table: &SymbolTable,
        options: &ValidationOptions,
    ) -> ValidationResult {
        let mut merged = ValidationResult::ok();
        for validator in self.validators_for(options.tier) {
            if let Some(result) = self.run_one(validator.as_ref(), table, options) {
                merged.merge(result);
            }
            yield_now().await;
        }
        merged
    }

    fn run_one(
        &self,
        validator: &dyn Validator,
        table: &SymbolTable,
        options: &ValidationOptions,
    ) -> Option<ValidationResult> {
        if let Some(reason) = unmet_prerequisite(validator, table, options) {
            tracing::debug!(target: "validation", "skipping {}: {reason}", validator.id());
            return None;
        }

        let result = validator.validate(table, options);
        tracing::trace!(
            target: "validation",
            "{} found {} errors, {} warnings",
            validator.id(),
            result.errors.len(),
            result.warnings.len()
        );
        Some(result)
    }
}

fn unmet_prerequisite(
    validator: &dyn Validator,
    table: &SymbolTable,
    options: &ValidationOptions,
) -> Option<String> {
    let prerequisites = validator.prerequisites();

    if prerequisites.requires_references && table.references().is_empty() {
        return Some("no references recorded".to_string());
    }
    if prerequisites.requires_cross_file_resolution && options.cross_file().is_none() {
        return Some("cross-file resolution unavailable".to_string());
    }
    // Files without a recorded level were parsed in full.
    if let Some(required) = prerequisites.required_detail_level
        && let Some(manager) = &options.manager
        && let Some(file_uri) = table.file_uri()
        && let Some(level) = manager.detail_level(file_uri)
        && level < required
    {
        return Some(format!("detail level {level} below {required}"));
    }
    None
}
