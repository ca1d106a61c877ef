//! Tiered semantic validation.
//!
//! Validators run in two cost tiers:
//!
//! - `Immediate`: same-file only, never loads artifacts, cheap enough to run
//!   on every keystroke
//! - `Thorough`: may consult the symbol manager and load a bounded number of
//!   missing dependency artifacts
//!
//! A `Thorough` run includes every `Immediate` validator. Findings are data
//! ([`ValidationError`] with a stable code from [`codes`]), never panics.
//!
//! Cross-file findings about a type whose artifact could not be loaded are
//! suppressed rather than reported.

pub mod artifact;
pub mod builtins;
pub mod codes;
mod lookup;
mod registry;
pub mod validators;

pub use artifact::{ArtifactError, ArtifactLoader, ArtifactLoadingHelper, ArtifactStats, ArtifactStatus};
pub use registry::ValidatorRegistry;

use crate::enrichment::DetailLevel;
use crate::manager::SymbolManager;
use crate::symbol::SymbolTable;
use crate::types::Range;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationTier {
    Immediate,
    Thorough,
}

impl ValidationTier {
    /// Whether validators of tier `other` run when this tier is requested.
    pub fn includes(&self, other: ValidationTier) -> bool {
        other <= *self
    }
}

impl fmt::Display for ValidationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationTier::Immediate => f.write_str("IMMEDIATE"),
            ValidationTier::Thorough => f.write_str("THOROUGH"),
        }
    }
}

/// What a validator needs before it can run meaningfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prerequisites {
    pub required_detail_level: Option<DetailLevel>,
    pub requires_references: bool,
    pub requires_cross_file_resolution: bool,
}

/// A single finding. Used for both errors and warnings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub message: String,
    pub location: Range,
    pub code: String,
}

impl ValidationError {
    pub fn new(code: &str, message: impl Into<String>, location: Range) -> Self {
        Self {
            message: message.into(),
            location,
            code: code.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn warning(&mut self, warning: ValidationError) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.is_valid &= other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Errors carrying `code`.
    pub fn errors_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.errors.iter().filter(move |e| e.code == code)
    }
}

/// Inputs a validator may use besides the file's own table.
#[derive(Clone)]
pub struct ValidationOptions {
    pub tier: ValidationTier,
    /// Cross-file lookups; only consulted at `Thorough`
    pub manager: Option<SymbolManager>,
    /// Bounded artifact loading; only consulted at `Thorough`
    pub artifacts: Option<Rc<ArtifactLoadingHelper>>,
    pub enable_artifact_loading: bool,
}

impl ValidationOptions {
    pub fn immediate() -> Self {
        Self {
            tier: ValidationTier::Immediate,
            manager: None,
            artifacts: None,
            enable_artifact_loading: false,
        }
    }

    pub fn thorough(manager: SymbolManager) -> Self {
        Self {
            tier: ValidationTier::Thorough,
            manager: Some(manager),
            artifacts: None,
            enable_artifact_loading: false,
        }
    }

    pub fn with_artifacts(mut self, helper: Rc<ArtifactLoadingHelper>) -> Self {
        self.artifacts = Some(helper);
        self.enable_artifact_loading = true;
        self
    }

    pub fn is_thorough(&self) -> bool {
        self.tier == ValidationTier::Thorough
    }

    /// Symbol manager, but only at `Thorough`.
    pub fn cross_file(&self) -> Option<&SymbolManager> {
        self.manager.as_ref().filter(|_| self.is_thorough())
    }

    /// Artifact helper, but only at `Thorough` with loading enabled.
    pub fn artifact_loading(&self) -> Option<&ArtifactLoadingHelper> {
        self.artifacts
            .as_deref()
            .filter(|_| self.is_thorough() && self.enable_artifact_loading)
    }
}

/// A pluggable validation rule.
pub trait Validator {
    /// Stable identifier, e.g. `duplicate-method`
    fn id(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn tier(&self) -> ValidationTier;

    /// Ordering within a tier, lower runs first
    fn priority(&self) -> u32;

    fn prerequisites(&self) -> Prerequisites {
        Prerequisites::default()
    }

    fn validate(&self, table: &SymbolTable, options: &ValidationOptions) -> ValidationResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thorough_includes_immediate() {
        assert!(ValidationTier::Thorough.includes(ValidationTier::Immediate));
        assert!(ValidationTier::Thorough.includes(ValidationTier::Thorough));
        assert!(!ValidationTier::Immediate.includes(ValidationTier::Thorough));
    }

    #[test]
    fn test_merge_keeps_invalid() {
        let mut result = ValidationResult::ok();
        let mut other = ValidationResult::ok();
        other.error(ValidationError::new(codes::UNRESOLVED_TYPE, "x", Range::at(0, 0)));

        result.merge(other);
        assert!(!result.is_valid);
        assert_eq!(result.errors_with_code(codes::UNRESOLVED_TYPE).count(), 1);
    }

    #[test]
    fn test_immediate_options_hide_cross_file() {
        let options = ValidationOptions {
            manager: Some(SymbolManager::new(crate::scheduler::Scheduler::new())),
            ..ValidationOptions::immediate()
        };
        assert!(options.cross_file().is_none());
        assert!(options.artifact_loading().is_none());
    }
}
