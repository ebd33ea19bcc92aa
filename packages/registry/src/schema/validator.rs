use std::collections::HashSet;
use std::fmt;

use common::{AnalysisTypeId, AnalysisTypeRef};
use jsonschema::Validator;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use serde_json::Value;

use super::registry::SchemaRegistry;
use crate::config::ValidationConfig;
use crate::entity::analysis_schema;
use crate::error::RegistryError;

/// Which envelope a document is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationMode {
    /// Full submission: payload envelope plus the type's clauses.
    Create,
    /// Partial update: only `analysisType` is required from the envelope.
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// JSON pointer to the offending value. Empty for the document root.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Every violation found in one pass, in the order the validator reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    /// Collect all errors `validator` reports for `instance`.
    pub fn collect(validator: &Validator, instance: &Value) -> Self {
        Self(
            validator
                .iter_errors(instance)
                .map(|e| ValidationError::new(e.instance_path.to_string(), e.to_string()))
                .collect(),
        )
    }
}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join("; "))
    }
}

/// Rules about which analysis type versions may still be used.
#[derive(Debug, Clone, Default)]
pub struct VersionPolicy {
    latest_only: bool,
    rejected: HashSet<AnalysisTypeRef>,
}

impl VersionPolicy {
    pub fn new(latest_only: bool, rejected: HashSet<AnalysisTypeRef>) -> Self {
        Self {
            latest_only,
            rejected,
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Result<Self, RegistryError> {
        Ok(Self::new(config.latest_only, config.rejected_refs()?))
    }
}

/// Checks raw documents against the schema of their analysis type.
pub struct PayloadValidator<'a> {
    registry: &'a SchemaRegistry,
    policy: &'a VersionPolicy,
}

impl<'a> PayloadValidator<'a> {
    pub fn new(registry: &'a SchemaRegistry, policy: &'a VersionPolicy) -> Self {
        Self { registry, policy }
    }

    pub async fn validate_for_create<C: ConnectionTrait>(
        &self,
        conn: &C,
        payload: &Value,
        analysis_type: &AnalysisTypeId,
    ) -> Result<analysis_schema::Model, RegistryError> {
        self.validate(conn, payload, analysis_type, ValidationMode::Create)
            .await
    }

    pub async fn validate_for_update<C: ConnectionTrait>(
        &self,
        conn: &C,
        patch: &Value,
        analysis_type: &AnalysisTypeId,
    ) -> Result<analysis_schema::Model, RegistryError> {
        self.validate(conn, patch, analysis_type, ValidationMode::Update)
            .await
    }

    /// Resolve the type, apply the version policy, then validate. Returns the resolved version.
    async fn validate<C: ConnectionTrait>(
        &self,
        conn: &C,
        document: &Value,
        analysis_type: &AnalysisTypeId,
        mode: ValidationMode,
    ) -> Result<analysis_schema::Model, RegistryError> {
        let entry = self.registry.resolve_id(conn, analysis_type).await?;
        self.check_version_accepted(conn, &entry).await?;

        let validator = self.registry.validator(&entry, mode)?;
        let errors = ValidationErrors::collect(&validator, document);
        if errors.is_empty() {
            Ok(entry)
        } else {
            tracing::debug!(
                analysis_type = %entry.type_ref(),
                ?mode,
                errors = errors.len(),
                "Document failed validation"
            );
            Err(RegistryError::SchemaViolation(errors))
        }
    }

    pub async fn check_version_accepted<C: ConnectionTrait>(
        &self,
        conn: &C,
        entry: &analysis_schema::Model,
    ) -> Result<(), RegistryError> {
        let type_ref = entry.type_ref();
        if self.policy.rejected.contains(&type_ref) {
            return Err(RegistryError::AnalysisTypeIncorrectVersion {
                analysis_type: type_ref,
                reason: "this version has been rejected".to_string(),
            });
        }
        if self.policy.latest_only {
            let latest = self
                .registry
                .latest_version(conn, &entry.name)
                .await?
                .unwrap_or(entry.version);
            if latest != entry.version {
                return Err(RegistryError::AnalysisTypeIncorrectVersion {
                    analysis_type: type_ref,
                    reason: format!("only the latest version ({latest}) is accepted"),
                });
            }
        }
        Ok(())
    }
}
