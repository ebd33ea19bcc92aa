use common::AnalysisTypeRef;
use common::analysis_type::AnalysisTypeError;
use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

use crate::analysis::StorageReport;
use crate::schema::ValidationErrors;

/// Structured error for callers that render errors, e.g. an HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code, e.g. `UNKNOWN_ANALYSIS`.
    pub code: &'static str,
    /// Human-readable error description.
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    MalformedParameter(String),

    #[error("Malformed schema: {0}")]
    MalformedSchema(String),

    #[error("The study '{0}' does not exist")]
    UnknownStudy(String),

    #[error("The analysis '{0}' does not exist")]
    UnknownAnalysis(String),

    #[error("The analysis type '{0}' does not exist")]
    UnknownAnalysisType(String),

    #[error(
        "Version {version} of analysis type '{name}' does not exist, the latest version is {latest}"
    )]
    UnknownAnalysisTypeVersion {
        name: String,
        version: i32,
        latest: i32,
    },

    #[error("Analysis type '{analysis_type}' is not accepted: {reason}")]
    AnalysisTypeIncorrectVersion {
        analysis_type: AnalysisTypeRef,
        reason: String,
    },

    #[error("Payload is invalid: {0}")]
    SchemaViolation(ValidationErrors),

    #[error("The analysis '{analysis_id}' belongs to study '{actual}', not '{claimed}'")]
    EntityNotRelatedToStudy {
        analysis_id: String,
        claimed: String,
        actual: String,
    },

    #[error("The analysis '{0}' has no files")]
    AnalysisMissingFiles(String),

    #[error("The analysis '{0}' has no samples")]
    AnalysisMissingSamples(String),

    #[error("Cannot publish analysis '{analysis_id}': {report}")]
    MissingStorageObjects {
        analysis_id: String,
        report: StorageReport,
    },

    #[error("Cannot publish analysis '{analysis_id}': {report}")]
    MismatchingStorageObjectSizes {
        analysis_id: String,
        report: StorageReport,
    },

    #[error("Cannot publish analysis '{analysis_id}': {report}")]
    MismatchingStorageObjectChecksums {
        analysis_id: String,
        report: StorageReport,
    },

    #[error("The analysis '{0}' is SUPPRESSED and cannot be unpublished")]
    SuppressedStateTransition(String),

    #[error("The payload studyId '{payload}' does not match the target study '{target}'")]
    StudyIdMismatch { payload: String, target: String },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedParameter(_) => "MALFORMED_PARAMETER",
            Self::MalformedSchema(_) => "MALFORMED_SCHEMA",
            Self::UnknownStudy(_) => "STUDY_ID_DOES_NOT_EXIST",
            Self::UnknownAnalysis(_) => "ANALYSIS_ID_NOT_FOUND",
            Self::UnknownAnalysisType(_) => "ANALYSIS_TYPE_NOT_FOUND",
            Self::UnknownAnalysisTypeVersion { .. } => "ANALYSIS_TYPE_VERSION_NOT_FOUND",
            Self::AnalysisTypeIncorrectVersion { .. } => "ANALYSIS_TYPE_INCORRECT_VERSION",
            Self::SchemaViolation(_) => "SCHEMA_VIOLATION",
            Self::EntityNotRelatedToStudy { .. } => "ENTITY_NOT_RELATED_TO_STUDY",
            Self::AnalysisMissingFiles(_) => "ANALYSIS_MISSING_FILES",
            Self::AnalysisMissingSamples(_) => "ANALYSIS_MISSING_SAMPLES",
            Self::MissingStorageObjects { .. } => "MISSING_STORAGE_OBJECTS",
            Self::MismatchingStorageObjectSizes { .. } => "MISMATCHING_STORAGE_OBJECT_SIZES",
            Self::MismatchingStorageObjectChecksums { .. } => {
                "MISMATCHING_STORAGE_OBJECT_CHECKSUMS"
            }
            Self::SuppressedStateTransition(_) => "SUPPRESSED_STATE_TRANSITION",
            Self::StudyIdMismatch { .. } => "STUDY_ID_MISMATCH",
            Self::Database(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Render for callers. Internal details are logged, not returned.
    pub fn body(&self) -> ErrorBody {
        let message = match self {
            Self::Database(_) | Self::Internal(_) => {
                tracing::error!("Internal error: {}", self);
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message,
        }
    }
}

impl From<AnalysisTypeError> for RegistryError {
    fn from(err: AnalysisTypeError) -> Self {
        RegistryError::MalformedParameter(err.to_string())
    }
}
