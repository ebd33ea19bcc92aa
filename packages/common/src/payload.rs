//! Submission documents as received from clients.
//!
//! Field names follow the external camelCase wire format. Anything outside the envelope
//! (`studyId`, `analysisType`, `samples`, `files`) is experiment data and is kept as an opaque
//! JSON object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::analysis_type::AnalysisTypeId;

/// Fields that analysis type schemas may not redefine.
pub const RESERVED_FIELDS: &[&str] = &["analysisId", "analysisState", "analysisType"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_id: Option<String>,
    pub analysis_type: AnalysisTypeId,
    pub samples: Vec<SubmittedSample>,
    pub files: Vec<SubmittedFile>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedDonor {
    pub submitter_donor_id: String,
    pub gender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedSpecimen {
    pub submitter_specimen_id: String,
    pub specimen_type: String,
    pub specimen_tissue_source: String,
    pub tumour_normal_designation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

/// One donor → specimen → sample chain inside a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedSample {
    pub submitter_sample_id: String,
    pub sample_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_normal_submitter_sample_id: Option<String>,
    pub specimen: SubmittedSpecimen,
    pub donor: SubmittedDonor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedFile {
    pub file_name: String,
    pub file_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_md5sum: Option<String>,
    pub file_access: String,
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

/// Pull `analysisType` out of a raw document without deserializing the rest.
pub fn analysis_type_of(document: &Value) -> Option<AnalysisTypeId> {
    document
        .get("analysisType")
        .and_then(|v| serde_json::from_value::<AnalysisTypeId>(v.clone()).ok())
}
