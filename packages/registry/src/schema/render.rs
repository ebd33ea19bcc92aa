//! Base envelope schemas and how analysis type schemas are folded into them.

use common::payload::RESERVED_FIELDS;
use serde_json::{Map, Value, json};

use super::validator::{ValidationErrors, ValidationMode};
use crate::error::RegistryError;

/// Clauses of a registered type schema that are merged into the envelope.
const MERGED_KEYWORDS: &[&str] = &["properties", "definitions", "$defs"];

fn analysis_type_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "properties": {
            "name": {"type": "string", "pattern": "^[a-zA-Z0-9._-]+$"},
            "version": {"type": "integer", "minimum": 1}
        }
    })
}

fn non_empty() -> Value {
    json!({"type": "string", "minLength": 1})
}

fn info_schema() -> Value {
    json!({"type": ["object", "null"]})
}

/// Envelope every full submission must satisfy.
pub fn base_payload_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["analysisType", "samples", "files"],
        "properties": {
            "studyId": non_empty(),
            "analysisType": analysis_type_schema(),
            "samples": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["submitterSampleId", "sampleType", "specimen", "donor"],
                    "properties": {
                        "submitterSampleId": non_empty(),
                        "sampleType": non_empty(),
                        "matchedNormalSubmitterSampleId": {"type": ["string", "null"]},
                        "info": info_schema(),
                        "specimen": {
                            "type": "object",
                            "required": [
                                "submitterSpecimenId",
                                "specimenType",
                                "specimenTissueSource",
                                "tumourNormalDesignation"
                            ],
                            "properties": {
                                "submitterSpecimenId": non_empty(),
                                "specimenType": non_empty(),
                                "specimenTissueSource": non_empty(),
                                "tumourNormalDesignation": {"enum": ["Normal", "Tumour"]},
                                "info": info_schema()
                            }
                        },
                        "donor": {
                            "type": "object",
                            "required": ["submitterDonorId", "gender"],
                            "properties": {
                                "submitterDonorId": non_empty(),
                                "gender": {"enum": ["Male", "Female", "Other"]},
                                "info": info_schema()
                            }
                        }
                    }
                }
            },
            "files": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["fileName", "fileSize", "fileAccess", "fileType"],
                    "properties": {
                        "fileName": non_empty(),
                        "fileSize": {"type": "integer", "minimum": 0},
                        "fileMd5sum": {"type": ["string", "null"], "pattern": "^[a-fA-F0-9]{32}$"},
                        "fileAccess": {"enum": ["open", "controlled"]},
                        "fileType": non_empty(),
                        "dataType": {"type": ["string", "null"]},
                        "info": info_schema()
                    }
                }
            }
        }
    })
}

/// Envelope for partial updates: only the type reference is mandatory.
pub fn base_update_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["analysisType"],
        "properties": {
            "analysisType": analysis_type_schema()
        }
    })
}

/// Constraints on the schema documents themselves.
pub fn registration_metaschema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "type": {"const": "object"},
            "required": {
                "type": "array",
                "items": {"type": "string"},
                "uniqueItems": true
            },
            "properties": {
                "type": "object",
                "propertyNames": {"not": {"enum": RESERVED_FIELDS}}
            }
        }
    })
}

/// Merge `type_schema` into `base`: `required` is a set union, keyed clauses such as
/// `properties` are combined with the type's entries winning on collision.
pub fn merge(base: &Value, type_schema: &Value) -> Value {
    let mut out = base.clone();
    let (Some(target), Some(source)) = (out.as_object_mut(), type_schema.as_object()) else {
        return out;
    };

    if let Some(Value::Array(extra)) = source.get("required") {
        let required = target
            .entry("required")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = required {
            for item in extra {
                if !list.contains(item) {
                    list.push(item.clone());
                }
            }
        }
    }

    for keyword in MERGED_KEYWORDS {
        if let Some(Value::Object(extra)) = source.get(*keyword) {
            let entry = target
                .entry(keyword.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(map) = entry {
                for (k, v) in extra {
                    map.insert(k.clone(), v.clone());
                }
            }
        }
    }

    out
}

/// The schema a document is actually validated against.
pub fn render(type_schema: &Value, mode: ValidationMode) -> Value {
    match mode {
        ValidationMode::Create => merge(&base_payload_schema(), type_schema),
        ValidationMode::Update => merge(&base_update_schema(), type_schema),
    }
}

/// Reject documents that are not usable as analysis type schemas.
pub fn check_registrable(schema: &Value) -> Result<(), RegistryError> {
    if !schema.is_object() {
        return Err(RegistryError::MalformedSchema(
            "the schema must be a JSON object".to_string(),
        ));
    }

    jsonschema::validator_for(schema)
        .map_err(|e| RegistryError::MalformedSchema(e.to_string()))?;

    let meta = jsonschema::validator_for(&registration_metaschema())
        .map_err(|e| RegistryError::Internal(format!("registration metaschema: {e}")))?;
    let errors = ValidationErrors::collect(&meta, schema);
    if !errors.is_empty() {
        return Err(RegistryError::MalformedSchema(errors.to_string()));
    }

    // The rendered form must compile too, e.g. `$ref`s into merged definitions.
    jsonschema::validator_for(&render(schema, ValidationMode::Create))
        .map_err(|e| RegistryError::MalformedSchema(e.to_string()))?;
    Ok(())
}
