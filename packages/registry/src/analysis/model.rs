use chrono::{DateTime, Utc};
use common::{AnalysisState, AnalysisTypeRef};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::composite::CompositeEntity;
use crate::entity::{analysis_state_change, file};

/// The analysis row with its type reference. What a shallow read returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisHeader {
    pub analysis_id: String,
    pub study_id: String,
    pub analysis_type: AnalysisTypeRef,
    pub analysis_state: AnalysisState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fully assembled analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(flatten)]
    pub header: AnalysisHeader,
    pub data: Map<String, Value>,
    pub samples: Vec<CompositeEntity>,
    pub files: Vec<file::Model>,
    pub state_history: Vec<analysis_state_change::Model>,
    /// Earliest transition into PUBLISHED.
    pub first_published_at: Option<DateTime<Utc>>,
    /// Latest transition into PUBLISHED.
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisView {
    Shallow(AnalysisHeader),
    Deep(Box<Analysis>),
}

impl AnalysisView {
    pub fn header(&self) -> &AnalysisHeader {
        match self {
            Self::Shallow(header) => header,
            Self::Deep(analysis) => &analysis.header,
        }
    }
}

/// The state change recorded by publish, unpublish or suppress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub analysis_id: String,
    pub initial_state: AnalysisState,
    pub updated_state: AnalysisState,
    pub updated_at: DateTime<Utc>,
}

impl From<analysis_state_change::Model> for StateTransition {
    fn from(change: analysis_state_change::Model) -> Self {
        Self {
            analysis_id: change.analysis_id,
            initial_state: change.initial_state,
            updated_state: change.updated_state,
            updated_at: change.updated_at,
        }
    }
}

/// First and last time `history` entered PUBLISHED.
pub fn published_bounds(
    history: &[analysis_state_change::Model],
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let published = history
        .iter()
        .filter(|c| c.updated_state == AnalysisState::Published)
        .map(|c| c.updated_at);
    let first = published.clone().min();
    let last = published.max();
    (first, last)
}
