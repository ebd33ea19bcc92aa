pub mod analysis_state;
pub mod analysis_type;
pub mod config;
pub mod payload;
pub mod retry;
pub mod storage;

pub use analysis_state::AnalysisState;
pub use analysis_type::{AnalysisTypeError, AnalysisTypeId, AnalysisTypeRef};
