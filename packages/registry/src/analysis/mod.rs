mod model;
mod patch;
mod service;
mod verify;

pub use model::{Analysis, AnalysisHeader, AnalysisView, StateTransition, published_bounds};
pub use patch::merge_patch;
pub use service::{AnalysisService, Collaborators, LifecycleOptions};
pub use verify::{StorageReport, verify_files};
