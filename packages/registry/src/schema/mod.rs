mod registry;
pub mod render;
mod validator;

pub use registry::{AnalysisType, ListQuery, SchemaRegistry};
pub use validator::{
    PayloadValidator, ValidationError, ValidationErrors, ValidationMode, VersionPolicy,
};
