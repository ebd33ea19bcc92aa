pub mod analysis;
pub mod analysis_data;
pub mod analysis_schema;
pub mod analysis_state_change;
pub mod donor;
pub mod file;
pub mod sample;
pub mod sample_set;
pub mod specimen;
pub mod study;
