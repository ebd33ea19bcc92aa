pub mod analysis;
pub mod composite;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod ids;
pub mod models;
pub mod schema;
pub mod seed;
pub mod state;
pub mod study;
