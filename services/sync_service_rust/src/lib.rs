//! sync_service_rust - keeps live event state and validated odds in storage

pub mod config;
pub mod service;

pub use config::ServiceConfig;
pub use service::SyncService;
