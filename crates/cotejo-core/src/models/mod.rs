//! Data models: document records, results and configuration.

pub mod config;
pub mod document;
pub mod report;
