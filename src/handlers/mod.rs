//! HTTP handlers

pub mod health;
pub mod alerts;
pub mod incidents;
pub mod ingest;
