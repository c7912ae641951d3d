// Library root - exposes modules for the binary and integration tests

pub mod audit_service;
pub mod auth;
pub mod config;
pub mod consultation_service;
pub mod crypto;
pub mod database;
pub mod error;
pub mod flash;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod patient_service;
pub mod report_generator;
pub mod report_service;
pub mod user_service;
