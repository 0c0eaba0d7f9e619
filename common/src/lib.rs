// Shared library for the publish-time decision engine: feature extraction,
// scoring models, the scheduling engine, and the rescheduling sweep.

pub mod cadence;
pub mod config;
pub mod engine;
pub mod errors;
pub mod features;
pub mod lock;
pub mod model;
pub mod models;
pub mod policy;
pub mod retry;
pub mod service;
pub mod store;
pub mod telemetry;
