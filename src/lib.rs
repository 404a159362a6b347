//! Digital Twin Orchestrator
//!
//! A multi-agent "digital twin" of an organization that:
//! - Retrieves context from an append-only, similarity-searchable store
//! - Dispatches specialist agents concurrently against one state snapshot
//! - Merges their outputs deterministically and synthesizes a final memo
//! - Archives finished runs back into the store for later retrieval
//! - Degrades instead of failing when the store or generation backend is missing
//!
//! RUN LOOP:
//! INIT → RETRIEVE → DISPATCH → MERGE → (RE-DISPATCH?) → FINALIZE → ARCHIVE

pub mod agents;
pub mod archive;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod retrieval;
pub mod store;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use config::OrchestratorConfig;
pub use models::*;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
