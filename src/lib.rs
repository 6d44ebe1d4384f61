//! Content Autopilot Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod automation;
pub mod automation_store;
pub mod config;
pub mod content_store;
pub mod llm;
pub mod metrics;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use automation_store::{AutomationStore, SqliteAutomationStore};
pub use content_store::{ContentStore, SqliteContentStore};
