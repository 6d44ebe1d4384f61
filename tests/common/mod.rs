//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{FakeGenerator, TestEnv, CATALOG_REPLY};
//!
//! #[tokio::test]
//! async fn test_catalog() {
//!     let env = TestEnv::new(FakeGenerator::new(|_| Ok(CATALOG_REPLY.to_string())));
//!     let report = env.orchestrator().run_all().await;
//!     assert!(report.success);
//! }
//! ```

mod constants;
mod env;
mod fixtures;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use env::{start_time, TestEnv};
pub use fixtures::FakeGenerator;
