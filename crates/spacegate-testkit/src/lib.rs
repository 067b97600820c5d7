//! # Spacegate Testkit
//!
//! Testing utilities for Spacegate.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: A space with signed genesis, membership and feed credentials
//! - **Processors**: Recording and failing credential processors
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust
//! use spacegate_testkit::SpaceFixture;
//!
//! let fixture = SpaceFixture::new();
//! let chain = fixture.genesis_chain();
//! assert_eq!(chain.len(), 4);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use spacegate_testkit::generators::credential_script;
//!
//! proptest! {
//!     #[test]
//!     fn script_is_idempotent(script in credential_script(16)) {
//!         // run the script twice and compare state
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    multi_party_fixtures, FailingProcessor, RecordingProcessor, SpaceFixture, TestFixture,
};
pub use generators::{credential_script, script_member, ScriptStep};
