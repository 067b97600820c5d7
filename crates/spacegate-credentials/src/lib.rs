//! # Spacegate Credentials
//!
//! Space authorization as replayed credentials.
//!
//! ## Overview
//!
//! A space is founded by a genesis credential and grows by membership and
//! feed admission credentials. Instead of mutable membership tables, the
//! [`SpaceStateMachine`] validates each credential as it arrives from a
//! feed and derives the current membership and feed set from the accepted
//! log.
//!
//! ## Key Concepts
//!
//! - **Genesis**: The founding credential; exactly one per space
//! - **SpaceMember**: Sets the role of an identity (issued by the space or an admin)
//! - **AdmittedFeed**: Admits a feed (issued by a member or admin)
//! - **CredentialProcessor**: Receives the accepted log, backlog first, then live
//!
//! ## Usage
//!
//! ```rust,no_run
//! use spacegate_core::{Keypair, PublicKey};
//! use spacegate_credentials::SpaceStateMachine;
//!
//! # async fn demo(credentials: Vec<spacegate_core::Credential>, feed: PublicKey) {
//! let space = Keypair::generate();
//! let state = SpaceStateMachine::new(space.public_key());
//! for credential in &credentials {
//!     if !state.process(credential, feed).await {
//!         // Rejected; already logged.
//!     }
//! }
//! # }
//! ```

pub mod error;
pub mod feed;
pub mod generator;
pub mod member;
pub mod processor;
pub mod state;

pub use error::{CredentialsError, Result};
pub use feed::{FeedInfo, FeedStateMachine};
pub use generator::CredentialGenerator;
pub use member::{MemberInfo, MemberStateMachine};
pub use processor::{CredentialConsumer, CredentialProcessor};
pub use state::SpaceStateMachine;
