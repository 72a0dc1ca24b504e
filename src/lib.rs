//! Session-aware client for the postboard community API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `session::Session` owns the credential/identity lifecycle, `api::ApiClient`
//! issues HTTP calls and performs the single refresh-and-retry on 401, and
//! `services` wraps the post/comment/user/image endpoints on top of both.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use postboard::config::ClientConfig;
//! use postboard::credential::MemoryStore;
//! use postboard::session::Session;
//! use std::sync::Arc;
//!
//! let session = Session::new(ClientConfig::from_env()?, Arc::new(MemoryStore::new()), None)?;
//! if session.login("a@b.c", "pw").await {
//!     let posts = session.posts().list(0, 10).await?;
//!     println!("{posts}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod credential;
pub mod error;
pub mod services;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, AuthHandler, RequestBody, RequestOptions};
pub use config::{ClientConfig, CredentialMode};
pub use credential::{Credential, CredentialStore, FileStore, MemoryStore};
pub use error::{ApiError, ConfigError, ErrorPayload};
pub use session::{Session, SessionObserver, SessionPhase};
pub use types::Identity;
