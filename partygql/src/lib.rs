//! # partygql
//!
//! GraphQL backend for [`partysync`]: implements
//! [`PlaylistBackend`](partysync::PlaylistBackend) against the party server.
//!
//! - Queries and mutations: JSON over HTTP POST (`reqwest`)
//! - `PlaylistUpdated`: `graphql-transport-ws` over WebSocket
//!   (`tokio-tungstenite`), one connection per subscription
//!
//! ```no_run
//! use std::sync::Arc;
//! use partygql::GraphqlBackend;
//! use partysync::{
//!     CoordinatorDeps, CoordinatorSettings, FilePartyStore, MemoryTabHost, PartyCoordinator,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(GraphqlBackend::from_config()?);
//! let coordinator = PartyCoordinator::spawn(CoordinatorDeps::new(
//!     backend,
//!     Arc::new(MemoryTabHost::new()),
//!     Arc::new(FilePartyStore::from_config()?),
//!     CoordinatorSettings::from_config()?,
//! ));
//! # let _ = coordinator;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod documents;
pub mod error;
pub mod subscription;

#[cfg(feature = "partyconfig")]
pub mod config_ext;

pub use client::{GraphqlBackend, GraphqlBackendBuilder, GraphqlError, GraphqlResponse};
pub use error::{Error, Result};
pub use subscription::ProtocolMessage;

#[cfg(feature = "partyconfig")]
pub use config_ext::GraphqlConfigExt;
