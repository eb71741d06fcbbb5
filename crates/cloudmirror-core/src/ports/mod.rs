//! Port definitions (hexagonal architecture interfaces)
//!
//! The reconciliation engine depends only on these traits; implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Name-and-parent addressed node store (Google Drive)
//! - [`IAuthenticator`] - Turns credential material into transport credentials

pub mod authenticator;
pub mod remote_store;

pub use authenticator::{IAuthenticator, TransportCredential};
pub use remote_store::IRemoteStore;
